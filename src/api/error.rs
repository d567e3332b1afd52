use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::registry::AddError;
use crate::scheduler::ScheduleError;

/// Error returned by API handlers, rendered as `{status: "error", message}`.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Add(AddError),
    Schedule(ScheduleError),
}

impl From<AddError> for ApiError {
    fn from(err: AddError) -> Self {
        ApiError::Add(err)
    }
}

impl From<ScheduleError> for ApiError {
    fn from(err: ScheduleError) -> Self {
        ApiError::Schedule(err)
    }
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Add(AddError::InvalidInterval(_)) => StatusCode::BAD_REQUEST,
            ApiError::Add(AddError::InvalidUrl { .. }) => StatusCode::BAD_REQUEST,
            ApiError::Add(AddError::Duplicate(_)) => StatusCode::CONFLICT,
            ApiError::Schedule(ScheduleError::AlreadyScheduled(_)) => StatusCode::CONFLICT,
            ApiError::Schedule(ScheduleError::ShuttingDown) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Schedule(ScheduleError::NoRuntime) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(&self) -> String {
        match self {
            ApiError::BadRequest(msg) => msg.clone(),
            ApiError::Add(e) => e.to_string(),
            ApiError::Schedule(e) => e.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "status": "error",
            "message": self.message(),
        }));
        (self.status_code(), body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ApiError::from(AddError::InvalidInterval("5".into())).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(AddError::Duplicate("https://a.test".into())).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::from(ScheduleError::NoRuntime).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
