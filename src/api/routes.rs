//! API route definitions.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{error, info};

use super::error::ApiError;
use super::state::AppState;
use crate::fetch::FetchOutcome;
use crate::registry::AddError;
use crate::scheduler::ScheduleError;

pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/status", get(status))
        .route("/logs", get(logs))
        .route("/add_site", post(add_site))
}

pub async fn index() -> &'static str {
    "Keep-alive service is running!"
}

async fn status(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "online",
        "uptime": state.uptime.formatted(),
        "started_at": state.uptime.started_at().to_rfc3339(),
        "active_tasks": state.scheduler.active_tasks(),
        "monitored_sites": state.registry.list(),
    }))
}

/// Oldest first; the dashboard reverses for display.
async fn logs(State(state): State<AppState>) -> Json<Vec<FetchOutcome>> {
    Json(state.history.snapshot())
}

#[derive(Debug, Deserialize)]
pub struct AddSiteRequest {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub interval: Option<Value>,
}

async fn add_site(
    State(state): State<AppState>,
    payload: Result<Json<AddSiteRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let Json(req) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    let interval = parse_interval(req.interval.as_ref())?;
    let target = state
        .registry
        .add(req.url.as_deref().unwrap_or_default(), interval)?;

    if let Err(e) = state.scheduler.spawn_for(&target) {
        error!(url = %target.url, error = %e, "Could not start keep-alive task");
        if !matches!(e, ScheduleError::AlreadyScheduled(_)) {
            state.registry.rollback(&target.url);
        }
        return Err(e.into());
    }

    info!(url = %target.url, interval_secs = target.interval_seconds, "Site added at runtime");
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "status": "success",
            "message": format!(
                "Site {} added, pinging every {} seconds",
                target.url, target.interval_seconds
            ),
        })),
    ))
}

/// Accept a JSON integer or a numeric string.
fn parse_interval(raw: Option<&Value>) -> Result<i64, AddError> {
    match raw {
        Some(Value::Number(n)) => n
            .as_i64()
            .ok_or_else(|| AddError::InvalidInterval(n.to_string())),
        Some(Value::String(s)) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| AddError::InvalidInterval(format!("{s:?}"))),
        Some(other) => Err(AddError::InvalidInterval(other.to_string())),
        None => Err(AddError::InvalidInterval("nothing".to_string())),
    }
}
