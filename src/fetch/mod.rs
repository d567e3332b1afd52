//! Keep-alive fetching -- one resilient GET per call, classified into an outcome.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod http;
pub mod retry;

pub use self::http::HttpFetcher;
pub use self::retry::RetryPolicy;

/// Longest error description carried by an `Error` outcome, in characters.
pub const ERROR_TEXT_LIMIT: usize = 50;

/// Classification of a single fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeKind {
    /// Final response was HTTP 200.
    Success,
    /// A response arrived, but with any other status.
    Failure,
    /// No response: transport failure after the retry budget ran out.
    Error,
}

impl std::fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutcomeKind::Success => write!(f, "success"),
            OutcomeKind::Failure => write!(f, "failure"),
            OutcomeKind::Error => write!(f, "error"),
        }
    }
}

/// The recorded result of one fetch. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchOutcome {
    pub timestamp: DateTime<Utc>,
    pub url: String,
    pub status_text: String,
    pub kind: OutcomeKind,
}

impl FetchOutcome {
    pub fn success(url: &str, status_text: impl Into<String>) -> Self {
        Self::new(url, status_text.into(), OutcomeKind::Success)
    }

    pub fn failure(url: &str, status_text: impl Into<String>) -> Self {
        Self::new(url, status_text.into(), OutcomeKind::Failure)
    }

    /// Build an `Error` outcome; the description is cut to [`ERROR_TEXT_LIMIT`] characters.
    pub fn error(url: &str, description: &str) -> Self {
        let text: String = description.chars().take(ERROR_TEXT_LIMIT).collect();
        Self::new(url, text, OutcomeKind::Error)
    }

    fn new(url: &str, status_text: String, kind: OutcomeKind) -> Self {
        Self {
            timestamp: Utc::now(),
            url: url.to_string(),
            status_text,
            kind,
        }
    }

    pub fn is_success(&self) -> bool {
        self.kind == OutcomeKind::Success
    }
}

/// Anything able to ping a URL and classify the result.
///
/// Implementations never fail: every problem is folded into the returned
/// outcome, so callers can record it and carry on.
#[async_trait::async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> FetchOutcome;
}
