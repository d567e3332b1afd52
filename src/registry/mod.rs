//! Site registry -- the authoritative, ordered set of monitored targets.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use reqwest::Url;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

/// Shortest interval accepted for targets added at runtime.
pub const MIN_INTERVAL_SECS: i64 = 30;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddError {
    #[error("interval must be an integer of at least {min} seconds, got {0}", min = MIN_INTERVAL_SECS)]
    InvalidInterval(String),
    #[error("invalid url {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("site {0} is already monitored")]
    Duplicate(String),
}

/// A monitored URL and its ping interval. Never mutated once registered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    pub url: String,
    pub interval_seconds: u64,
}

impl Target {
    pub fn interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.interval_seconds)
    }
}

/// Insertion-ordered targets, unique by url. Cloning shares the registry.
#[derive(Clone, Default)]
pub struct SiteRegistry {
    targets: Arc<RwLock<Vec<Target>>>,
}

impl SiteRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-filled with startup targets.
    ///
    /// Startup targets skip the interval floor; a url listed twice keeps
    /// its first entry.
    pub fn with_targets(targets: impl IntoIterator<Item = Target>) -> Self {
        let registry = Self::new();
        {
            let mut guard = registry.write();
            for target in targets {
                if guard.iter().any(|t| t.url == target.url) {
                    warn!(url = %target.url, "Duplicate startup site skipped");
                    continue;
                }
                guard.push(target);
            }
        }
        registry
    }

    /// Validate and append a new target.
    pub fn add(&self, url: &str, interval_seconds: i64) -> Result<Target, AddError> {
        if interval_seconds < MIN_INTERVAL_SECS {
            return Err(AddError::InvalidInterval(interval_seconds.to_string()));
        }
        let url = validate_url(url)?;

        let target = Target {
            url,
            interval_seconds: interval_seconds as u64,
        };

        // Check and insert under one write lock so two racing adds of the
        // same url cannot both succeed.
        let mut targets = self.write();
        if targets.iter().any(|t| t.url == target.url) {
            return Err(AddError::Duplicate(target.url));
        }
        targets.push(target.clone());
        drop(targets);

        info!(url = %target.url, interval_secs = target.interval_seconds, "Site registered");
        Ok(target)
    }

    /// Point-in-time, insertion-ordered copy.
    pub fn list(&self) -> Vec<Target> {
        self.read().clone()
    }

    pub fn get(&self, url: &str) -> Option<Target> {
        self.read().iter().find(|t| t.url == url).cloned()
    }

    pub fn contains(&self, url: &str) -> bool {
        self.read().iter().any(|t| t.url == url)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Undo an `add` whose task could not be started.
    pub(crate) fn rollback(&self, url: &str) {
        self.write().retain(|t| t.url != url);
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<Target>> {
        self.targets.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<Target>> {
        self.targets.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Accept absolute http(s) urls with a host. The trimmed input is kept
/// as the identity so the same string always maps to the same target.
pub(crate) fn validate_url(raw: &str) -> Result<String, AddError> {
    let trimmed = raw.trim();
    let invalid = |reason: &str| AddError::InvalidUrl {
        url: raw.to_string(),
        reason: reason.to_string(),
    };

    if trimmed.is_empty() {
        return Err(invalid("url is empty"));
    }
    let parsed = Url::parse(trimmed).map_err(|e| invalid(&e.to_string()))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(invalid("scheme must be http or https"));
    }
    if parsed.host_str().map_or(true, str::is_empty) {
        return Err(invalid("url has no host"));
    }
    Ok(trimmed.to_string())
}
