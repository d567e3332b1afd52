//! TOML configuration for the keep-alive daemon.
//!
//! Every section has compiled-in defaults, so an empty file (or no file at
//! all) yields a working setup. The listening port can be overridden by the
//! `PORT` environment variable, which is how most hosting platforms hand it in.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::fetch::retry::{RetryPolicy, DEFAULT_RETRY_STATUSES};

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "KEEPALIVE_CONFIG";

/// Environment variable overriding `server.port`.
pub const PORT_ENV: &str = "PORT";

/// Config file picked up from the working directory when nothing else is given.
pub const LOCAL_CONFIG: &str = "keepalive.toml";

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Root configuration for the keep-alive process.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KeepAliveConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    /// Targets monitored from startup.
    #[serde(default)]
    pub sites: Vec<SiteConfig>,
}

impl KeepAliveConfig {
    /// Load configuration from a TOML file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        info!(path = %path.display(), sites = config.sites.len(), "loaded keep-alive configuration");
        Ok(config)
    }

    /// Resolve the configuration, in order:
    /// 1. `explicit`, when given (a load failure is an error).
    /// 2. The path in `KEEPALIVE_CONFIG`.
    /// 3. `./keepalive.toml`.
    /// 4. Compiled-in defaults.
    ///
    /// The `PORT` override is applied last and the result is validated.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match explicit {
            Some(path) => Self::load(path)?,
            None => Self::load_or_default(),
        };
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Steps 2-4 of [`KeepAliveConfig::resolve`]; never fails.
    pub fn load_or_default() -> Self {
        if let Ok(env_path) = std::env::var(CONFIG_ENV) {
            let path = PathBuf::from(env_path);
            match Self::load(&path) {
                Ok(cfg) => return cfg,
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "KEEPALIVE_CONFIG set but file could not be loaded, trying fallback"
                    );
                }
            }
        }

        let local = Path::new(LOCAL_CONFIG);
        if local.exists() {
            match Self::load(local) {
                Ok(cfg) => return cfg,
                Err(e) => {
                    warn!(
                        path = %local.display(),
                        error = %e,
                        "local config file exists but could not be loaded, using defaults"
                    );
                }
            }
        }

        debug!("no config file found, using compiled-in defaults");
        Self::default()
    }

    /// Apply `PORT` from the environment, if set.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(raw) = std::env::var(PORT_ENV) {
            self.apply_port_override(&raw)?;
        }
        Ok(())
    }

    fn apply_port_override(&mut self, raw: &str) -> Result<()> {
        let port: u16 = raw
            .trim()
            .parse()
            .with_context(|| format!("{PORT_ENV} is not a valid port: {raw:?}"))?;
        self.server.port = port;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.history.capacity == 0 {
            bail!("history.capacity must be at least 1");
        }
        if self.fetch.max_attempts == 0 {
            bail!("fetch.max_attempts must be at least 1");
        }
        if self.fetch.timeout_secs == 0 {
            bail!("fetch.timeout_secs must be at least 1");
        }
        for site in &self.sites {
            if site.interval_seconds == 0 {
                bail!("site {} has a zero interval", site.url);
            }
            crate::registry::validate_url(&site.url)
                .with_context(|| format!("site {:?} in [[sites]]", site.url))?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

/// HTTP listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 10000,
        }
    }
}

// ---------------------------------------------------------------------------
// Fetch
// ---------------------------------------------------------------------------

/// Per-ping request and retry settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Total timeout of one request, redirects included.
    pub timeout_secs: u64,
    /// Requests per ping, first one included.
    pub max_attempts: u32,
    /// First retry delay; doubles on every further retry.
    pub backoff_base_ms: u64,
    /// Upper bound for any retry delay, `Retry-After` included.
    pub max_backoff_ms: u64,
    /// Statuses considered transient.
    pub retry_statuses: Vec<u16>,
}

impl FetchConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.backoff_base_ms),
            max_delay: Duration::from_millis(self.max_backoff_ms),
            retry_statuses: self.retry_statuses.clone(),
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            max_attempts: 3,
            backoff_base_ms: 1000,
            max_backoff_ms: 30_000,
            retry_statuses: DEFAULT_RETRY_STATUSES.to_vec(),
        }
    }
}

// ---------------------------------------------------------------------------
// History
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Outcomes kept before the oldest is evicted.
    pub capacity: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self { capacity: 100 }
    }
}

// ---------------------------------------------------------------------------
// Sites
// ---------------------------------------------------------------------------

/// One initial target. Not subject to the runtime interval floor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SiteConfig {
    pub url: String,
    #[serde(default = "default_site_interval")]
    pub interval_seconds: u64,
}

fn default_site_interval() -> u64 {
    120
}

impl From<SiteConfig> for crate::registry::Target {
    fn from(site: SiteConfig) -> Self {
        Self {
            url: site.url.trim().to_string(),
            interval_seconds: site.interval_seconds,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = KeepAliveConfig::default();
        assert_eq!(config.server.port, 10000);
        assert_eq!(config.fetch.timeout_secs, 10);
        assert_eq!(config.fetch.max_attempts, 3);
        assert_eq!(config.history.capacity, 100);
        assert!(config.sites.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[server]
port = 8081

[[sites]]
url = "https://a.test"
interval_seconds = 60

[[sites]]
url = "https://b.test"
"#
        )
        .unwrap();

        let config = KeepAliveConfig::load(file.path()).unwrap();

        assert_eq!(config.server.port, 8081);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.fetch.max_attempts, 3);
        assert_eq!(config.sites.len(), 2);
        assert_eq!(config.sites[0].interval_seconds, 60);
        assert_eq!(config.sites[1].interval_seconds, 120);
    }

    #[test]
    fn test_load_rejects_bad_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[server\nport = ").unwrap();
        assert!(KeepAliveConfig::load(file.path()).is_err());
    }

    #[test]
    fn test_port_override() {
        let mut config = KeepAliveConfig::default();
        config.apply_port_override("8088").unwrap();
        assert_eq!(config.server.port, 8088);
        assert_eq!(config.server.bind_address(), "0.0.0.0:8088");
        assert!(config.apply_port_override("not-a-port").is_err());
        assert!(config.apply_port_override("70000").is_err());
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        let mut config = KeepAliveConfig::default();
        config.history.capacity = 0;
        assert!(config.validate().is_err());

        let mut config = KeepAliveConfig::default();
        config.fetch.max_attempts = 0;
        assert!(config.validate().is_err());

        let mut config = KeepAliveConfig::default();
        config.fetch.timeout_secs = 0;
        assert!(config.validate().is_err());

        let mut config = KeepAliveConfig::default();
        config.sites.push(SiteConfig {
            url: "https://a.test".to_string(),
            interval_seconds: 0,
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_site_urls() {
        for url in ["", "ftp://files.test", "not a url"] {
            let mut config = KeepAliveConfig::default();
            config.sites.push(SiteConfig {
                url: url.to_string(),
                interval_seconds: 60,
            });
            let err = config.validate().unwrap_err();
            assert!(format!("{err:#}").contains("invalid url"), "{url:?}: {err:#}");
        }

        let mut config = KeepAliveConfig::default();
        config.sites.push(SiteConfig {
            url: " https://a.test ".to_string(),
            interval_seconds: 60,
        });
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_retry_policy_from_config() {
        let config = FetchConfig {
            backoff_base_ms: 250,
            ..FetchConfig::default()
        };
        let policy = config.retry_policy();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.delay(1), Duration::from_millis(500));
        assert!(policy.is_retryable_status(429));
    }
}
