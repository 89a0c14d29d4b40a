//! Runtime configuration
//!
//! Defaults are overridden by `MELODY_*` environment variables, optionally
//! read from a `.env` file in the working directory.

use serde::Deserialize;
use thiserror::Error;
use tracing::info;

/// Default request timeout for the hosted backend (seconds)
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

/// Default connect timeout for the hosted backend (seconds)
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 5;

/// Privacy-enhanced host variant of the embeddable player
pub const DEFAULT_PLAYER_HOST: &str = "https://www.youtube-nocookie.com";

/// Default tracing filter
const DEFAULT_LOG_FILTER: &str = "melody_core=debug";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {message}")]
    Invalid { key: &'static str, message: String },

    #[error("Missing required setting: {0}")]
    Missing(&'static str),
}

/// Hosted backend connection settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Project URL, e.g. `https://xyz.supabase.co`
    pub url: String,
    /// Public (anon) API key
    pub anon_key: String,
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            anon_key: String::new(),
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

impl BackendConfig {
    pub fn new(url: impl Into<String>, anon_key: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            anon_key: anon_key.into(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.url.trim().is_empty() {
            return Err(ConfigError::Missing("MELODY_BACKEND_URL"));
        }
        if !(self.url.starts_with("http://") || self.url.starts_with("https://")) {
            return Err(ConfigError::Invalid {
                key: "MELODY_BACKEND_URL",
                message: format!("'{}' is not an http(s) URL", self.url),
            });
        }
        if self.anon_key.trim().is_empty() {
            return Err(ConfigError::Missing("MELODY_BACKEND_ANON_KEY"));
        }
        if self.request_timeout_secs == 0 || self.connect_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "MELODY_BACKEND_TIMEOUT_SECS",
                message: "timeouts must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

/// Embedded player settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Widget host variant
    pub host: String,
    /// Origin of the embedding page, declared to the widget for postMessage checks
    pub origin: String,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_PLAYER_HOST.to_string(),
            origin: String::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive string
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub backend: BackendConfig,
    pub player: PlayerConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration.
    ///
    /// Loading order:
    /// 1. Built-in defaults
    /// 2. `.env` file in the working directory, if present
    /// 3. `MELODY_*` environment variable overrides
    ///
    /// Does NOT validate - call validate() after load().
    pub fn load() -> Result<Self, ConfigError> {
        if let Ok(path) = dotenvy::dotenv() {
            info!("Loaded environment from {}", path.display());
        }

        let mut config = Config::default();
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply overrides from a key lookup (the process environment in production)
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("MELODY_BACKEND_URL") {
            self.backend.url = url.trim_end_matches('/').to_string();
        }
        if let Some(key) = lookup("MELODY_BACKEND_ANON_KEY") {
            self.backend.anon_key = key;
        }
        if let Some(timeout) = lookup("MELODY_BACKEND_TIMEOUT_SECS") {
            self.backend.request_timeout_secs =
                timeout.trim().parse().map_err(|_| ConfigError::Invalid {
                    key: "MELODY_BACKEND_TIMEOUT_SECS",
                    message: format!("'{}' is not a number of seconds", timeout),
                })?;
        }
        if let Some(origin) = lookup("MELODY_PLAYER_ORIGIN") {
            self.player.origin = origin;
        }
        if let Some(filter) = lookup("MELODY_LOG") {
            self.logging.filter = filter;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.backend.validate()
    }

    /// Log configuration summary (never logs the key)
    pub fn log_summary(&self) {
        info!("Configuration loaded:");
        info!("  backend: {} (timeout {}s)", self.backend.url, self.backend.request_timeout_secs);
        info!("  player host: {}", self.player.host);
        if !self.player.origin.is_empty() {
            info!("  player origin: {}", self.player.origin);
        }
    }
}
