//! Client configuration
//!
//! Loaded from a TOML file, then overridden by environment variables:
//!
//! - `EQUICALC_API_URL` - base URL of the calculation API
//! - `EQUICALC_SIMULATION_URL` - WebSocket endpoint of the simulation service
//! - `EQUICALC_REQUEST_TIMEOUT_SECS` - per-request timeout of the HTTP adapter

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable overriding [`ClientConfig::api_base_url`]
pub const ENV_API_URL: &str = "EQUICALC_API_URL";
/// Environment variable overriding [`ClientConfig::simulation_url`]
pub const ENV_SIMULATION_URL: &str = "EQUICALC_SIMULATION_URL";
/// Environment variable overriding [`ClientConfig::request_timeout_secs`]
pub const ENV_REQUEST_TIMEOUT: &str = "EQUICALC_REQUEST_TIMEOUT_SECS";

/// Errors produced while loading configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: &'static str, message: String },

    #[error("failed to build HTTP client: {0}")]
    HttpClient(String),
}

/// Where the remote services live
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL of the calculation API
    pub api_base_url: String,
    /// WebSocket URL of the simulation service
    pub simulation_url: String,
    /// Per-request timeout; `None` leaves requests unbounded
    pub request_timeout_secs: Option<u64>,
    /// User-Agent header sent with every request
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://127.0.0.1:8000".to_string(),
            simulation_url: "ws://127.0.0.1:8000/ws/simulate".to_string(),
            request_timeout_secs: None,
            user_agent: concat!("equicalc/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl ClientConfig {
    /// Create a config pointing at the given API
    #[must_use]
    pub fn new(api_base_url: impl Into<String>) -> Self {
        Self {
            api_base_url: api_base_url.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_simulation_url(mut self, url: impl Into<String>) -> Self {
        self.simulation_url = url.into();
        self
    }

    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_secs = Some(timeout.as_secs());
        self
    }

    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Per-request timeout as a [`Duration`]
    #[must_use]
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }

    /// Parse a TOML document; missing keys keep their defaults
    ///
    /// # Errors
    /// Returns [`ConfigError::Parse`] on malformed TOML.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Load and validate a TOML file
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from the process environment
    ///
    /// # Errors
    /// Returns [`ConfigError::InvalidValue`] for unparsable overrides.
    pub fn apply_env(self) -> Result<Self, ConfigError> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary lookup
    ///
    /// # Errors
    /// Returns [`ConfigError::InvalidValue`] for unparsable overrides.
    pub fn apply_env_from<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_API_URL) {
            self.api_base_url = url;
        }
        if let Some(url) = lookup(ENV_SIMULATION_URL) {
            self.simulation_url = url;
        }
        if let Some(raw) = lookup(ENV_REQUEST_TIMEOUT) {
            let secs = raw.trim().parse::<u64>().map_err(|e| ConfigError::InvalidValue {
                key: ENV_REQUEST_TIMEOUT,
                message: e.to_string(),
            })?;
            self.request_timeout_secs = Some(secs);
        }
        self.validate()?;
        Ok(self)
    }

    /// Check URL schemes and the timeout
    ///
    /// # Errors
    /// Returns [`ConfigError::InvalidValue`] naming the offending key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !has_scheme(&self.api_base_url, &["http://", "https://"]) {
            return Err(ConfigError::InvalidValue {
                key: "api_base_url",
                message: format!("expected an http(s) URL, got {:?}", self.api_base_url),
            });
        }
        if !has_scheme(&self.simulation_url, &["ws://", "wss://"]) {
            return Err(ConfigError::InvalidValue {
                key: "simulation_url",
                message: format!("expected a ws(s) URL, got {:?}", self.simulation_url),
            });
        }
        if self.request_timeout_secs == Some(0) {
            return Err(ConfigError::InvalidValue {
                key: "request_timeout_secs",
                message: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

fn has_scheme(url: &str, schemes: &[&str]) -> bool {
    schemes
        .iter()
        .any(|scheme| url.len() > scheme.len() && url.starts_with(scheme))
}
