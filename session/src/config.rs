//! Session configuration with TOML file support.

use serde::{Deserialize, Serialize};

use larder_utils::{try_init_logging, LogFormat, LoggingError};

use crate::SessionError;

/// Configuration for a [`StoreSession`](crate::StoreSession).
///
/// Can be loaded from a TOML file via [`SessionConfig::from_toml_file`] or
/// built programmatically (e.g. for tests).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// How many times one operation may reopen a lease the engine closed
    /// between the validity check and the request.
    #[serde(default = "default_max_lease_renewals")]
    pub max_lease_renewals: u32,

    /// Log format: "human" or "json".
    #[serde(default = "default_log_format")]
    pub log_format: LogFormat,

    /// Log level filter, e.g. "info" or "debug,larder_session=trace".
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_max_lease_renewals() -> u32 {
    1
}

fn default_log_format() -> LogFormat {
    LogFormat::Human
}

fn default_log_level() -> String {
    "info".to_string()
}

impl SessionConfig {
    pub fn from_toml_file(path: &str) -> Result<Self, SessionError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| SessionError::Config(e.to_string()))?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(s: &str) -> Result<Self, SessionError> {
        toml::from_str(s).map_err(|e| SessionError::Config(e.to_string()))
    }

    pub fn to_toml_string(&self) -> Result<String, SessionError> {
        toml::to_string_pretty(self).map_err(|e| SessionError::Config(e.to_string()))
    }

    /// Install the global tracing subscriber described by this config.
    pub fn init_logging(&self) -> Result<(), LoggingError> {
        try_init_logging(self.log_format, &self.log_level)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_lease_renewals: default_max_lease_renewals(),
            log_format: default_log_format(),
            log_level: default_log_level(),
        }
    }
}
