//! Null engine configuration with TOML support.

use serde::{Deserialize, Serialize};

use crate::NullEngineError;

/// When idle transactions commit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum AutoCommit {
    /// Commit once the transaction has had no pending request while the
    /// runtime yielded `yields` times, approximating an event loop that
    /// returned to idle.
    OnIdle {
        #[serde(default = "default_idle_yields")]
        yields: u32,
    },
    /// Never commit on its own; call `NullEngine::commit_idle`.
    Manual,
}

impl Default for AutoCommit {
    fn default() -> Self {
        Self::OnIdle {
            yields: default_idle_yields(),
        }
    }
}

/// Configuration for a [`NullEngine`](crate::NullEngine).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NullEngineConfig {
    #[serde(default)]
    pub auto_commit: AutoCommit,
}

fn default_idle_yields() -> u32 {
    4
}

impl NullEngineConfig {
    /// Transactions stay open until committed by hand.
    pub fn manual() -> Self {
        Self {
            auto_commit: AutoCommit::Manual,
        }
    }

    pub fn from_toml_file(path: &str) -> Result<Self, NullEngineError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| NullEngineError::Config(e.to_string()))?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(s: &str) -> Result<Self, NullEngineError> {
        toml::from_str(s).map_err(|e| NullEngineError::Config(e.to_string()))
    }

    pub fn to_toml_string(&self) -> Result<String, NullEngineError> {
        toml::to_string_pretty(self).map_err(|e| NullEngineError::Config(e.to_string()))
    }
}
