//! Raw TOML configuration data types
//!
//! These structs represent the exact structure of the TOML config file.
//! Every section is `#[serde(default)]`, so a partial file only overrides
//! what it names.

mod logging;
mod provider;
mod runner;
mod worker;

pub use logging::FileLoggingConfig;
pub use provider::{DEFAULT_MODEL, FileProviderConfig};
pub use runner::FileRunnerConfig;
pub use worker::{FileTimeoutsConfig, FileWorkerConfig};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration values that load but cannot work as given.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigValidationError {
    #[error("worker.name cannot be empty")]
    EmptyWorkerName,

    #[error("provider.model cannot be empty")]
    EmptyModelName,

    #[error("runner.turn_budget must be at least 1 (using 1)")]
    ZeroTurnBudget,

    #[error("worker.timeouts.{0} cannot be 0")]
    ZeroTimeout(&'static str),
}

/// Complete file configuration (raw TOML structure)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    /// Worker process and transport settings
    pub worker: FileWorkerConfig,
    /// LLM provider settings
    pub provider: FileProviderConfig,
    /// Conversation loop settings
    pub runner: FileRunnerConfig,
    /// Log outputs
    pub logging: FileLoggingConfig,
}

impl FileConfig {
    /// Every problem found, in section order.
    pub fn validate(&self) -> Vec<ConfigValidationError> {
        let mut issues = Vec::new();
        if self.worker.name.trim().is_empty() {
            issues.push(ConfigValidationError::EmptyWorkerName);
        }
        let timeouts = &self.worker.timeouts;
        for (field, value) in [
            ("initialize_secs", timeouts.initialize_secs),
            ("list_tools_secs", timeouts.list_tools_secs),
            ("default_secs", timeouts.default_secs),
            ("complex_secs", timeouts.complex_secs),
        ] {
            if value == 0 {
                issues.push(ConfigValidationError::ZeroTimeout(field));
            }
        }
        if self.provider.model.trim().is_empty() {
            issues.push(ConfigValidationError::EmptyModelName);
        }
        if self.runner.turn_budget == 0 {
            issues.push(ConfigValidationError::ZeroTurnBudget);
        }
        issues
    }
}
