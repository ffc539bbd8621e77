//! Configuration file loading for quest-keeper
//!
//! This module handles file I/O and merging of configuration from multiple sources.
//! The priority order (highest to lowest):
//!
//! 1. `QUESTKEEPER_*` environment variables (`__` separates nested keys)
//! 2. `--config <path>` specified file
//! 3. Project root: `./questkeeper.toml`
//! 4. Global: `$XDG_CONFIG_HOME/questkeeper/config.toml`
//! 5. Default values

mod file_config;
mod loader;

pub use file_config::{
    ConfigValidationError, DEFAULT_MODEL, FileConfig, FileLoggingConfig, FileProviderConfig,
    FileRunnerConfig, FileTimeoutsConfig, FileWorkerConfig,
};
pub use loader::{ConfigError, ConfigLoader};
