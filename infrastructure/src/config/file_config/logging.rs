//! Log output configuration (`[logging]` section)

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileLoggingConfig {
    /// JSONL conversation log. Disabled when unset.
    pub conversation_log: Option<PathBuf>,
    /// Write `mcp-debug.log` into the worker's working directory.
    pub debug_log: bool,
}

impl Default for FileLoggingConfig {
    fn default() -> Self {
        Self {
            conversation_log: None,
            debug_log: true,
        }
    }
}
