//! Worker process configuration (`[worker]` section)

use crate::rpc::client::{DEFAULT_SLOW_RESPONSE, DEFAULT_STDERR_FILTERS};
use crate::rpc::timeout::DEFAULT_COMPLEX_TOOLS;
use crate::rpc::{TimeoutPolicy, WorkerLaunch};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileWorkerConfig {
    /// Logical worker name; also the packaged binary's file name.
    pub name: String,
    /// State directory, created on connect and used as the worker's cwd.
    pub working_dir: PathBuf,
    /// Explicit packaged binary. Defaults to `<name>` next to this executable.
    pub packaged_binary: Option<PathBuf>,
    /// Executable looked up on `PATH` when the packaged binary fails.
    pub direct_executable: String,
    /// Last-resort command run through the platform shell.
    pub shell_command: String,
    pub args: Vec<String>,
    /// Files copied into `working_dir` before the packaged strategy runs.
    pub staged_artifacts: Vec<PathBuf>,
    /// Stderr lines containing any of these are logged at debug level.
    pub stderr_filters: Vec<String>,
    pub slow_response_ms: u64,
    pub timeouts: FileTimeoutsConfig,
}

impl Default for FileWorkerConfig {
    fn default() -> Self {
        Self {
            name: "rpg-mcp-server".to_string(),
            working_dir: default_working_dir(),
            packaged_binary: None,
            direct_executable: "rpg-mcp-server-direct".to_string(),
            shell_command: "rpg-mcp-server".to_string(),
            args: Vec::new(),
            staged_artifacts: Vec::new(),
            stderr_filters: DEFAULT_STDERR_FILTERS.iter().map(|s| s.to_string()).collect(),
            slow_response_ms: DEFAULT_SLOW_RESPONSE.as_millis() as u64,
            timeouts: FileTimeoutsConfig::default(),
        }
    }
}

fn default_working_dir() -> PathBuf {
    dirs::data_dir()
        .map(|dir| dir.join("quest-keeper"))
        .unwrap_or_else(|| PathBuf::from(".quest-keeper"))
}

impl FileWorkerConfig {
    /// Launch description with the standard strategy ranking.
    pub fn to_launch(&self) -> WorkerLaunch {
        WorkerLaunch::ranked(
            self.name.clone(),
            self.working_dir.clone(),
            self.packaged_binary.clone(),
            &self.direct_executable,
            &self.shell_command,
            &self.args,
        )
        .with_staged_artifacts(self.staged_artifacts.clone())
    }

    pub fn slow_response(&self) -> Duration {
        Duration::from_millis(self.slow_response_ms)
    }
}

/// Request deadlines (`[worker.timeouts]` section)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileTimeoutsConfig {
    pub initialize_secs: u64,
    pub list_tools_secs: u64,
    pub default_secs: u64,
    pub complex_secs: u64,
    /// Tools that get `complex_secs` instead of `default_secs`.
    pub complex_tools: Vec<String>,
}

impl Default for FileTimeoutsConfig {
    fn default() -> Self {
        Self {
            initialize_secs: 10,
            list_tools_secs: 10,
            default_secs: 30,
            complex_secs: 120,
            complex_tools: DEFAULT_COMPLEX_TOOLS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl FileTimeoutsConfig {
    pub fn to_policy(&self) -> TimeoutPolicy {
        TimeoutPolicy {
            initialize: Duration::from_secs(self.initialize_secs),
            list_tools: Duration::from_secs(self.list_tools_secs),
            default: Duration::from_secs(self.default_secs),
            complex: Duration::from_secs(self.complex_secs),
            complex_tools: self.complex_tools.iter().cloned().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::StrategyKind;

    #[test]
    fn default_timeouts_match_policy_defaults() {
        assert_eq!(FileTimeoutsConfig::default().to_policy(), TimeoutPolicy::default());
    }

    #[test]
    fn explicit_packaged_binary_ranks_first() {
        let config = FileWorkerConfig {
            packaged_binary: Some(PathBuf::from("/opt/qk/rpg-mcp-server")),
            staged_artifacts: vec![PathBuf::from("/opt/qk/better_sqlite3.node")],
            ..Default::default()
        };
        let launch = config.to_launch();
        assert_eq!(launch.strategies[0].kind, StrategyKind::Packaged);
        assert_eq!(launch.strategies[0].program, PathBuf::from("/opt/qk/rpg-mcp-server"));
        assert_eq!(launch.strategies.last().map(|s| s.kind), Some(StrategyKind::ShellWrapped));
        assert_eq!(launch.staged_artifacts.len(), 1);
    }
}
