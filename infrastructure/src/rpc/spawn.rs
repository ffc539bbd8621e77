//! Worker process launch.
//!
//! A worker is started by trying a ranked list of [`SpawnStrategy`]s in
//! order. The first strategy whose process starts wins; every failed
//! attempt is logged and recorded, and if all of them fail the collected
//! reasons are returned as [`RpcError::Connect`].
//!
//! | Rank | Strategy | Program |
//! |------|----------|---------|
//! | 1 | [`StrategyKind::Packaged`] | Configured binary, or one named after the worker next to the current executable |
//! | 2 | [`StrategyKind::Direct`] | Direct executable resolved on `PATH` |
//! | 3 | [`StrategyKind::ShellWrapped`] | `sh -c <command>` (`cmd /c` on Windows) |

use super::error::{Result, RpcError};
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    Packaged,
    Direct,
    ShellWrapped,
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            StrategyKind::Packaged => "packaged",
            StrategyKind::Direct => "direct",
            StrategyKind::ShellWrapped => "shell",
        };
        f.write_str(label)
    }
}

/// One way of starting the worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnStrategy {
    pub kind: StrategyKind,
    pub program: PathBuf,
    pub args: Vec<String>,
    /// Staged artifacts must be in the working directory before this
    /// strategy may run.
    pub requires_staged_artifacts: bool,
}

impl SpawnStrategy {
    pub fn packaged(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            kind: StrategyKind::Packaged,
            program: program.into(),
            args,
            requires_staged_artifacts: true,
        }
    }

    /// `program` is resolved on `PATH` at spawn time.
    pub fn direct(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            kind: StrategyKind::Direct,
            program: program.into(),
            args,
            requires_staged_artifacts: false,
        }
    }

    /// Run `command` (with `args` appended) through the platform shell.
    pub fn shell_wrapped(command: &str, args: &[String]) -> Self {
        let mut line = command.to_string();
        for arg in args {
            line.push(' ');
            line.push_str(arg);
        }
        let (shell, flag) = if cfg!(windows) {
            ("cmd", "/c")
        } else {
            ("sh", "-c")
        };
        Self {
            kind: StrategyKind::ShellWrapped,
            program: PathBuf::from(shell),
            args: vec![flag.to_string(), line],
            requires_staged_artifacts: false,
        }
    }
}

/// Everything needed to start one named worker.
#[derive(Debug, Clone)]
pub struct WorkerLaunch {
    pub name: String,
    /// Created before spawning; used as the process cwd so the worker can
    /// persist its state there.
    pub working_dir: PathBuf,
    pub strategies: Vec<SpawnStrategy>,
    /// Files copied into `working_dir` before a strategy that requires them.
    pub staged_artifacts: Vec<PathBuf>,
}

impl WorkerLaunch {
    pub fn new(name: impl Into<String>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            working_dir: working_dir.into(),
            strategies: Vec::new(),
            staged_artifacts: Vec::new(),
        }
    }

    pub fn with_strategy(mut self, strategy: SpawnStrategy) -> Self {
        self.strategies.push(strategy);
        self
    }

    pub fn with_staged_artifacts(mut self, artifacts: Vec<PathBuf>) -> Self {
        self.staged_artifacts = artifacts;
        self
    }

    /// The standard three-strategy ranking.
    ///
    /// The packaged strategy is omitted when no binary is configured and the
    /// location of the current executable cannot be determined.
    pub fn ranked(
        name: impl Into<String>,
        working_dir: impl Into<PathBuf>,
        packaged_binary: Option<PathBuf>,
        direct_executable: &str,
        shell_command: &str,
        args: &[String],
    ) -> Self {
        let name = name.into();
        let mut launch = Self::new(name.clone(), working_dir);

        match packaged_binary.or_else(|| sibling_binary(&name)) {
            Some(path) => launch = launch.with_strategy(SpawnStrategy::packaged(path, args.to_vec())),
            None => debug!("Spawn[{}]: no packaged binary location, skipping", name),
        }

        launch
            .with_strategy(SpawnStrategy::direct(direct_executable, args.to_vec()))
            .with_strategy(SpawnStrategy::shell_wrapped(shell_command, args))
    }
}

/// `<dir of current exe>/<name><EXE_SUFFIX>`
fn sibling_binary(name: &str) -> Option<PathBuf> {
    let exe = std::env::current_exe().ok()?;
    let dir = exe.parent()?;
    Some(dir.join(format!("{}{}", name, std::env::consts::EXE_SUFFIX)))
}

/// A started worker and the strategy that started it.
pub struct SpawnedWorker {
    pub child: Child,
    pub strategy: StrategyKind,
}

/// Create the working directory if absent.
pub async fn prepare_working_dir(dir: &Path) -> std::io::Result<()> {
    tokio::fs::create_dir_all(dir).await
}

/// Copy each artifact into `dir`, keeping its file name.
pub async fn stage_artifacts(artifacts: &[PathBuf], dir: &Path) -> std::io::Result<()> {
    for artifact in artifacts {
        let file_name = artifact.file_name().ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("artifact has no file name: {}", artifact.display()),
            )
        })?;
        let target = dir.join(file_name);
        tokio::fs::copy(artifact, &target).await.map_err(|e| {
            std::io::Error::new(
                e.kind(),
                format!("cannot stage {}: {}", artifact.display(), e),
            )
        })?;
        debug!("Spawn: staged {} into {}", artifact.display(), dir.display());
    }
    Ok(())
}

/// Try each strategy of `launch` in rank order.
pub async fn spawn_ranked(launch: &WorkerLaunch) -> Result<SpawnedWorker> {
    // Preparation failure is not fatal here: each strategy retries it.
    if let Err(e) = prepare_working_dir(&launch.working_dir).await {
        warn!(
            "Spawn[{}]: cannot prepare working dir {}: {}",
            launch.name,
            launch.working_dir.display(),
            e
        );
    }

    let mut attempts = Vec::new();
    for strategy in &launch.strategies {
        if strategy.requires_staged_artifacts
            && let Err(e) = stage_artifacts(&launch.staged_artifacts, &launch.working_dir).await
        {
            warn!("Spawn[{}]: {} strategy skipped: {}", launch.name, strategy.kind, e);
            attempts.push(format!("{}: {}", strategy.kind, e));
            continue;
        }

        match spawn_strategy(strategy, &launch.working_dir).await {
            Ok(child) => {
                info!(
                    "Spawn[{}]: started via {} strategy ({})",
                    launch.name,
                    strategy.kind,
                    strategy.program.display()
                );
                return Ok(SpawnedWorker {
                    child,
                    strategy: strategy.kind,
                });
            }
            Err(e) => {
                warn!("Spawn[{}]: {} strategy failed: {}", launch.name, strategy.kind, e);
                attempts.push(format!("{}: {}", strategy.kind, e));
            }
        }
    }

    if attempts.is_empty() {
        attempts.push("no spawn strategies configured".to_string());
    }
    Err(RpcError::Connect {
        worker: launch.name.clone(),
        attempts,
    })
}

async fn spawn_strategy(strategy: &SpawnStrategy, working_dir: &Path) -> std::io::Result<Child> {
    if !working_dir.is_dir() {
        prepare_working_dir(working_dir).await?;
    }

    let program = match strategy.kind {
        StrategyKind::Direct => which::which(&strategy.program).map_err(|e| {
            std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{}: {}", strategy.program.display(), e),
            )
        })?,
        _ => strategy.program.clone(),
    };

    let mut cmd = Command::new(&program);
    cmd.args(&strategy.args)
        .current_dir(working_dir)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    // Linux: request kernel to send SIGTERM to child when parent dies.
    // This catches cases where Drop doesn't run (SIGKILL, OOM kill).
    #[cfg(target_os = "linux")]
    unsafe {
        cmd.pre_exec(|| {
            libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGTERM);
            Ok(())
        });
    }

    cmd.spawn()
}
