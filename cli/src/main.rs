//! CLI entrypoint for quest-keeper
//!
//! This is the main binary that wires together all layers using
//! dependency injection.

mod args;
mod observer;

use anyhow::{Context, Result, bail};
use args::Cli;
use clap::Parser;
use observer::ConsoleObserver;
use questkeeper_application::{
    ConversationLogger, ConversationRunner, Credentials, NoConversationLogger, RunError, RunOutput,
};
use questkeeper_domain::{ConversationMessage, ProviderKind, RunOutcome};
use questkeeper_infrastructure::{
    ConfigLoader, FileConfig, JsonlConversationLogger, RpcClient, RpcManager, build_adapter,
};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const DEBUG_LOG_FILE: &str = "mcp-debug.log";

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = if cli.no_config {
        ConfigLoader::load_defaults()
    } else {
        ConfigLoader::load(cli.config.as_deref()).context("Failed to load configuration")?
    };
    apply_overrides(&mut config, &cli)?;

    if cli.show_config {
        print!("{}", ConfigLoader::render(&config)?);
        return Ok(());
    }

    let _guard = init_tracing(cli.verbose, &config);
    for issue in config.validate() {
        warn!("Config: {}", issue);
    }
    info!("Starting quest-keeper");

    // === Dependency Injection ===
    let api_key = config.provider.resolve_api_key().with_context(|| {
        format!(
            "No API key for {}: set {}",
            config.provider.kind,
            config.provider.api_key_env_name()
        )
    })?;
    let adapter = build_adapter(config.provider.kind, config.provider.http_options())
        .context("Failed to build provider adapter")?;

    let worker = &config.worker;
    let client = RpcClient::with_options(
        worker.to_launch(),
        worker.timeouts.to_policy(),
        worker.slow_response(),
        worker.stderr_filters.clone(),
    );
    let manager = Arc::new(RpcManager::new(vec![Arc::new(client)]));
    if let Err(e) = manager.initialize_all().await {
        // The runner degrades to tool-less turns while the worker is down.
        warn!("Worker unavailable, continuing without tools: {}", e);
    }

    let logger: Arc<dyn ConversationLogger> = match &config.logging.conversation_log {
        Some(path) => match JsonlConversationLogger::open(path) {
            Ok(logger) => Arc::new(logger),
            Err(e) => {
                warn!("Conversation log {} disabled: {}", path.display(), e);
                Arc::new(NoConversationLogger)
            }
        },
        None => Arc::new(NoConversationLogger),
    };

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });

    let runner = ConversationRunner::new(
        adapter,
        manager.clone(),
        config.provider.selection(),
        Credentials::new(api_key),
    )
    .with_params(config.runner.to_params())
    .with_conversation_logger(logger)
    .with_cancellation(cancel);

    let mut session = Session::new(&runner, cli.stream, cli.system.as_deref());
    let result = match cli.prompt {
        Some(prompt) => session.turn(prompt).await.map(|_| ()),
        None => session.interactive().await,
    };

    manager.disconnect_all();
    result
}

/// Command-line flags take precedence over every config source.
fn apply_overrides(config: &mut FileConfig, cli: &Cli) -> Result<()> {
    if let Some(provider) = &cli.provider {
        config.provider.kind = provider
            .parse::<ProviderKind>()
            .with_context(|| format!("Invalid --provider {}", provider))?;
    }
    if let Some(model) = &cli.model {
        if model.trim().is_empty() {
            bail!("--model cannot be empty");
        }
        config.provider.model = model.clone();
    }
    Ok(())
}

/// Console filter by `-v` count, plus the debug log file when enabled.
fn init_tracing(verbose: u8, config: &FileConfig) -> Option<WorkerGuard> {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace", // -vvv or more
    };

    let (file_layer, guard) = if config.logging.debug_log
        && std::fs::create_dir_all(&config.worker.working_dir).is_ok()
    {
        let appender = tracing_appender::rolling::never(&config.worker.working_dir, DEBUG_LOG_FILE);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let layer = fmt::layer()
            .with_writer(writer)
            .with_ansi(false)
            .with_filter(EnvFilter::new("debug"));
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_filter(EnvFilter::new(level)),
        )
        .with(file_layer)
        .init();
    guard
}

/// History carried across prompts in one process.
struct Session<'a> {
    runner: &'a ConversationRunner,
    stream: bool,
    history: Vec<ConversationMessage>,
}

impl<'a> Session<'a> {
    fn new(runner: &'a ConversationRunner, stream: bool, system: Option<&str>) -> Self {
        let history = system
            .map(|text| vec![ConversationMessage::system(text)])
            .unwrap_or_default();
        Self {
            runner,
            stream,
            history,
        }
    }

    async fn turn(&mut self, prompt: String) -> Result<RunOutput> {
        let mut history = self.history.clone();
        history.push(ConversationMessage::user(prompt));

        let output = if self.stream {
            self.runner
                .run_streaming(history, &ConsoleObserver::stdout())
                .await?
        } else {
            let output = self.runner.run(history).await?;
            println!("{}", output.text);
            if let RunOutcome::BudgetExhausted { turns } = output.outcome {
                eprintln!("[stopped after {} turns]", turns);
            }
            output
        };
        self.history = output.history.clone();
        Ok(output)
    }

    async fn interactive(&mut self) -> Result<()> {
        let selection = self.runner.selection();
        eprintln!(
            "quest-keeper ({} / {}). Type 'exit' to quit.",
            selection.provider, selection.model
        );
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            eprint!("> ");
            let Some(line) = lines.next_line().await.context("Failed to read stdin")? else {
                return Ok(());
            };
            let prompt = line.trim();
            if prompt.is_empty() {
                continue;
            }
            if matches!(prompt, "exit" | "quit") {
                return Ok(());
            }
            // A failed turn leaves the history as it was.
            if let Err(e) = self.turn(prompt.to_string()).await {
                eprintln!("Error: {:#}", e);
                if matches!(e.downcast_ref::<RunError>(), Some(RunError::Cancelled)) {
                    return Ok(());
                }
            }
        }
    }
}
