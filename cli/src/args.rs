//! CLI argument definitions

use clap::Parser;
use std::path::PathBuf;

/// CLI arguments for quest-keeper
#[derive(Parser, Debug)]
#[command(name = "questkeeper")]
#[command(author, version, about = "LLM game master backed by an RPG tool worker")]
#[command(long_about = r#"
quest-keeper sends your prompt to an LLM and lets it call the tools exposed
by the RPG worker process (dice, inventory, world state) until it has an
answer.

Configuration files are loaded from (in priority order):
1. QUESTKEEPER_* environment variables
2. --config <path>     Explicit config file
3. ./questkeeper.toml  Project-level config
4. ~/.config/questkeeper/config.toml   Global config

Example:
  questkeeper "I search the chest for traps"
  questkeeper --stream --provider openrouter --model anthropic/claude-3.5-sonnet
"#)]
pub struct Cli {
    /// Prompt to send. Without one, prompts are read from stdin line by line
    pub prompt: Option<String>,

    /// Print the reply as it is generated
    #[arg(short, long)]
    pub stream: bool,

    /// System prompt prepended to the conversation
    #[arg(long, value_name = "TEXT")]
    pub system: Option<String>,

    /// Model name (overrides provider.model)
    #[arg(short, long, value_name = "MODEL")]
    pub model: Option<String>,

    /// Provider: anthropic, openai or openrouter (overrides provider.kind)
    #[arg(short, long, value_name = "PROVIDER")]
    pub provider: Option<String>,

    /// Path to configuration file
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Disable loading of configuration files
    #[arg(long)]
    pub no_config: bool,

    /// Print the merged configuration and exit
    #[arg(long)]
    pub show_config: bool,

    /// Verbosity level (-v = info, -vv = debug, -vvv = trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}
