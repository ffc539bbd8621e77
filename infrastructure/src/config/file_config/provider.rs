//! LLM provider configuration (`[provider]` section)

use crate::providers::{DEFAULT_ANTHROPIC_VERSION, DEFAULT_MAX_TOKENS, HttpProviderOptions};
use questkeeper_domain::{ModelSelection, ProviderKind};
use serde::{Deserialize, Serialize};

pub const DEFAULT_MODEL: &str = "claude-3-5-sonnet-20241022";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileProviderConfig {
    pub kind: ProviderKind,
    pub model: String,
    /// Environment variable holding the API key. Defaults per provider kind.
    pub api_key_env: Option<String>,
    /// Direct API key. Prefer `api_key_env`.
    pub api_key: Option<String>,
    /// Overrides the vendor's API base URL.
    pub base_url: Option<String>,
    pub max_tokens: u32,
    /// Anthropic API version header.
    pub api_version: String,
}

impl Default for FileProviderConfig {
    fn default() -> Self {
        Self {
            kind: ProviderKind::Anthropic,
            model: DEFAULT_MODEL.to_string(),
            api_key_env: None,
            api_key: None,
            base_url: None,
            max_tokens: DEFAULT_MAX_TOKENS,
            api_version: DEFAULT_ANTHROPIC_VERSION.to_string(),
        }
    }
}

impl FileProviderConfig {
    pub fn api_key_env_name(&self) -> String {
        if let Some(name) = &self.api_key_env {
            return name.clone();
        }
        match self.kind {
            ProviderKind::Anthropic => "ANTHROPIC_API_KEY",
            ProviderKind::OpenAi => "OPENAI_API_KEY",
            ProviderKind::OpenRouter => "OPENROUTER_API_KEY",
        }
        .to_string()
    }

    /// The configured key, else the environment variable's value.
    pub fn resolve_api_key(&self) -> Option<String> {
        self.resolve_api_key_with(|name| std::env::var(name).ok())
    }

    pub(crate) fn resolve_api_key_with(&self, lookup: impl Fn(&str) -> Option<String>) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| lookup(&self.api_key_env_name()))
            .filter(|key| !key.trim().is_empty())
    }

    pub fn selection(&self) -> ModelSelection {
        ModelSelection::new(self.kind, self.model.clone())
    }

    pub fn http_options(&self) -> HttpProviderOptions {
        HttpProviderOptions {
            base_url: self.base_url.clone(),
            max_tokens: self.max_tokens,
            api_version: self.api_version.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_env_defaults_follow_provider_kind() {
        let config = FileProviderConfig {
            kind: ProviderKind::OpenRouter,
            ..Default::default()
        };
        assert_eq!(config.api_key_env_name(), "OPENROUTER_API_KEY");
    }

    #[test]
    fn direct_key_wins_over_environment() {
        let mut config = FileProviderConfig::default();
        let from_env = config.resolve_api_key_with(|name| {
            (name == "ANTHROPIC_API_KEY").then(|| "sk-env".to_string())
        });
        assert_eq!(from_env.as_deref(), Some("sk-env"));

        config.api_key = Some("sk-file".into());
        assert_eq!(
            config.resolve_api_key_with(|_| Some("sk-env".into())).as_deref(),
            Some("sk-file")
        );

        config.api_key = Some("  ".into());
        assert_eq!(config.resolve_api_key_with(|_| None), None);
    }

    #[test]
    fn free_openrouter_model_selection_disables_tools() {
        let config = FileProviderConfig {
            kind: ProviderKind::OpenRouter,
            model: "meta-llama/llama-3.1-8b-instruct:free".into(),
            ..Default::default()
        };
        assert!(!config.selection().supports_tools());
    }
}
