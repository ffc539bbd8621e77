//! Model selection and capability flags.
//!
//! Orchestration never pattern-matches provider or model names itself. It
//! asks the [`ModelSelection`] whether tools may be advertised.

use crate::core::error::DomainError;
use serde::{Deserialize, Serialize};

/// LLM vendor behind a provider adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Anthropic,
    #[serde(rename = "openai")]
    OpenAi,
    #[serde(rename = "openrouter")]
    OpenRouter,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Anthropic => "anthropic",
            ProviderKind::OpenAi => "openai",
            ProviderKind::OpenRouter => "openrouter",
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ProviderKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "anthropic" => Ok(ProviderKind::Anthropic),
            "openai" => Ok(ProviderKind::OpenAi),
            "openrouter" => Ok(ProviderKind::OpenRouter),
            other => Err(DomainError::UnknownProvider(other.to_string())),
        }
    }
}

/// What a provider/model pair is able to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelCapabilities {
    /// Whether tool definitions may be sent with a request.
    pub supports_tools: bool,
}

impl Default for ModelCapabilities {
    fn default() -> Self {
        Self {
            supports_tools: true,
        }
    }
}

impl ModelCapabilities {
    /// Known capabilities for `model` served by `provider`.
    ///
    /// OpenRouter's free-tier variants (`...:free`) reject tool definitions.
    pub fn detect(provider: ProviderKind, model: &str) -> Self {
        let supports_tools = !(provider == ProviderKind::OpenRouter && model.contains(":free"));
        Self { supports_tools }
    }
}

/// The provider and model a conversation runs against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSelection {
    pub provider: ProviderKind,
    pub model: String,
    pub capabilities: ModelCapabilities,
}

impl ModelSelection {
    /// Select `model` on `provider` with detected capabilities.
    pub fn new(provider: ProviderKind, model: impl Into<String>) -> Self {
        let model = model.into();
        let capabilities = ModelCapabilities::detect(provider, &model);
        Self {
            provider,
            model,
            capabilities,
        }
    }

    /// Override the detected capabilities.
    pub fn with_capabilities(mut self, capabilities: ModelCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn supports_tools(&self) -> bool {
        self.capabilities.supports_tools
    }
}
