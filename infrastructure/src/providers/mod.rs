//! LLM provider adapters.
//!
//! Each adapter implements the application [`ProviderAdapter`] port for one
//! vendor API. Streaming responses are decoded by a shared pipeline
//! ([`pump`]) with a vendor-specific [`SignalClassifier`](pump::SignalClassifier).

pub mod anthropic;
pub mod openai;
pub mod pump;
pub mod sse;

use questkeeper_application::{ProviderAdapter, ProviderError};
use questkeeper_domain::ProviderKind;
use std::sync::Arc;

pub use anthropic::AnthropicAdapter;
pub use openai::OpenAiCompatibleAdapter;

pub const DEFAULT_MAX_TOKENS: u32 = 4096;
pub const DEFAULT_ANTHROPIC_VERSION: &str = "2023-06-01";

/// Settings shared by the HTTP adapters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpProviderOptions {
    /// Overrides the vendor's default API base.
    pub base_url: Option<String>,
    pub max_tokens: u32,
    /// Value of the `anthropic-version` header.
    pub api_version: String,
}

impl Default for HttpProviderOptions {
    fn default() -> Self {
        Self {
            base_url: None,
            max_tokens: DEFAULT_MAX_TOKENS,
            api_version: DEFAULT_ANTHROPIC_VERSION.to_string(),
        }
    }
}

/// Build the adapter for `kind`.
pub fn build_adapter(
    kind: ProviderKind,
    options: HttpProviderOptions,
) -> Result<Arc<dyn ProviderAdapter>, ProviderError> {
    let client = reqwest::Client::builder()
        .build()
        .map_err(|e| ProviderError::Http(e.to_string()))?;
    Ok(match kind {
        ProviderKind::Anthropic => Arc::new(AnthropicAdapter::new(client, options)),
        ProviderKind::OpenAi | ProviderKind::OpenRouter => {
            Arc::new(OpenAiCompatibleAdapter::new(client, kind, options))
        }
    })
}

/// `base` joined with `path`, unless `base` already ends with it.
pub(crate) fn endpoint_url(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    if base.ends_with(path) {
        return base.to_string();
    }
    format!("{}{}", base, path)
}

/// Send and turn non-success statuses into [`ProviderError::Status`].
pub(crate) async fn send_checked(
    builder: reqwest::RequestBuilder,
) -> Result<reqwest::Response, ProviderError> {
    let response = builder
        .send()
        .await
        .map_err(|e| ProviderError::Http(e.to_string()))?;
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ProviderError::Status {
        status: status.as_u16(),
        body,
    })
}
