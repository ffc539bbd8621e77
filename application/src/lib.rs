//! Application layer for quest-keeper
//!
//! This crate contains the conversation runner, its ports and configuration.
//! It depends only on the domain layer.

pub mod config;
pub mod ports;
pub mod use_cases;

// Re-export commonly used types
pub use config::RunnerParams;
pub use ports::{
    conversation_logger::{ConversationEvent, ConversationLogger, NoConversationLogger},
    llm_gateway::{Credentials, ProviderAdapter, ProviderError, ProviderRequest, StreamHandle},
    stream_observer::{NoStreamObserver, StreamObserver},
    tool_executor::{NoTools, ToolBackend, ToolBackendError, ToolCallRequest, ToolHost},
};
pub use use_cases::run_conversation::{ConversationRunner, RunError, RunOutput};
