//! Infrastructure layer for quest-keeper
//!
//! This crate contains adapters that implement the ports defined in the
//! application layer: the worker RPC transport, the LLM provider adapters,
//! the JSONL conversation logger and configuration file loading.

pub mod config;
pub mod framing;
pub mod logging;
pub mod providers;
pub mod rpc;

// Re-export commonly used types
pub use config::{ConfigError, ConfigLoader, ConfigValidationError, FileConfig};
pub use logging::JsonlConversationLogger;
pub use providers::{HttpProviderOptions, build_adapter};
pub use rpc::{ConnectionState, RpcClient, RpcError, RpcManager, TimeoutPolicy, WorkerLaunch};
