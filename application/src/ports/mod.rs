//! Ports (interfaces) for external dependencies
//!
//! Implementations live in the infrastructure layer (provider adapters,
//! worker transport, JSONL logger) and the CLI (stream observer).

pub mod conversation_logger;
pub mod llm_gateway;
pub mod stream_observer;
pub mod tool_executor;
