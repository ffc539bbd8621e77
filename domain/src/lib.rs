//! Domain layer for quest-keeper
//!
//! Neutral conversation, tool and streaming types shared by the conversation
//! runner, the worker transport and the LLM provider adapters. Nothing in
//! this crate performs I/O.
//!
//! # Core Concepts
//!
//! - **Conversation**: [`ConversationMessage`] history, where assistant turns
//!   carry [`ToolInvocation`]s and tool results answer them by id.
//! - **Tools**: [`ToolDescriptor`]s advertised by workers, merged into a
//!   [`ToolCatalog`] that records which worker owns each name.
//! - **Streaming**: vendor events are classified into [`StreamSignal`]s and
//!   reassembled by the [`ToolCallAssembler`] into neutral [`StreamEvent`]s.

pub mod conversation;
pub mod core;
pub mod provider;
pub mod stream;
pub mod tool;
pub mod util;

pub use conversation::{
    message::{ConversationMessage, ToolInvocation},
    turn::{ProviderResponse, RunOutcome, TurnResult},
};
pub use crate::core::error::DomainError;
pub use provider::capabilities::{ModelCapabilities, ModelSelection, ProviderKind};
pub use stream::{
    assembler::{StreamDecodeError, ToolCallAssembler},
    event::{StreamEvent, StreamSignal},
};
pub use tool::{
    catalog::ToolCatalog,
    descriptor::ToolDescriptor,
    value_objects::{ToolError, ToolOutcome},
};
