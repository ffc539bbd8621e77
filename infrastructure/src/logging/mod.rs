//! Conversation logging.
//!
//! [`JsonlConversationLogger`] implements the
//! [`ConversationLogger`](questkeeper_application::ConversationLogger) port.

mod jsonl_logger;

pub use jsonl_logger::JsonlConversationLogger;
