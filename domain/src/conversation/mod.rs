//! Conversation history and per-turn results

pub mod message;
pub mod turn;
