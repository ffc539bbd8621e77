//! Provider stream classification and tool-call reassembly

pub mod assembler;
pub mod event;
