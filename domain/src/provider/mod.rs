//! Provider identity and model capabilities

pub mod capabilities;
