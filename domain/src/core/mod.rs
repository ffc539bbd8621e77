//! Core domain errors

pub mod error;
