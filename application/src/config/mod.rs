//! Application-level configuration.

pub mod runner_params;

pub use runner_params::RunnerParams;
