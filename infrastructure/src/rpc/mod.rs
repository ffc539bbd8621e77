//! Worker transport: a JSON-RPC 2.0 client over a child process's stdio.
//!
//! - [`protocol`]: message types and method names
//! - [`transport`]: frame parsing and message classification
//! - [`timeout`]: per-method / per-tool deadlines
//! - [`spawn`]: ranked process launch strategies
//! - [`client`]: [`RpcClient`], one worker process
//! - [`manager`]: [`RpcManager`], the supervisor for all workers
//! - [`backend`]: adapters to the application tool ports

pub mod backend;
pub mod client;
pub mod error;
pub mod manager;
pub mod protocol;
pub mod spawn;
pub mod timeout;
pub mod transport;

pub use client::{ConnectionState, RpcClient};
pub use error::RpcError;
pub use manager::RpcManager;
pub use spawn::{SpawnStrategy, StrategyKind, WorkerLaunch};
pub use timeout::TimeoutPolicy;
