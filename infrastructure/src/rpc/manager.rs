//! Supervisor for the named worker clients.
//!
//! [`RpcManager`] is constructed once at startup and passed to whoever needs
//! it. Concurrent [`initialize_all`](RpcManager::initialize_all) calls share
//! one in-flight attempt, so a burst of callers never spawns duplicate
//! workers. A failed attempt is reported to every waiter and the next call
//! starts a fresh one.

use super::client::RpcClient;
use super::error::RpcError;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared, try_join_all};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

type InitFuture = Shared<BoxFuture<'static, Result<(), Arc<RpcError>>>>;

pub struct RpcManager {
    clients: Vec<Arc<RpcClient>>,
    in_flight: Mutex<Option<InitFuture>>,
}

impl RpcManager {
    pub fn new(clients: Vec<Arc<RpcClient>>) -> Self {
        Self {
            clients,
            in_flight: Mutex::new(None),
        }
    }

    pub fn client(&self, name: &str) -> Option<&Arc<RpcClient>> {
        self.clients.iter().find(|c| c.name() == name)
    }

    pub fn clients(&self) -> &[Arc<RpcClient>] {
        &self.clients
    }

    /// Connect and handshake every client.
    ///
    /// Joins an attempt already in flight instead of starting another.
    pub async fn initialize_all(&self) -> Result<(), Arc<RpcError>> {
        if self.is_ready() {
            return Ok(());
        }

        let attempt = {
            let mut slot = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
            match slot.as_ref() {
                Some(existing) => {
                    debug!("RpcManager: joining in-flight initialization");
                    existing.clone()
                }
                None => {
                    let clients = self.clients.clone();
                    let attempt = async move {
                        info!("RpcManager: initializing {} worker(s)", clients.len());
                        try_join_all(clients.iter().map(|client| client.initialize()))
                            .await
                            .map(|_| ())
                            .map_err(Arc::new)
                    }
                    .boxed()
                    .shared();
                    *slot = Some(attempt.clone());
                    attempt
                }
            }
        };

        let result = attempt.clone().await;

        {
            let mut slot = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
            if slot
                .as_ref()
                .is_some_and(|current| Shared::ptr_eq(current, &attempt))
            {
                *slot = None;
            }
        }

        match &result {
            Ok(()) => info!("RpcManager: all workers ready"),
            Err(e) => warn!("RpcManager: initialization failed: {}", e),
        }
        result
    }

    /// Every client has completed its handshake.
    pub fn is_ready(&self) -> bool {
        !self.clients.is_empty() && self.clients.iter().all(|c| c.is_ready())
    }

    /// Outstanding requests across all clients.
    pub fn pending_count(&self) -> usize {
        self.clients.iter().map(|c| c.pending_count()).sum()
    }

    pub fn disconnect_all(&self) {
        for client in &self.clients {
            client.disconnect();
        }
    }
}
