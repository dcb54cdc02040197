//! [`BridgeApi`] over the manager and the dispatcher.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::info;

use molar_core::{BulkReport, OutboundRequest, Recipient, SendResult, SessionSnapshot};
use molar_transport::BridgeApi;

use crate::dispatcher::OutboundDispatcher;
use crate::manager::ConnectionManager;

/// What the HTTP facade talks to.
pub struct Bridge {
    manager: Arc<ConnectionManager>,
    dispatcher: Arc<OutboundDispatcher>,
    started: Instant,
}

impl Bridge {
    pub fn new(manager: Arc<ConnectionManager>, dispatcher: Arc<OutboundDispatcher>) -> Self {
        Self {
            manager,
            dispatcher,
            started: Instant::now(),
        }
    }
}

#[async_trait]
impl BridgeApi for Bridge {
    fn snapshot(&self) -> SessionSnapshot {
        self.manager.snapshot()
    }

    fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    async fn send(&self, request: OutboundRequest) -> SendResult<()> {
        self.dispatcher.send(&request).await
    }

    async fn send_bulk(&self, recipients: Vec<Recipient>, text: String) -> BulkReport {
        self.dispatcher.send_bulk(&recipients, &text).await
    }

    async fn reinit(&self) -> bool {
        info!("Manual re-initialization requested");
        self.manager.initialize().await
    }
}
