//! The backend classifier/responder and the inbound message sink.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::BackendResult;
use crate::model::{ConnectedIdentity, InboundMessage, MessageBatch};

/// What the classifier answered for an inbound message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifierReply {
    /// Auto-reply to send back to the sender, if any.
    #[serde(default)]
    pub reply: Option<String>,
}

impl ClassifierReply {
    /// The reply text, ignoring blank replies.
    pub fn reply_text(&self) -> Option<&str> {
        self.reply.as_deref().filter(|r| !r.trim().is_empty())
    }
}

/// The backend collaborator the bridge reports to.
#[async_trait]
pub trait BackendPort: Send + Sync {
    /// Forwards one inbound message for classification.
    async fn message_received(&self, message: &InboundMessage) -> BackendResult<ClassifierReply>;

    /// Notifies that the session opened.
    async fn connected(&self, identity: &ConnectedIdentity) -> BackendResult<()>;

    /// Notifies that a new pairing challenge is available.
    async fn qr_updated(&self, payload: &str) -> BackendResult<()>;
}

/// Receives inbound message batches from the connection manager.
///
/// The manager awaits each call before taking the next event, so
/// implementations see batches strictly in delivery order.
#[async_trait]
pub trait InboundSink: Send + Sync {
    /// Processes one batch to completion.
    async fn on_batch(&self, batch: MessageBatch);
}
