//! The transport port: everything the bridge needs from the wire protocol.
//!
//! Pairing, encryption and framing live behind [`TransportPort`]. The bridge
//! only initializes a connection, sends presence and text, resolves contact
//! names and logs out. Everything the transport observes flows back as
//! [`TransportEvent`]s through the [`EventSender`] handed over at connect time.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::trace;

use crate::error::TransportResult;
use crate::machine::Input;
use crate::model::{ConnectedIdentity, Jid, MessageBatch};
use crate::port::session::SessionCredential;

/// Close status code the protocol uses for an explicit logout.
pub const LOGGED_OUT_STATUS: u16 = 401;

/// Why a connection closed.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CloseReason {
    /// Protocol status code, when the transport reports one.
    #[serde(default)]
    pub status_code: Option<u16>,
    /// Human readable reason.
    #[serde(default)]
    pub message: String,
}

impl CloseReason {
    /// A closure with no status code.
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            status_code: None,
            message: message.into(),
        }
    }

    /// A closure caused by the account logging this device out.
    pub fn logged_out(message: impl Into<String>) -> Self {
        Self {
            status_code: Some(LOGGED_OUT_STATUS),
            message: message.into(),
        }
    }

    /// Returns whether the session credential was invalidated.
    pub fn is_logged_out(&self) -> bool {
        self.status_code == Some(LOGGED_OUT_STATUS)
    }
}

/// Presence signals the bridge emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Presence {
    /// Online; used as the keepalive signal.
    Available,
    /// Typing indicator shown to a recipient.
    Composing,
    /// Typing stopped.
    Paused,
}

/// Something the transport observed.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// The transport started a handshake.
    Connecting,
    /// A pairing challenge was emitted.
    Qr(String),
    /// The handshake completed.
    Opened(ConnectedIdentity),
    /// The connection closed.
    Closed(CloseReason),
    /// Session material changed and must be persisted.
    CredentialsUpdated(SessionCredential),
    /// Messages were delivered.
    Messages(MessageBatch),
}

impl TransportEvent {
    /// Short name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Qr(_) => "qr",
            Self::Opened(_) => "open",
            Self::Closed(_) => "close",
            Self::CredentialsUpdated(_) => "creds.update",
            Self::Messages(_) => "messages.upsert",
        }
    }
}

/// Identifies one connection attempt.
///
/// Events tagged with a superseded epoch are discarded by the manager.
pub type Epoch = u64;

/// Channel end a transport uses to report events for one connection attempt.
#[derive(Debug, Clone)]
pub struct EventSender {
    epoch: Epoch,
    tx: mpsc::Sender<Input>,
}

impl EventSender {
    /// Creates a sender bound to `epoch`.
    pub fn new(epoch: Epoch, tx: mpsc::Sender<Input>) -> Self {
        Self { epoch, tx }
    }

    /// The connection attempt this sender belongs to.
    pub fn epoch(&self) -> Epoch {
        self.epoch
    }

    /// Queues an event; returns `false` once the manager has shut down.
    pub async fn emit(&self, event: TransportEvent) -> bool {
        trace!(epoch = self.epoch, event = event.name(), "Transport event");
        self.tx
            .send(Input::Transport {
                epoch: self.epoch,
                event,
            })
            .await
            .is_ok()
    }
}

/// The injected wire-protocol capability.
///
/// Implementations must bound every call with their own timeout; the bridge
/// never waits on a transport call indefinitely.
#[async_trait]
pub trait TransportPort: Send + Sync {
    /// Starts a connection, restoring `credential` when present.
    ///
    /// Returns once the attempt is under way; progress is reported through
    /// `events`. A previous connection, if any, is torn down first.
    async fn connect(
        &self,
        credential: Option<SessionCredential>,
        events: EventSender,
    ) -> TransportResult<()>;

    /// Sends a presence update, optionally scoped to one chat.
    async fn send_presence(&self, presence: Presence, to: Option<&Jid>) -> TransportResult<()>;

    /// Sends a text message.
    async fn send_text(&self, to: &Jid, text: &str) -> TransportResult<()>;

    /// Looks up the contact name registered for `jid`.
    async fn contact_name(&self, _jid: &Jid) -> TransportResult<Option<String>> {
        Ok(None)
    }

    /// Logs the paired device out, invalidating the session credential.
    async fn logout(&self) -> TransportResult<()>;

    /// Drops the live connection without logging out.
    async fn disconnect(&self) {}
}
