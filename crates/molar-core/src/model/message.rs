//! Inbound message shapes, raw and normalized.

use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use super::state::millis_since_epoch;

/// Server suffix of person-to-person addresses.
pub const USER_SERVER: &str = "@s.whatsapp.net";

/// Kind of a message upsert batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpsertKind {
    /// New messages delivered live.
    #[default]
    Notify,
    /// Messages appended from history sync.
    Append,
}

/// Key identifying a raw message on the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageKey {
    /// Chat address the message belongs to.
    pub remote_jid: String,
    /// Whether the paired account sent it.
    #[serde(default)]
    pub from_me: bool,
    /// Provider-assigned message id.
    #[serde(default)]
    pub id: String,
}

/// Extended (styled, link preview, quoted) text body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtendedText {
    /// Text content.
    #[serde(default)]
    pub text: Option<String>,
}

/// Media body carrying an optional caption.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptionedMedia {
    /// Caption shown under the media.
    #[serde(default)]
    pub caption: Option<String>,
}

/// Message content variants the bridge understands.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageContent {
    /// Plain text.
    #[serde(default)]
    pub conversation: Option<String>,
    /// Styled text.
    #[serde(default)]
    pub extended_text_message: Option<ExtendedText>,
    /// Image with caption.
    #[serde(default)]
    pub image_message: Option<CaptionedMedia>,
}

/// A message event exactly as the transport delivers it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawMessage {
    /// Addressing key.
    pub key: MessageKey,
    /// Content; absent for protocol/stub messages.
    #[serde(default)]
    pub message: Option<MessageContent>,
    /// Send time in seconds since the Unix epoch.
    #[serde(default)]
    pub message_timestamp: Option<i64>,
    /// Sender's self-chosen name.
    #[serde(default)]
    pub push_name: Option<String>,
}

impl RawMessage {
    /// Extracts the textual payload.
    ///
    /// Plain text wins over styled text, which wins over a media caption.
    /// Empty strings count as absent.
    pub fn text(&self) -> Option<&str> {
        let content = self.message.as_ref()?;

        non_empty(&content.conversation)
            .or_else(|| {
                content
                    .extended_text_message
                    .as_ref()
                    .and_then(|m| non_empty(&m.text))
            })
            .or_else(|| {
                content
                    .image_message
                    .as_ref()
                    .and_then(|m| non_empty(&m.caption))
            })
    }

    /// Sender address with the user server suffix removed.
    pub fn sender_address(&self) -> &str {
        let jid = self.key.remote_jid.as_str();
        jid.strip_suffix(USER_SERVER).unwrap_or(jid)
    }

    /// Normalizes into an [`InboundMessage`], or `None` when it must not be relayed.
    ///
    /// Self-sent echoes and messages without text are dropped.
    pub fn normalize(&self, received_at: SystemTime) -> Option<InboundMessage> {
        if self.key.from_me {
            return None;
        }
        let text = self.text()?;
        let timestamp = self
            .message_timestamp
            .filter(|ts| *ts > 0)
            .unwrap_or_else(|| (millis_since_epoch(received_at) / 1000) as i64);

        Some(InboundMessage {
            from_address: self.sender_address().to_string(),
            display_name: None,
            text: text.to_string(),
            provider_message_id: self.key.id.clone(),
            timestamp_epoch: timestamp,
        })
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|t| !t.is_empty())
}

/// A batch of raw messages delivered by one transport event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageBatch {
    /// Whether the batch is live traffic or history.
    #[serde(default)]
    pub kind: UpsertKind,
    /// Messages in delivery order.
    #[serde(default)]
    pub messages: Vec<RawMessage>,
}

/// A message from the other party, normalized for the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Sender address (phone number for person-to-person chats).
    pub from_address: String,
    /// Best-effort display name.
    pub display_name: Option<String>,
    /// Extracted text.
    pub text: String,
    /// Provider message id; also the idempotency key for the backend.
    pub provider_message_id: String,
    /// Send time in seconds since the Unix epoch.
    pub timestamp_epoch: i64,
}
