//! Domain model shared by every layer of the bridge.

pub mod message;
pub mod outbound;
pub mod state;

pub use message::{
    CaptionedMedia, ExtendedText, InboundMessage, MessageBatch, MessageContent, MessageKey,
    RawMessage, USER_SERVER, UpsertKind,
};
pub use outbound::{BulkReport, Jid, OutboundRequest, Recipient, RecipientReport, SendReport};
pub use state::{
    ConnectedIdentity, ConnectionState, QrChallenge, SessionSnapshot, millis_since_epoch,
};
