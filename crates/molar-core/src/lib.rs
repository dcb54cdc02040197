//! # Molar Core
//!
//! Domain types, ports and the connection state machine of the Molar
//! messaging bridge.
//!
//! This crate performs no I/O. It is organized in three parts:
//!
//! - **Model** ([`model`]): connection state, pairing challenge, connected
//!   identity, inbound messages and outbound send reports.
//! - **Ports** ([`port`]): the traits the bridge consumes, namely
//!   [`TransportPort`], [`SessionStore`], [`BackendPort`] and [`InboundSink`].
//! - **Machine** ([`machine`]): the pure transition function driving the
//!   session lifecycle.
//!
//! ## Data flow
//!
//! ```text
//! ┌───────────┐  TransportEvent  ┌──────────────┐  Effect::Relay  ┌──────────────┐
//! │ Transport │─────────────────▶│ step (state, │────────────────▶│ InboundSink  │
//! │   Port    │◀─────────────────│   input)     │                 │   (relay)    │
//! └───────────┘  Effect::Connect └──────────────┘                 └──────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust
//! use std::time::SystemTime;
//! use molar_core::{ConnectionState, Input, MachineState, SessionPolicy, step};
//!
//! let t = step(&MachineState::default(), Input::Initialize, SystemTime::now(), &SessionPolicy::default());
//! assert_eq!(t.next.snapshot.state, ConnectionState::Connecting);
//! ```

pub mod error;
pub mod machine;
pub mod model;
pub mod port;

pub use error::{
    BackendError, BackendResult, SendError, SendResult, SessionError, SessionResult,
    TransportError, TransportResult,
};
pub use machine::{
    Effect, Input, LOGGED_OUT_NOTICE, MachineState, PendingRetry, SessionPolicy, Transition, step,
};
pub use model::{
    BulkReport, CaptionedMedia, ConnectedIdentity, ConnectionState, ExtendedText, InboundMessage,
    Jid, MessageBatch, MessageContent, MessageKey, OutboundRequest, QrChallenge, RawMessage,
    Recipient, RecipientReport, SendReport, SessionSnapshot, USER_SERVER, UpsertKind,
    millis_since_epoch,
};
pub use port::{
    BackendPort, ClassifierReply, CloseReason, Epoch, EventSender, InboundSink, LOGGED_OUT_STATUS,
    MemorySessionStore, Presence, SessionCredential, SessionStore, TransportEvent, TransportPort,
};
