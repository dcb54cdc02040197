//! Ports to the collaborators outside the bridge.

pub mod backend;
pub mod session;
pub mod transport;

pub use backend::{BackendPort, ClassifierReply, InboundSink};
pub use session::{MemorySessionStore, SessionCredential, SessionStore};
pub use transport::{
    CloseReason, Epoch, EventSender, LOGGED_OUT_STATUS, Presence, TransportEvent, TransportPort,
};
