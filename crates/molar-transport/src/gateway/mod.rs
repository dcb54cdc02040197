//! Multi-device gateway transport.
//!
//! The pairing and encryption protocol runs in a gateway sidecar. This module
//! speaks its JSON-over-WebSocket frame protocol:
//!
//! | Direction | Frame | Meaning |
//! |-----------|-------|---------|
//! | in | `{"type":"connection.update", ...}` | QR issued, connection opened or closed |
//! | in | `{"type":"messages.upsert", ...}` | Message batch |
//! | in | `{"type":"creds.update", ...}` | Session material changed |
//! | in | `{"echo":N, "ok":bool, ...}` | Reply to a command |
//! | out | `{"action", "params", "echo"}` | `init`, `send_presence`, `send_message`, `on_whatsapp`, `logout` |

mod caller;
mod client;
pub mod frame;

pub use caller::GatewayCaller;
pub use client::{GatewayConfig, WsGateway};
