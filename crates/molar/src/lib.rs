//! # Molar
//!
//! WhatsApp messaging bridge for the DenApp clinic dashboard.
//!
//! Molar keeps one paired WhatsApp session alive, relays inbound messages to
//! the classifier backend, sends its auto-replies back, and exposes an HTTP
//! facade for status, pairing and outbound sends.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────────┐   ┌──────────────┐
//! │ HTTP facade  │──▶│ OutboundDispatch │──▶│              │
//! └──────────────┘   └──────────────────┘   │  Transport   │◀──▶ gateway ◀──▶ WhatsApp
//!                    ┌──────────────────┐   │    Port      │
//! backend ◀──────────│  InboundRelay    │◀──│              │
//!                    └──────────────────┘   └──────────────┘
//!                             ▲                    │ events
//!                    ┌──────────────────┐          │
//!                    │ConnectionManager │◀─────────┘
//!                    └──────────────────┘
//! ```
//!
//! - [`core`]: domain types, ports and the pure state machine
//! - [`transport`]: gateway client, backend client, file store, HTTP facade
//! - [`runtime`]: configuration, logging, manager, relay, dispatcher
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use molar::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     MolarRuntime::new().run().await?;
//!     Ok(())
//! }
//! ```

pub use molar_core as core;
pub use molar_runtime as runtime;
pub use molar_transport as transport;

/// Commonly used types.
pub mod prelude {
    pub use molar_runtime::{
        ConfigLoader, ConnectionManager, InboundRelay, MolarConfig, MolarRuntime,
        OutboundDispatcher, RuntimeError, RuntimeResult, SessionView,
    };

    pub use molar_core::{
        BackendPort, ConnectionState, InboundMessage, OutboundRequest, Recipient, SendError,
        SessionSnapshot, SessionStore, TransportPort,
    };

    pub use molar_runtime::prelude::*;
}
