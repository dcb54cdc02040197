//! # Molar Transport
//!
//! Concrete implementations of the ports defined in `molar-core`, selected
//! through feature flags.
//!
//! ## Features
//!
//! - `ws-gateway`: [`WsGateway`], the [`TransportPort`](molar_core::TransportPort)
//!   speaking to the multi-device gateway over WebSocket
//! - `http-client`: [`HttpBackend`], the [`BackendPort`](molar_core::BackendPort)
//!   posting to the classifier backend
//! - `http-server`: the axum HTTP facade ([`router`], [`serve`])
//! - `file-store`: [`FileSessionStore`], a directory-backed
//!   [`SessionStore`](molar_core::SessionStore)
//! - `full`: all of the above
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────┐
//! │  molar-runtime      │  (manager, relay, dispatcher)
//! ├─────────────────────┤
//! │  molar-core         │  (port traits)
//! ├─────────────────────┤
//! │  molar-transport    │  <- This crate (implementations)
//! ├─────────────────────┤
//! │  Gateway / Backend  │
//! └─────────────────────┘
//! ```

#[cfg(any(feature = "http-client", feature = "http-server"))]
pub mod http;

#[cfg(feature = "ws-gateway")]
pub mod gateway;

#[cfg(feature = "file-store")]
pub mod file_store;

#[cfg(feature = "ws-gateway")]
pub use gateway::{GatewayConfig, WsGateway};

#[cfg(feature = "http-client")]
pub use http::{HttpBackend, HttpBackendConfig};

#[cfg(feature = "http-server")]
pub use http::{BridgeApi, FacadeHandle, router, serve};

#[cfg(feature = "file-store")]
pub use file_store::FileSessionStore;
