//! HTTP implementations: the backend client and the facade server.

#[cfg(feature = "http-client")]
pub mod backend;

#[cfg(feature = "http-server")]
pub mod server;

#[cfg(feature = "http-client")]
pub use backend::{HttpBackend, HttpBackendConfig};

#[cfg(feature = "http-server")]
pub use server::{BridgeApi, FacadeHandle, router, serve};
