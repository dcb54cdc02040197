//! Molar Runtime - session lifecycle and process orchestration.
//!
//! This crate provides:
//! - Layered configuration ([`config`]) and logging setup ([`logging`])
//! - The [`ConnectionManager`] event loop with its keepalive, retry and QR
//!   sweep timers
//! - The [`InboundRelay`] and the [`OutboundDispatcher`]
//! - [`MolarRuntime`], which wires everything to the HTTP facade and runs
//!   until a shutdown signal
//!
//! # Features
//!
//! - `toml-config` *(default)*: TOML configuration files
//! - `yaml-config`: YAML configuration files
//! - `json-log`: JSON log lines
//! - `full-transport` *(default)*: the production ports (gateway, file
//!   store, HTTP backend) and [`MolarRuntime::run`]
//!
//! ```ignore
//! use molar_runtime::MolarRuntime;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     MolarRuntime::new().run().await?;
//!     Ok(())
//! }
//! ```

pub mod bridge;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod logging;
pub mod manager;
pub mod relay;
pub mod runtime;
pub mod view;

mod schedule;

#[cfg(test)]
mod testing;

pub use bridge::Bridge;
pub use config::{ConfigError, ConfigLoader, ConfigResult, MolarConfig};
pub use dispatcher::{DispatchSettings, OutboundDispatcher};
pub use error::{RuntimeError, RuntimeResult};
pub use logging::LoggingBuilder;
pub use manager::{ConnectionManager, ManagerPorts, ManagerSettings};
pub use relay::InboundRelay;
pub use runtime::{MolarRuntime, RuntimeBuilder, RuntimePorts, Services, wait_for_shutdown};
pub use view::SessionView;

// Re-export tracing for use by other crates
pub use tracing;

/// Logging macros.
pub mod prelude {
    pub use tracing::{Level, debug, error, info, instrument, span, trace, warn};
}
