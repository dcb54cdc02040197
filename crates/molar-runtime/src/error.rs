//! Runtime error types.

use thiserror::Error;

pub use crate::config::ConfigError;

/// Errors that stop the runtime from starting or running.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Configuration could not be loaded or is invalid.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A transport could not be built or the facade could not bind.
    #[error("Transport error: {0}")]
    Transport(#[from] molar_core::TransportError),

    /// The backend client could not be built.
    #[error("Backend error: {0}")]
    Backend(#[from] molar_core::BackendError),

    /// The connection manager is no longer running.
    #[error("Connection manager stopped")]
    ManagerStopped,
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
