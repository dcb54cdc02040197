//! Configuration for the Molar runtime.
//!
//! Layered loading with figment, a serde schema with the deployed defaults,
//! and validation of the values the lifecycle depends on.

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, Profile, load_config, load_config_from_file};
pub use schema::{
    BackendConfig, DEFAULT_FALLBACK_MESSAGE, DispatchConfig, GatewaySettings, LogFormat, LogLevel,
    LogOutput, LogRotation, LoggingConfig, MolarConfig, RelayConfig, ServerConfig, SessionConfig,
};
pub use validation::validate_config;
