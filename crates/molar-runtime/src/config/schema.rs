//! Configuration schema definitions.
//!
//! Every duration is expressed in whole seconds or milliseconds, as the
//! field suffix says. Defaults reproduce the timings of the deployed service.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use molar_core::SessionPolicy;

/// Reply sent to a contact when the backend cannot be reached.
pub const DEFAULT_FALLBACK_MESSAGE: &str = "Disculpe, estamos experimentando problemas técnicos. \
Por favor, contacte directamente con la clínica al 664218253.";

/// Root configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MolarConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub gateway: GatewaySettings,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub relay: RelayConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

// =============================================================================
// Server
// =============================================================================

/// HTTP facade listener.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl ServerConfig {
    /// `host:port` to bind.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3001
}

// =============================================================================
// Backend
// =============================================================================

/// Backend classifier/responder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default = "default_backend_url")]
    pub base_url: String,
    #[serde(default = "default_path_prefix")]
    pub path_prefix: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_backend_url(),
            path_prefix: default_path_prefix(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

fn default_backend_url() -> String {
    "http://localhost:8001".to_string()
}

fn default_path_prefix() -> String {
    "/api/whatsapp".to_string()
}

fn default_timeout_ms() -> u64 {
    30_000
}

// =============================================================================
// Gateway
// =============================================================================

/// Multi-device gateway connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewaySettings {
    #[serde(default = "default_gateway_url")]
    pub url: String,
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default = "default_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_browser")]
    pub browser: Vec<String>,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            url: default_gateway_url(),
            access_token: None,
            request_timeout_ms: default_timeout_ms(),
            browser: default_browser(),
        }
    }
}

fn default_gateway_url() -> String {
    "ws://127.0.0.1:8085/ws".to_string()
}

fn default_browser() -> Vec<String> {
    vec![
        "DenApp Control".to_string(),
        "Chrome".to_string(),
        "1.0.0".to_string(),
    ]
}

#[cfg(feature = "full-transport")]
impl GatewaySettings {
    /// Settings for the WebSocket gateway client.
    pub fn to_transport(&self) -> molar_transport::GatewayConfig {
        molar_transport::GatewayConfig {
            url: self.url.clone(),
            access_token: self.access_token.clone(),
            request_timeout: Duration::from_millis(self.request_timeout_ms),
            browser: self.browser.clone(),
        }
    }
}

#[cfg(feature = "full-transport")]
impl BackendConfig {
    /// Settings for the HTTP backend client.
    pub fn to_transport(&self) -> molar_transport::HttpBackendConfig {
        molar_transport::HttpBackendConfig {
            base_url: self.base_url.clone(),
            path_prefix: self.path_prefix.clone(),
            timeout: Duration::from_millis(self.timeout_ms),
        }
    }
}

// =============================================================================
// Session lifecycle
// =============================================================================

/// Session persistence and lifecycle timings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Directory holding the session credential.
    #[serde(default = "default_session_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_qr_ttl")]
    pub qr_ttl_secs: u64,
    #[serde(default = "default_qr_sweep")]
    pub qr_sweep_interval_secs: u64,
    #[serde(default = "default_reconnect")]
    pub reconnect_delay_secs: u64,
    #[serde(default = "default_reinit")]
    pub reinit_delay_secs: u64,
    #[serde(default = "default_keepalive")]
    pub keepalive_interval_secs: u64,
    /// Log the device out when the process stops.
    #[serde(default = "default_true")]
    pub logout_on_shutdown: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            dir: default_session_dir(),
            qr_ttl_secs: default_qr_ttl(),
            qr_sweep_interval_secs: default_qr_sweep(),
            reconnect_delay_secs: default_reconnect(),
            reinit_delay_secs: default_reinit(),
            keepalive_interval_secs: default_keepalive(),
            logout_on_shutdown: true,
        }
    }
}

impl SessionConfig {
    /// Delays consumed by the state machine.
    pub fn policy(&self) -> SessionPolicy {
        SessionPolicy {
            qr_ttl: Duration::from_secs(self.qr_ttl_secs),
            reconnect_delay: Duration::from_secs(self.reconnect_delay_secs),
            reinit_delay: Duration::from_secs(self.reinit_delay_secs),
        }
    }
}

fn default_session_dir() -> PathBuf {
    PathBuf::from("auth_info")
}

fn default_qr_ttl() -> u64 {
    60
}

fn default_qr_sweep() -> u64 {
    10
}

fn default_reconnect() -> u64 {
    5
}

fn default_reinit() -> u64 {
    10
}

fn default_keepalive() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

// =============================================================================
// Dispatch and relay
// =============================================================================

/// Outbound pacing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchConfig {
    #[serde(default = "default_typing_delay")]
    pub typing_delay_ms: u64,
    #[serde(default = "default_bulk_interval")]
    pub bulk_interval_ms: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            typing_delay_ms: default_typing_delay(),
            bulk_interval_ms: default_bulk_interval(),
        }
    }
}

fn default_typing_delay() -> u64 {
    1_000
}

fn default_bulk_interval() -> u64 {
    2_000
}

/// Inbound relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayConfig {
    #[serde(default = "default_fallback")]
    pub fallback_message: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            fallback_message: default_fallback(),
        }
    }
}

fn default_fallback() -> String {
    DEFAULT_FALLBACK_MESSAGE.to_string()
}

// =============================================================================
// Logging
// =============================================================================

/// Log verbosity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    pub fn to_tracing_level(self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Line format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Full,
    Pretty,
    /// Requires the `json-log` feature; falls back to `full` otherwise.
    Json,
}

/// Destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    #[default]
    Stdout,
    Stderr,
    File,
}

/// File rotation policy when `output = "file"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    #[default]
    Never,
    Hourly,
    Daily,
}

/// Logging settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub level: LogLevel,
    #[serde(default)]
    pub format: LogFormat,
    #[serde(default)]
    pub output: LogOutput,
    /// Per-target overrides (`molar_runtime = "debug"`).
    #[serde(default)]
    pub filters: HashMap<String, LogLevel>,
    #[serde(default)]
    pub file_path: Option<PathBuf>,
    #[serde(default)]
    pub rotation: LogRotation,
    #[serde(default)]
    pub thread_ids: bool,
    #[serde(default)]
    pub file_location: bool,
}
