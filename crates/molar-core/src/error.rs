//! Unified error types for the Molar bridge.
//!
//! Each collaborator boundary gets its own error enum so callers can tell a
//! wire failure apart from a session-store failure or a backend outage.

use thiserror::Error;

// =============================================================================
// Transport Errors
// =============================================================================

/// Errors raised by a [`TransportPort`](crate::port::TransportPort) implementation.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// Connection to the protocol gateway failed.
    #[error("connection failed: {url} - {reason}")]
    ConnectionFailed {
        /// The URL that failed to connect.
        url: String,
        /// Reason for failure.
        reason: String,
    },

    /// There is no live connection to issue the request on.
    #[error("transport is not connected")]
    NotConnected,

    /// The connection closed while a request was in flight.
    #[error("connection closed: {reason}")]
    ConnectionClosed {
        /// Reason for closure.
        reason: String,
    },

    /// The gateway rejected the request.
    #[error("request '{action}' rejected: {message}")]
    Rejected {
        /// Action that was rejected.
        action: String,
        /// Message reported by the gateway.
        message: String,
    },

    /// The request did not complete within the transport timeout.
    #[error("request '{action}' timed out")]
    Timeout {
        /// Action that timed out.
        action: String,
    },

    /// Message send failed before reaching the gateway.
    #[error("failed to send frame: {0}")]
    SendFailed(String),

    /// Serialization of a frame failed.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for TransportError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

// =============================================================================
// Session Store Errors
// =============================================================================

/// Errors raised by a [`SessionStore`](crate::port::SessionStore).
///
/// Any of these during startup is an initialization failure.
#[derive(Debug, Clone, Error)]
pub enum SessionError {
    /// The stored credential could not be read.
    #[error("failed to read session store: {0}")]
    Read(String),

    /// The stored credential is present but unreadable.
    #[error("session store is corrupt: {0}")]
    Corrupt(String),

    /// The credential could not be persisted.
    #[error("failed to write session store: {0}")]
    Write(String),
}

impl From<std::io::Error> for SessionError {
    fn from(err: std::io::Error) -> Self {
        Self::Read(err.to_string())
    }
}

// =============================================================================
// Backend Errors
// =============================================================================

/// Errors raised when talking to the backend classifier/responder.
#[derive(Debug, Clone, Error)]
pub enum BackendError {
    /// The backend could not be reached.
    #[error("backend unreachable: {0}")]
    Unreachable(String),

    /// The backend answered with a non-success status.
    #[error("backend returned HTTP {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, possibly truncated.
        body: String,
    },

    /// The backend reply could not be decoded.
    #[error("invalid backend reply: {0}")]
    InvalidReply(String),
}

// =============================================================================
// Send Errors
// =============================================================================

/// Errors returned by the outbound dispatcher for a single recipient.
#[derive(Debug, Clone, Error)]
pub enum SendError {
    /// A send was attempted while the connection is not `connected`.
    #[error("WhatsApp is not connected")]
    NotConnected,

    /// The target address has no usable digits.
    #[error("invalid address: {0:?}")]
    InvalidAddress(String),

    /// The transport failed to deliver the message.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Result type for session store operations.
pub type SessionResult<T> = Result<T, SessionError>;

/// Result type for backend calls.
pub type BackendResult<T> = Result<T, BackendError>;

/// Result type for outbound sends.
pub type SendResult<T> = Result<T, SendError>;
