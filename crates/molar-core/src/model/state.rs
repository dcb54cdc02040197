//! Connection state, pairing challenge and connected identity.

use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Lifecycle state of the single messaging session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// No live connection and no attempt in progress.
    #[default]
    Disconnected,
    /// A connection attempt (possibly awaiting QR pairing) is in progress.
    Connecting,
    /// The handshake completed; sends are allowed.
    Connected,
    /// Initialization failed; a delayed re-initialization is pending.
    Error,
}

impl ConnectionState {
    /// Returns the wire name of this state.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of the paired account, captured when the session opens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectedIdentity {
    /// Raw device identifier as reported by the transport (`34600111222:7@s.whatsapp.net`).
    pub raw_id: String,
    /// Phone number part of the identifier.
    pub phone_number: String,
    /// Account display name, when the transport reports one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl ConnectedIdentity {
    /// Derives the identity from a raw device id.
    ///
    /// The phone number is everything before the device separator (`:`) or
    /// the server part (`@`), whichever comes first.
    pub fn from_raw_id(raw_id: impl Into<String>, name: Option<String>) -> Self {
        let raw_id = raw_id.into();
        let phone_number = raw_id
            .split([':', '@'])
            .next()
            .unwrap_or_default()
            .to_string();
        Self {
            raw_id,
            phone_number,
            name,
        }
    }
}

/// A pairing challenge the operator scans with their phone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QrChallenge {
    /// Opaque payload to render as a QR code.
    pub payload: String,
    /// When the transport emitted the challenge.
    pub issued_at: SystemTime,
    /// After this instant the challenge is treated as absent.
    pub expires_at: SystemTime,
}

impl QrChallenge {
    /// Creates a challenge issued at `issued_at` that lives for `ttl`.
    pub fn new(payload: impl Into<String>, issued_at: SystemTime, ttl: Duration) -> Self {
        Self {
            payload: payload.into(),
            issued_at,
            expires_at: issued_at + ttl,
        }
    }

    /// Returns whether the challenge is still usable at `now`.
    pub fn is_live_at(&self, now: SystemTime) -> bool {
        now < self.expires_at
    }

    /// Expiry as milliseconds since the Unix epoch.
    pub fn expires_at_millis(&self) -> u64 {
        millis_since_epoch(self.expires_at)
    }
}

/// Point-in-time view of the session, safe to hand to concurrent readers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSnapshot {
    /// Current connection state.
    pub state: ConnectionState,
    /// Paired identity, set only while connected.
    pub identity: Option<ConnectedIdentity>,
    /// Pending pairing challenge, if any was issued.
    pub qr: Option<QrChallenge>,
    /// Last initialization failure or session invalidation notice.
    pub last_error: Option<String>,
}

impl SessionSnapshot {
    /// Returns whether sends are currently allowed.
    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// Returns the pairing challenge only if it has not expired at `now`.
    pub fn live_qr(&self, now: SystemTime) -> Option<&QrChallenge> {
        self.qr.as_ref().filter(|qr| qr.is_live_at(now))
    }
}

/// Milliseconds since the Unix epoch, saturating at zero for earlier instants.
pub fn millis_since_epoch(at: SystemTime) -> u64 {
    at.duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
