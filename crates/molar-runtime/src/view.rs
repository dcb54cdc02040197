//! Shared read side of the session state.

use std::sync::Arc;
use std::time::SystemTime;

use parking_lot::RwLock;

use molar_core::{QrChallenge, SessionSnapshot};

/// Concurrent snapshot of the session, written only by the connection manager.
///
/// Readers copy the snapshot out; no lock is held across an await point.
#[derive(Debug, Clone, Default)]
pub struct SessionView {
    inner: Arc<RwLock<SessionSnapshot>>,
}

impl SessionView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the current snapshot.
    pub fn snapshot(&self) -> SessionSnapshot {
        self.inner.read().clone()
    }

    pub fn is_connected(&self) -> bool {
        self.inner.read().is_connected()
    }

    /// The pairing challenge, unless it expired before `now`.
    pub fn live_qr(&self, now: SystemTime) -> Option<QrChallenge> {
        self.inner.read().live_qr(now).cloned()
    }

    pub(crate) fn publish(&self, snapshot: &SessionSnapshot) {
        let mut current = self.inner.write();
        if *current != *snapshot {
            current.clone_from(snapshot);
        }
    }
}
