//! Session credential persistence.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::SessionResult;

/// Opaque authentication material produced by the transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionCredential(Value);

impl SessionCredential {
    /// Wraps transport-provided material.
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    /// Borrows the raw material.
    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// Consumes the credential, returning the raw material.
    pub fn into_value(self) -> Value {
        self.0
    }
}

/// Load-at-startup / save-on-update persistence for the single credential set.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Reads the stored credential, `None` if the device was never paired.
    async fn load(&self) -> SessionResult<Option<SessionCredential>>;

    /// Replaces the stored credential.
    async fn save(&self, credential: &SessionCredential) -> SessionResult<()>;

    /// Removes the stored credential after a logout.
    async fn clear(&self) -> SessionResult<()>;
}

/// In-memory store, for tests and ephemeral deployments.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    credential: Mutex<Option<SessionCredential>>,
}

impl MemorySessionStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store that already holds `credential`.
    pub fn with_credential(credential: SessionCredential) -> Self {
        Self {
            credential: Mutex::new(Some(credential)),
        }
    }

    /// Returns the current credential without going through the trait.
    pub fn current(&self) -> Option<SessionCredential> {
        self.credential.lock().clone()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn load(&self) -> SessionResult<Option<SessionCredential>> {
        Ok(self.credential.lock().clone())
    }

    async fn save(&self, credential: &SessionCredential) -> SessionResult<()> {
        *self.credential.lock() = Some(credential.clone());
        Ok(())
    }

    async fn clear(&self) -> SessionResult<()> {
        *self.credential.lock() = None;
        Ok(())
    }
}
