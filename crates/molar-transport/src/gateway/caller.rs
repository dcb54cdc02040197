//! Echo-matched command calls over a gateway connection.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tracing::{debug, warn};

use molar_core::{TransportError, TransportResult};

use super::frame::{command, reply_data};

/// Issues commands on one connection and routes replies back by echo id.
///
/// Each [`call`](Self::call):
/// 1. takes the next echo id,
/// 2. registers a one-shot waiter under it,
/// 3. queues the command on the socket write channel,
/// 4. waits for [`on_reply`](Self::on_reply) to resolve the waiter or for
///    the request timeout to elapse.
pub struct GatewayCaller {
    outgoing: mpsc::Sender<String>,
    pending: Mutex<HashMap<u64, oneshot::Sender<Value>>>,
    next_echo: AtomicU64,
    request_timeout: Duration,
}

impl GatewayCaller {
    pub fn new(outgoing: mpsc::Sender<String>, request_timeout: Duration) -> Self {
        Self {
            outgoing,
            pending: Mutex::new(HashMap::new()),
            next_echo: AtomicU64::new(1),
            request_timeout,
        }
    }

    /// Sends `action` and waits for its reply data.
    pub async fn call(&self, action: &str, params: Value) -> TransportResult<Value> {
        let echo = self.next_echo.fetch_add(1, Ordering::SeqCst);

        // Register before sending so an immediate reply is never missed.
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(echo, tx);

        debug!(action = %action, echo = echo, "Calling gateway");

        let frame = serde_json::to_string(&command(action, params, echo))?;
        if let Err(e) = self.outgoing.send(frame).await {
            self.pending.lock().remove(&echo);
            return Err(TransportError::SendFailed(e.to_string()));
        }

        match timeout(self.request_timeout, rx).await {
            Ok(Ok(reply)) => reply_data(action, reply),
            Ok(Err(_)) => Err(TransportError::ConnectionClosed {
                reason: format!("connection dropped while waiting for '{action}'"),
            }),
            Err(_) => {
                self.pending.lock().remove(&echo);
                Err(TransportError::Timeout {
                    action: action.to_string(),
                })
            }
        }
    }

    /// Resolves the waiter for a reply frame. Returns `false` if none is waiting.
    pub fn on_reply(&self, reply: Value) -> bool {
        let Some(echo) = reply.get("echo").and_then(Value::as_u64) else {
            return false;
        };
        match self.pending.lock().remove(&echo) {
            Some(tx) => {
                let _ = tx.send(reply);
                true
            }
            None => {
                warn!(echo = echo, "Gateway reply for unknown echo (timed out?)");
                false
            }
        }
    }

    /// Fails every outstanding call; used when the socket goes away.
    pub fn on_disconnect(&self) {
        let mut pending = self.pending.lock();
        if !pending.is_empty() {
            debug!(
                count = pending.len(),
                "Clearing pending gateway calls due to disconnect"
            );
            pending.clear();
        }
    }

    /// Number of calls awaiting a reply.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }
}
