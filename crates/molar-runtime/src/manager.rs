//! The connection manager: single owner of the session lifecycle.
//!
//! One task drains a queue of [`Input`]s. Each input goes through the pure
//! [`step`] function and the resulting [`Effect`]s are carried out before the
//! next input is taken, so transport events, timer expiries and inbound
//! batches are handled strictly one after another.
//!
//! ```text
//!  transport ──EventSender──┐
//!  retry timer ─────────────┤
//!  QR sweeper ──────────────┼──▶ mpsc<Input> ──▶ event loop ──▶ effects
//!  initialize()/shutdown() ─┘                       │
//!                                                   └──▶ SessionView (readers)
//! ```

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use molar_core::{
    BackendPort, Effect, EventSender, InboundSink, Input, MachineState, SessionPolicy,
    SessionSnapshot, SessionStore, TransportPort, step,
};

use crate::config::SessionConfig;
use crate::schedule::{Keepalive, RetryTimer, spawn_qr_sweeper};
use crate::view::SessionView;

const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Timing of the lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManagerSettings {
    pub policy: SessionPolicy,
    pub keepalive_interval: Duration,
    pub qr_sweep_interval: Duration,
    /// Capacity of the input queue.
    pub event_capacity: usize,
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self::from(&SessionConfig::default())
    }
}

impl From<&SessionConfig> for ManagerSettings {
    fn from(config: &SessionConfig) -> Self {
        Self {
            policy: config.policy(),
            keepalive_interval: Duration::from_secs(config.keepalive_interval_secs),
            qr_sweep_interval: Duration::from_secs(config.qr_sweep_interval_secs),
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

/// The ports the manager drives.
#[derive(Clone)]
pub struct ManagerPorts {
    pub transport: Arc<dyn TransportPort>,
    pub store: Arc<dyn SessionStore>,
    pub backend: Arc<dyn BackendPort>,
    pub sink: Arc<dyn InboundSink>,
}

/// Handle to the running event loop.
pub struct ConnectionManager {
    view: SessionView,
    tx: mpsc::Sender<Input>,
    transport: Arc<dyn TransportPort>,
    store: Arc<dyn SessionStore>,
    sweeper: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ConnectionManager {
    /// Spawns the event loop and the QR sweeper. The session stays
    /// disconnected until [`initialize`](Self::initialize) is called.
    pub fn start(settings: ManagerSettings, view: SessionView, ports: ManagerPorts) -> Self {
        let (tx, rx) = mpsc::channel(settings.event_capacity.max(1));
        let sweeper = CancellationToken::new();
        spawn_qr_sweeper(settings.qr_sweep_interval, tx.clone(), sweeper.clone());

        let event_loop = EventLoop {
            state: MachineState::default(),
            policy: settings.policy,
            view: view.clone(),
            rx,
            tx: tx.clone(),
            keepalive: Keepalive::new(
                settings.keepalive_interval,
                Arc::clone(&ports.transport),
                view.clone(),
            ),
            retry: RetryTimer::new(tx.clone()),
            connecting: None,
            ports: ports.clone(),
        };
        let task = tokio::spawn(event_loop.run());

        Self {
            view,
            tx,
            transport: ports.transport,
            store: ports.store,
            sweeper,
            task: Mutex::new(Some(task)),
        }
    }

    /// Read side of the session state.
    pub fn view(&self) -> &SessionView {
        &self.view
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.view.snapshot()
    }

    /// Starts a fresh session, superseding any connection in progress.
    ///
    /// Returns `false` once the manager has shut down.
    pub async fn initialize(&self) -> bool {
        self.tx.send(Input::Initialize).await.is_ok()
    }

    /// Stops the event loop and its timers.
    ///
    /// With `logout`, a connected session is logged out and its stored
    /// credential removed; otherwise the connection is only dropped.
    pub async fn shutdown(&self, logout: bool) {
        let was_connected = self.view.is_connected();
        self.sweeper.cancel();

        if self.tx.send(Input::Shutdown).await.is_err() {
            debug!("Connection manager already stopped");
        }
        let task = self.task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                error!(error = %e, "Connection manager task failed");
            }
        }

        if logout && was_connected {
            info!("Logging out of the session");
            if let Err(e) = self.transport.logout().await {
                warn!(error = %e, "Logout not acknowledged");
            }
            // The gateway may drop the socket before acknowledging; the
            // credential is revoked either way.
            if let Err(e) = self.store.clear().await {
                warn!(error = %e, "Failed to remove stored session");
            }
        } else {
            self.transport.disconnect().await;
        }
        info!("Connection manager stopped");
    }
}

struct EventLoop {
    state: MachineState,
    policy: SessionPolicy,
    view: SessionView,
    rx: mpsc::Receiver<Input>,
    tx: mpsc::Sender<Input>,
    keepalive: Keepalive,
    retry: RetryTimer,
    connecting: Option<JoinHandle<()>>,
    ports: ManagerPorts,
}

impl EventLoop {
    async fn run(mut self) {
        debug!("Connection manager started");
        while let Some(input) = self.rx.recv().await {
            let stop = matches!(input, Input::Shutdown);
            self.handle(input).await;
            if stop {
                break;
            }
        }

        self.keepalive.stop();
        self.retry.cancel();
        if let Some(task) = self.connecting.take() {
            task.abort();
        }
    }

    async fn handle(&mut self, input: Input) {
        let mut queue = VecDeque::from([input]);

        while let Some(input) = queue.pop_front() {
            let name = input.name();
            let transition = step(&self.state, input, SystemTime::now(), &self.policy);

            if transition.changes_state(&self.state) {
                info!(
                    from = %self.state.snapshot.state,
                    to = %transition.next.snapshot.state,
                    input = name,
                    epoch = transition.next.epoch,
                    "Connection state changed"
                );
            } else if self.state.snapshot.qr.is_some() && transition.next.snapshot.qr.is_none() {
                info!("QR code expired");
            }

            self.state = transition.next;
            self.view.publish(&self.state.snapshot);

            for effect in transition.effects {
                if let Some(follow_up) = self.apply(effect).await {
                    queue.push_back(follow_up);
                }
            }
        }
    }

    async fn apply(&mut self, effect: Effect) -> Option<Input> {
        match effect {
            Effect::Connect { epoch } => return self.connect(epoch).await,
            Effect::StartKeepalive => self.keepalive.start(),
            Effect::StopKeepalive => self.keepalive.stop(),
            Effect::CancelRetry => self.retry.cancel(),
            Effect::ScheduleReconnect(delay) => {
                info!(delay_secs = delay.as_secs(), "Connection closed, reconnecting");
                self.retry.schedule(delay, Input::ReconnectDue);
            }
            Effect::ScheduleReinit(delay) => {
                info!(delay_secs = delay.as_secs(), "Re-initializing after failure");
                self.retry.schedule(delay, Input::ReinitDue);
            }
            Effect::NotifyConnected(identity) => {
                info!(
                    phone = %identity.phone_number,
                    name = identity.name.as_deref().unwrap_or_default(),
                    "WhatsApp connected"
                );
                let backend = Arc::clone(&self.ports.backend);
                tokio::spawn(async move {
                    if let Err(e) = backend.connected(&identity).await {
                        warn!(error = %e, "Failed to notify backend of connection");
                    }
                });
            }
            Effect::NotifyQr(payload) => {
                info!(qr = %payload, "QR code received, scan it with the phone to pair");
                let backend = Arc::clone(&self.ports.backend);
                tokio::spawn(async move {
                    if let Err(e) = backend.qr_updated(&payload).await {
                        warn!(error = %e, "Failed to notify backend of QR code");
                    }
                });
            }
            Effect::SaveCredentials(credential) => {
                if let Err(e) = self.ports.store.save(&credential).await {
                    warn!(error = %e, "Failed to persist session credential");
                }
            }
            Effect::InvalidateSession => {
                warn!("Session logged out, re-pairing required");
                if let Err(e) = self.ports.store.clear().await {
                    warn!(error = %e, "Failed to remove stored session");
                }
            }
            Effect::Relay(batch) => self.ports.sink.on_batch(batch).await,
        }
        None
    }

    async fn connect(&mut self, epoch: u64) -> Option<Input> {
        let credential = match self.ports.store.load().await {
            Ok(credential) => credential,
            Err(e) => {
                error!(epoch, error = %e, "Failed to restore session");
                return Some(Input::InitFailed {
                    epoch,
                    reason: e.to_string(),
                });
            }
        };

        info!(
            epoch,
            restored = credential.is_some(),
            "Initializing WhatsApp connection"
        );

        if let Some(previous) = self.connecting.take() {
            previous.abort();
        }
        let transport = Arc::clone(&self.ports.transport);
        let tx = self.tx.clone();
        self.connecting = Some(tokio::spawn(async move {
            let events = EventSender::new(epoch, tx.clone());
            if let Err(e) = transport.connect(credential, events).await {
                error!(epoch, error = %e, "Failed to start connection");
                let _ = tx
                    .send(Input::InitFailed {
                        epoch,
                        reason: e.to_string(),
                    })
                    .await;
            }
        }));
        None
    }
}
