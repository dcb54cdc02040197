//! Background timers owned by the connection manager.
//!
//! Each timer keeps at most one task alive. Starting or scheduling again
//! replaces the previous task, so reconnect cycles never stack timers.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use molar_core::{Input, Presence, TransportPort};

use crate::view::SessionView;

/// Sends an `available` presence on a fixed interval while connected.
pub(crate) struct Keepalive {
    interval: Duration,
    transport: Arc<dyn TransportPort>,
    view: SessionView,
    running: Option<CancellationToken>,
}

impl Keepalive {
    pub(crate) fn new(interval: Duration, transport: Arc<dyn TransportPort>, view: SessionView) -> Self {
        Self {
            interval,
            transport,
            view,
            running: None,
        }
    }

    /// Starts a fresh schedule, stopping any running one first.
    pub(crate) fn start(&mut self) {
        self.stop();

        let token = CancellationToken::new();
        let cancelled = token.clone();
        let transport = Arc::clone(&self.transport);
        let view = self.view.clone();
        let period = self.interval;

        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    () = cancelled.cancelled() => break,
                    _ = ticker.tick() => {
                        if !view.is_connected() {
                            continue;
                        }
                        trace!("Sending keepalive presence");
                        if let Err(e) = transport.send_presence(Presence::Available, None).await {
                            warn!(error = %e, "Keepalive failed");
                        }
                    }
                }
            }
            trace!("Keepalive stopped");
        });

        debug!(interval_secs = period.as_secs(), "Keepalive started");
        self.running = Some(token);
    }

    pub(crate) fn stop(&mut self) {
        if let Some(token) = self.running.take() {
            token.cancel();
            debug!("Keepalive cancelled");
        }
    }

    #[cfg(test)]
    pub(crate) fn is_running(&self) -> bool {
        self.running.is_some()
    }
}

impl Drop for Keepalive {
    fn drop(&mut self) {
        self.stop();
    }
}

/// One-shot delayed delivery of a retry input.
pub(crate) struct RetryTimer {
    tx: mpsc::Sender<Input>,
    pending: Option<JoinHandle<()>>,
}

impl RetryTimer {
    pub(crate) fn new(tx: mpsc::Sender<Input>) -> Self {
        Self { tx, pending: None }
    }

    /// Delivers `input` after `delay`, replacing any armed timer.
    pub(crate) fn schedule(&mut self, delay: Duration, input: Input) {
        self.cancel();
        let tx = self.tx.clone();
        debug!(delay_secs = delay.as_secs(), input = input.name(), "Retry armed");
        self.pending = Some(tokio::spawn(async move {
            sleep(delay).await;
            let _ = tx.send(input).await;
        }));
    }

    pub(crate) fn cancel(&mut self) {
        if let Some(task) = self.pending.take() {
            task.abort();
        }
    }
}

impl Drop for RetryTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Spawns the periodic QR sweep, stopped by `token` or when the manager exits.
pub(crate) fn spawn_qr_sweeper(
    every: Duration,
    tx: mpsc::Sender<Input>,
    token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + every, every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;
                () = token.cancelled() => break,
                _ = ticker.tick() => {
                    if tx.send(Input::SweepQr).await.is_err() {
                        break;
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeTransport;
    use molar_core::{ConnectionState, SessionSnapshot};

    fn connected_view() -> SessionView {
        let view = SessionView::new();
        view.publish(&SessionSnapshot {
            state: ConnectionState::Connected,
            ..Default::default()
        });
        view
    }

    #[tokio::test(start_paused = true)]
    async fn test_keepalive_fires_once_per_interval() {
        let transport = Arc::new(FakeTransport::new());
        let mut keepalive = Keepalive::new(Duration::from_secs(30), transport.clone(), connected_view());

        keepalive.start();
        sleep(Duration::from_secs(29)).await;
        assert_eq!(transport.keepalives(), 0);

        sleep(Duration::from_secs(2)).await;
        assert_eq!(transport.keepalives(), 1);

        sleep(Duration::from_secs(30)).await;
        assert_eq!(transport.keepalives(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_does_not_overlap() {
        let transport = Arc::new(FakeTransport::new());
        let mut keepalive = Keepalive::new(Duration::from_secs(30), transport.clone(), connected_view());

        keepalive.start();
        sleep(Duration::from_secs(20)).await;
        keepalive.start();
        keepalive.start();
        assert!(keepalive.is_running());

        sleep(Duration::from_secs(31)).await;
        assert_eq!(transport.keepalives(), 1);

        keepalive.stop();
        sleep(Duration::from_secs(120)).await;
        assert_eq!(transport.keepalives(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_keepalive_skips_while_disconnected() {
        let transport = Arc::new(FakeTransport::new());
        let mut keepalive = Keepalive::new(Duration::from_secs(30), transport.clone(), SessionView::new());

        keepalive.start();
        sleep(Duration::from_secs(95)).await;
        assert_eq!(transport.keepalives(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_replaces_previous() {
        let (tx, mut rx) = mpsc::channel(8);
        let mut timer = RetryTimer::new(tx);

        timer.schedule(Duration::from_secs(5), Input::ReconnectDue);
        timer.schedule(Duration::from_secs(10), Input::ReinitDue);

        sleep(Duration::from_secs(6)).await;
        assert!(rx.try_recv().is_err());

        sleep(Duration::from_secs(5)).await;
        assert_eq!(rx.try_recv().ok(), Some(Input::ReinitDue));

        timer.schedule(Duration::from_secs(5), Input::ReconnectDue);
        timer.cancel();
        sleep(Duration::from_secs(10)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_ticks_until_cancelled() {
        let (tx, mut rx) = mpsc::channel(8);
        let token = CancellationToken::new();
        let task = spawn_qr_sweeper(Duration::from_secs(10), tx, token.clone());

        sleep(Duration::from_secs(25)).await;
        assert_eq!(rx.try_recv().ok(), Some(Input::SweepQr));
        assert_eq!(rx.try_recv().ok(), Some(Input::SweepQr));
        assert!(rx.try_recv().is_err());

        token.cancel();
        task.await.unwrap();
    }
}
