//! The connection state machine.
//!
//! [`step`] is a pure function of the current [`MachineState`], one
//! [`Input`], the wall clock and the [`SessionPolicy`]. It returns the next
//! state and the [`Effect`]s the connection manager must carry out. No I/O
//! happens here, so every transition can be exercised without a transport.

use std::time::{Duration, SystemTime};

use crate::model::{ConnectedIdentity, ConnectionState, MessageBatch, QrChallenge, SessionSnapshot};
use crate::port::session::SessionCredential;
use crate::port::transport::{CloseReason, Epoch, TransportEvent};

/// Notice recorded when the account logs this device out.
pub const LOGGED_OUT_NOTICE: &str = "Session logged out; scan a new QR code to re-pair";

/// Fixed delays driving the lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionPolicy {
    /// How long a pairing challenge stays usable.
    pub qr_ttl: Duration,
    /// Wait before reconnecting after a transient closure.
    pub reconnect_delay: Duration,
    /// Wait before re-initializing after an initialization failure.
    pub reinit_delay: Duration,
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self {
            qr_ttl: Duration::from_secs(60),
            reconnect_delay: Duration::from_secs(5),
            reinit_delay: Duration::from_secs(10),
        }
    }
}

/// Which delayed retry is armed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingRetry {
    Reconnect,
    Reinit,
}

/// Everything the machine tracks between inputs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MachineState {
    /// The externally visible part.
    pub snapshot: SessionSnapshot,
    /// Tag of the current connection attempt.
    pub epoch: Epoch,
    /// Retry timer the manager should have armed, if any.
    pub pending: Option<PendingRetry>,
}

/// Inputs consumed by the manager's event loop.
#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    /// Something the transport observed on connection `epoch`.
    Transport { epoch: Epoch, event: TransportEvent },
    /// Start (or restart) the session from scratch.
    Initialize,
    /// The reconnect delay elapsed.
    ReconnectDue,
    /// The re-initialization delay elapsed.
    ReinitDue,
    /// Restoring the session or starting connection `epoch` failed.
    InitFailed { epoch: Epoch, reason: String },
    /// Periodic sweep of expired pairing challenges.
    SweepQr,
    /// The process is shutting down.
    Shutdown,
}

impl Input {
    /// Short name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Transport { event, .. } => event.name(),
            Self::Initialize => "initialize",
            Self::ReconnectDue => "reconnect_due",
            Self::ReinitDue => "reinit_due",
            Self::InitFailed { .. } => "init_failed",
            Self::SweepQr => "sweep_qr",
            Self::Shutdown => "shutdown",
        }
    }
}

/// Side effects requested by a transition, executed in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Restore the credential and connect, tagging events with `epoch`.
    Connect { epoch: Epoch },
    /// Start the keepalive scheduler, replacing any running one.
    StartKeepalive,
    /// Stop the keepalive scheduler.
    StopKeepalive,
    /// Disarm the retry timer.
    CancelRetry,
    /// Arm the retry timer to deliver [`Input::ReconnectDue`].
    ScheduleReconnect(Duration),
    /// Arm the retry timer to deliver [`Input::ReinitDue`].
    ScheduleReinit(Duration),
    /// Best-effort backend notification of the new connection.
    NotifyConnected(ConnectedIdentity),
    /// Best-effort backend notification of a new pairing challenge.
    NotifyQr(String),
    /// Persist updated session material.
    SaveCredentials(SessionCredential),
    /// Drop the persisted credential after a logout.
    InvalidateSession,
    /// Hand a message batch to the inbound relay.
    Relay(MessageBatch),
}

/// Result of one [`step`].
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub next: MachineState,
    pub effects: Vec<Effect>,
}

impl Transition {
    fn unchanged(current: &MachineState) -> Self {
        Self {
            next: current.clone(),
            effects: Vec::new(),
        }
    }

    /// Returns whether the visible state changed.
    pub fn changes_state(&self, from: &MachineState) -> bool {
        self.next.snapshot.state != from.snapshot.state
    }
}

/// Computes the transition for `input`.
pub fn step(
    current: &MachineState,
    input: Input,
    now: SystemTime,
    policy: &SessionPolicy,
) -> Transition {
    match input {
        Input::Initialize => begin_connect(current),
        Input::ReconnectDue => {
            if current.pending == Some(PendingRetry::Reconnect)
                && current.snapshot.state == ConnectionState::Disconnected
            {
                begin_connect(current)
            } else {
                Transition::unchanged(current)
            }
        }
        Input::ReinitDue => {
            if current.pending == Some(PendingRetry::Reinit)
                && current.snapshot.state == ConnectionState::Error
            {
                begin_connect(current)
            } else {
                Transition::unchanged(current)
            }
        }
        Input::InitFailed { epoch, reason } => {
            if epoch != current.epoch {
                return Transition::unchanged(current);
            }
            let mut next = current.clone();
            next.snapshot = SessionSnapshot {
                state: ConnectionState::Error,
                identity: None,
                qr: None,
                last_error: Some(reason),
            };
            next.pending = Some(PendingRetry::Reinit);
            Transition {
                next,
                effects: vec![
                    Effect::StopKeepalive,
                    Effect::ScheduleReinit(policy.reinit_delay),
                ],
            }
        }
        Input::SweepQr => {
            let expired = current
                .snapshot
                .qr
                .as_ref()
                .is_some_and(|qr| !qr.is_live_at(now));
            if !expired {
                return Transition::unchanged(current);
            }
            let mut next = current.clone();
            next.snapshot.qr = None;
            Transition {
                next,
                effects: Vec::new(),
            }
        }
        Input::Shutdown => {
            let mut next = current.clone();
            next.epoch += 1;
            next.pending = None;
            next.snapshot.state = ConnectionState::Disconnected;
            next.snapshot.identity = None;
            next.snapshot.qr = None;
            Transition {
                next,
                effects: vec![Effect::StopKeepalive, Effect::CancelRetry],
            }
        }
        Input::Transport { epoch, event } => {
            if epoch != current.epoch {
                return Transition::unchanged(current);
            }
            on_transport_event(current, event, now, policy)
        }
    }
}

fn begin_connect(current: &MachineState) -> Transition {
    let mut next = current.clone();
    next.epoch += 1;
    next.pending = None;
    next.snapshot.state = ConnectionState::Connecting;
    next.snapshot.identity = None;
    next.snapshot.qr = None;
    Transition {
        effects: vec![
            Effect::StopKeepalive,
            Effect::CancelRetry,
            Effect::Connect { epoch: next.epoch },
        ],
        next,
    }
}

fn on_transport_event(
    current: &MachineState,
    event: TransportEvent,
    now: SystemTime,
    policy: &SessionPolicy,
) -> Transition {
    let state = current.snapshot.state;
    // A closed connection never reopens on its own epoch. After a logout
    // (no retry pending) its credential updates are stale too.
    if state == ConnectionState::Disconnected {
        let ignored = match &event {
            TransportEvent::Messages(_) => false,
            TransportEvent::CredentialsUpdated(_) => current.pending.is_none(),
            _ => true,
        };
        if ignored {
            return Transition::unchanged(current);
        }
    }
    match event {
        TransportEvent::Connecting => {
            if state == ConnectionState::Connecting {
                return Transition::unchanged(current);
            }
            let mut next = current.clone();
            next.snapshot.state = ConnectionState::Connecting;
            next.snapshot.identity = None;
            Transition {
                next,
                effects: vec![Effect::StopKeepalive],
            }
        }
        TransportEvent::Qr(payload) => {
            if state == ConnectionState::Connected {
                return Transition::unchanged(current);
            }
            let mut next = current.clone();
            next.snapshot.state = ConnectionState::Connecting;
            next.snapshot.qr = Some(QrChallenge::new(payload.clone(), now, policy.qr_ttl));
            Transition {
                next,
                effects: vec![Effect::NotifyQr(payload)],
            }
        }
        TransportEvent::Opened(identity) => {
            let mut next = current.clone();
            next.pending = None;
            next.snapshot = SessionSnapshot {
                state: ConnectionState::Connected,
                identity: Some(identity.clone()),
                qr: None,
                last_error: None,
            };
            Transition {
                next,
                effects: vec![
                    Effect::CancelRetry,
                    Effect::StartKeepalive,
                    Effect::NotifyConnected(identity),
                ],
            }
        }
        TransportEvent::Closed(reason) => on_closed(current, reason, policy),
        TransportEvent::CredentialsUpdated(credential) => Transition {
            next: current.clone(),
            effects: vec![Effect::SaveCredentials(credential)],
        },
        TransportEvent::Messages(batch) => Transition {
            next: current.clone(),
            effects: vec![Effect::Relay(batch)],
        },
    }
}

fn on_closed(current: &MachineState, reason: CloseReason, policy: &SessionPolicy) -> Transition {
    // A failed initialization already armed the re-init timer.
    if current.snapshot.state == ConnectionState::Error {
        return Transition::unchanged(current);
    }

    let mut next = current.clone();
    next.snapshot.state = ConnectionState::Disconnected;
    next.snapshot.identity = None;
    next.snapshot.qr = None;

    if reason.is_logged_out() {
        next.pending = None;
        next.snapshot.last_error = Some(LOGGED_OUT_NOTICE.to_string());
        Transition {
            next,
            effects: vec![
                Effect::StopKeepalive,
                Effect::CancelRetry,
                Effect::InvalidateSession,
            ],
        }
    } else {
        next.pending = Some(PendingRetry::Reconnect);
        Transition {
            next,
            effects: vec![
                Effect::StopKeepalive,
                Effect::ScheduleReconnect(policy.reconnect_delay),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::UpsertKind;
    use std::time::UNIX_EPOCH;

    fn at(secs: u64) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(secs)
    }

    fn identity() -> ConnectedIdentity {
        ConnectedIdentity::from_raw_id("34600111222:3@s.whatsapp.net", Some("Clinic".into()))
    }

    fn run(state: &MachineState, input: Input, now: SystemTime) -> Transition {
        step(state, input, now, &SessionPolicy::default())
    }

    fn event(state: &MachineState, event: TransportEvent) -> Input {
        Input::Transport {
            epoch: state.epoch,
            event,
        }
    }

    fn connected() -> MachineState {
        let start = run(&MachineState::default(), Input::Initialize, at(0)).next;
        run(&start, event(&start, TransportEvent::Opened(identity())), at(1)).next
    }

    #[test]
    fn test_initialize_connects_with_new_epoch() {
        let t = run(&MachineState::default(), Input::Initialize, at(0));

        assert_eq!(t.next.snapshot.state, ConnectionState::Connecting);
        assert_eq!(t.next.epoch, 1);
        assert_eq!(t.effects.last(), Some(&Effect::Connect { epoch: 1 }));
    }

    #[test]
    fn test_open_captures_identity_and_clears_qr() {
        let start = run(&MachineState::default(), Input::Initialize, at(0)).next;
        let with_qr = run(&start, event(&start, TransportEvent::Qr("2@abc".into())), at(1)).next;
        assert!(with_qr.snapshot.qr.is_some());

        let t = run(
            &with_qr,
            event(&with_qr, TransportEvent::Opened(identity())),
            at(2),
        );
        assert_eq!(t.next.snapshot.state, ConnectionState::Connected);
        assert_eq!(t.next.snapshot.identity, Some(identity()));
        assert!(t.next.snapshot.qr.is_none());
        assert!(t.effects.contains(&Effect::StartKeepalive));
        assert!(t.effects.contains(&Effect::NotifyConnected(identity())));
    }

    #[test]
    fn test_transient_close_schedules_reconnect() {
        let state = connected();
        let t = run(
            &state,
            event(&state, TransportEvent::Closed(CloseReason::transient("stream errored"))),
            at(10),
        );

        assert_eq!(t.next.snapshot.state, ConnectionState::Disconnected);
        assert!(t.next.snapshot.identity.is_none());
        assert_eq!(
            t.effects,
            vec![
                Effect::StopKeepalive,
                Effect::ScheduleReconnect(Duration::from_secs(5))
            ]
        );

        let again = run(&t.next, Input::ReconnectDue, at(15));
        assert_eq!(again.next.snapshot.state, ConnectionState::Connecting);
        assert!(
            again
                .effects
                .contains(&Effect::Connect { epoch: state.epoch + 1 })
        );
    }

    #[test]
    fn test_logout_close_never_reconnects() {
        let state = connected();
        let t = run(
            &state,
            event(&state, TransportEvent::Closed(CloseReason::logged_out("logged out"))),
            at(10),
        );

        assert_eq!(t.next.snapshot.state, ConnectionState::Disconnected);
        assert_eq!(t.next.pending, None);
        assert!(t.effects.contains(&Effect::InvalidateSession));
        assert!(
            !t.effects
                .iter()
                .any(|e| matches!(e, Effect::ScheduleReconnect(_)))
        );

        let late = run(&t.next, Input::ReconnectDue, at(20));
        assert_eq!(late.next, t.next);
        assert!(late.effects.is_empty());

        let manual = run(&t.next, Input::Initialize, at(30));
        assert_eq!(manual.next.snapshot.state, ConnectionState::Connecting);
    }

    #[test]
    fn test_socket_end_after_logout_stays_down() {
        let state = connected();
        let logged_out = run(
            &state,
            event(&state, TransportEvent::Closed(CloseReason::logged_out("logged out"))),
            at(10),
        )
        .next;

        let t = run(
            &logged_out,
            event(&logged_out, TransportEvent::Closed(CloseReason::transient("socket ended"))),
            at(10),
        );
        assert_eq!(t.next, logged_out);
        assert!(t.effects.is_empty());
    }

    #[test]
    fn test_logged_out_session_ignores_gateway_redial() {
        let state = connected();
        let logged_out = run(
            &state,
            event(&state, TransportEvent::Closed(CloseReason::logged_out("logged out"))),
            at(10),
        )
        .next;

        for redial in [
            TransportEvent::Connecting,
            TransportEvent::Qr("2@again".into()),
            TransportEvent::Opened(identity()),
            TransportEvent::CredentialsUpdated(SessionCredential::new(serde_json::json!({}))),
        ] {
            let t = run(&logged_out, event(&logged_out, redial), at(11));
            assert_eq!(t.next, logged_out);
            assert!(t.effects.is_empty());
        }

        let batch = MessageBatch {
            kind: UpsertKind::Notify,
            messages: Vec::new(),
        };
        let t = run(
            &logged_out,
            event(&logged_out, TransportEvent::Messages(batch.clone())),
            at(12),
        );
        assert_eq!(t.effects, vec![Effect::Relay(batch)]);
    }

    #[test]
    fn test_stale_epoch_is_ignored() {
        let state = connected();
        let stale = Input::Transport {
            epoch: state.epoch - 1,
            event: TransportEvent::Closed(CloseReason::transient("old socket")),
        };

        let t = run(&state, stale, at(10));
        assert_eq!(t.next, state);
        assert!(t.effects.is_empty());
    }

    #[test]
    fn test_init_failure_enters_error_and_schedules_reinit() {
        let start = run(&MachineState::default(), Input::Initialize, at(0)).next;
        let t = run(
            &start,
            Input::InitFailed {
                epoch: start.epoch,
                reason: "corrupt credentials".into(),
            },
            at(1),
        );

        assert_eq!(t.next.snapshot.state, ConnectionState::Error);
        assert_eq!(
            t.next.snapshot.last_error.as_deref(),
            Some("corrupt credentials")
        );
        assert!(
            t.effects
                .contains(&Effect::ScheduleReinit(Duration::from_secs(10)))
        );

        let retry = run(&t.next, Input::ReinitDue, at(11));
        assert_eq!(retry.next.snapshot.state, ConnectionState::Connecting);
    }

    #[test]
    fn test_qr_ignored_while_connected() {
        let state = connected();
        let t = run(&state, event(&state, TransportEvent::Qr("2@late".into())), at(5));

        assert_eq!(t.next, state);
        assert!(t.effects.is_empty());
    }

    #[test]
    fn test_new_qr_replaces_previous() {
        let start = run(&MachineState::default(), Input::Initialize, at(0)).next;
        let first = run(&start, event(&start, TransportEvent::Qr("2@one".into())), at(1)).next;
        let second = run(&first, event(&first, TransportEvent::Qr("2@two".into())), at(20));

        let qr = second.next.snapshot.qr.as_ref().map(|q| q.payload.as_str());
        assert_eq!(qr, Some("2@two"));
        assert_eq!(second.effects, vec![Effect::NotifyQr("2@two".into())]);
    }

    #[test]
    fn test_sweep_clears_only_expired_qr() {
        let start = run(&MachineState::default(), Input::Initialize, at(0)).next;
        let with_qr = run(&start, event(&start, TransportEvent::Qr("2@abc".into())), at(100)).next;

        let early = run(&with_qr, Input::SweepQr, at(130));
        assert!(early.next.snapshot.qr.is_some());

        let late = run(&with_qr, Input::SweepQr, at(161));
        assert!(late.next.snapshot.qr.is_none());
        assert_eq!(late.next.snapshot.state, ConnectionState::Connecting);
    }

    #[test]
    fn test_credentials_and_messages_pass_through() {
        let state = connected();
        let creds = SessionCredential::new(serde_json::json!({"me": "x"}));
        let t = run(
            &state,
            event(&state, TransportEvent::CredentialsUpdated(creds.clone())),
            at(5),
        );
        assert_eq!(t.next, state);
        assert_eq!(t.effects, vec![Effect::SaveCredentials(creds)]);

        let batch = MessageBatch {
            kind: UpsertKind::Notify,
            messages: Vec::new(),
        };
        let t = run(&state, event(&state, TransportEvent::Messages(batch.clone())), at(6));
        assert_eq!(t.effects, vec![Effect::Relay(batch)]);
    }

    #[test]
    fn test_shutdown_disconnects_and_bumps_epoch() {
        let state = connected();
        let t = run(&state, Input::Shutdown, at(50));

        assert_eq!(t.next.snapshot.state, ConnectionState::Disconnected);
        assert_eq!(t.next.epoch, state.epoch + 1);
        assert_eq!(t.effects, vec![Effect::StopKeepalive, Effect::CancelRetry]);
    }
}
