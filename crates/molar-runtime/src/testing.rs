//! In-crate fakes for the ports.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use parking_lot::Mutex;

use molar_core::{
    BackendError, BackendPort, BackendResult, ClassifierReply, ConnectedIdentity, EventSender,
    InboundMessage, Jid, Presence, SessionCredential, TransportError, TransportEvent,
    TransportPort, TransportResult,
};

#[derive(Default)]
struct TransportLog {
    connects: Vec<Option<SessionCredential>>,
    events: Option<EventSender>,
    presences: Vec<(Presence, Option<Jid>)>,
    sent: Vec<(Jid, String)>,
    logouts: usize,
    disconnects: usize,
}

/// Transport that records every call and lets tests inject events.
#[derive(Default)]
pub(crate) struct FakeTransport {
    log: Mutex<TransportLog>,
    failing: Mutex<HashSet<String>>,
    contacts: Mutex<HashMap<String, String>>,
    fail_connect: Mutex<bool>,
    fail_logout: Mutex<bool>,
}

impl FakeTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Makes every send to `jid` fail.
    pub(crate) fn fail_sends_to(&self, jid: &str) {
        self.failing.lock().insert(jid.to_string());
    }

    pub(crate) fn fail_connect(&self, fail: bool) {
        *self.fail_connect.lock() = fail;
    }

    /// Makes logout fail as if the socket dropped before the ack.
    pub(crate) fn fail_logout(&self, fail: bool) {
        *self.fail_logout.lock() = fail;
    }

    pub(crate) fn add_contact(&self, jid: &str, name: &str) {
        self.contacts.lock().insert(jid.to_string(), name.to_string());
    }

    /// Emits on the sender of the latest connect.
    pub(crate) async fn emit(&self, event: TransportEvent) -> bool {
        let events = self.log.lock().events.clone();
        match events {
            Some(events) => events.emit(event).await,
            None => false,
        }
    }

    pub(crate) fn events(&self) -> Option<EventSender> {
        self.log.lock().events.clone()
    }

    pub(crate) fn connects(&self) -> Vec<Option<SessionCredential>> {
        self.log.lock().connects.clone()
    }

    pub(crate) fn keepalives(&self) -> usize {
        self.log
            .lock()
            .presences
            .iter()
            .filter(|(p, to)| *p == Presence::Available && to.is_none())
            .count()
    }

    pub(crate) fn presences(&self) -> Vec<(Presence, Option<Jid>)> {
        self.log.lock().presences.clone()
    }

    pub(crate) fn sent(&self) -> Vec<(String, String)> {
        self.log
            .lock()
            .sent
            .iter()
            .map(|(jid, text)| (jid.to_string(), text.clone()))
            .collect()
    }

    pub(crate) fn logouts(&self) -> usize {
        self.log.lock().logouts
    }

    pub(crate) fn disconnects(&self) -> usize {
        self.log.lock().disconnects
    }
}

#[async_trait]
impl TransportPort for FakeTransport {
    async fn connect(
        &self,
        credential: Option<SessionCredential>,
        events: EventSender,
    ) -> TransportResult<()> {
        if *self.fail_connect.lock() {
            return Err(TransportError::ConnectionFailed {
                url: "fake://gateway".into(),
                reason: "refused".into(),
            });
        }
        let mut log = self.log.lock();
        log.connects.push(credential);
        log.events = Some(events);
        Ok(())
    }

    async fn send_presence(&self, presence: Presence, to: Option<&Jid>) -> TransportResult<()> {
        self.log.lock().presences.push((presence, to.cloned()));
        Ok(())
    }

    async fn send_text(&self, to: &Jid, text: &str) -> TransportResult<()> {
        if self.failing.lock().contains(to.as_str()) {
            return Err(TransportError::Rejected {
                action: "send_message".into(),
                message: "recipient unavailable".into(),
            });
        }
        self.log.lock().sent.push((to.clone(), text.to_string()));
        Ok(())
    }

    async fn contact_name(&self, jid: &Jid) -> TransportResult<Option<String>> {
        Ok(self.contacts.lock().get(jid.as_str()).cloned())
    }

    async fn logout(&self) -> TransportResult<()> {
        self.log.lock().logouts += 1;
        if *self.fail_logout.lock() {
            return Err(TransportError::ConnectionClosed {
                reason: "connection dropped while waiting for 'logout'".into(),
            });
        }
        Ok(())
    }

    async fn disconnect(&self) {
        self.log.lock().disconnects += 1;
    }
}

#[derive(Default)]
struct BackendLog {
    messages: Vec<InboundMessage>,
    connected: Vec<ConnectedIdentity>,
    qrs: Vec<String>,
}

/// Backend that records calls and answers with a canned reply or error.
#[derive(Default)]
pub(crate) struct RecordingBackend {
    log: Mutex<BackendLog>,
    reply: Mutex<Option<String>>,
    failing: Mutex<bool>,
}

impl RecordingBackend {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn replying(reply: &str) -> Self {
        let backend = Self::default();
        *backend.reply.lock() = Some(reply.to_string());
        backend
    }

    pub(crate) fn failing() -> Self {
        let backend = Self::default();
        *backend.failing.lock() = true;
        backend
    }

    pub(crate) fn messages(&self) -> Vec<InboundMessage> {
        self.log.lock().messages.clone()
    }

    pub(crate) fn connected(&self) -> Vec<ConnectedIdentity> {
        self.log.lock().connected.clone()
    }

    pub(crate) fn qrs(&self) -> Vec<String> {
        self.log.lock().qrs.clone()
    }
}

#[async_trait]
impl BackendPort for RecordingBackend {
    async fn message_received(&self, message: &InboundMessage) -> BackendResult<ClassifierReply> {
        self.log.lock().messages.push(message.clone());
        if *self.failing.lock() {
            return Err(BackendError::Unreachable("connection refused".into()));
        }
        Ok(ClassifierReply {
            reply: self.reply.lock().clone(),
        })
    }

    async fn connected(&self, identity: &ConnectedIdentity) -> BackendResult<()> {
        self.log.lock().connected.push(identity.clone());
        Ok(())
    }

    async fn qr_updated(&self, payload: &str) -> BackendResult<()> {
        self.log.lock().qrs.push(payload.to_string());
        Ok(())
    }
}
