//! Inbound relay: normalize, forward to the backend, answer the sender.

use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use molar_core::{
    BackendPort, InboundMessage, InboundSink, Jid, MessageBatch, OutboundRequest, RawMessage,
    TransportPort, UpsertKind,
};

use crate::config::DEFAULT_FALLBACK_MESSAGE;
use crate::dispatcher::OutboundDispatcher;

/// [`InboundSink`] forwarding live messages to the backend classifier.
///
/// Messages are handled one at a time in delivery order. A backend failure
/// is answered with a fixed fallback reply instead of silence; the message
/// itself is not retried.
pub struct InboundRelay {
    backend: Arc<dyn BackendPort>,
    transport: Arc<dyn TransportPort>,
    dispatcher: Arc<OutboundDispatcher>,
    fallback: String,
}

impl InboundRelay {
    pub fn new(
        backend: Arc<dyn BackendPort>,
        transport: Arc<dyn TransportPort>,
        dispatcher: Arc<OutboundDispatcher>,
    ) -> Self {
        Self {
            backend,
            transport,
            dispatcher,
            fallback: DEFAULT_FALLBACK_MESSAGE.to_string(),
        }
    }

    /// Overrides the reply sent when the backend is unavailable.
    pub fn with_fallback(mut self, fallback: impl Into<String>) -> Self {
        self.fallback = fallback.into();
        self
    }

    async fn relay(&self, raw: &RawMessage) {
        let Some(mut message) = raw.normalize(SystemTime::now()) else {
            debug!(
                id = %raw.key.id,
                from_me = raw.key.from_me,
                "Skipping message without relayable text"
            );
            return;
        };
        message.display_name = Some(self.display_name(raw).await);

        info!(
            from = %message.from_address,
            name = message.display_name.as_deref().unwrap_or_default(),
            id = %message.provider_message_id,
            "Message received"
        );

        let reply = match self.backend.message_received(&message).await {
            Ok(reply) => reply.reply_text().map(str::to_owned),
            Err(e) => {
                warn!(
                    from = %message.from_address,
                    id = %message.provider_message_id,
                    error = %e,
                    "Forwarding to backend failed, sending fallback"
                );
                Some(self.fallback.clone())
            }
        };

        if let Some(text) = reply {
            self.answer(&message, text).await;
        }
    }

    async fn answer(&self, message: &InboundMessage, text: String) {
        let request = OutboundRequest::new(message.from_address.clone(), text);
        if let Err(e) = self.dispatcher.send(&request).await {
            warn!(to = %message.from_address, error = %e, "Reply not delivered");
        }
    }

    /// Contact name from the transport, then the push name, then the address.
    async fn display_name(&self, raw: &RawMessage) -> String {
        if let Ok(jid) = Jid::from_address(&raw.key.remote_jid) {
            match self.transport.contact_name(&jid).await {
                Ok(Some(name)) if !name.trim().is_empty() => return name,
                Ok(_) => {}
                Err(e) => debug!(jid = %jid, error = %e, "Contact lookup failed"),
            }
        }

        raw.push_name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .map(str::to_owned)
            .unwrap_or_else(|| raw.sender_address().to_string())
    }
}

#[async_trait]
impl InboundSink for InboundRelay {
    async fn on_batch(&self, batch: MessageBatch) {
        if batch.kind != UpsertKind::Notify {
            debug!(count = batch.messages.len(), "Ignoring history batch");
            return;
        }
        for raw in &batch.messages {
            self.relay(raw).await;
        }
    }
}
