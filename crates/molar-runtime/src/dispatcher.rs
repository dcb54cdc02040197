//! Outbound dispatcher: connection precondition, typing simulation, bulk pacing.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, info, warn};

use molar_core::{
    BulkReport, Jid, OutboundRequest, Presence, Recipient, SendError, SendResult, TransportPort,
};

use crate::config::DispatchConfig;
use crate::view::SessionView;

/// Characters of message text included in logs.
const LOG_PREVIEW_CHARS: usize = 50;

/// Pacing applied to outbound sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchSettings {
    /// Pause between the composing indicator and the text.
    pub typing_delay: Duration,
    /// Pause between consecutive recipients of a bulk send.
    pub bulk_interval: Duration,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self::from(&DispatchConfig::default())
    }
}

impl From<&DispatchConfig> for DispatchSettings {
    fn from(config: &DispatchConfig) -> Self {
        Self {
            typing_delay: Duration::from_millis(config.typing_delay_ms),
            bulk_interval: Duration::from_millis(config.bulk_interval_ms),
        }
    }
}

/// Turns send requests into transport calls.
pub struct OutboundDispatcher {
    transport: Arc<dyn TransportPort>,
    view: SessionView,
    settings: DispatchSettings,
}

impl OutboundDispatcher {
    pub fn new(
        transport: Arc<dyn TransportPort>,
        view: SessionView,
        settings: DispatchSettings,
    ) -> Self {
        Self {
            transport,
            view,
            settings,
        }
    }

    /// Sends one message.
    ///
    /// Fails with [`SendError::NotConnected`] without touching the transport
    /// unless the session is connected at call time.
    pub async fn send(&self, request: &OutboundRequest) -> SendResult<()> {
        if !self.view.is_connected() {
            debug!(to = %request.to_address, "Send refused, not connected");
            return Err(SendError::NotConnected);
        }
        let jid = Jid::from_address(&request.to_address)?;

        if request.simulate_typing {
            self.transport
                .send_presence(Presence::Composing, Some(&jid))
                .await?;
            sleep(self.settings.typing_delay).await;
        }

        self.transport.send_text(&jid, &request.text).await?;
        info!(to = %jid, text = %preview(&request.text), "Message sent");
        Ok(())
    }

    /// Sends `text` to each recipient in order, pausing between them.
    ///
    /// A failing recipient is recorded and the batch continues.
    pub async fn send_bulk(&self, recipients: &[Recipient], text: &str) -> BulkReport {
        let mut report = BulkReport::with_capacity(recipients.len());
        info!(total = recipients.len(), "Bulk send started");

        for (index, recipient) in recipients.iter().enumerate() {
            if index > 0 {
                sleep(self.settings.bulk_interval).await;
            }

            let request = OutboundRequest::new(recipient.phone_number.clone(), text);
            let result = self.send(&request).await;
            if let Err(e) = &result {
                warn!(to = %recipient.phone_number, error = %e, "Bulk send item failed");
            }
            report.record(recipient, &result);
        }

        info!(
            total = report.total,
            sent = report.sent,
            failed = report.failed,
            "Bulk send finished"
        );
        report
    }
}

fn preview(text: &str) -> String {
    match text.char_indices().nth(LOG_PREVIEW_CHARS) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}
