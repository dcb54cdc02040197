//! HTTP client for the backend classifier/responder.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, ClientBuilder, Response};
use serde_json::{Value, json};
use tracing::{debug, trace};

use molar_core::{
    BackendError, BackendPort, BackendResult, ClassifierReply, ConnectedIdentity, InboundMessage,
};

/// Longest response body kept in a [`BackendError::Status`].
const MAX_ERROR_BODY: usize = 512;

/// Where the backend lives.
#[derive(Debug, Clone)]
pub struct HttpBackendConfig {
    /// Base URL (`http://localhost:8001`).
    pub base_url: String,
    /// Path prefix of the bridge endpoints.
    pub path_prefix: String,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl Default for HttpBackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8001".to_string(),
            path_prefix: "/api/whatsapp".to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// [`BackendPort`] that POSTs JSON to the backend.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    config: HttpBackendConfig,
}

impl HttpBackend {
    pub fn new(config: HttpBackendConfig) -> BackendResult<Self> {
        let client = ClientBuilder::new()
            .timeout(config.timeout)
            .build()
            .map_err(|e| BackendError::Unreachable(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    /// Full URL of a bridge endpoint.
    pub fn endpoint(&self, name: &str) -> String {
        format!(
            "{}/{}/{}",
            self.config.base_url.trim_end_matches('/'),
            self.config.path_prefix.trim_matches('/'),
            name
        )
    }

    async fn post(
        &self,
        name: &str,
        body: &Value,
        idempotency_key: Option<&str>,
    ) -> BackendResult<Response> {
        let url = self.endpoint(name);
        trace!(url = %url, "Posting to backend");

        let mut request = self.client.post(&url).json(body);
        if let Some(key) = idempotency_key {
            request = request.header("Idempotency-Key", key);
        }
        let response = request
            .send()
            .await
            .map_err(|e| BackendError::Unreachable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let mut text = response.text().await.unwrap_or_default();
            truncate(&mut text, MAX_ERROR_BODY);
            return Err(BackendError::Status {
                status: status.as_u16(),
                body: text,
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl BackendPort for HttpBackend {
    async fn message_received(&self, message: &InboundMessage) -> BackendResult<ClassifierReply> {
        let body = message_body(message);
        let response = self
            .post(
                "message-received",
                &body,
                Some(message.provider_message_id.as_str()).filter(|id| !id.is_empty()),
            )
            .await?;

        let bytes = response
            .bytes()
            .await
            .map_err(|e| BackendError::InvalidReply(e.to_string()))?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(ClassifierReply::default());
        }
        let reply: ClassifierReply = serde_json::from_slice(&bytes)
            .map_err(|e| BackendError::InvalidReply(e.to_string()))?;
        debug!(
            message_id = %message.provider_message_id,
            has_reply = reply.reply_text().is_some(),
            "Backend classified message"
        );
        Ok(reply)
    }

    async fn connected(&self, identity: &ConnectedIdentity) -> BackendResult<()> {
        let body = json!({
            "user": { "id": identity.raw_id, "name": identity.name },
            "phone": identity.phone_number,
        });
        self.post("connected", &body, None).await?;
        Ok(())
    }

    async fn qr_updated(&self, payload: &str) -> BackendResult<()> {
        self.post("qr-updated", &json!({ "qr": payload }), None)
            .await?;
        Ok(())
    }
}

/// Wire body of a `message-received` call.
pub fn message_body(message: &InboundMessage) -> Value {
    json!({
        "phone_number": message.from_address,
        "contact_name": message.display_name.as_deref().unwrap_or(&message.from_address),
        "message": message.text,
        "message_id": message.provider_message_id,
        "timestamp": message.timestamp_epoch,
    })
}

fn truncate(text: &mut String, max: usize) {
    if text.len() <= max {
        return;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text.truncate(end);
}
