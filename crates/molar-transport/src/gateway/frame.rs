//! JSON frames exchanged with the multi-device gateway.

use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use molar_core::{
    CloseReason, ConnectedIdentity, MessageBatch, RawMessage, SessionCredential, TransportError,
    TransportEvent, TransportResult, UpsertKind,
};

/// Phase reported by a `connection.update` frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionPhase {
    Connecting,
    Open,
    Close,
}

/// Account the gateway is logged in as.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayUser {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// Body of a `connection.update` frame. Every field is optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConnectionUpdate {
    #[serde(default)]
    pub connection: Option<ConnectionPhase>,
    #[serde(default)]
    pub qr: Option<String>,
    #[serde(default)]
    pub user: Option<GatewayUser>,
    #[serde(default)]
    pub last_disconnect: Option<CloseReason>,
}

impl ConnectionUpdate {
    /// Expands the update into transport events, QR first.
    pub fn into_events(self) -> Vec<TransportEvent> {
        let mut events = Vec::with_capacity(2);
        if let Some(qr) = self.qr.filter(|q| !q.is_empty()) {
            events.push(TransportEvent::Qr(qr));
        }
        match self.connection {
            Some(ConnectionPhase::Connecting) => events.push(TransportEvent::Connecting),
            Some(ConnectionPhase::Open) => {
                let identity = match self.user {
                    Some(user) => ConnectedIdentity::from_raw_id(user.id, user.name),
                    None => ConnectedIdentity::from_raw_id(String::new(), None),
                };
                events.push(TransportEvent::Opened(identity));
            }
            Some(ConnectionPhase::Close) => {
                let reason = self
                    .last_disconnect
                    .unwrap_or_else(|| CloseReason::transient("connection closed"));
                events.push(TransportEvent::Closed(reason));
            }
            None => {}
        }
        events
    }
}

/// Unsolicited events pushed by the gateway.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum GatewayEvent {
    #[serde(rename = "connection.update")]
    ConnectionUpdate(ConnectionUpdate),
    #[serde(rename = "messages.upsert")]
    MessagesUpsert {
        #[serde(default)]
        upsert_type: UpsertKind,
        #[serde(default)]
        messages: Vec<RawMessage>,
    },
    #[serde(rename = "creds.update")]
    CredsUpdate { creds: Value },
}

impl GatewayEvent {
    /// Converts the frame into the events the bridge understands.
    pub fn into_events(self) -> Vec<TransportEvent> {
        match self {
            Self::ConnectionUpdate(update) => update.into_events(),
            Self::MessagesUpsert {
                upsert_type,
                messages,
            } => vec![TransportEvent::Messages(MessageBatch {
                kind: upsert_type,
                messages,
            })],
            Self::CredsUpdate { creds } => {
                vec![TransportEvent::CredentialsUpdated(SessionCredential::new(
                    creds,
                ))]
            }
        }
    }
}

/// A decoded inbound frame.
#[derive(Debug, Clone)]
pub enum Frame {
    /// Reply to a command, carrying its `echo` id.
    Reply(Value),
    /// Unsolicited event.
    Event(GatewayEvent),
    /// Frame type this bridge does not handle.
    Ignored,
}

/// Decodes one text frame.
pub fn parse_frame(text: &str) -> TransportResult<Frame> {
    let value: Value = serde_json::from_str(text)?;
    if value.get("echo").is_some_and(Value::is_u64) {
        return Ok(Frame::Reply(value));
    }

    let kind = value
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    match serde_json::from_value::<GatewayEvent>(value) {
        Ok(event) => Ok(Frame::Event(event)),
        Err(e) => {
            debug!(frame_type = %kind, error = %e, "Ignoring gateway frame");
            Ok(Frame::Ignored)
        }
    }
}

/// Builds a command frame.
pub fn command(action: &str, params: Value, echo: u64) -> Value {
    json!({
        "action": action,
        "params": params,
        "echo": echo,
    })
}

/// Unpacks a command reply into its data or a rejection.
pub fn reply_data(action: &str, reply: Value) -> TransportResult<Value> {
    let ok = reply.get("ok").and_then(Value::as_bool).unwrap_or(false);
    if ok {
        return Ok(reply.get("data").cloned().unwrap_or(Value::Null));
    }
    let message = reply
        .get("error")
        .and_then(Value::as_str)
        .unwrap_or("unknown gateway error")
        .to_string();
    Err(TransportError::Rejected {
        action: action.to_string(),
        message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use molar_core::LOGGED_OUT_STATUS;

    fn events(text: &str) -> Vec<TransportEvent> {
        match parse_frame(text).unwrap() {
            Frame::Event(event) => event.into_events(),
            other => panic!("expected event, got {other:?}"),
        }
    }

    #[test]
    fn test_qr_update() {
        let got = events(r#"{"type":"connection.update","qr":"2@abc"}"#);
        assert_eq!(got, vec![TransportEvent::Qr("2@abc".into())]);
    }

    #[test]
    fn test_open_update_carries_identity() {
        let got = events(
            r#"{"type":"connection.update","connection":"open","user":{"id":"34600111222:4@s.whatsapp.net","name":"Clinica"}}"#,
        );
        let TransportEvent::Opened(identity) = &got[0] else {
            panic!("expected open, got {got:?}");
        };
        assert_eq!(identity.phone_number, "34600111222");
        assert_eq!(identity.name.as_deref(), Some("Clinica"));
    }

    #[test]
    fn test_close_update_keeps_status_code() {
        let got = events(
            r#"{"type":"connection.update","connection":"close","last_disconnect":{"status_code":401,"message":"logged out"}}"#,
        );
        let TransportEvent::Closed(reason) = &got[0] else {
            panic!("expected close, got {got:?}");
        };
        assert_eq!(reason.status_code, Some(LOGGED_OUT_STATUS));
        assert!(reason.is_logged_out());
    }

    #[test]
    fn test_upsert_frame() {
        let got = events(
            r#"{"type":"messages.upsert","upsert_type":"append","messages":[{"key":{"remote_jid":"1@s.whatsapp.net","id":"X"},"message":{"conversation":"hi"}}]}"#,
        );
        let TransportEvent::Messages(batch) = &got[0] else {
            panic!("expected messages, got {got:?}");
        };
        assert_eq!(batch.kind, UpsertKind::Append);
        assert_eq!(batch.messages.len(), 1);
    }

    #[test]
    fn test_reply_and_unknown_frames() {
        assert!(matches!(
            parse_frame(r#"{"echo":7,"ok":true,"data":{"exists":true}}"#).unwrap(),
            Frame::Reply(_)
        ));
        assert!(matches!(
            parse_frame(r#"{"type":"presence.update","id":"x"}"#).unwrap(),
            Frame::Ignored
        ));
        assert!(parse_frame("not json").is_err());
    }

    #[test]
    fn test_reply_data() {
        let ok = reply_data("send_message", json!({"echo":1,"ok":true,"data":{"id":"M"}})).unwrap();
        assert_eq!(ok["id"], "M");

        let err = reply_data("send_message", json!({"echo":2,"ok":false,"error":"bad jid"}))
            .unwrap_err();
        assert!(matches!(err, TransportError::Rejected { message, .. } if message == "bad jid"));
    }
}
