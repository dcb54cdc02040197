//! WebSocket client for the multi-device gateway.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};
use tracing::{debug, info, trace, warn};

use molar_core::{
    CloseReason, EventSender, Jid, Presence, SessionCredential, TransportError, TransportEvent,
    TransportPort, TransportResult,
};

use super::caller::GatewayCaller;
use super::frame::{Frame, parse_frame};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

/// Where and how to reach the gateway.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// WebSocket URL (`ws://127.0.0.1:8085/ws`).
    pub url: String,
    /// Bearer token sent on the upgrade request.
    pub access_token: Option<String>,
    /// Upper bound for every command round trip.
    pub request_timeout: Duration,
    /// Device descriptor shown in the phone's linked devices list.
    pub browser: Vec<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:8085/ws".to_string(),
            access_token: None,
            request_timeout: Duration::from_secs(30),
            browser: vec!["DenApp Control".into(), "Chrome".into(), "1.0.0".into()],
        }
    }
}

struct Connection {
    caller: Arc<GatewayCaller>,
    shutdown: watch::Sender<bool>,
}

/// [`TransportPort`] backed by a gateway WebSocket.
///
/// Holds at most one connection. Every [`connect`](TransportPort::connect)
/// tears the previous one down before dialing again; reconnect policy is
/// left to the caller.
pub struct WsGateway {
    config: GatewayConfig,
    current: Mutex<Option<Connection>>,
}

impl WsGateway {
    pub fn new(config: GatewayConfig) -> Self {
        Self {
            config,
            current: Mutex::new(None),
        }
    }

    fn caller(&self) -> TransportResult<Arc<GatewayCaller>> {
        self.current
            .lock()
            .as_ref()
            .map(|c| c.caller.clone())
            .ok_or(TransportError::NotConnected)
    }

    fn teardown(&self) {
        if let Some(conn) = self.current.lock().take() {
            let _ = conn.shutdown.send(true);
            conn.caller.on_disconnect();
        }
    }

    async fn dial(&self) -> TransportResult<WsStream> {
        let url = self.config.url.clone();
        let mut request =
            url.as_str()
                .into_client_request()
                .map_err(|e| TransportError::ConnectionFailed {
                    url: url.clone(),
                    reason: e.to_string(),
                })?;
        if let Some(token) = &self.config.access_token {
            let value = HeaderValue::from_str(&format!("Bearer {token}")).map_err(|e| {
                TransportError::ConnectionFailed {
                    url: url.clone(),
                    reason: format!("invalid access token: {e}"),
                }
            })?;
            request.headers_mut().insert("Authorization", value);
        }

        let (stream, _response) =
            connect_async(request)
                .await
                .map_err(|e| TransportError::ConnectionFailed {
                    url: url.clone(),
                    reason: format!("WebSocket connection failed: {e}"),
                })?;
        Ok(stream)
    }
}

#[async_trait]
impl TransportPort for WsGateway {
    async fn connect(
        &self,
        credential: Option<SessionCredential>,
        events: EventSender,
    ) -> TransportResult<()> {
        self.teardown();

        info!(url = %self.config.url, epoch = events.epoch(), "Connecting to gateway");
        let stream = self.dial().await?;
        let (ws_tx, ws_rx) = stream.split();

        let (out_tx, out_rx) = mpsc::channel::<String>(256);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let caller = Arc::new(GatewayCaller::new(out_tx, self.config.request_timeout));

        tokio::spawn(run_connection_loop(
            ws_tx,
            ws_rx,
            out_rx,
            shutdown_rx,
            caller.clone(),
            events,
        ));

        *self.current.lock() = Some(Connection {
            caller: caller.clone(),
            shutdown: shutdown_tx,
        });

        let params = json!({
            "credentials": credential.map(SessionCredential::into_value),
            "browser": self.config.browser,
        });
        if let Err(e) = caller.call("init", params).await {
            self.teardown();
            return Err(e);
        }

        debug!("Gateway session initialized");
        Ok(())
    }

    async fn send_presence(&self, presence: Presence, to: Option<&Jid>) -> TransportResult<()> {
        let params = json!({
            "presence": presence,
            "jid": to.map(Jid::as_str),
        });
        self.caller()?.call("send_presence", params).await?;
        Ok(())
    }

    async fn send_text(&self, to: &Jid, text: &str) -> TransportResult<()> {
        let params = json!({
            "jid": to.as_str(),
            "content": { "text": text },
        });
        self.caller()?.call("send_message", params).await?;
        Ok(())
    }

    async fn contact_name(&self, jid: &Jid) -> TransportResult<Option<String>> {
        let data = self
            .caller()?
            .call("on_whatsapp", json!({ "jid": jid.as_str() }))
            .await?;
        let name = data
            .as_array()
            .and_then(|found| found.first())
            .and_then(|contact| contact.get("name"))
            .and_then(Value::as_str)
            .filter(|n| !n.is_empty())
            .map(str::to_string);
        Ok(name)
    }

    async fn logout(&self) -> TransportResult<()> {
        let result = self.caller()?.call("logout", Value::Null).await;
        self.teardown();
        result.map(|_| ())
    }

    async fn disconnect(&self) {
        self.teardown();
    }
}

/// Pumps one socket until it closes or is torn down.
async fn run_connection_loop(
    mut ws_tx: WsSink,
    mut ws_rx: WsSource,
    mut out_rx: mpsc::Receiver<String>,
    mut shutdown_rx: watch::Receiver<bool>,
    caller: Arc<GatewayCaller>,
    events: EventSender,
) {
    let epoch = events.epoch();
    let mut detached = false;
    let reason = loop {
        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    debug!(epoch = epoch, "Gateway connection torn down");
                    let _ = ws_tx.close().await;
                    caller.on_disconnect();
                    return;
                }
            }

            Some(frame) = out_rx.recv() => {
                if let Err(e) = ws_tx.send(Message::Text(frame.into())).await {
                    warn!(epoch = epoch, error = %e, "Failed to write gateway frame");
                }
            }

            msg = ws_rx.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    trace!(epoch = epoch, len = text.len(), "Received gateway frame");
                    match parse_frame(&text) {
                        Ok(Frame::Reply(reply)) => {
                            caller.on_reply(reply);
                        }
                        Ok(Frame::Event(_)) if detached => {
                            trace!(epoch = epoch, "Dropping gateway event, receiver gone");
                        }
                        Ok(Frame::Event(event)) => {
                            for event in event.into_events() {
                                if !events.emit(event).await {
                                    // Commands in flight (a shutdown logout) still need replies.
                                    debug!(epoch = epoch, "Event receiver gone, dropping further events");
                                    detached = true;
                                    break;
                                }
                            }
                        }
                        Ok(Frame::Ignored) => {}
                        Err(e) => warn!(epoch = epoch, error = %e, "Malformed gateway frame"),
                    }
                }
                Some(Ok(Message::Ping(data))) => {
                    trace!(epoch = epoch, "Received ping, sending pong");
                    let _ = ws_tx.send(Message::Pong(data)).await;
                }
                Some(Ok(Message::Close(frame))) => {
                    let message = frame
                        .map(|f| f.reason.to_string())
                        .filter(|r| !r.is_empty())
                        .unwrap_or_else(|| "gateway closed the connection".to_string());
                    break message;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => break format!("WebSocket error: {e}"),
                None => break "gateway stream ended".to_string(),
            }
        }
    };

    info!(epoch = epoch, reason = %reason, "Gateway connection lost");
    caller.on_disconnect();
    if !detached {
        events
            .emit(TransportEvent::Closed(CloseReason::transient(reason)))
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use molar_core::{Input, LOGGED_OUT_STATUS};
    use tokio::net::TcpListener;
    use tokio::time::timeout;
    use tokio_tungstenite::accept_hdr_async;
    use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};

    type ServerWs = WebSocketStream<TcpStream>;

    const WAIT: Duration = Duration::from_secs(2);

    async fn bind() -> (TcpListener, String) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}/ws", listener.local_addr().unwrap());
        (listener, url)
    }

    fn gateway(url: String, access_token: Option<&str>) -> WsGateway {
        WsGateway::new(GatewayConfig {
            url,
            access_token: access_token.map(str::to_string),
            request_timeout: WAIT,
            ..Default::default()
        })
    }

    /// Accepts one client and returns its `Authorization` header.
    async fn accept(listener: &TcpListener) -> (ServerWs, Option<String>) {
        let (stream, _) = listener.accept().await.unwrap();
        let mut auth = None;
        let ws = accept_hdr_async(stream, |req: &Request, resp: Response| {
            auth = req
                .headers()
                .get("Authorization")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            Ok::<_, ErrorResponse>(resp)
        })
        .await
        .unwrap();
        (ws, auth)
    }

    async fn next_command(ws: &mut ServerWs) -> Value {
        loop {
            match ws.next().await {
                Some(Ok(Message::Text(text))) => return serde_json::from_str(&text).unwrap(),
                Some(Ok(_)) => continue,
                other => panic!("client went away: {other:?}"),
            }
        }
    }

    async fn expect_command(ws: &mut ServerWs, action: &str) -> u64 {
        let frame = next_command(ws).await;
        assert_eq!(frame["action"], action);
        frame["echo"].as_u64().unwrap()
    }

    async fn push(ws: &mut ServerWs, frame: Value) {
        ws.send(Message::Text(frame.to_string().into())).await.unwrap();
    }

    fn ack(echo: u64) -> Value {
        json!({ "echo": echo, "ok": true, "data": null })
    }

    /// Accepts the client and acknowledges its `init`.
    async fn handshake(listener: TcpListener) -> (ServerWs, Option<String>, Value) {
        let (mut ws, auth) = accept(&listener).await;
        let init = next_command(&mut ws).await;
        assert_eq!(init["action"], "init");
        push(&mut ws, ack(init["echo"].as_u64().unwrap())).await;
        (ws, auth, init)
    }

    fn channel() -> (EventSender, mpsc::Receiver<Input>) {
        let (tx, rx) = mpsc::channel(16);
        (EventSender::new(1, tx), rx)
    }

    async fn next_event(rx: &mut mpsc::Receiver<Input>) -> TransportEvent {
        match timeout(WAIT, rx.recv()).await {
            Ok(Some(Input::Transport { epoch: 1, event })) => event,
            other => panic!("expected a transport event, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_connect_sends_token_and_credentials() {
        let (listener, url) = bind().await;
        let server = tokio::spawn(handshake(listener));
        let gateway = gateway(url, Some("s3cret"));
        let (events, _rx) = channel();

        gateway
            .connect(Some(SessionCredential::new(json!({"me": "x"}))), events)
            .await
            .unwrap();

        let (_ws, auth, init) = server.await.unwrap();
        assert_eq!(auth.as_deref(), Some("Bearer s3cret"));
        assert_eq!(init["params"]["credentials"], json!({"me": "x"}));
        assert_eq!(init["params"]["browser"][0], "DenApp Control");
    }

    #[tokio::test]
    async fn test_events_then_transient_close_on_socket_end() {
        let (listener, url) = bind().await;
        let server = tokio::spawn(handshake(listener));
        let gateway = gateway(url, None);
        let (events, mut rx) = channel();
        gateway.connect(None, events).await.unwrap();
        let (mut ws, auth, _) = server.await.unwrap();
        assert!(auth.is_none());

        push(&mut ws, json!({"type": "connection.update", "qr": "2@abc"})).await;
        ws.close(None).await.unwrap();

        assert_eq!(next_event(&mut rx).await, TransportEvent::Qr("2@abc".into()));
        let TransportEvent::Closed(reason) = next_event(&mut rx).await else {
            panic!("expected a close");
        };
        assert!(!reason.is_logged_out());
    }

    #[tokio::test]
    async fn test_disconnect_emits_no_close() {
        let (listener, url) = bind().await;
        let server = tokio::spawn(handshake(listener));
        let gateway = gateway(url, None);
        let (events, mut rx) = channel();
        gateway.connect(None, events).await.unwrap();
        let (mut ws, _, _) = server.await.unwrap();

        gateway.disconnect().await;

        // The server sees the socket go away.
        let closed = timeout(WAIT, async {
            loop {
                match ws.next().await {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => {}
                }
            }
        })
        .await;
        assert!(closed.is_ok());

        match timeout(Duration::from_millis(300), rx.recv()).await {
            Ok(Some(input)) => panic!("unexpected event after teardown: {input:?}"),
            Ok(None) | Err(_) => {}
        }
        let jid = Jid::from_address("34600111222").unwrap();
        assert!(matches!(
            gateway.send_text(&jid, "hola").await,
            Err(TransportError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_rejected_init_tears_down() {
        let (listener, url) = bind().await;
        let server = tokio::spawn(async move {
            let (mut ws, _) = accept(&listener).await;
            let echo = expect_command(&mut ws, "init").await;
            push(
                &mut ws,
                json!({ "echo": echo, "ok": false, "error": "bad credentials" }),
            )
            .await;
            ws
        });
        let gateway = gateway(url, None);
        let (events, _rx) = channel();

        let err = gateway.connect(None, events).await.unwrap_err();
        let _ws = server.await.unwrap();

        assert!(matches!(err, TransportError::Rejected { message, .. } if message == "bad credentials"));
        assert!(matches!(
            gateway.send_presence(Presence::Available, None).await,
            Err(TransportError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_logout_acknowledged_after_receiver_dropped() {
        let (listener, url) = bind().await;
        let server = tokio::spawn(async move {
            let (mut ws, _, _) = handshake(listener).await;
            let echo = expect_command(&mut ws, "logout").await;
            push(
                &mut ws,
                json!({
                    "type": "connection.update",
                    "connection": "close",
                    "last_disconnect": {"status_code": LOGGED_OUT_STATUS, "message": "logged out"}
                }),
            )
            .await;
            push(&mut ws, json!({"type": "creds.update", "creds": {"me": null}})).await;
            push(&mut ws, ack(echo)).await;
            ws
        });
        let gateway = gateway(url, None);
        let (events, rx) = channel();
        gateway.connect(None, events).await.unwrap();

        drop(rx);
        let result = gateway.logout().await;
        let _ws = server.await.unwrap();

        assert!(result.is_ok(), "logout failed: {result:?}");
    }
}
