//! HTTP facade over the bridge.
//!
//! | Method | Path | Result |
//! |--------|------|--------|
//! | GET | `/status` | connection state, identity, server timestamp |
//! | GET | `/qr` | live pairing challenge or nulls |
//! | POST | `/send` | single-send report |
//! | POST | `/send-bulk` | bulk report |
//! | POST | `/reinit` | starts a fresh session |
//! | GET | `/health` | liveness, uptime, connection state |

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use molar_core::{
    BulkReport, ConnectedIdentity, ConnectionState, OutboundRequest, Recipient, SendError,
    SendReport, SendResult, SessionSnapshot, TransportError, TransportResult,
};

/// Service name reported by `/health`.
pub const SERVICE_NAME: &str = "molar";

/// What the facade needs from the rest of the bridge.
#[async_trait]
pub trait BridgeApi: Send + Sync + 'static {
    /// Current session view.
    fn snapshot(&self) -> SessionSnapshot;

    /// Time since the process started.
    fn uptime(&self) -> Duration;

    /// Sends one message.
    async fn send(&self, request: OutboundRequest) -> SendResult<()>;

    /// Sends `text` to every recipient in order.
    async fn send_bulk(&self, recipients: Vec<Recipient>, text: String) -> BulkReport;

    /// Requests a fresh session. Returns `false` if the bridge is shutting down.
    async fn reinit(&self) -> bool;
}

type SharedApi = Arc<dyn BridgeApi>;

/// Builds the facade router.
pub fn router(api: SharedApi) -> Router {
    Router::new()
        .route("/status", get(status))
        .route("/qr", get(qr))
        .route("/send", post(send))
        .route("/send-bulk", post(send_bulk))
        .route("/reinit", post(reinit))
        .route("/health", get(health))
        .with_state(api)
}

/// A running facade server.
pub struct FacadeHandle {
    local_addr: SocketAddr,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl FacadeHandle {
    /// Address the server is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stops accepting requests and waits for the server task.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(());
        let _ = self.task.await;
    }
}

/// Binds `addr` and serves the facade in a background task.
pub async fn serve(addr: &str, api: SharedApi) -> TransportResult<FacadeHandle> {
    let bind_error = |e: std::io::Error| TransportError::ConnectionFailed {
        url: addr.to_string(),
        reason: e.to_string(),
    };
    let listener = TcpListener::bind(addr).await.map_err(bind_error)?;
    let local_addr = listener.local_addr().map_err(bind_error)?;

    info!(addr = %local_addr, "HTTP facade listening");

    let app = router(api);
    let (shutdown_tx, mut shutdown_rx) = oneshot::channel();
    let task = tokio::spawn(async move {
        let server = axum::serve(listener, app);
        tokio::select! {
            result = server => {
                if let Err(e) = result {
                    error!(error = %e, "HTTP facade error");
                }
            }
            _ = &mut shutdown_rx => {
                info!("HTTP facade shutting down");
            }
        }
    });

    Ok(FacadeHandle {
        local_addr,
        shutdown: shutdown_tx,
        task,
    })
}

// =============================================================================
// Wire types
// =============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: ConnectionState,
    pub connected: bool,
    pub user: Option<ConnectedIdentity>,
    pub phone: Option<String>,
    pub last_error: Option<String>,
    pub timestamp: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct QrResponse {
    pub qr: Option<String>,
    pub expires_at: Option<u64>,
    pub status: ConnectionState,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub uptime_secs: f64,
    pub whatsapp_status: ConnectionState,
    pub last_error: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct SendBody {
    #[serde(default, alias = "to_address")]
    phone_number: Option<String>,
    #[serde(default, alias = "text")]
    message: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct BulkBody {
    #[serde(default)]
    recipients: Option<Vec<Recipient>>,
    #[serde(default, alias = "text")]
    message: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BulkResponse {
    pub success: bool,
    #[serde(flatten)]
    pub report: BulkReport,
}

// =============================================================================
// Handlers
// =============================================================================

fn bad_request(message: &str) -> Response {
    let report = SendReport {
        success: false,
        error: Some(message.to_string()),
    };
    (StatusCode::BAD_REQUEST, Json(report)).into_response()
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_default()
}

async fn status(State(api): State<SharedApi>) -> Json<StatusResponse> {
    let snapshot = api.snapshot();
    Json(StatusResponse {
        status: snapshot.state,
        connected: snapshot.is_connected(),
        phone: snapshot.identity.as_ref().map(|i| i.phone_number.clone()),
        user: snapshot.identity,
        last_error: snapshot.last_error,
        timestamp: now_rfc3339(),
    })
}

async fn qr(State(api): State<SharedApi>) -> Json<QrResponse> {
    let snapshot = api.snapshot();
    let live = snapshot.live_qr(SystemTime::now());
    Json(QrResponse {
        qr: live.map(|q| q.payload.clone()),
        expires_at: live.map(|q| q.expires_at_millis()),
        status: snapshot.state,
    })
}

async fn send(
    State(api): State<SharedApi>,
    body: Result<Json<SendBody>, JsonRejection>,
) -> Response {
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => return bad_request(&rejection.body_text()),
    };
    let (Some(to), Some(text)) = (non_empty(body.phone_number), non_empty(body.message)) else {
        return bad_request("phone_number and message are required");
    };

    debug!(to = %to, "Send requested");
    let result = api.send(OutboundRequest::new(to, text)).await;
    let code = match &result {
        Err(SendError::NotConnected) => StatusCode::CONFLICT,
        _ => StatusCode::OK,
    };
    (code, Json(SendReport::from(&result))).into_response()
}

async fn send_bulk(
    State(api): State<SharedApi>,
    body: Result<Json<BulkBody>, JsonRejection>,
) -> Response {
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => return bad_request(&rejection.body_text()),
    };
    let (Some(recipients), Some(text)) = (body.recipients, non_empty(body.message)) else {
        return bad_request("recipients (array) and message are required");
    };

    debug!(count = recipients.len(), "Bulk send requested");
    let report = api.send_bulk(recipients, text).await;
    Json(BulkResponse {
        success: true,
        report,
    })
    .into_response()
}

async fn reinit(State(api): State<SharedApi>) -> Response {
    if api.reinit().await {
        (
            StatusCode::ACCEPTED,
            Json(serde_json::json!({ "success": true, "status": ConnectionState::Connecting })),
        )
            .into_response()
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(SendReport {
                success: false,
                error: Some("bridge is shutting down".to_string()),
            }),
        )
            .into_response()
    }
}

async fn health(State(api): State<SharedApi>) -> Json<HealthResponse> {
    let snapshot = api.snapshot();
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: SERVICE_NAME.to_string(),
        uptime_secs: api.uptime().as_secs_f64(),
        whatsapp_status: snapshot.state,
        last_error: snapshot.last_error,
    })
}
