// Fake monitoring backend: the REST envelope endpoints plus a `/ws` stream,
// served over a real socket so the reqwest and tungstenite clients can reach it.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use axum_test::TestServer;
use serde::Deserialize;
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use telemetry_feed::models::{AnomalyEvent, Snapshot};
use tokio::sync::broadcast;

#[derive(Clone)]
pub struct Backend {
    pub current: Arc<Mutex<Option<Snapshot>>>,
    /// Oldest first; served newest first.
    pub history: Arc<Mutex<Vec<Snapshot>>>,
    /// Oldest first; served newest first.
    pub anomalies: Arc<Mutex<Vec<AnomalyEvent>>>,
    /// When set, every `/api` route answers 500.
    pub failing: Arc<AtomicBool>,
    /// Text frames pushed to every connected stream client.
    pub frames: broadcast::Sender<String>,
    /// Text frames received from stream clients.
    pub received: Arc<Mutex<Vec<String>>>,
    /// `limit` query values seen, in request order.
    pub limits: Arc<Mutex<Vec<Option<usize>>>>,
}

impl Backend {
    pub fn new() -> Self {
        let (frames, _) = broadcast::channel(256);
        Self {
            current: Arc::default(),
            history: Arc::default(),
            anomalies: Arc::default(),
            failing: Arc::default(),
            frames,
            received: Arc::default(),
            limits: Arc::default(),
        }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/health", get(|| async { "OK" }))
            .route("/api/v1/metrics/current", get(current))
            .route("/api/v1/metrics/history", get(history))
            .route("/api/v1/anomalies", get(anomalies))
            .route("/ws", get(ws_handler))
            .with_state(self.clone())
    }

    /// Serve on a real port; returns the server (keep it alive) and its `http://host:port` base.
    pub fn serve(&self) -> (TestServer, String) {
        let server = TestServer::builder()
            .http_transport()
            .build(self.router());
        let base = server
            .server_address()
            .expect("http transport has an address")
            .as_str()
            .trim_end_matches('/')
            .to_string();
        (server, base)
    }

    pub fn broadcast(&self, frame: impl Into<String>) {
        let _ = self.frames.send(frame.into());
    }
}

#[derive(Deserialize)]
struct LimitParams {
    limit: Option<usize>,
}

fn failure() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({"status": "error", "message": "database unavailable"})),
    )
        .into_response()
}

async fn current(State(b): State<Backend>) -> Response {
    if b.failing.load(Ordering::SeqCst) {
        return failure();
    }
    match b.current.lock().unwrap().clone() {
        Some(snapshot) => Json(json!({"status": "success", "data": snapshot})).into_response(),
        None => Json(json!({
            "status": "success",
            "data": null,
            "message": "No metrics collected yet"
        }))
        .into_response(),
    }
}

async fn history(State(b): State<Backend>, Query(params): Query<LimitParams>) -> Response {
    if b.failing.load(Ordering::SeqCst) {
        return failure();
    }
    b.limits.lock().unwrap().push(params.limit);
    let limit = params.limit.unwrap_or(60);
    let metrics: Vec<Snapshot> = b.history.lock().unwrap().iter().rev().take(limit).cloned().collect();
    let count = metrics.len();
    Json(json!({"status": "success", "data": {"metrics": metrics, "count": count}})).into_response()
}

async fn anomalies(State(b): State<Backend>, Query(params): Query<LimitParams>) -> Response {
    if b.failing.load(Ordering::SeqCst) {
        return failure();
    }
    b.limits.lock().unwrap().push(params.limit);
    let limit = params.limit.unwrap_or(50);
    let anomalies: Vec<AnomalyEvent> =
        b.anomalies.lock().unwrap().iter().rev().take(limit).cloned().collect();
    let count = anomalies.len();
    Json(json!({"status": "success", "data": {"anomalies": anomalies, "count": count}}))
        .into_response()
}

async fn ws_handler(ws: WebSocketUpgrade, State(b): State<Backend>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| stream_client(socket, b))
}

async fn stream_client(mut socket: WebSocket, backend: Backend) {
    let mut frames = backend.frames.subscribe();
    let greeting = r#"{"type":"connected","data":"Connected to telemetry stream"}"#;
    if socket.send(Message::Text(greeting.into())).await.is_err() {
        return;
    }
    loop {
        tokio::select! {
            frame = frames.recv() => match frame {
                Ok(text) => {
                    if socket.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            },
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    backend.received.lock().unwrap().push(text.as_str().to_string());
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }
}
