// mock_queue_server: A mock queue HTTP server for testing the client engine.
//
// Serves the status, respond and push-subscribe endpoints on
// http://127.0.0.1:<port> at their default paths. Responses are scripted per
// test: queued one-shot responses are served first, then a sticky default.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use qs_protocol::{NotificationId, NotificationRecord, StatusResponse};
use serde_json::{Value, json};
use tokio::net::TcpListener;

pub const STATUS_ROUTE: &str = "/queueing/api/queue/{entry_uuid}/status/";
pub const RESPOND_ROUTE: &str = "/queueing/api/notification/respond/";
pub const SUBSCRIBE_ROUTE: &str = "/queueing/push/subscribe/";

/// One scripted HTTP response.
#[derive(Debug, Clone)]
pub struct MockResponse {
    pub status: u16,
    pub body: Value,
    /// How long the server holds the request before answering.
    pub delay: Duration,
}

impl MockResponse {
    pub fn ok(body: Value) -> Self {
        Self::with_status(200, body)
    }

    pub fn with_status(status: u16, body: Value) -> Self {
        Self {
            status,
            body,
            delay: Duration::ZERO,
        }
    }

    /// Hold the request for `delay` before answering.
    #[must_use]
    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

struct Endpoint {
    queued: VecDeque<MockResponse>,
    default: MockResponse,
}

impl Endpoint {
    fn new(default: MockResponse) -> Self {
        Self {
            queued: VecDeque::new(),
            default,
        }
    }

    fn next(&mut self) -> MockResponse {
        self.queued
            .pop_front()
            .unwrap_or_else(|| self.default.clone())
    }
}

struct MockState {
    status: Mutex<Endpoint>,
    respond: Mutex<Endpoint>,
    status_hits: AtomicUsize,
    status_entries: Mutex<Vec<String>>,
    respond_bodies: Mutex<Vec<Value>>,
    subscribe_bodies: Mutex<Vec<Value>>,
}

/// A mock queue server for integration testing.
///
/// Binds to port 0 (random). Each test spins up its own instance.
pub struct MockQueueServer {
    addr: SocketAddr,
    state: Arc<MockState>,
    _task: tokio::task::JoinHandle<()>,
}

impl MockQueueServer {
    /// Start the server. By default status reports position 1 with no
    /// notification and respond accepts everything.
    pub async fn start() -> Result<Self, Box<dyn std::error::Error>> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let state = Arc::new(MockState {
            status: Mutex::new(Endpoint::new(MockResponse::ok(status_waiting(1)))),
            respond: Mutex::new(Endpoint::new(MockResponse::ok(
                json!({"success": true, "message": "Response recorded."}),
            ))),
            status_hits: AtomicUsize::new(0),
            status_entries: Mutex::new(Vec::new()),
            respond_bodies: Mutex::new(Vec::new()),
            subscribe_bodies: Mutex::new(Vec::new()),
        });

        let router = Router::new()
            .route(STATUS_ROUTE, get(status_handler))
            .route(RESPOND_ROUTE, post(respond_handler))
            .route(SUBSCRIBE_ROUTE, post(subscribe_handler))
            .with_state(Arc::clone(&state));

        let task = tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });

        Ok(Self {
            addr,
            state,
            _task: task,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Replace the sticky status response.
    pub fn set_status(&self, resp: MockResponse) {
        lock(&self.state.status).default = resp;
    }

    /// Serve `resp` once before falling back to the sticky response.
    pub fn queue_status(&self, resp: MockResponse) {
        lock(&self.state.status).queued.push_back(resp);
    }

    pub fn queue_respond(&self, resp: MockResponse) {
        lock(&self.state.respond).queued.push_back(resp);
    }

    pub fn status_hits(&self) -> usize {
        self.state.status_hits.load(Ordering::SeqCst)
    }

    /// Entry UUIDs seen in status request paths, in order.
    pub fn status_entries(&self) -> Vec<String> {
        lock(&self.state.status_entries).clone()
    }

    pub fn respond_bodies(&self) -> Vec<Value> {
        lock(&self.state.respond_bodies).clone()
    }

    pub fn subscribe_bodies(&self) -> Vec<Value> {
        lock(&self.state.subscribe_bodies).clone()
    }

    /// Poll until at least `n` status requests arrived. False on timeout.
    pub async fn wait_for_status_hits(&self, n: usize, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.status_hits() >= n {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

async fn into_response(resp: MockResponse) -> Response {
    if !resp.delay.is_zero() {
        tokio::time::sleep(resp.delay).await;
    }
    let status = StatusCode::from_u16(resp.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(resp.body)).into_response()
}

async fn status_handler(
    State(state): State<Arc<MockState>>,
    Path(entry_uuid): Path<String>,
) -> Response {
    state.status_hits.fetch_add(1, Ordering::SeqCst);
    lock(&state.status_entries).push(entry_uuid);
    let resp = lock(&state.status).next();
    into_response(resp).await
}

async fn respond_handler(State(state): State<Arc<MockState>>, Json(body): Json<Value>) -> Response {
    lock(&state.respond_bodies).push(body);
    let resp = lock(&state.respond).next();
    into_response(resp).await
}

async fn subscribe_handler(
    State(state): State<Arc<MockState>>,
    Json(body): Json<Value>,
) -> Response {
    lock(&state.subscribe_bodies).push(body);
    into_response(MockResponse::ok(json!({"success": true}))).await
}

// ---------------------------------------------------------------------------
// Body builders
// ---------------------------------------------------------------------------

fn base_status(position: u32) -> StatusResponse {
    StatusResponse {
        success: true,
        position: Some(position),
        has_notification: false,
        notification: None,
        status: Some("Waiting".to_owned()),
        status_code: Some("waiting".to_owned()),
        total_waiting: Some(position + 4),
        last_updated: Some("2026-03-02T08:15:30+00:00".to_owned()),
        error: None,
    }
}

/// A successful status body with no pending notification.
pub fn status_waiting(position: u32) -> Value {
    serde_json::to_value(base_status(position)).unwrap_or(Value::Null)
}

/// A successful status body with a pending notification `id`.
pub fn status_with_notification(id: &str, is_expired: bool) -> Value {
    let mut status = base_status(1);
    status.has_notification = true;
    status.status = Some("Notified".to_owned());
    status.status_code = Some("notified".to_owned());
    status.notification = Some(NotificationRecord {
        id: NotificationId::new(id),
        notification_time: Some("2026-03-02T08:15:02+00:00".to_owned()),
        is_expired,
        is_cascade: false,
    });
    serde_json::to_value(status).unwrap_or(Value::Null)
}

/// A status body the server flags as unsuccessful.
pub fn status_failure(error: &str) -> Value {
    json!({"success": false, "error": error})
}
