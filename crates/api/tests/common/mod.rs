#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::extract::ws::Message;
use axum::http::{Request, StatusCode};
use axum::response::Response;
use axum::Router;
use http_body_util::BodyExt;
use tokio::sync::mpsc;
use tower::ServiceExt;

use latchkey_api::config::{RelayConfig, ScheduleConfig, ServerConfig};
use latchkey_api::router::build_app_router;
use latchkey_api::state::AppState;
use latchkey_api::ws::WsConnection;
use latchkey_core::protocol::OutboundFrame;
use latchkey_core::registry::{DeviceRegistry, RegistryError};
use latchkey_core::schedule::{ScheduleEntry, ScheduleSlot};
use latchkey_core::types::{DeviceId, OwnerId};
use latchkey_db::InMemoryRegistry;

/// Build a test `ServerConfig` with safe defaults and no database.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:8081".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 5,
        database_url: None,
        relay: RelayConfig::default(),
        schedule: ScheduleConfig::default(),
    }
}

pub fn test_state(registry: Arc<dyn DeviceRegistry>) -> AppState {
    AppState::new(test_config(), registry)
}

/// Build the full application router backed by an in-memory registry.
///
/// Uses the same middleware stack as `main.rs`.
pub fn build_test_app() -> (Router, AppState) {
    let state = test_state(Arc::new(InMemoryRegistry::new()));
    let app = build_app_router(state.clone(), &test_config());
    (app, state)
}

pub async fn get(app: Router, uri: &str) -> Response {
    app.oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

pub async fn body_json(response: Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

pub fn assert_status(response: &Response, expected: StatusCode) {
    assert_eq!(response.status(), expected, "unexpected status");
}

// ---------------------------------------------------------------------------
// Connections without sockets
// ---------------------------------------------------------------------------

/// A connection handle plus the queue its frames land in.
pub struct Peer {
    pub conn: Arc<WsConnection>,
    pub rx: mpsc::Receiver<Message>,
}

impl Peer {
    pub fn new(id: &str) -> Self {
        let (conn, rx) = WsConnection::new(id, 64);
        Self { conn, rx }
    }

    pub fn with_buffer(id: &str, buffer: usize) -> Self {
        let (conn, rx) = WsConnection::new(id, buffer);
        Self { conn, rx }
    }

    pub fn id(&self) -> &str {
        self.conn.id()
    }

    /// Next queued frame, failing the test if none arrives within a minute
    /// of (possibly paused) time.
    pub async fn next_frame(&mut self) -> OutboundFrame {
        let message = tokio::time::timeout(Duration::from_secs(60), self.rx.recv())
            .await
            .expect("timed out waiting for a frame")
            .expect("connection queue closed");
        decode(message)
    }

    /// Drain every frame queued so far.
    pub fn drain(&mut self) -> Vec<OutboundFrame> {
        let mut frames = Vec::new();
        while let Ok(message) = self.rx.try_recv() {
            frames.push(decode(message));
        }
        frames
    }

    pub fn assert_idle(&mut self) {
        let frames = self.drain();
        assert!(frames.is_empty(), "expected no frames, got {frames:?}");
    }
}

pub fn decode(message: Message) -> OutboundFrame {
    match message {
        Message::Text(text) => serde_json::from_str(text.as_str()).expect("valid outbound frame"),
        other => panic!("expected a text frame, got {other:?}"),
    }
}

pub fn inbound(event: &str, data: serde_json::Value) -> String {
    serde_json::json!({ "event": event, "data": data }).to_string()
}

pub fn heartbeat_json(owner_id: &str, device_id: &str, lock: &str) -> String {
    inbound(
        "heartbeat",
        serde_json::json!({
            "ownerId": owner_id,
            "deviceId": device_id,
            "deviceName": "Front door",
            "lock": lock,
            "sensor": "closed",
            "buzzer": "off",
        }),
    )
}

// ---------------------------------------------------------------------------
// Registry test doubles
// ---------------------------------------------------------------------------

/// Registry whose every call fails with `Unavailable`.
pub struct FailingRegistry;

#[async_trait]
impl DeviceRegistry for FailingRegistry {
    async fn create_device(
        &self,
        _name: &str,
        _owner_id: &OwnerId,
    ) -> Result<DeviceId, RegistryError> {
        Err(RegistryError::Unavailable("connection refused".into()))
    }

    async fn list_due_schedules(
        &self,
        _slot: &ScheduleSlot,
    ) -> Result<Vec<ScheduleEntry>, RegistryError> {
        Err(RegistryError::Unavailable("connection refused".into()))
    }

    async fn health_check(&self) -> Result<(), RegistryError> {
        Err(RegistryError::Unavailable("connection refused".into()))
    }
}

/// Registry whose calls never complete.
pub struct HangingRegistry;

#[async_trait]
impl DeviceRegistry for HangingRegistry {
    async fn create_device(
        &self,
        _name: &str,
        _owner_id: &OwnerId,
    ) -> Result<DeviceId, RegistryError> {
        std::future::pending().await
    }

    async fn list_due_schedules(
        &self,
        _slot: &ScheduleSlot,
    ) -> Result<Vec<ScheduleEntry>, RegistryError> {
        std::future::pending().await
    }

    async fn health_check(&self) -> Result<(), RegistryError> {
        std::future::pending().await
    }
}
