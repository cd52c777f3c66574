use std::sync::Arc;

use latchkey_core::registry::DeviceRegistry;
use tokio_util::task::TaskTracker;

use crate::config::ServerConfig;
use crate::relay::Relay;
use crate::ws::WsManager;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc`).
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    /// WebSocket connection manager.
    pub ws_manager: Arc<WsManager>,
    /// Channel membership, routing, presence and registration.
    pub relay: Arc<Relay>,
    /// Persistent device and schedule records.
    pub registry: Arc<dyn DeviceRegistry>,
    /// Per-socket tasks, awaited during shutdown.
    pub ws_tasks: TaskTracker,
}

impl AppState {
    /// Wire a fresh relay and connection manager around `registry`.
    pub fn new(config: ServerConfig, registry: Arc<dyn DeviceRegistry>) -> Self {
        let relay = Arc::new(Relay::new(Arc::clone(&registry), &config.relay));
        let ws_manager = Arc::new(WsManager::new(config.relay.outbound_buffer));
        Self {
            config: Arc::new(config),
            ws_manager,
            relay,
            registry,
            ws_tasks: TaskTracker::new(),
        }
    }
}
