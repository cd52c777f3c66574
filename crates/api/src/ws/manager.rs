use std::collections::HashMap;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::ws::Message;
use tokio::sync::{mpsc, RwLock};

use crate::ws::connection::WsConnection;

/// Outbound queue length used by [`WsManager::default`].
pub const DEFAULT_OUTBOUND_BUFFER: usize = 64;

/// Outcome of one liveness sweep.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub pinged: usize,
    pub terminated: usize,
}

/// Manages all active WebSocket connections.
///
/// Thread-safe via interior `RwLock`; designed to be wrapped in `Arc` and
/// shared across the application.
pub struct WsManager {
    connections: RwLock<HashMap<String, Arc<WsConnection>>>,
    outbound_buffer: usize,
}

impl WsManager {
    /// Create a new, empty connection manager.
    pub fn new(outbound_buffer: usize) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            outbound_buffer,
        }
    }

    /// Register a new connection.
    ///
    /// Returns the shared connection handle plus the receiver half of its
    /// outbound queue so the caller can forward messages to the socket sink.
    pub async fn add(&self, conn_id: String) -> (Arc<WsConnection>, mpsc::Receiver<Message>) {
        let (conn, rx) = WsConnection::new(conn_id.clone(), self.outbound_buffer);
        self.connections
            .write()
            .await
            .insert(conn_id, Arc::clone(&conn));
        (conn, rx)
    }

    /// Remove a connection by its ID.
    pub async fn remove(&self, conn_id: &str) {
        self.connections.write().await.remove(conn_id);
    }

    /// Return the current number of active connections.
    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Ping every live connection and terminate the ones that stayed silent
    /// since the previous sweep.
    ///
    /// Terminated connections are only signalled here; their receive loops
    /// run the usual disconnect cleanup.
    pub async fn sweep(&self) -> SweepReport {
        let conns = self.connections.read().await;
        let mut report = SweepReport::default();

        for conn in conns.values() {
            if conn.take_alive() {
                if let Err(e) = conn.try_send(Message::Ping(Bytes::new())) {
                    tracing::debug!(conn_id = %conn.id(), error = %e, "Ping not queued");
                }
                report.pinged += 1;
            } else {
                tracing::info!(conn_id = %conn.id(), "Terminating unresponsive WebSocket");
                conn.close();
                report.terminated += 1;
            }
        }

        report
    }

    /// Send a Close frame to every connection, then clear the map.
    ///
    /// Used during graceful shutdown to notify all clients before the
    /// server stops.
    pub async fn shutdown_all(&self) {
        let mut conns = self.connections.write().await;
        let count = conns.len();
        for conn in conns.values() {
            let _ = conn.try_send(Message::Close(None));
            conn.close();
        }
        conns.clear();
        tracing::info!(count, "Closed all WebSocket connections");
    }
}

impl Default for WsManager {
    fn default() -> Self {
        Self::new(DEFAULT_OUTBOUND_BUFFER)
    }
}
