use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::extract::ws::Message;
use latchkey_core::types::{ConnId, Timestamp};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Channel sender half for pushing messages to a WebSocket connection.
pub type WsSender = mpsc::Sender<Message>;

/// Why a frame could not be queued for a connection.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("Outbound queue is full")]
    Full,

    #[error("Connection is closed")]
    Closed,
}

/// One live WebSocket connection as seen by the rest of the server.
///
/// Outbound frames go through a bounded queue drained by the connection's
/// sender task, so producers never wait on a slow peer.
pub struct WsConnection {
    id: ConnId,
    sender: WsSender,
    /// Set by any inbound traffic, cleared by each liveness sweep.
    alive: AtomicBool,
    close: CancellationToken,
    connected_at: Timestamp,
}

impl WsConnection {
    /// Create a connection handle and the receiver its sender task drains.
    pub fn new(id: impl Into<ConnId>, buffer: usize) -> (Arc<Self>, mpsc::Receiver<Message>) {
        let (sender, rx) = mpsc::channel(buffer);
        let conn = Arc::new(Self {
            id: id.into(),
            sender,
            alive: AtomicBool::new(true),
            close: CancellationToken::new(),
            connected_at: chrono::Utc::now(),
        });
        (conn, rx)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn connected_at(&self) -> Timestamp {
        self.connected_at
    }

    /// Queue a frame without waiting.
    pub fn try_send(&self, message: Message) -> Result<(), DeliveryError> {
        self.sender.try_send(message).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DeliveryError::Full,
            mpsc::error::TrySendError::Closed(_) => DeliveryError::Closed,
        })
    }

    pub fn mark_alive(&self) {
        self.alive.store(true, Ordering::Relaxed);
    }

    /// Clear the liveness flag, returning whether it was set.
    pub fn take_alive(&self) -> bool {
        self.alive.swap(false, Ordering::Relaxed)
    }

    /// Ask the connection's receive loop to stop.
    pub fn close(&self) {
        self.close.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.close.is_cancelled()
    }

    /// Resolves once [`close`](Self::close) has been called.
    pub async fn closed(&self) {
        self.close.cancelled().await
    }
}

impl std::fmt::Debug for WsConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsConnection")
            .field("id", &self.id)
            .field("connected_at", &self.connected_at)
            .field("closed", &self.is_closed())
            .finish()
    }
}
