use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::ws::manager::WsManager;

/// Spawn a background task that sweeps all WebSocket connections every
/// `interval`: live ones get a Ping, ones that never answered the previous
/// Ping are terminated.
///
/// The task runs until `cancel` is triggered.
pub fn start_heartbeat(
    ws_manager: Arc<WsManager>,
    interval: Duration,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!("WebSocket heartbeat stopping");
                    break;
                }
                _ = ticker.tick() => {
                    let report = ws_manager.sweep().await;
                    tracing::debug!(
                        pinged = report.pinged,
                        terminated = report.terminated,
                        "WebSocket heartbeat sweep"
                    );
                }
            }
        }
    })
}
