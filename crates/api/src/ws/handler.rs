use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};

use crate::state::AppState;

/// HTTP handler that upgrades the connection to WebSocket.
///
/// After the upgrade the connection is registered with `WsManager` and its
/// frames are fed to the relay until either side closes. The socket task is
/// tracked so shutdown can wait for queued frames to flush.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    let tracker = state.ws_tasks.clone();
    ws.on_upgrade(move |socket| tracker.track_future(handle_socket(socket, state)))
}

/// Manage a single WebSocket connection after upgrade.
///
/// Splits the socket into a sink (outbound) and stream (inbound), then:
///   1. Registers the connection with `WsManager`.
///   2. Spawns a sender task that drains the connection's outbound queue.
///   3. Hands inbound text frames to the relay on the current task.
///   4. Cleans up relay state and the manager entry on disconnect, then lets
///      the sender flush what is still queued (a server Close included).
async fn handle_socket(socket: WebSocket, state: AppState) {
    let conn_id = uuid::Uuid::new_v4().to_string();
    tracing::info!(conn_id = %conn_id, "WebSocket connected");

    let (connection, mut rx) = state.ws_manager.add(conn_id.clone()).await;
    let connected_at = connection.connected_at();

    let (mut sink, mut stream) = socket.split();

    // Sender task: forward queued messages to the WebSocket sink.
    let sender_conn_id = conn_id.clone();
    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let closing = matches!(msg, Message::Close(_));
            if sink.send(msg).await.is_err() {
                tracing::debug!(conn_id = %sender_conn_id, "WebSocket sink closed");
                break;
            }
            if closing {
                break;
            }
        }
    });

    // Receiver loop: any inbound traffic counts as liveness.
    loop {
        tokio::select! {
            _ = connection.closed() => {
                tracing::debug!(conn_id = %conn_id, "WebSocket closed by server");
                break;
            }
            next = stream.next() => match next {
                Some(Ok(Message::Text(text))) => {
                    connection.mark_alive();
                    state.relay.handle_text(&connection, text.as_str()).await;
                }
                Some(Ok(Message::Pong(_))) => {
                    connection.mark_alive();
                    tracing::trace!(conn_id = %conn_id, "Pong received");
                }
                Some(Ok(Message::Ping(_))) => connection.mark_alive(),
                Some(Ok(Message::Binary(_))) => {
                    connection.mark_alive();
                    tracing::warn!(conn_id = %conn_id, "Dropping binary frame");
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(e)) => {
                    tracing::debug!(conn_id = %conn_id, error = %e, "WebSocket receive error");
                    break;
                }
            }
        }
    }

    state.relay.disconnect(&conn_id);
    state.ws_manager.remove(&conn_id).await;

    // With the last sender gone the queue ends once drained.
    drop(connection);
    let flush = Duration::from_secs(state.config.shutdown_timeout_secs);
    if tokio::time::timeout(flush, &mut send_task).await.is_err() {
        tracing::debug!(conn_id = %conn_id, "Outbound queue not flushed in time");
        send_task.abort();
    }

    let connected_secs = (chrono::Utc::now() - connected_at).num_seconds();
    tracing::info!(conn_id = %conn_id, connected_secs, "WebSocket disconnected");
}
