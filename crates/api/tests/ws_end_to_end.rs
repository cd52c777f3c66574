//! Socket-level tests: a real server on an ephemeral port and real
//! WebSocket clients.

mod common;

use std::net::SocketAddr;
use std::time::Duration;

use assert_matches::assert_matches;
use common::{heartbeat_json, inbound};
use futures::{SinkExt, StreamExt};
use latchkey_api::state::AppState;
use latchkey_core::protocol::{LockCommand, OutboundFrame};
use serde_json::json;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn spawn_server() -> (SocketAddr, AppState) {
    let (app, state) = common::build_test_app();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, state)
}

async fn connect(addr: SocketAddr) -> Client {
    let (ws, _) = connect_async(format!("ws://{addr}/api/v1/ws")).await.unwrap();
    ws
}

async fn send(ws: &mut Client, text: String) {
    ws.send(WsMessage::Text(text)).await.unwrap();
}

async fn recv_frame(ws: &mut Client) -> OutboundFrame {
    loop {
        let message = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("stream ended")
            .expect("websocket error");
        match message {
            WsMessage::Text(text) => return serde_json::from_str(&text).unwrap(),
            WsMessage::Ping(_) | WsMessage::Pong(_) => continue,
            other => panic!("unexpected message {other:?}"),
        }
    }
}

/// Poll until `check` holds, failing after a few seconds.
async fn wait_until<F: Fn() -> bool>(check: F) {
    for _ in 0..200 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached");
}

fn join(event: &str, device_id: &str) -> String {
    inbound(event, json!({ "ownerId": "alice", "deviceId": device_id }))
}

// ---------------------------------------------------------------------------
// Test: full mobile/device exchange over real sockets
// ---------------------------------------------------------------------------

#[tokio::test]
async fn mobile_and_device_exchange_over_websocket() {
    let (addr, state) = spawn_server().await;
    let mut device = connect(addr).await;
    let mut mobile = connect(addr).await;

    send(&mut device, join("join_as_device", "d1")).await;
    wait_until(|| state.relay.channels().member_count() == 1).await;

    send(&mut mobile, join("join_as_mobile", "d1")).await;
    assert_eq!(recv_frame(&mut mobile).await, OutboundFrame::RequestStatus {});
    assert_eq!(recv_frame(&mut device).await, OutboundFrame::RequestStatus {});

    send(&mut device, heartbeat_json("alice", "d1", "locked")).await;
    assert_matches!(recv_frame(&mut mobile).await, OutboundFrame::DeviceStatus(update) => {
        assert!(update.online);
    });

    send(
        &mut mobile,
        inbound(
            "command",
            json!({ "ownerId": "alice", "deviceId": "d1", "command": "lock" }),
        ),
    )
    .await;
    assert_eq!(
        recv_frame(&mut device).await,
        OutboundFrame::Command {
            command: LockCommand::Lock
        }
    );

    device.close(None).await.unwrap();
    assert_matches!(recv_frame(&mut mobile).await, OutboundFrame::DeviceStatus(update) => {
        assert!(!update.online);
    });
    wait_until(|| state.relay.channels().member_count() == 1).await;
}

// ---------------------------------------------------------------------------
// Test: register_device round trip
// ---------------------------------------------------------------------------

#[tokio::test]
async fn register_device_over_websocket() {
    let (addr, state) = spawn_server().await;
    let mut controller = connect(addr).await;

    send(
        &mut controller,
        inbound(
            "register_device",
            json!({ "ownerId": "alice", "deviceName": "Garage" }),
        ),
    )
    .await;

    assert_matches!(recv_frame(&mut controller).await, OutboundFrame::RegisterDevice(reply) => {
        assert!(reply.success);
        assert_eq!(reply.device_name.as_deref(), Some("Garage"));
        assert!(reply.device_id.is_some());
    });
    assert_eq!(state.relay.channels().member_count(), 1);
    assert_eq!(state.ws_manager.connection_count().await, 1);
}

// ---------------------------------------------------------------------------
// Test: garbage frames do not close the connection
// ---------------------------------------------------------------------------

#[tokio::test]
async fn garbage_frames_keep_connection_open() {
    let (addr, _state) = spawn_server().await;
    let mut mobile = connect(addr).await;

    send(&mut mobile, "definitely not json".to_string()).await;
    send(&mut mobile, join("join_as_mobile", "d1")).await;

    assert_eq!(recv_frame(&mut mobile).await, OutboundFrame::RequestStatus {});
}

// ---------------------------------------------------------------------------
// Test: shutdown delivers a Close frame before the socket task exits
// ---------------------------------------------------------------------------

#[tokio::test]
async fn shutdown_flushes_close_frame_to_clients() {
    let (addr, state) = spawn_server().await;
    let mut mobile = connect(addr).await;
    send(&mut mobile, join("join_as_mobile", "d1")).await;
    assert_eq!(recv_frame(&mut mobile).await, OutboundFrame::RequestStatus {});

    state.ws_manager.shutdown_all().await;

    let message = tokio::time::timeout(Duration::from_secs(5), mobile.next())
        .await
        .expect("timed out waiting for close")
        .expect("stream ended")
        .expect("websocket error");
    assert_matches!(message, WsMessage::Close(_));

    state.ws_tasks.close();
    tokio::time::timeout(Duration::from_secs(5), state.ws_tasks.wait())
        .await
        .expect("socket task should finish");
    assert_eq!(state.relay.channels().member_count(), 0);
}
