pub mod health;
pub mod presence;

use axum::routing::get;
use axum::Router;

use crate::state::AppState;
use crate::ws;

/// Build the `/api/v1` route tree.
///
/// ```text
/// /ws                                  WebSocket relay endpoint
/// /devices/{device_id}/presence        live presence of one device (GET)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/ws", get(ws::ws_handler))
        .route("/devices/{device_id}/presence", get(presence::get_presence))
}
