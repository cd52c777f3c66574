use axum::extract::{Path, State};
use axum::Json;
use latchkey_core::error::CoreError;

use crate::error::AppResult;
use crate::relay::PresenceSnapshot;
use crate::state::AppState;

/// GET /api/v1/devices/{device_id}/presence
///
/// 404 when the device has never sent a heartbeat since startup.
pub async fn get_presence(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
) -> AppResult<Json<PresenceSnapshot>> {
    state
        .relay
        .presence()
        .snapshot(&device_id)
        .map(Json)
        .ok_or_else(|| {
            CoreError::NotFound {
                entity: "Device presence",
                id: device_id,
            }
            .into()
        })
}
