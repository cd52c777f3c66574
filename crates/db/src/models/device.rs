//! Device entity model.

use latchkey_core::types::{DeviceId, OwnerId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `devices` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Device {
    pub id: DeviceId,
    pub name: String,
    pub owner_id: OwnerId,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}
