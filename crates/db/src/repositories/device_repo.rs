//! Repository for the `devices` table.

use latchkey_core::types::{DeviceId, OwnerId};
use sqlx::PgPool;

use crate::models::device::Device;

/// Column list for `devices` queries.
const COLUMNS: &str = "id, name, owner_id, created_at, updated_at";

/// Postgres NOTIFY channel announcing device removals.
pub const DEVICE_REMOVED_CHANNEL: &str = "device_removed";

/// Provides CRUD operations for devices.
pub struct DeviceRepo;

impl DeviceRepo {
    /// Insert a device with a caller-chosen id, returning the created row.
    pub async fn create(
        pool: &PgPool,
        id: &str,
        name: &str,
        owner_id: &str,
    ) -> Result<Device, sqlx::Error> {
        let query = format!(
            "INSERT INTO devices (id, name, owner_id) VALUES ($1, $2, $3) RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Device>(&query)
            .bind(id)
            .bind(name)
            .bind(owner_id)
            .fetch_one(pool)
            .await
    }

    /// Find a device by its id.
    pub async fn find_by_id(pool: &PgPool, id: &str) -> Result<Option<Device>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM devices WHERE id = $1");
        sqlx::query_as::<_, Device>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// List an owner's devices, oldest first.
    pub async fn list_for_owner(pool: &PgPool, owner_id: &str) -> Result<Vec<Device>, sqlx::Error> {
        let query =
            format!("SELECT {COLUMNS} FROM devices WHERE owner_id = $1 ORDER BY created_at");
        sqlx::query_as::<_, Device>(&query)
            .bind(owner_id)
            .fetch_all(pool)
            .await
    }

    /// Rename a device. Returns `true` if a row was updated.
    pub async fn rename(pool: &PgPool, id: &str, name: &str) -> Result<bool, sqlx::Error> {
        let result =
            sqlx::query("UPDATE devices SET name = $2, updated_at = NOW() WHERE id = $1")
                .bind(id)
                .bind(name)
                .execute(pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete a device and announce the removal on [`DEVICE_REMOVED_CHANNEL`].
    ///
    /// The delete and the `pg_notify` share a transaction, so listeners
    /// only hear about removals that committed. Returns the former owner,
    /// or `None` if no such device existed.
    pub async fn delete_and_notify(
        pool: &PgPool,
        id: &str,
    ) -> Result<Option<OwnerId>, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let owner_id: Option<OwnerId> =
            sqlx::query_scalar("DELETE FROM devices WHERE id = $1 RETURNING owner_id")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;

        if let Some(owner_id) = &owner_id {
            let payload = serde_json::json!({ "ownerId": owner_id, "deviceId": id }).to_string();
            sqlx::query("SELECT pg_notify($1, $2)")
                .bind(DEVICE_REMOVED_CHANNEL)
                .bind(payload)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(owner_id)
    }
}

/// Allocate a fresh device id.
pub fn new_device_id() -> DeviceId {
    uuid::Uuid::new_v4().to_string()
}
