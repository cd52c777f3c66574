//! PostgreSQL-backed [`DeviceRegistry`].

use async_trait::async_trait;
use latchkey_core::registry::{DeviceRegistry, RegistryError};
use latchkey_core::schedule::{weekday_abbrev, ScheduleEntry, ScheduleSlot};
use latchkey_core::types::{DbId, DeviceId, OwnerId};

use crate::models::device::Device;
use crate::models::schedule::{CreateSchedule, ScheduleRow};
use crate::repositories::device_repo::new_device_id;
use crate::repositories::{DeviceRepo, ScheduleRepo};
use crate::DbPool;

/// Registry over the `devices` and `schedules` tables.
///
/// Removals go through [`PgDeviceRegistry::remove_device`], which notifies
/// on the `device_removed` channel; see [`crate::listener`] for the
/// receiving side.
#[derive(Clone)]
pub struct PgDeviceRegistry {
    pool: DbPool,
}

impl PgDeviceRegistry {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    pub async fn get_device(&self, device_id: &str) -> Result<Option<Device>, RegistryError> {
        DeviceRepo::find_by_id(&self.pool, device_id)
            .await
            .map_err(map_sqlx_error)
    }

    /// An owner's devices, oldest first.
    pub async fn list_devices(&self, owner_id: &str) -> Result<Vec<Device>, RegistryError> {
        DeviceRepo::list_for_owner(&self.pool, owner_id)
            .await
            .map_err(map_sqlx_error)
    }

    /// Rename a device. Returns `false` if it does not exist.
    pub async fn rename_device(&self, device_id: &str, name: &str) -> Result<bool, RegistryError> {
        DeviceRepo::rename(&self.pool, device_id, name)
            .await
            .map_err(map_sqlx_error)
    }

    /// Delete a device and announce it. Returns `false` if it did not exist.
    ///
    /// Its schedules go with it (`ON DELETE CASCADE`).
    pub async fn remove_device(&self, device_id: &str) -> Result<bool, RegistryError> {
        let owner = DeviceRepo::delete_and_notify(&self.pool, device_id)
            .await
            .map_err(map_sqlx_error)?;
        if let Some(owner_id) = &owner {
            tracing::info!(device_id, owner_id = %owner_id, "Device removed from registry");
        }
        Ok(owner.is_some())
    }

    /// Add a schedule for an existing device, returning its id.
    ///
    /// An unknown device is `Rejected` by the foreign key.
    pub async fn add_schedule(&self, input: CreateSchedule) -> Result<DbId, RegistryError> {
        ScheduleRepo::create(&self.pool, &input)
            .await
            .map_err(map_sqlx_error)
    }

    /// Every schedule of a device, earliest time first.
    pub async fn list_schedules(&self, device_id: &str) -> Result<Vec<ScheduleEntry>, RegistryError> {
        let rows = ScheduleRepo::list_for_device(&self.pool, device_id)
            .await
            .map_err(map_sqlx_error)?;
        Ok(into_entries(rows))
    }

    /// Toggle a schedule. Returns `false` if it does not exist.
    pub async fn set_schedule_enabled(&self, id: DbId, enabled: bool) -> Result<bool, RegistryError> {
        ScheduleRepo::set_enabled(&self.pool, id, enabled)
            .await
            .map_err(map_sqlx_error)
    }

    /// Delete a schedule. Returns `false` if it does not exist.
    pub async fn remove_schedule(&self, id: DbId) -> Result<bool, RegistryError> {
        ScheduleRepo::delete(&self.pool, id)
            .await
            .map_err(map_sqlx_error)
    }
}

#[async_trait]
impl DeviceRegistry for PgDeviceRegistry {
    async fn create_device(
        &self,
        name: &str,
        owner_id: &OwnerId,
    ) -> Result<DeviceId, RegistryError> {
        let device = DeviceRepo::create(&self.pool, &new_device_id(), name, owner_id)
            .await
            .map_err(map_sqlx_error)?;
        tracing::info!(device_id = %device.id, owner_id = %owner_id, "Device created");
        Ok(device.id)
    }

    async fn list_due_schedules(
        &self,
        slot: &ScheduleSlot,
    ) -> Result<Vec<ScheduleEntry>, RegistryError> {
        let rows = ScheduleRepo::list_due(
            &self.pool,
            &slot.time.to_string(),
            weekday_abbrev(slot.weekday),
        )
        .await
        .map_err(map_sqlx_error)?;

        Ok(into_entries(rows))
    }

    async fn health_check(&self) -> Result<(), RegistryError> {
        crate::health_check(&self.pool)
            .await
            .map_err(map_sqlx_error)
    }
}

/// Convert rows, skipping (and logging) any that no longer parse.
fn into_entries(rows: Vec<ScheduleRow>) -> Vec<ScheduleEntry> {
    rows.into_iter()
        .filter_map(|row| {
            let id = row.id;
            match ScheduleEntry::try_from(row) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    tracing::warn!(schedule_id = id, error = %e, "Skipping unreadable schedule row");
                    None
                }
            }
        })
        .collect()
}

/// Classify a sqlx error into a [`RegistryError`].
///
/// - Pool exhaustion and I/O failures map to `Unavailable`.
/// - Check / foreign-key violations map to `Rejected`.
/// - Everything else maps to `Backend`.
fn map_sqlx_error(err: sqlx::Error) -> RegistryError {
    match &err {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            RegistryError::Unavailable(err.to_string())
        }
        sqlx::Error::Database(db_err)
            if matches!(db_err.code().as_deref(), Some("23503") | Some("23514")) =>
        {
            RegistryError::Rejected(db_err.message().to_string())
        }
        _ => RegistryError::Backend(err.to_string()),
    }
}
