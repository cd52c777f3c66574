//! The device registry seam.
//!
//! Persistent device and schedule records live behind [`DeviceRegistry`].
//! The relay only ever creates devices and reads due schedules; everything
//! else about the records belongs to whoever implements the trait.

use async_trait::async_trait;

use crate::schedule::{ScheduleEntry, ScheduleSlot};
use crate::types::{DeviceId, OwnerId};

/// Failures reported by a registry implementation.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Registry unavailable: {0}")]
    Unavailable(String),

    #[error("Registry call timed out")]
    Timeout,

    #[error("Registry rejected request: {0}")]
    Rejected(String),

    #[error("Registry backend error: {0}")]
    Backend(String),
}

#[async_trait]
pub trait DeviceRegistry: Send + Sync {
    /// Allocate a new device identity for `owner_id`.
    async fn create_device(&self, name: &str, owner_id: &OwnerId)
        -> Result<DeviceId, RegistryError>;

    /// All enabled schedule entries due in `slot`.
    async fn list_due_schedules(
        &self,
        slot: &ScheduleSlot,
    ) -> Result<Vec<ScheduleEntry>, RegistryError>;

    /// Cheap reachability check used by the health endpoint.
    async fn health_check(&self) -> Result<(), RegistryError>;
}
