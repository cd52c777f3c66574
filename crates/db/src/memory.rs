//! In-memory [`DeviceRegistry`] for development runs and tests.
//!
//! Mirrors the Postgres registry's behaviour, including publishing a
//! `device_removed` event when a device is deleted, but keeps everything
//! in process memory and loses it on restart.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use latchkey_core::registry::{DeviceRegistry, RegistryError};
use latchkey_core::schedule::{ScheduleEntry, ScheduleSlot};
use latchkey_core::types::{DbId, DeviceId, OwnerId};
use latchkey_events::{EventBus, PlatformEvent};
use tokio::sync::RwLock;

use crate::models::device::Device;
use crate::models::schedule::CreateSchedule;
use crate::repositories::device_repo::new_device_id;

#[derive(Default)]
struct Tables {
    devices: HashMap<DeviceId, Device>,
    schedules: Vec<ScheduleEntry>,
    next_schedule_id: DbId,
}

/// Registry held entirely in memory.
pub struct InMemoryRegistry {
    tables: RwLock<Tables>,
    bus: Option<Arc<EventBus>>,
}

impl InMemoryRegistry {
    /// A registry that does not announce removals.
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            bus: None,
        }
    }

    /// A registry that publishes removals on `bus`.
    pub fn with_event_bus(bus: Arc<EventBus>) -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            bus: Some(bus),
        }
    }

    pub async fn get_device(&self, device_id: &str) -> Option<Device> {
        self.tables.read().await.devices.get(device_id).cloned()
    }

    /// An owner's devices, oldest first.
    pub async fn list_devices(&self, owner_id: &str) -> Vec<Device> {
        let tables = self.tables.read().await;
        let mut devices: Vec<Device> = tables
            .devices
            .values()
            .filter(|d| d.owner_id == owner_id)
            .cloned()
            .collect();
        devices.sort_by_key(|d| d.created_at);
        devices
    }

    /// Rename a device. Returns `false` if it does not exist.
    pub async fn rename_device(&self, device_id: &str, name: &str) -> bool {
        let mut tables = self.tables.write().await;
        match tables.devices.get_mut(device_id) {
            Some(device) => {
                device.name = name.to_string();
                device.updated_at = Utc::now();
                true
            }
            None => false,
        }
    }

    /// Delete a device with its schedules and publish `device_removed`.
    ///
    /// Returns `false` if the device did not exist.
    pub async fn remove_device(&self, device_id: &str) -> bool {
        let removed = {
            let mut tables = self.tables.write().await;
            let removed = tables.devices.remove(device_id);
            if removed.is_some() {
                tables.schedules.retain(|s| s.device_id != device_id);
            }
            removed
        };

        match removed {
            Some(device) => {
                tracing::info!(device_id, owner_id = %device.owner_id, "Device removed from registry");
                if let Some(bus) = &self.bus {
                    bus.publish(PlatformEvent::device_removed(device.owner_id, device.id));
                }
                true
            }
            None => false,
        }
    }

    /// Add a schedule for an existing device, returning its id.
    pub async fn add_schedule(&self, input: CreateSchedule) -> Result<DbId, RegistryError> {
        let mut tables = self.tables.write().await;
        let owner_id = tables
            .devices
            .get(&input.device_id)
            .map(|d| d.owner_id.clone())
            .ok_or_else(|| {
                RegistryError::Rejected(format!("Unknown device '{}'", input.device_id))
            })?;

        tables.next_schedule_id += 1;
        let id = tables.next_schedule_id;
        tables.schedules.push(ScheduleEntry {
            id,
            device_id: input.device_id,
            owner_id,
            schedule_type: input.schedule_type,
            days: input.days,
            time: input.time,
            enabled: input.enabled,
        });
        Ok(id)
    }

    /// Every schedule of a device, earliest time first.
    pub async fn list_schedules(&self, device_id: &str) -> Vec<ScheduleEntry> {
        let tables = self.tables.read().await;
        let mut schedules: Vec<ScheduleEntry> = tables
            .schedules
            .iter()
            .filter(|s| s.device_id == device_id)
            .cloned()
            .collect();
        schedules.sort_by_key(|s| s.time);
        schedules
    }

    /// Toggle a schedule. Returns `false` if it does not exist.
    pub async fn set_schedule_enabled(&self, id: DbId, enabled: bool) -> bool {
        let mut tables = self.tables.write().await;
        match tables.schedules.iter_mut().find(|s| s.id == id) {
            Some(schedule) => {
                schedule.enabled = enabled;
                true
            }
            None => false,
        }
    }

    /// Delete a schedule. Returns `false` if it does not exist.
    pub async fn remove_schedule(&self, id: DbId) -> bool {
        let mut tables = self.tables.write().await;
        let before = tables.schedules.len();
        tables.schedules.retain(|s| s.id != id);
        tables.schedules.len() != before
    }
}

impl Default for InMemoryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DeviceRegistry for InMemoryRegistry {
    async fn create_device(
        &self,
        name: &str,
        owner_id: &OwnerId,
    ) -> Result<DeviceId, RegistryError> {
        let now = Utc::now();
        let device = Device {
            id: new_device_id(),
            name: name.to_string(),
            owner_id: owner_id.clone(),
            created_at: now,
            updated_at: now,
        };
        let id = device.id.clone();
        self.tables.write().await.devices.insert(id.clone(), device);
        Ok(id)
    }

    async fn list_due_schedules(
        &self,
        slot: &ScheduleSlot,
    ) -> Result<Vec<ScheduleEntry>, RegistryError> {
        let tables = self.tables.read().await;
        Ok(tables
            .schedules
            .iter()
            .filter(|s| s.is_due(slot))
            .cloned()
            .collect())
    }

    async fn health_check(&self) -> Result<(), RegistryError> {
        Ok(())
    }
}
