//! Schedule entity model and DTOs.

use chrono::Weekday;
use latchkey_core::error::CoreError;
use latchkey_core::schedule::{parse_weekday, ScheduleEntry, ScheduleType, TimeOfDay};
use latchkey_core::types::{DbId, DeviceId, OwnerId};
use serde::Deserialize;
use sqlx::FromRow;

/// A `schedules` row joined with its device's owner.
#[derive(Debug, Clone, FromRow)]
pub struct ScheduleRow {
    pub id: DbId,
    pub device_id: DeviceId,
    pub owner_id: OwnerId,
    pub schedule_type: String,
    pub days: Vec<String>,
    pub time: String,
    pub is_enabled: bool,
}

impl TryFrom<ScheduleRow> for ScheduleEntry {
    type Error = CoreError;

    fn try_from(row: ScheduleRow) -> Result<Self, Self::Error> {
        let days = row
            .days
            .iter()
            .map(|d| parse_weekday(d))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ScheduleEntry {
            id: row.id,
            device_id: row.device_id,
            owner_id: row.owner_id,
            schedule_type: row.schedule_type.parse()?,
            days,
            time: row.time.parse()?,
            enabled: row.is_enabled,
        })
    }
}

/// DTO for creating a new schedule.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSchedule {
    pub device_id: DeviceId,
    pub schedule_type: ScheduleType,
    pub days: Vec<Weekday>,
    pub time: TimeOfDay,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}
