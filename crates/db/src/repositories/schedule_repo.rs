//! Repository for the `schedules` table.

use latchkey_core::schedule::weekday_abbrev;
use latchkey_core::types::DbId;
use sqlx::PgPool;

use crate::models::schedule::{CreateSchedule, ScheduleRow};

/// Column list for schedule queries joined with `devices d`.
const COLUMNS: &str = "s.id, s.device_id, d.owner_id, s.schedule_type, s.days, s.time, s.is_enabled";

/// Provides CRUD operations for schedules.
pub struct ScheduleRepo;

impl ScheduleRepo {
    /// Create a schedule, returning the generated ID.
    pub async fn create(pool: &PgPool, input: &CreateSchedule) -> Result<DbId, sqlx::Error> {
        let days: Vec<String> = input
            .days
            .iter()
            .map(|d| weekday_abbrev(*d).to_string())
            .collect();
        sqlx::query_scalar(
            "INSERT INTO schedules (device_id, schedule_type, days, time, is_enabled) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING id",
        )
        .bind(&input.device_id)
        .bind(input.schedule_type.as_db_str())
        .bind(days)
        .bind(input.time.to_string())
        .bind(input.enabled)
        .fetch_one(pool)
        .await
    }

    /// List every schedule for a device.
    pub async fn list_for_device(
        pool: &PgPool,
        device_id: &str,
    ) -> Result<Vec<ScheduleRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM schedules s JOIN devices d ON d.id = s.device_id \
             WHERE s.device_id = $1 ORDER BY s.time"
        );
        sqlx::query_as::<_, ScheduleRow>(&query)
            .bind(device_id)
            .fetch_all(pool)
            .await
    }

    /// Enabled schedules whose time is `time` (`HH:MM`) and whose days include `day` (`Mon`..`Sun`).
    pub async fn list_due(
        pool: &PgPool,
        time: &str,
        day: &str,
    ) -> Result<Vec<ScheduleRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM schedules s JOIN devices d ON d.id = s.device_id \
             WHERE s.is_enabled AND s.time = $1 AND $2 = ANY(s.days) \
             ORDER BY s.id"
        );
        sqlx::query_as::<_, ScheduleRow>(&query)
            .bind(time)
            .bind(day)
            .fetch_all(pool)
            .await
    }

    /// Toggle a schedule. Returns `true` if a row was updated.
    pub async fn set_enabled(pool: &PgPool, id: DbId, enabled: bool) -> Result<bool, sqlx::Error> {
        let result =
            sqlx::query("UPDATE schedules SET is_enabled = $2, updated_at = NOW() WHERE id = $1")
                .bind(id)
                .bind(enabled)
                .execute(pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete a schedule. Returns `true` if a row was removed.
    pub async fn delete(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM schedules WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
