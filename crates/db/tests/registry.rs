//! Integration tests for the Postgres device registry.
//!
//! Exercises the repository SQL against a real database:
//! - Due-schedule matching by time, weekday and enabled flag
//! - Cascade delete of schedules with their device
//! - `device_removed` NOTIFY payloads decoded onto the event bus
//! - Error classification for constraint violations and a closed pool

use std::time::Duration;

use assert_matches::assert_matches;
use chrono::Weekday;
use latchkey_core::registry::{DeviceRegistry, RegistryError};
use latchkey_core::schedule::{ScheduleSlot, ScheduleType};
use latchkey_db::listener;
use latchkey_db::models::schedule::CreateSchedule;
use latchkey_db::PgDeviceRegistry;
use latchkey_events::{DeviceRemoved, EventBus, RegistryEvent};
use sqlx::PgPool;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn schedule(device_id: &str, schedule_type: ScheduleType, days: &[Weekday], time: &str) -> CreateSchedule {
    CreateSchedule {
        device_id: device_id.to_string(),
        schedule_type,
        days: days.to_vec(),
        time: time.parse().unwrap(),
        enabled: true,
    }
}

fn slot(weekday: Weekday, time: &str) -> ScheduleSlot {
    ScheduleSlot::new(weekday, time.parse().unwrap())
}

// ---------------------------------------------------------------------------
// Devices
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "./migrations")]
async fn test_device_create_list_rename(pool: PgPool) {
    let registry = PgDeviceRegistry::new(pool);
    let alice = "alice".to_string();

    let first = registry.create_device("Front door", &alice).await.unwrap();
    let second = registry.create_device("Garage", &alice).await.unwrap();
    registry.create_device("Shed", &"bob".to_string()).await.unwrap();

    let ids: Vec<_> = registry
        .list_devices("alice")
        .await
        .unwrap()
        .into_iter()
        .map(|d| d.id)
        .collect();
    assert_eq!(ids, vec![first.clone(), second]);

    assert!(registry.rename_device(&first, "Back door").await.unwrap());
    assert!(!registry.rename_device("missing", "x").await.unwrap());

    let device = registry.get_device(&first).await.unwrap().unwrap();
    assert_eq!(device.name, "Back door");
    assert_eq!(device.owner_id, "alice");
    assert!(registry.get_device("missing").await.unwrap().is_none());
}

// ---------------------------------------------------------------------------
// Schedules
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "./migrations")]
async fn test_due_schedules_match_time_weekday_and_enabled(pool: PgPool) {
    let registry = PgDeviceRegistry::new(pool);
    let device = registry
        .create_device("Front door", &"alice".to_string())
        .await
        .unwrap();

    let weekday_lock = registry
        .add_schedule(schedule(&device, ScheduleType::Lock, &[Weekday::Mon, Weekday::Fri], "08:00"))
        .await
        .unwrap();
    registry
        .add_schedule(schedule(&device, ScheduleType::Unlock, &[Weekday::Tue], "08:00"))
        .await
        .unwrap();
    registry
        .add_schedule(schedule(&device, ScheduleType::Unlock, &[Weekday::Mon], "08:01"))
        .await
        .unwrap();

    let due = registry.list_due_schedules(&slot(Weekday::Mon, "08:00")).await.unwrap();
    assert_eq!(due.len(), 1);
    assert_eq!(due[0].id, weekday_lock);
    assert_eq!(due[0].owner_id, "alice");
    assert_eq!(due[0].device_id, device);
    assert_eq!(due[0].schedule_type, ScheduleType::Lock);
    assert_eq!(due[0].days, vec![Weekday::Mon, Weekday::Fri]);

    assert_eq!(
        registry.list_due_schedules(&slot(Weekday::Fri, "08:00")).await.unwrap().len(),
        1
    );
    assert!(registry
        .list_due_schedules(&slot(Weekday::Wed, "08:00"))
        .await
        .unwrap()
        .is_empty());

    assert!(registry.set_schedule_enabled(weekday_lock, false).await.unwrap());
    assert!(registry
        .list_due_schedules(&slot(Weekday::Mon, "08:00"))
        .await
        .unwrap()
        .is_empty());
}

#[sqlx::test(migrations = "./migrations")]
async fn test_list_and_remove_schedules(pool: PgPool) {
    let registry = PgDeviceRegistry::new(pool);
    let device = registry.create_device("d", &"alice".to_string()).await.unwrap();

    let late = registry
        .add_schedule(schedule(&device, ScheduleType::Lock, &[Weekday::Sun], "22:30"))
        .await
        .unwrap();
    let early = registry
        .add_schedule(schedule(&device, ScheduleType::Unlock, &[Weekday::Sun], "06:45"))
        .await
        .unwrap();

    let ids: Vec<_> = registry
        .list_schedules(&device)
        .await
        .unwrap()
        .into_iter()
        .map(|s| s.id)
        .collect();
    assert_eq!(ids, vec![early, late]);

    assert!(registry.remove_schedule(late).await.unwrap());
    assert!(!registry.remove_schedule(late).await.unwrap());
    assert!(!registry.set_schedule_enabled(late, true).await.unwrap());
    assert_eq!(registry.list_schedules(&device).await.unwrap().len(), 1);
}

#[sqlx::test(migrations = "./migrations")]
async fn test_removing_device_cascades_to_schedules(pool: PgPool) {
    let registry = PgDeviceRegistry::new(pool.clone());
    let device = registry.create_device("d", &"alice".to_string()).await.unwrap();
    registry
        .add_schedule(schedule(&device, ScheduleType::Lock, &[Weekday::Mon], "08:00"))
        .await
        .unwrap();

    assert!(registry.remove_device(&device).await.unwrap());
    assert!(!registry.remove_device(&device).await.unwrap());

    let remaining: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM schedules WHERE device_id = $1")
        .bind(&device)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(remaining.0, 0);
    assert!(registry
        .list_due_schedules(&slot(Weekday::Mon, "08:00"))
        .await
        .unwrap()
        .is_empty());
}

// ---------------------------------------------------------------------------
// Removal notifications
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "./migrations")]
async fn test_remove_device_notifies_listener(pool: PgPool) {
    let registry = PgDeviceRegistry::new(pool.clone());
    let device = registry.create_device("d", &"alice".to_string()).await.unwrap();

    let mut pg_listener = listener::subscribe(&pool).await.unwrap();
    let bus = EventBus::default();
    let mut rx = bus.subscribe();

    assert!(registry.remove_device(&device).await.unwrap());

    let notification = tokio::time::timeout(Duration::from_secs(5), pg_listener.recv())
        .await
        .expect("notification should arrive")
        .unwrap();
    listener::forward(&bus, notification.payload());

    let event = rx.recv().await.unwrap();
    assert_eq!(
        event.event,
        RegistryEvent::DeviceRemoved(DeviceRemoved {
            owner_id: "alice".into(),
            device_id: device,
        })
    );
}

#[sqlx::test(migrations = "./migrations")]
async fn test_removing_unknown_device_is_silent(pool: PgPool) {
    let registry = PgDeviceRegistry::new(pool.clone());
    let mut pg_listener = listener::subscribe(&pool).await.unwrap();

    assert!(!registry.remove_device("missing").await.unwrap());

    let received = tokio::time::timeout(Duration::from_millis(300), pg_listener.recv()).await;
    assert!(received.is_err(), "no notification expected");
}

// ---------------------------------------------------------------------------
// Error classification
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "./migrations")]
async fn test_constraint_violations_are_rejected(pool: PgPool) {
    let registry = PgDeviceRegistry::new(pool);

    assert_matches!(
        registry
            .add_schedule(schedule("missing", ScheduleType::Lock, &[Weekday::Mon], "08:00"))
            .await,
        Err(RegistryError::Rejected(_))
    );

    let too_long = "x".repeat(65);
    assert_matches!(
        registry.create_device(&too_long, &"alice".to_string()).await,
        Err(RegistryError::Rejected(_))
    );
}

#[sqlx::test(migrations = "./migrations")]
async fn test_closed_pool_is_unavailable(pool: PgPool) {
    let registry = PgDeviceRegistry::new(pool.clone());
    registry.health_check().await.unwrap();

    pool.close().await;

    assert_matches!(registry.health_check().await, Err(RegistryError::Unavailable(_)));
}
