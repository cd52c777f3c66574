//! Bridge from Postgres `NOTIFY device_removed` to the in-process event bus.
//!
//! Whatever deletes a device row (this crate's [`PgDeviceRegistry`] or an
//! external admin tool) announces it with
//! `pg_notify('device_removed', '{"ownerId": .., "deviceId": ..}')`.
//!
//! [`PgDeviceRegistry`]: crate::PgDeviceRegistry

use std::sync::Arc;
use std::time::Duration;

use latchkey_events::{DeviceRemoved, EventBus, PlatformEvent, RegistryEvent};
use sqlx::postgres::PgListener;
use tokio_util::sync::CancellationToken;

use crate::repositories::device_repo::DEVICE_REMOVED_CHANNEL;
use crate::DbPool;

/// Delay before re-subscribing after the listener connection fails.
const RETRY_DELAY: Duration = Duration::from_secs(5);

/// Run the removal listener until `cancel` fires.
pub async fn run(pool: DbPool, bus: Arc<EventBus>, cancel: CancellationToken) {
    loop {
        let mut listener = match subscribe(&pool).await {
            Ok(listener) => listener,
            Err(e) => {
                tracing::error!(error = %e, "Failed to LISTEN for device removals");
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(RETRY_DELAY) => continue,
                }
            }
        };
        tracing::info!(channel = DEVICE_REMOVED_CHANNEL, "Listening for device removals");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Device removal listener stopping");
                    return;
                }
                received = listener.recv() => match received {
                    Ok(notification) => forward(&bus, notification.payload()),
                    Err(e) => {
                        tracing::warn!(error = %e, "Device removal listener lost its connection");
                        break;
                    }
                }
            }
        }
    }
}

/// Open a dedicated connection and `LISTEN` on the removal channel.
pub async fn subscribe(pool: &DbPool) -> Result<PgListener, sqlx::Error> {
    let mut listener = PgListener::connect_with(pool).await?;
    listener.listen(DEVICE_REMOVED_CHANNEL).await?;
    Ok(listener)
}

/// Decode one notification payload and publish it. Malformed payloads are logged and dropped.
pub fn forward(bus: &EventBus, payload: &str) {
    match serde_json::from_str::<DeviceRemoved>(payload) {
        Ok(removed) => {
            tracing::info!(
                owner_id = %removed.owner_id,
                device_id = %removed.device_id,
                "Device removal notification received"
            );
            bus.publish(PlatformEvent::new(RegistryEvent::DeviceRemoved(removed)));
        }
        Err(e) => {
            tracing::warn!(error = %e, payload, "Ignoring malformed device removal notification");
        }
    }
}
