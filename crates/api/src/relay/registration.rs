//! Channel joins, device registration and device removal.

use std::sync::Arc;
use std::time::Duration;

use latchkey_core::channel::{ChannelKey, Role};
use latchkey_core::protocol::{JoinChannel, OutboundFrame, RegisterDevice, RegisterDeviceReply};
use latchkey_core::registry::{DeviceRegistry, RegistryError};
use latchkey_core::types::DeviceId;
use latchkey_events::{DeviceRemoved, PlatformEvent, RegistryEvent};
use tokio::sync::broadcast;

use crate::relay::channels::ChannelRegistry;
use crate::relay::presence::PresenceTracker;
use crate::relay::router::MessageRouter;
use crate::ws::WsConnection;

/// Reply text sent to a controller whose registration failed.
pub const REGISTRATION_FAILED: &str = "Failed to register device";

pub struct RegistrationHandler {
    registry: Arc<dyn DeviceRegistry>,
    channels: Arc<ChannelRegistry>,
    router: Arc<MessageRouter>,
    presence: PresenceTracker,
    registry_timeout: Duration,
}

impl RegistrationHandler {
    pub fn new(
        registry: Arc<dyn DeviceRegistry>,
        channels: Arc<ChannelRegistry>,
        router: Arc<MessageRouter>,
        presence: PresenceTracker,
        registry_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            channels,
            router,
            presence,
            registry_timeout,
        }
    }

    /// Seat a mobile app and ask the channel for a fresh status report.
    ///
    /// The status request goes to the whole channel, the joining app included.
    pub fn join_as_mobile(&self, connection: &Arc<WsConnection>, join: &JoinChannel) {
        let key = join.channel_key();
        self.channels.join(key.clone(), connection, Role::Mobile);
        self.router.relay(&key, &OutboundFrame::RequestStatus {}, None);
    }

    pub fn join_as_device(&self, connection: &Arc<WsConnection>, join: &JoinChannel) {
        self.channels.join(join.channel_key(), connection, Role::Device);
    }

    /// Create a device identity, seat the controller in its channel and reply.
    ///
    /// On any registry failure (including a timeout) the controller gets a
    /// failure reply and no channel membership is created.
    pub async fn register_device(
        &self,
        connection: &Arc<WsConnection>,
        request: &RegisterDevice,
    ) -> Result<DeviceId, RegistryError> {
        let created = tokio::time::timeout(
            self.registry_timeout,
            self.registry.create_device(&request.device_name, &request.owner_id),
        )
        .await
        .unwrap_or(Err(RegistryError::Timeout));

        match created {
            Ok(device_id) => {
                tracing::info!(
                    conn_id = %connection.id(),
                    owner_id = %request.owner_id,
                    device_id = %device_id,
                    "Device registered"
                );
                let key = ChannelKey::new(request.owner_id.clone(), device_id.clone());
                self.channels.join(key, connection, Role::Device);
                let reply =
                    RegisterDeviceReply::registered(device_id.clone(), request.device_name.clone());
                self.router.send_to(connection, &OutboundFrame::RegisterDevice(reply));
                Ok(device_id)
            }
            Err(e) => {
                tracing::warn!(
                    conn_id = %connection.id(),
                    owner_id = %request.owner_id,
                    error = %e,
                    "Device registration failed"
                );
                self.router.send_to(
                    connection,
                    &OutboundFrame::RegisterDevice(RegisterDeviceReply::failed(REGISTRATION_FAILED)),
                );
                Err(e)
            }
        }
    }

    /// Tell the device's channel it was unpaired and stop tracking it.
    pub fn on_device_removed(&self, removed: &DeviceRemoved) {
        let key = ChannelKey::new(removed.owner_id.clone(), removed.device_id.clone());
        let delivered = self.router.relay(&key, &OutboundFrame::UnpairDevice {}, None);
        self.presence.cancel(&removed.device_id);
        tracing::info!(channel = %key, delivered, "Device unpaired");
    }

    /// Consume registry events until the bus closes.
    pub async fn run(self: Arc<Self>, mut receiver: broadcast::Receiver<PlatformEvent>) {
        loop {
            match receiver.recv().await {
                Ok(event) => match &event.event {
                    RegistryEvent::DeviceRemoved(removed) => self.on_device_removed(removed),
                },
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "Registration handler lagged");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::info!("Event bus closed, registration handler shutting down");
                    break;
                }
            }
        }
    }
}
