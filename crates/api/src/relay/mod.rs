//! The relay core.
//!
//! Routes protocol frames between the mobile apps and lock controllers that
//! share a channel, tracks device presence from heartbeats, and handles
//! device registration and removal. [`Relay`] wires the components together
//! and is the single entry point used by the WebSocket handler.

pub mod channels;
pub mod presence;
pub mod registration;
pub mod router;

use std::sync::Arc;

use latchkey_core::protocol::{InboundFrame, OutboundFrame};
use latchkey_core::registry::DeviceRegistry;

use crate::config::RelayConfig;
use crate::ws::WsConnection;

pub use channels::{ChannelRegistry, Member};
pub use presence::{PresenceSnapshot, PresenceState, PresenceTracker};
pub use registration::RegistrationHandler;
pub use router::{Audience, MessageRouter};

pub struct Relay {
    channels: Arc<ChannelRegistry>,
    router: Arc<MessageRouter>,
    presence: PresenceTracker,
    registration: Arc<RegistrationHandler>,
}

impl Relay {
    pub fn new(registry: Arc<dyn DeviceRegistry>, config: &RelayConfig) -> Self {
        let channels = Arc::new(ChannelRegistry::new());
        let router = Arc::new(MessageRouter::new(Arc::clone(&channels)));
        let presence = PresenceTracker::new(Arc::clone(&router), config.presence_timeout);
        let registration = Arc::new(RegistrationHandler::new(
            registry,
            Arc::clone(&channels),
            Arc::clone(&router),
            presence.clone(),
            config.registry_timeout,
        ));

        Self {
            channels,
            router,
            presence,
            registration,
        }
    }

    pub fn channels(&self) -> &Arc<ChannelRegistry> {
        &self.channels
    }

    pub fn router(&self) -> &Arc<MessageRouter> {
        &self.router
    }

    pub fn presence(&self) -> &PresenceTracker {
        &self.presence
    }

    pub fn registration(&self) -> &Arc<RegistrationHandler> {
        &self.registration
    }

    /// Decode one text frame and act on it. Bad frames are logged and dropped.
    pub async fn handle_text(&self, connection: &Arc<WsConnection>, text: &str) {
        match InboundFrame::parse(text) {
            Ok(frame) => self.handle_frame(connection, frame).await,
            Err(e) => {
                tracing::warn!(conn_id = %connection.id(), error = %e, "Dropping inbound frame");
            }
        }
    }

    pub async fn handle_frame(&self, connection: &Arc<WsConnection>, frame: InboundFrame) {
        tracing::debug!(conn_id = %connection.id(), event = frame.event_name(), "Inbound frame");

        match frame {
            InboundFrame::JoinAsMobile(join) => self.registration.join_as_mobile(connection, &join),
            InboundFrame::JoinAsDevice(join) => self.registration.join_as_device(connection, &join),
            InboundFrame::RegisterDevice(request) => {
                // The controller has already been answered and the failure logged.
                let _ = self
                    .registration
                    .register_device(connection, &request)
                    .await;
            }
            InboundFrame::Heartbeat(heartbeat) => {
                self.presence.on_heartbeat(connection.id(), &heartbeat);
            }
            InboundFrame::Command(request) => {
                let frame = OutboundFrame::Command {
                    command: request.command,
                };
                self.router
                    .relay(&request.channel_key(), &frame, Some(connection.id()));
            }
        }
    }

    /// Drop all relay state tied to a closed connection.
    pub fn disconnect(&self, conn_id: &str) {
        self.channels.leave(conn_id);
        self.presence.on_disconnect(conn_id);
    }

    pub fn shutdown(&self) {
        self.presence.shutdown();
    }
}
