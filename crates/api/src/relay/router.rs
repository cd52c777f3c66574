//! Fan-out of protocol frames to channel members.

use std::sync::Arc;

use axum::extract::ws::Message;
use latchkey_core::channel::{ChannelKey, Role};
use latchkey_core::protocol::OutboundFrame;

use crate::relay::channels::{ChannelRegistry, Member};
use crate::ws::WsConnection;

/// Which members of a channel receive a frame.
#[derive(Debug, Clone, Copy)]
pub enum Audience<'a> {
    All,
    AllExcept(&'a str),
    Role(Role),
}

impl Audience<'_> {
    fn includes(&self, member: &Member) -> bool {
        match self {
            Audience::All => true,
            Audience::AllExcept(origin) => member.connection.id() != *origin,
            Audience::Role(role) => member.role == *role,
        }
    }
}

/// Delivers frames to channel members without ever waiting on a peer.
///
/// Each frame is serialized once per call and queued on every recipient's
/// bounded outbound queue. A recipient whose queue is full or closed is
/// skipped with a warning.
pub struct MessageRouter {
    channels: Arc<ChannelRegistry>,
}

impl MessageRouter {
    pub fn new(channels: Arc<ChannelRegistry>) -> Self {
        Self { channels }
    }

    /// Relay to every member of `key` other than `origin`.
    ///
    /// Returns how many members the frame was queued for.
    pub fn relay(&self, key: &ChannelKey, frame: &OutboundFrame, origin: Option<&str>) -> usize {
        let audience = match origin {
            Some(conn_id) => Audience::AllExcept(conn_id),
            None => Audience::All,
        };
        self.fan_out(key, frame, audience)
    }

    /// Relay to the members of `key` seated with `role`.
    pub fn relay_to_role(&self, key: &ChannelKey, role: Role, frame: &OutboundFrame) -> usize {
        self.fan_out(key, frame, Audience::Role(role))
    }

    pub fn fan_out(&self, key: &ChannelKey, frame: &OutboundFrame, audience: Audience<'_>) -> usize {
        let members = self.channels.members(key);
        if members.is_empty() {
            tracing::trace!(channel = %key, event = frame.event_name(), "No peers in channel");
            return 0;
        }

        let Some(message) = encode(frame) else {
            return 0;
        };

        let mut delivered = 0;
        for member in members.iter().filter(|m| audience.includes(m)) {
            match member.connection.try_send(message.clone()) {
                Ok(()) => delivered += 1,
                Err(e) => tracing::warn!(
                    conn_id = %member.connection.id(),
                    channel = %key,
                    event = frame.event_name(),
                    error = %e,
                    "Dropping frame for peer"
                ),
            }
        }

        tracing::debug!(channel = %key, event = frame.event_name(), delivered, "Relayed frame");
        delivered
    }

    /// Send a frame to one connection. Returns whether it was queued.
    pub fn send_to(&self, connection: &WsConnection, frame: &OutboundFrame) -> bool {
        let Some(message) = encode(frame) else {
            return false;
        };
        match connection.try_send(message) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(
                    conn_id = %connection.id(),
                    event = frame.event_name(),
                    error = %e,
                    "Dropping direct frame"
                );
                false
            }
        }
    }
}

fn encode(frame: &OutboundFrame) -> Option<Message> {
    match frame.to_json() {
        Ok(text) => Some(Message::Text(text.into())),
        Err(e) => {
            tracing::error!(event = frame.event_name(), error = %e, "Failed to encode frame");
            None
        }
    }
}
