//! WebSocket wire protocol.
//!
//! Every text frame is a JSON envelope `{"event": <name>, "data": {...}}`.
//! Each event name has exactly one accepted payload shape; frames that do
//! not deserialize into it, or that fail validation, are rejected as a
//! whole with a [`FrameError`].

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::channel::ChannelKey;
use crate::types::{DeviceId, OwnerId};

// ---------------------------------------------------------------------------
// Event names
// ---------------------------------------------------------------------------

pub const EVENT_JOIN_AS_MOBILE: &str = "join_as_mobile";
pub const EVENT_JOIN_AS_DEVICE: &str = "join_as_device";
pub const EVENT_REGISTER_DEVICE: &str = "register_device";
pub const EVENT_HEARTBEAT: &str = "heartbeat";
pub const EVENT_COMMAND: &str = "command";
pub const EVENT_REQUEST_STATUS: &str = "request_status";
pub const EVENT_DEVICE_STATUS: &str = "device_status";
pub const EVENT_UNPAIR_DEVICE: &str = "unpair_device";

// ---------------------------------------------------------------------------
// Controller sub-state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockState {
    Locked,
    Unlocked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorState {
    Open,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuzzerState {
    On,
    Off,
}

/// Last reported controller state, carried from heartbeat to status events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceStatus {
    pub lock: LockState,
    pub sensor: SensorState,
    pub buzzer: BuzzerState,
}

/// A command a controller can execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockCommand {
    Lock,
    Unlock,
}

impl LockCommand {
    pub fn as_str(self) -> &'static str {
        match self {
            LockCommand::Lock => "lock",
            LockCommand::Unlock => "unlock",
        }
    }
}

// ---------------------------------------------------------------------------
// Inbound payloads
// ---------------------------------------------------------------------------

/// Payload of `join_as_mobile` and `join_as_device`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct JoinChannel {
    #[validate(length(min = 1, max = 254))]
    pub owner_id: OwnerId,
    #[validate(length(min = 1, max = 128))]
    pub device_id: DeviceId,
}

impl JoinChannel {
    pub fn channel_key(&self) -> ChannelKey {
        ChannelKey::new(self.owner_id.clone(), self.device_id.clone())
    }
}

/// Payload of an inbound `register_device`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RegisterDevice {
    #[validate(length(min = 1, max = 254))]
    pub owner_id: OwnerId,
    #[validate(length(min = 1, max = 64))]
    pub device_name: String,
}

/// Periodic liveness and status report from a controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct Heartbeat {
    #[validate(length(min = 1, max = 254))]
    pub owner_id: OwnerId,
    #[validate(length(min = 1, max = 128))]
    pub device_id: DeviceId,
    #[validate(length(max = 64))]
    pub device_name: String,
    #[serde(flatten)]
    pub status: DeviceStatus,
}

impl Heartbeat {
    pub fn channel_key(&self) -> ChannelKey {
        ChannelKey::new(self.owner_id.clone(), self.device_id.clone())
    }
}

/// A lock/unlock request issued by a mobile peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CommandRequest {
    #[validate(length(min = 1, max = 254))]
    pub owner_id: OwnerId,
    #[validate(length(min = 1, max = 128))]
    pub device_id: DeviceId,
    pub command: LockCommand,
}

impl CommandRequest {
    pub fn channel_key(&self) -> ChannelKey {
        ChannelKey::new(self.owner_id.clone(), self.device_id.clone())
    }
}

/// Every frame a client may send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum InboundFrame {
    JoinAsMobile(JoinChannel),
    JoinAsDevice(JoinChannel),
    RegisterDevice(RegisterDevice),
    Heartbeat(Heartbeat),
    Command(CommandRequest),
}

/// Reasons an inbound frame is dropped.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("Malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Invalid {event} payload: {source}")]
    Invalid {
        event: &'static str,
        source: validator::ValidationErrors,
    },
}

impl InboundFrame {
    /// Decode and validate a text frame.
    pub fn parse(text: &str) -> Result<Self, FrameError> {
        let frame: InboundFrame = serde_json::from_str(text)?;
        frame.validate()?;
        Ok(frame)
    }

    pub fn event_name(&self) -> &'static str {
        match self {
            InboundFrame::JoinAsMobile(_) => EVENT_JOIN_AS_MOBILE,
            InboundFrame::JoinAsDevice(_) => EVENT_JOIN_AS_DEVICE,
            InboundFrame::RegisterDevice(_) => EVENT_REGISTER_DEVICE,
            InboundFrame::Heartbeat(_) => EVENT_HEARTBEAT,
            InboundFrame::Command(_) => EVENT_COMMAND,
        }
    }

    fn validate(&self) -> Result<(), FrameError> {
        let result = match self {
            InboundFrame::JoinAsMobile(p) | InboundFrame::JoinAsDevice(p) => p.validate(),
            InboundFrame::RegisterDevice(p) => p.validate(),
            InboundFrame::Heartbeat(p) => p.validate(),
            InboundFrame::Command(p) => p.validate(),
        };
        result.map_err(|source| FrameError::Invalid {
            event: self.event_name(),
            source,
        })
    }
}

// ---------------------------------------------------------------------------
// Outbound payloads
// ---------------------------------------------------------------------------

/// Presence transition pushed to mobile peers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceStatusUpdate {
    pub device_id: DeviceId,
    pub device_name: String,
    pub online: bool,
    #[serde(flatten)]
    pub status: DeviceStatus,
}

/// Answer to an inbound `register_device`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterDeviceReply {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<DeviceId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_name: Option<String>,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RegisterDeviceReply {
    pub fn registered(device_id: DeviceId, device_name: String) -> Self {
        Self {
            device_id: Some(device_id),
            device_name: Some(device_name),
            success: true,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            device_id: None,
            device_name: None,
            success: false,
            error: Some(error.into()),
        }
    }
}

/// Every frame the relay may send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum OutboundFrame {
    RequestStatus {},
    Command { command: LockCommand },
    DeviceStatus(DeviceStatusUpdate),
    RegisterDevice(RegisterDeviceReply),
    UnpairDevice {},
}

impl OutboundFrame {
    pub fn event_name(&self) -> &'static str {
        match self {
            OutboundFrame::RequestStatus {} => EVENT_REQUEST_STATUS,
            OutboundFrame::Command { .. } => EVENT_COMMAND,
            OutboundFrame::DeviceStatus(_) => EVENT_DEVICE_STATUS,
            OutboundFrame::RegisterDevice(_) => EVENT_REGISTER_DEVICE,
            OutboundFrame::UnpairDevice {} => EVENT_UNPAIR_DEVICE,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
