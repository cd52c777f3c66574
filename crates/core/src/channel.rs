//! Channel keys and peer roles.
//!
//! A channel groups every connection that talks about one device on behalf
//! of one owner. Two connections are peers iff they share a [`ChannelKey`].

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::{DeviceId, OwnerId};

/// Composite key identifying one mobile-to-device pairing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelKey {
    pub owner_id: OwnerId,
    pub device_id: DeviceId,
}

impl ChannelKey {
    pub fn new(owner_id: impl Into<OwnerId>, device_id: impl Into<DeviceId>) -> Self {
        Self {
            owner_id: owner_id.into(),
            device_id: device_id.into(),
        }
    }
}

impl fmt::Display for ChannelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-device-{}", self.owner_id, self.device_id)
    }
}

/// Which side of a channel a connection speaks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// A mobile control app.
    Mobile,
    /// An embedded lock controller.
    Device,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Mobile => "mobile",
            Role::Device => "device",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_matches_room_naming() {
        let key = ChannelKey::new("alice@example.com", "d1");
        assert_eq!(key.to_string(), "alice@example.com-device-d1");
    }

    #[test]
    fn keys_differ_by_owner() {
        assert_ne!(ChannelKey::new("alice", "d1"), ChannelKey::new("bob", "d1"));
    }
}
