//! Channel membership.
//!
//! Tracks which connections sit in which channel and in what role. A
//! connection belongs to at most one channel; joining another channel moves
//! it. Channels exist only while they have members.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use latchkey_core::channel::{ChannelKey, Role};
use latchkey_core::types::ConnId;

use crate::ws::WsConnection;

/// A connection's seat in a channel.
#[derive(Debug, Clone)]
pub struct Member {
    pub connection: Arc<WsConnection>,
    pub role: Role,
}

#[derive(Default)]
pub struct ChannelRegistry {
    channels: DashMap<ChannelKey, HashMap<ConnId, Member>>,
    by_conn: DashMap<ConnId, ChannelKey>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seat `connection` in `key` with `role`.
    ///
    /// Rejoining the same channel only updates the role. Returns the channel
    /// the connection was moved out of, if any.
    pub fn join(
        &self,
        key: ChannelKey,
        connection: &Arc<WsConnection>,
        role: Role,
    ) -> Option<ChannelKey> {
        let conn_id = connection.id().to_string();
        let previous = self
            .by_conn
            .insert(conn_id.clone(), key.clone())
            .filter(|prev| *prev != key);

        if let Some(prev) = &previous {
            self.remove_member(prev, &conn_id);
        }

        self.channels.entry(key.clone()).or_default().insert(
            conn_id.clone(),
            Member {
                connection: Arc::clone(connection),
                role,
            },
        );

        tracing::info!(conn_id = %conn_id, channel = %key, role = %role, "Joined channel");
        previous
    }

    /// Remove a connection from whatever channel it is in.
    pub fn leave(&self, conn_id: &str) -> Option<ChannelKey> {
        let (_, key) = self.by_conn.remove(conn_id)?;
        self.remove_member(&key, conn_id);
        tracing::debug!(conn_id, channel = %key, "Left channel");
        Some(key)
    }

    /// Snapshot of a channel's members.
    pub fn members(&self, key: &ChannelKey) -> Vec<Member> {
        self.channels
            .get(key)
            .map(|members| members.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn channel_of(&self, conn_id: &str) -> Option<ChannelKey> {
        self.by_conn.get(conn_id).map(|entry| entry.value().clone())
    }

    pub fn role_of(&self, conn_id: &str) -> Option<Role> {
        let key = self.channel_of(conn_id)?;
        self.channels
            .get(&key)
            .and_then(|members| members.get(conn_id).map(|m| m.role))
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Number of connections seated in some channel.
    pub fn member_count(&self) -> usize {
        self.by_conn.len()
    }

    fn remove_member(&self, key: &ChannelKey, conn_id: &str) {
        let now_empty = match self.channels.get_mut(key) {
            Some(mut members) => {
                members.remove(conn_id);
                members.is_empty()
            }
            None => false,
        };
        if now_empty {
            // Re-checked under the shard lock: a concurrent join may have refilled it.
            self.channels.remove_if(key, |_, members| members.is_empty());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn(id: &str) -> Arc<WsConnection> {
        WsConnection::new(id, 8).0
    }

    #[test]
    fn join_then_leave_drops_empty_channel() {
        let registry = ChannelRegistry::new();
        let key = ChannelKey::new("alice", "d1");
        let c1 = conn("c1");

        assert!(registry.join(key.clone(), &c1, Role::Mobile).is_none());
        assert_eq!(registry.channel_count(), 1);
        assert_eq!(registry.role_of("c1"), Some(Role::Mobile));

        assert_eq!(registry.leave("c1"), Some(key));
        assert_eq!(registry.channel_count(), 0);
        assert_eq!(registry.member_count(), 0);
    }

    #[test]
    fn joining_another_channel_moves_the_connection() {
        let registry = ChannelRegistry::new();
        let first = ChannelKey::new("alice", "d1");
        let second = ChannelKey::new("alice", "d2");
        let c1 = conn("c1");

        registry.join(first.clone(), &c1, Role::Mobile);
        assert_eq!(registry.join(second.clone(), &c1, Role::Mobile), Some(first.clone()));

        assert!(registry.members(&first).is_empty());
        assert_eq!(registry.members(&second).len(), 1);
        assert_eq!(registry.channel_of("c1"), Some(second));
        assert_eq!(registry.channel_count(), 1);
    }

    #[test]
    fn rejoining_same_channel_updates_role() {
        let registry = ChannelRegistry::new();
        let key = ChannelKey::new("alice", "d1");
        let c1 = conn("c1");

        registry.join(key.clone(), &c1, Role::Mobile);
        assert!(registry.join(key.clone(), &c1, Role::Device).is_none());

        assert_eq!(registry.members(&key).len(), 1);
        assert_eq!(registry.role_of("c1"), Some(Role::Device));
    }

    #[test]
    fn leave_of_unknown_connection_is_noop() {
        let registry = ChannelRegistry::new();
        assert!(registry.leave("ghost").is_none());
    }
}
