//! Heartbeat-driven device presence.
//!
//! Every heartbeat marks its device ONLINE, tells the channel's mobile peers,
//! and (re)arms a per-device expiry timer. A device whose timer elapses
//! without a newer heartbeat goes OFFLINE and mobile peers are told once.
//!
//! Each record carries a generation counter. Heartbeats, expiries,
//! disconnects and cancellations all mutate a record under its map-entry
//! lock, and an expiry only takes effect if the generation it was armed
//! with is still current. A heartbeat racing with its own expiry therefore
//! either lands first (and the expiry is a no-op) or lands second (and the
//! device goes OFFLINE then straight back ONLINE).

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use latchkey_core::channel::{ChannelKey, Role};
use latchkey_core::protocol::{DeviceStatus, DeviceStatusUpdate, Heartbeat, OutboundFrame};
use latchkey_core::types::{ConnId, DeviceId, OwnerId, Timestamp};
use serde::Serialize;
use tokio::task::JoinHandle;

use crate::relay::router::MessageRouter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceState {
    Online,
    Offline,
}

/// Point-in-time view of one tracked device.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceSnapshot {
    pub device_id: DeviceId,
    pub owner_id: OwnerId,
    pub device_name: String,
    pub state: PresenceState,
    #[serde(flatten)]
    pub status: DeviceStatus,
    pub last_heartbeat: Timestamp,
    pub timer_pending: bool,
}

struct PresenceRecord {
    owner_id: OwnerId,
    device_name: String,
    status: DeviceStatus,
    last_heartbeat: Timestamp,
    state: PresenceState,
    /// Connection that delivered the latest heartbeat.
    conn_id: ConnId,
    generation: u64,
    timer: Option<JoinHandle<()>>,
}

impl PresenceRecord {
    fn status_frame(&self, device_id: &str, online: bool) -> OutboundFrame {
        OutboundFrame::DeviceStatus(DeviceStatusUpdate {
            device_id: device_id.to_string(),
            device_name: self.device_name.clone(),
            online,
            status: self.status,
        })
    }

    fn channel_key(&self, device_id: &str) -> ChannelKey {
        ChannelKey::new(self.owner_id.clone(), device_id)
    }

    fn disarm(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        self.generation += 1;
    }
}

struct Inner {
    records: DashMap<DeviceId, PresenceRecord>,
    /// Devices whose latest heartbeat came over each connection.
    by_conn: DashMap<ConnId, HashSet<DeviceId>>,
    router: Arc<MessageRouter>,
    timeout: Duration,
}

impl Inner {
    fn announce(&self, record: &PresenceRecord, device_id: &str, online: bool) {
        let frame = record.status_frame(device_id, online);
        self.router
            .relay_to_role(&record.channel_key(device_id), Role::Mobile, &frame);
    }

    fn expire(&self, device_id: &str, generation: u64) {
        let Some(mut record) = self.records.get_mut(device_id) else {
            return;
        };
        if record.generation != generation || record.timer.is_none() {
            return;
        }
        // Dropping our own handle detaches the task, which is finishing anyway.
        record.timer = None;
        record.state = PresenceState::Offline;
        tracing::info!(device_id, owner_id = %record.owner_id, "Device heartbeat expired, offline");
        self.announce(&record, device_id, false);
    }
}

/// Shared handle to the presence table. Cloning is cheap.
#[derive(Clone)]
pub struct PresenceTracker {
    inner: Arc<Inner>,
}

impl PresenceTracker {
    pub fn new(router: Arc<MessageRouter>, timeout: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                records: DashMap::new(),
                by_conn: DashMap::new(),
                router,
                timeout,
            }),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.inner.timeout
    }

    /// Record a heartbeat received on `conn_id`.
    ///
    /// Must be called from within a Tokio runtime; the expiry timer is a
    /// spawned task.
    pub fn on_heartbeat(&self, conn_id: &str, heartbeat: &Heartbeat) {
        let device_id = heartbeat.device_id.clone();
        let now = chrono::Utc::now();

        let mut record = self
            .inner
            .records
            .entry(device_id.clone())
            .or_insert_with(|| PresenceRecord {
                owner_id: heartbeat.owner_id.clone(),
                device_name: heartbeat.device_name.clone(),
                status: heartbeat.status,
                last_heartbeat: now,
                state: PresenceState::Offline,
                conn_id: conn_id.to_string(),
                generation: 0,
                timer: None,
            });

        record.disarm();

        if record.conn_id != conn_id {
            if let Some(mut devices) = self.inner.by_conn.get_mut(&record.conn_id) {
                devices.remove(&device_id);
            }
            record.conn_id = conn_id.to_string();
        }
        self.inner
            .by_conn
            .entry(conn_id.to_string())
            .or_default()
            .insert(device_id.clone());

        record.owner_id = heartbeat.owner_id.clone();
        record.device_name = heartbeat.device_name.clone();
        record.status = heartbeat.status;
        record.last_heartbeat = now;
        if record.state != PresenceState::Online {
            tracing::info!(device_id = %device_id, owner_id = %record.owner_id, "Device online");
        }
        record.state = PresenceState::Online;

        let generation = record.generation;
        let inner = Arc::clone(&self.inner);
        let timer_device = device_id.clone();
        record.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(inner.timeout).await;
            inner.expire(&timer_device, generation);
        }));

        self.inner.announce(&record, &device_id, true);
    }

    /// A connection closed: every device whose latest heartbeat came over it
    /// goes OFFLINE now instead of waiting out its timer.
    pub fn on_disconnect(&self, conn_id: &str) {
        let Some((_, devices)) = self.inner.by_conn.remove(conn_id) else {
            return;
        };

        for device_id in devices {
            let Some(mut record) = self.inner.records.get_mut(&device_id) else {
                continue;
            };
            if record.conn_id != conn_id {
                continue;
            }
            record.disarm();
            if record.state == PresenceState::Online {
                record.state = PresenceState::Offline;
                tracing::info!(device_id = %device_id, conn_id, "Device connection closed, offline");
                self.inner.announce(&record, &device_id, false);
            }
        }
    }

    /// Forget a device without announcing anything.
    pub fn cancel(&self, device_id: &str) {
        let Some((_, mut record)) = self.inner.records.remove(device_id) else {
            return;
        };
        record.disarm();
        if let Some(mut devices) = self.inner.by_conn.get_mut(&record.conn_id) {
            devices.remove(device_id);
        }
        tracing::debug!(device_id, "Presence tracking cancelled");
    }

    /// Abort every pending timer and clear all state.
    pub fn shutdown(&self) {
        let mut aborted = 0usize;
        self.inner.records.retain(|_, record| {
            if record.timer.is_some() {
                aborted += 1;
            }
            record.disarm();
            false
        });
        self.inner.by_conn.clear();
        tracing::info!(aborted, "Presence tracker shut down");
    }

    pub fn snapshot(&self, device_id: &str) -> Option<PresenceSnapshot> {
        self.inner
            .records
            .get(device_id)
            .map(|record| PresenceSnapshot {
                device_id: device_id.to_string(),
                owner_id: record.owner_id.clone(),
                device_name: record.device_name.clone(),
                state: record.state,
                status: record.status,
                last_heartbeat: record.last_heartbeat,
                timer_pending: record.timer.is_some(),
            })
    }

    pub fn tracked_devices(&self) -> usize {
        self.inner.records.len()
    }
}
