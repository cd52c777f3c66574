//! Time-based lock schedules.
//!
//! A schedule fires on whole wall-clock minutes: an entry is due for a
//! [`ScheduleSlot`] when it is enabled, its time of day equals the slot's
//! `HH:MM`, and the slot's weekday is one of its days.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, TimeZone, Timelike, Weekday};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::channel::ChannelKey;
use crate::error::CoreError;
use crate::protocol::LockCommand;
use crate::types::{DbId, DeviceId, OwnerId};

// ---------------------------------------------------------------------------
// TimeOfDay
// ---------------------------------------------------------------------------

/// A minute-resolution wall-clock time, rendered as zero-padded `HH:MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimeOfDay {
    hour: u8,
    minute: u8,
}

impl TimeOfDay {
    pub fn new(hour: u8, minute: u8) -> Result<Self, CoreError> {
        if hour > 23 || minute > 59 {
            return Err(CoreError::Validation(format!(
                "Time of day out of range: {hour}:{minute}"
            )));
        }
        Ok(Self { hour, minute })
    }

    pub fn hour(self) -> u8 {
        self.hour
    }

    pub fn minute(self) -> u8 {
        self.minute
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

impl FromStr for TimeOfDay {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || CoreError::Validation(format!("Expected HH:MM, got '{s}'"));
        let (h, m) = s.split_once(':').ok_or_else(invalid)?;
        if h.len() != 2 || m.len() != 2 {
            return Err(invalid());
        }
        let hour = h.parse().map_err(|_| invalid())?;
        let minute = m.parse().map_err(|_| invalid())?;
        Self::new(hour, minute)
    }
}

impl Serialize for TimeOfDay {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TimeOfDay {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// ScheduleSlot
// ---------------------------------------------------------------------------

/// One wall-clock minute in the dispatcher's time zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScheduleSlot {
    pub weekday: Weekday,
    pub time: TimeOfDay,
}

impl ScheduleSlot {
    pub fn new(weekday: Weekday, time: TimeOfDay) -> Self {
        Self { weekday, time }
    }

    /// The slot containing `instant`, read in the instant's own zone.
    pub fn of<Tz: TimeZone>(instant: &DateTime<Tz>) -> Self {
        // hour() and minute() are always in range, so construct directly.
        Self {
            weekday: instant.weekday(),
            time: TimeOfDay {
                hour: instant.hour() as u8,
                minute: instant.minute() as u8,
            },
        }
    }
}

impl fmt::Display for ScheduleSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.weekday, self.time)
    }
}

// ---------------------------------------------------------------------------
// ScheduleType
// ---------------------------------------------------------------------------

/// What a schedule does when it fires. Stored as `LOCK` / `UNLOCK`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ScheduleType {
    Lock,
    Unlock,
}

impl ScheduleType {
    pub fn as_db_str(self) -> &'static str {
        match self {
            ScheduleType::Lock => "LOCK",
            ScheduleType::Unlock => "UNLOCK",
        }
    }

    /// The controller command emitted when the schedule fires.
    pub fn command(self) -> LockCommand {
        match self {
            ScheduleType::Lock => LockCommand::Lock,
            ScheduleType::Unlock => LockCommand::Unlock,
        }
    }
}

impl FromStr for ScheduleType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "LOCK" => Ok(ScheduleType::Lock),
            "UNLOCK" => Ok(ScheduleType::Unlock),
            other => Err(CoreError::Validation(format!(
                "Unknown schedule type '{other}'"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// ScheduleEntry
// ---------------------------------------------------------------------------

/// Read-only view of a schedule as served by the device registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleEntry {
    pub id: DbId,
    pub device_id: DeviceId,
    pub owner_id: OwnerId,
    pub schedule_type: ScheduleType,
    pub days: Vec<Weekday>,
    pub time: TimeOfDay,
    pub enabled: bool,
}

impl ScheduleEntry {
    pub fn is_due(&self, slot: &ScheduleSlot) -> bool {
        self.enabled && self.time == slot.time && self.days.contains(&slot.weekday)
    }

    pub fn channel_key(&self) -> ChannelKey {
        ChannelKey::new(self.owner_id.clone(), self.device_id.clone())
    }
}

/// Parse a stored weekday abbreviation (`Mon`, `Tue`, ...).
pub fn parse_weekday(s: &str) -> Result<Weekday, CoreError> {
    s.parse()
        .map_err(|_| CoreError::Validation(format!("Unknown weekday '{s}'")))
}

/// The stored abbreviation for a weekday.
pub fn weekday_abbrev(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "Mon",
        Weekday::Tue => "Tue",
        Weekday::Wed => "Wed",
        Weekday::Thu => "Thu",
        Weekday::Fri => "Fri",
        Weekday::Sat => "Sat",
        Weekday::Sun => "Sun",
    }
}
