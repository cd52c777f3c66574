/// Database-generated primary keys (schedules) are PostgreSQL BIGSERIAL.
pub type DbId = i64;

/// Device identities are opaque strings assigned by the device registry.
pub type DeviceId = String;

/// Owner identities are opaque strings (an email address in practice).
pub type OwnerId = String;

/// Connection identities are UUID v4 strings assigned on upgrade.
pub type ConnId = String;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
