//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async CRUD methods
//! that accept `&PgPool` as the first argument.

pub mod device_repo;
pub mod schedule_repo;

pub use device_repo::DeviceRepo;
pub use schedule_repo::ScheduleRepo;
