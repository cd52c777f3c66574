//! Domain types shared by every latchkey crate.
//!
//! This crate has zero internal dependencies: it defines the identifiers,
//! the channel key, the WebSocket wire protocol, schedule matching and the
//! [`registry::DeviceRegistry`] seam that the relay consumes.

pub mod channel;
pub mod error;
pub mod protocol;
pub mod registry;
pub mod schedule;
pub mod types;
