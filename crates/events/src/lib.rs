//! In-process notifications from the device registry.
//!
//! The registry owns device records; the relay reacts to changes in them
//! (a removed device must be told to unpair). [`EventBus`] carries those
//! changes from whichever registry implementation is running to the relay
//! without either side holding a reference to the other.

pub mod bus;

pub use bus::{DeviceRemoved, EventBus, PlatformEvent, RegistryEvent};
