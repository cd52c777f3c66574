//! WebSocket infrastructure for the relay.
//!
//! Provides per-connection handles, connection management, the liveness
//! sweep, and the HTTP upgrade handler used by Axum routes.

pub mod connection;
mod handler;
mod heartbeat;
pub mod manager;

pub use connection::{DeliveryError, WsConnection};
pub use handler::ws_handler;
pub use heartbeat::start_heartbeat;
pub use manager::{SweepReport, WsManager};
