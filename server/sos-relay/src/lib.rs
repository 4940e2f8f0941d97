//! SOS Incident Relay: real-time panic signal fan-out over WebSocket.
//!
//! Tourists submit SOS events, every connected client receives them, admins
//! acknowledge them and the acknowledgment is broadcast back. One broker task
//! owns the incident table; socket tasks only post messages to it.
//!
//! No auth, no DB, no clustering; in-memory state only.

pub mod broker;
pub mod config;
pub mod engine;
pub mod error;
pub mod handlers;
pub mod id;
pub mod normalize;
pub mod types;

pub use broker::{Broker, BrokerHandle, ConnectionId};
pub use config::{AllowedOrigins, BrokerConfig, RelayConfig};
pub use engine::Engine;
pub use error::RelayError;
pub use handlers::router;
pub use types::{Incident, IncidentStatus, OutboundEvent};
