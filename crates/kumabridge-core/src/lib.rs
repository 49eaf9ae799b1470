// kumabridge-core: Connection registry, monitor cache and request/ack
// bridging between request/response callers and Socket.IO servers.

pub mod ack;
pub mod bridge;
pub mod config;
pub mod connection;
pub mod error;
pub mod establish;
pub mod model;
pub mod query;
pub mod registry;
pub mod store;
pub mod sync;

// ── Primary re-exports ──────────────────────────────────────────────
pub use bridge::Bridge;
pub use config::{BridgeSettings, Credentials};
pub use connection::{Connection, ConnectionInfo};
pub use error::CoreError;
pub use registry::ConnectionRegistry;
pub use store::MonitorCache;

pub use kumabridge_api::{ConnectionState, ReconnectConfig};

pub use model::{AckPayload, Destination, GroupSummary, Monitor, MonitorId};
