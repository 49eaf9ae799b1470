// ── Domain model ──

pub mod ack;
pub mod destination;
pub mod monitor;

pub use ack::AckPayload;
pub use destination::Destination;
pub use monitor::{GROUP_KIND, GroupSummary, Monitor, MonitorId};
