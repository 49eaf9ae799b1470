// ── Storage layer ──

pub(crate) mod collection;
mod monitor_cache;

pub use monitor_cache::MonitorCache;
