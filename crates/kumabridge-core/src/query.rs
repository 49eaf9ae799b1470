// ── Read-only queries over a connection's monitor cache ──

use crate::connection::Connection;
use crate::error::CoreError;
use crate::model::{GroupSummary, Monitor};

/// Every cached monitor, in no particular order.
pub fn list_monitors(connection: &Connection) -> Result<Vec<Monitor>, CoreError> {
    ensure_connected(connection)?;
    Ok(connection.cache().monitors())
}

/// Cached group monitors, projected to `id` and `name`.
pub fn list_groups(connection: &Connection) -> Result<Vec<GroupSummary>, CoreError> {
    ensure_connected(connection)?;
    Ok(connection.cache().groups())
}

fn ensure_connected(connection: &Connection) -> Result<(), CoreError> {
    if connection.is_connected() {
        Ok(())
    } else {
        Err(CoreError::TransportUnavailable)
    }
}
