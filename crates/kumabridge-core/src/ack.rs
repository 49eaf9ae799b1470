// ── Request/acknowledgement bridging ──

use std::time::Duration;

use kumabridge_api::SocketClient;
use serde_json::Value;

use crate::error::CoreError;
use crate::model::AckPayload;

/// Emit `event_name` with `payload` as its single argument and wait up to
/// `timeout` for the acknowledgement.
///
/// Whichever comes first of the ack, the deadline or loss of the
/// transport decides the outcome. On timeout the ack slot is released,
/// so a late acknowledgement is discarded by the transport.
pub async fn emit_with_ack(
    client: &SocketClient,
    event_name: &str,
    payload: Value,
    timeout: Duration,
) -> Result<AckPayload, CoreError> {
    if !client.is_connected() {
        return Err(CoreError::TransportUnavailable);
    }

    let args = match tokio::time::timeout(timeout, client.emit_with_ack(event_name, vec![payload]))
        .await
    {
        Ok(result) => result?,
        Err(_) => {
            let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
            tracing::debug!(event = event_name, timeout_ms, "Acknowledgement timed out");
            return Err(CoreError::AckTimeout {
                event_name: event_name.to_owned(),
                timeout_ms,
            });
        }
    };

    let ack = AckPayload::from_args(args)?;
    if !ack.ok {
        tracing::debug!(
            event = event_name,
            msg = ack.message().unwrap_or(""),
            "Request rejected by server"
        );
        return Err(CoreError::RemoteRejected { ack: ack.to_value() });
    }
    Ok(ack)
}
