//! Per-connection liveness check, independent of the sampling cadence.
//!
//! The server waits up to one heartbeat interval for any viewer frame. A
//! literal `"ping"` is answered with `"pong"`; anything else is ignored. If
//! the wait expires the server sends its own `"ping"`, and a failed send ends
//! the session.

use std::time::Duration;

use futures_util::{Stream, StreamExt};
use tokio::time::timeout;

use crate::error::DeliveryError;
use crate::registry::ConnectionHandle;

pub const PING: &str = "ping";
pub const PONG: &str = "pong";

#[derive(Debug, PartialEq, Eq)]
pub enum HeartbeatEnd {
    /// Inbound stream finished (close frame, error, or socket gone).
    ViewerClosed,
    /// A ping or pong could not be queued; the connection is dead.
    SendFailed(DeliveryError),
}

/// Drive the heartbeat until the viewer goes away or a send fails.
pub async fn run_heartbeat<S>(
    mut inbound: S,
    outbound: ConnectionHandle,
    interval: Duration,
    send_timeout: Duration,
) -> HeartbeatEnd
where
    S: Stream<Item = String> + Unpin,
{
    loop {
        match timeout(interval, inbound.next()).await {
            Ok(Some(text)) => {
                if text == PING {
                    if let Err(e) = outbound.deliver(PONG.to_string(), send_timeout).await {
                        return HeartbeatEnd::SendFailed(e);
                    }
                } else {
                    tracing::trace!(conn = %outbound.id(), len = text.len(), "Ignoring viewer frame");
                }
            }
            Ok(None) => return HeartbeatEnd::ViewerClosed,
            Err(_) => {
                if let Err(e) = outbound.deliver(PING.to_string(), send_timeout).await {
                    return HeartbeatEnd::SendFailed(e);
                }
            }
        }
    }
}
