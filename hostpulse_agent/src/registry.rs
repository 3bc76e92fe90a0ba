//! Live viewer connections and fan-out.
//!
//! Each viewer is represented by a [`ConnectionHandle`]: the sending half of a
//! bounded queue drained by that connection's writer task. Every frame is one
//! whole queue item, so broadcasts and heartbeat replies interleave without
//! corrupting each other.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::{mpsc, mpsc::error::SendTimeoutError, Mutex};

use crate::error::DeliveryError;

/// Outbound frames buffered per viewer before a send starts waiting.
pub const QUEUE_CAPACITY: usize = 32;

/// How long one delivery may wait on a full queue.
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(5);

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnId(u64);

impl std::fmt::Display for ConnId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnId,
    tx: mpsc::Sender<String>,
}

impl ConnectionHandle {
    /// New handle plus the receiver its writer task must drain.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let id = ConnId(NEXT_ID.fetch_add(1, Ordering::Relaxed));
        (Self { id, tx }, rx)
    }

    pub fn id(&self) -> ConnId {
        self.id
    }

    /// Queue one complete frame for this viewer.
    pub async fn deliver(&self, frame: String, timeout: Duration) -> Result<(), DeliveryError> {
        match self.tx.send_timeout(frame, timeout).await {
            Ok(()) => Ok(()),
            Err(SendTimeoutError::Closed(_)) => Err(DeliveryError::Closed),
            Err(SendTimeoutError::Timeout(_)) => Err(DeliveryError::TimedOut),
        }
    }
}

/// Outcome of one [`ConnectionRegistry::broadcast`] call.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub dropped: usize,
}

/// The set of live viewers.
///
/// Every read-modify-write of the set happens under one mutex. Broadcast holds
/// it only to copy the recipient list and to prune failures afterwards, so a
/// slow viewer never blocks register/unregister.
pub struct ConnectionRegistry {
    live: Mutex<Vec<ConnectionHandle>>,
    send_timeout: Duration,
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::with_send_timeout(DEFAULT_SEND_TIMEOUT)
    }

    pub fn with_send_timeout(send_timeout: Duration) -> Self {
        Self {
            live: Mutex::new(Vec::new()),
            send_timeout,
        }
    }

    pub async fn register(&self, handle: ConnectionHandle) {
        let mut live = self.live.lock().await;
        if !live.iter().any(|h| h.id == handle.id) {
            live.push(handle);
        }
        tracing::info!(total = live.len(), "Viewer registered");
    }

    /// Remove a viewer. Returns whether it was present; absent ids are a no-op.
    pub async fn unregister(&self, id: ConnId) -> bool {
        let mut live = self.live.lock().await;
        let before = live.len();
        live.retain(|h| h.id != id);
        let removed = live.len() != before;
        if removed {
            tracing::info!(conn = %id, total = live.len(), "Viewer unregistered");
        }
        removed
    }

    /// Send `frame` to everyone registered right now, then drop the viewers
    /// whose delivery failed.
    pub async fn broadcast(&self, frame: &str) -> BroadcastReport {
        let recipients: Vec<ConnectionHandle> = self.live.lock().await.clone();
        if recipients.is_empty() {
            return BroadcastReport::default();
        }

        let timeout = self.send_timeout;
        let results = join_all(recipients.iter().map(|h| async move {
            (h.id, h.deliver(frame.to_owned(), timeout).await)
        }))
        .await;

        let failed: Vec<ConnId> = results
            .into_iter()
            .filter_map(|(id, r)| match r {
                Ok(()) => None,
                Err(e) => {
                    tracing::warn!(conn = %id, error = %e, "Failed to send to viewer");
                    Some(id)
                }
            })
            .collect();

        if !failed.is_empty() {
            let mut live = self.live.lock().await;
            live.retain(|h| !failed.contains(&h.id));
        }

        BroadcastReport {
            delivered: recipients.len() - failed.len(),
            dropped: failed.len(),
        }
    }

    pub async fn count(&self) -> usize {
        self.live.lock().await.len()
    }
}
