//! Connection registry: the set of live subscribers and fan-out to them.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use axum::extract::ws::Utf8Bytes;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Sending half of a subscriber's frame queue.
pub type Outbox = mpsc::Sender<Utf8Bytes>;

/// Identity of one registered subscriber connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Result of one broadcast pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub evicted: usize,
}

struct Member {
    outbox: Outbox,
    /// Cancelled when the member leaves the registry; the socket task stops on it.
    closed: CancellationToken,
}

impl Member {
    fn close(self) {
        self.closed.cancel();
    }
}

/// Registry of live subscriber connections.
///
/// Insert, remove and broadcast all take the same lock, so a broadcast pass
/// sees a consistent membership and evictions never race a concurrent add.
/// Delivery is a non-blocking push into each connection's outbox; transport
/// writes happen in the connection's own task, never under the lock.
#[derive(Default)]
pub struct ConnectionRegistry {
    clients: Mutex<HashMap<ConnectionId, Member>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a freshly upgraded connection.
    ///
    /// `closed` is cancelled as soon as the connection is removed or evicted;
    /// its owner must stop writing to the transport at that point.
    pub fn add(&self, outbox: Outbox, closed: CancellationToken) -> ConnectionId {
        let id = ConnectionId::new();
        self.lock().insert(id, Member { outbox, closed });
        tracing::info!(conn = %id, "client connected");
        id
    }

    /// Deregister a connection. Returns `false` if it was already gone.
    pub fn remove(&self, id: ConnectionId) -> bool {
        let Some(member) = self.lock().remove(&id) else {
            return false;
        };
        member.close();
        tracing::info!(conn = %id, "client disconnected");
        true
    }

    /// Push `payload` to every registered connection, evicting those that cannot take it.
    ///
    /// A connection fails delivery when its outbox is closed (transport gone) or
    /// full (consumer too slow). Evicted connections are signalled to close at
    /// once; frames still queued for them are discarded. Failures never surface
    /// to the caller.
    pub fn broadcast(&self, payload: Utf8Bytes) -> BroadcastReport {
        let mut report = BroadcastReport::default();
        self.lock()
            .retain(|id, member| match member.outbox.try_send(payload.clone()) {
                Ok(()) => {
                    report.delivered += 1;
                    true
                }
                Err(TrySendError::Full(_)) => {
                    tracing::warn!(conn = %id, "client outbox full, evicting");
                    member.closed.cancel();
                    report.evicted += 1;
                    false
                }
                Err(TrySendError::Closed(_)) => {
                    tracing::debug!(conn = %id, "client transport closed, evicting");
                    member.closed.cancel();
                    report.evicted += 1;
                    false
                }
            });
        report
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.lock().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ConnectionId, Member>> {
        // Entries are independent; a panic mid-operation cannot leave the map inconsistent.
        self.clients.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
