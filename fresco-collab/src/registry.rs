//! Live-connection registry and fan-out channel.
//!
//! All connections share one tokio broadcast channel of [`Outbound`]
//! envelopes; each connection's task holds a receiver and filters on the
//! envelope's routing fields. An envelope either excludes its originator
//! (delta fan-out — an edit is never echoed to the client that made it) or
//! names a single target (per-identity quota pushes at replenishment).
//!
//! Sending is synchronous and never blocks: a connection that stops
//! draining its receiver observes `RecvError::Lagged` and is torn down by
//! its own task, leaving every other connection untouched.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

/// Opaque per-connection id. Distinct from identity: one identity may have
/// several simultaneous connections.
pub type ConnectionId = Uuid;

/// A routed frame on the fan-out channel.
#[derive(Debug, Clone)]
pub struct Outbound {
    /// Connection that caused this frame.
    pub origin: ConnectionId,
    /// Sole recipient, or None for everyone-but-origin.
    pub target: Option<ConnectionId>,
    /// Pre-encoded JSON text, shared across receivers.
    pub frame: Arc<String>,
}

impl Outbound {
    /// Fan out to every connection except `origin`.
    pub fn to_all_but(origin: ConnectionId, frame: Arc<String>) -> Self {
        Self {
            origin,
            target: None,
            frame,
        }
    }

    /// Deliver to exactly one connection.
    pub fn to_one(target: ConnectionId, frame: Arc<String>) -> Self {
        Self {
            origin: target,
            target: Some(target),
            frame,
        }
    }

    /// Whether the connection `id` should forward this envelope.
    pub fn delivers_to(&self, id: ConnectionId) -> bool {
        match self.target {
            Some(target) => target == id,
            None => self.origin != id,
        }
    }
}

/// What the registry remembers about a live connection.
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    /// Quota identity this connection resolves to.
    pub identity: String,
}

/// Registry statistics.
#[derive(Debug, Clone, Default)]
pub struct RegistryStats {
    pub frames_sent: u64,
    pub active_connections: usize,
}

/// The hub's set of live connections plus the shared fan-out channel.
pub struct ConnectionRegistry {
    sender: broadcast::Sender<Outbound>,
    connections: RwLock<HashMap<ConnectionId, ConnectionInfo>>,
    capacity: usize,
    frames_sent: AtomicU64,
}

impl ConnectionRegistry {
    /// Create a registry whose receivers buffer up to `capacity` envelopes.
    ///
    /// `capacity` bounds how far a slow connection may fall behind before
    /// it lags out and is dropped.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            connections: RwLock::new(HashMap::new()),
            capacity,
            frames_sent: AtomicU64::new(0),
        }
    }

    /// Register a new connection under `identity`.
    ///
    /// Returns the connection id and its fan-out receiver. The receiver is
    /// subscribed inside this call, so a caller that registers and snapshots
    /// the grid under one hub lock cannot miss a delta in between.
    pub async fn register(&self, identity: String) -> (ConnectionId, broadcast::Receiver<Outbound>) {
        let id = Uuid::new_v4();
        let rx = self.sender.subscribe();
        self.connections
            .write()
            .await
            .insert(id, ConnectionInfo { identity });
        (id, rx)
    }

    /// Drop a connection from the registry.
    pub async fn deregister(&self, id: &ConnectionId) -> Option<ConnectionInfo> {
        self.connections.write().await.remove(id)
    }

    /// Push an envelope onto the fan-out channel.
    ///
    /// Non-blocking; returns the number of live receivers. Zero receivers
    /// is not an error (a lone painter has no one to fan out to).
    pub fn send(&self, outbound: Outbound) -> usize {
        let count = self.sender.send(outbound).unwrap_or(0);
        self.frames_sent.fetch_add(1, Ordering::Relaxed);
        count
    }

    /// All live connections with their identities, for replenishment pushes.
    pub async fn connections(&self) -> Vec<(ConnectionId, String)> {
        self.connections
            .read()
            .await
            .iter()
            .map(|(id, info)| (*id, info.identity.clone()))
            .collect()
    }

    /// Current live-connection count.
    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Whether `id` is registered.
    pub async fn has_connection(&self, id: &ConnectionId) -> bool {
        self.connections.read().await.contains_key(id)
    }

    /// Receiver buffer capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Registry statistics snapshot.
    pub async fn stats(&self) -> RegistryStats {
        RegistryStats {
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            active_connections: self.connections.read().await.len(),
        }
    }
}
