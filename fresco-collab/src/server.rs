//! The canvas hub: WebSocket server, edit pipeline, schedulers.
//!
//! Architecture:
//! ```text
//! Client A ──┐
//!             ├── CanvasServer ── Mutex<HubState> ── PixelGrid
//! Client B ──┤        │                 │            QuotaLedger
//! Client C ──┘        │                 │            dirty flag
//!                     │                 │
//!                     │        ConnectionRegistry (fan-out channel)
//!                     │                 │
//!                     │        ┌────────┼────────┐
//!                     │        ▼        ▼        ▼
//!                     │    Client A  Client B  Client C
//!                     │
//!                     └── SnapshotStore (timestamped PNGs, flushed when dirty)
//! ```
//!
//! One `Mutex<HubState>` is the serialization point for every grid and
//! ledger mutation. Edits from all connections funnel through it, which is
//! what makes quota consumption and cell writes linearizable; delta
//! envelopes are pushed onto the fan-out channel *inside* that critical
//! section, so third parties observe edits in exactly the order the hub
//! accepted them. The lock is never held across network I/O.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::time::{interval_at, Instant};

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

use fresco_core::{Color, PixelGrid};

type WsSink = SplitSink<WebSocketStream<TcpStream>, Message>;
type WsStream = SplitStream<WebSocketStream<TcpStream>>;

use crate::protocol::{ClientFrame, ServerEvent};
use crate::quota::QuotaLedger;
use crate::registry::{ConnectionId, ConnectionRegistry, Outbound};
use crate::storage::{SnapshotStore, StoreError};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the WebSocket listener to.
    pub bind_addr: String,
    /// Canvas side length; the grid holds `grid_size²` cells.
    pub grid_size: usize,
    /// Pixels granted to each new identity and restored on reset.
    pub initial_quota: u32,
    /// Fan-out buffer per connection; a connection this far behind is
    /// dropped rather than allowed to stall the others.
    pub broadcast_capacity: usize,
    /// Snapshot directory (None = volatile canvas, nothing persisted).
    pub snapshot_dir: Option<PathBuf>,
    /// How often the dirty canvas is flushed to a snapshot.
    pub flush_interval: Duration,
    /// How often every identity's quota is restored.
    pub reset_period: Duration,
    /// How long a graceful shutdown may spend on the final flush.
    pub shutdown_grace: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            grid_size: 200,
            initial_quota: 1000,
            broadcast_capacity: 256,
            snapshot_dir: None,
            flush_interval: Duration::from_secs(15 * 60),
            reset_period: Duration::from_secs(12 * 60 * 60),
            shutdown_grace: Duration::from_secs(5),
        }
    }
}

/// Server statistics.
#[derive(Debug, Clone, Default)]
pub struct ServerStats {
    pub total_connections: u64,
    pub active_connections: u64,
    pub accepted_edits: u64,
    pub noop_edits: u64,
    pub rejected_edits: u64,
    pub snapshots_written: u64,
}

/// Hub errors.
#[derive(Debug)]
pub enum ServerError {
    /// Listener or transport failure at the accept loop.
    Io(String),
    /// Snapshot store could not be opened.
    Store(StoreError),
}

impl std::fmt::Display for ServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServerError::Io(e) => write!(f, "I/O error: {e}"),
            ServerError::Store(e) => write!(f, "snapshot store error: {e}"),
        }
    }
}

impl std::error::Error for ServerError {}

impl From<std::io::Error> for ServerError {
    fn from(e: std::io::Error) -> Self {
        ServerError::Io(e.to_string())
    }
}

impl From<StoreError> for ServerError {
    fn from(e: StoreError) -> Self {
        ServerError::Store(e)
    }
}

/// What the hub decided about one edit request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditOutcome {
    /// Index outside the grid. Rejected locally; the caller gets no reply
    /// and nobody else hears about it.
    OutOfBounds,
    /// Requested color equals the current cell: no mutation, no broadcast,
    /// and — the quota policy here — no charge.
    Noop { remaining: u32 },
    /// Identity has no pixels left: no mutation, no broadcast, no charge.
    Exhausted { remaining: u32 },
    /// Cell written, quota charged, delta fanned out to everyone else.
    Accepted { remaining: u32 },
}

impl EditOutcome {
    /// The quota-status event owed to the caller, if any.
    ///
    /// Every in-bounds edit request is answered with the identity's current
    /// balance; out-of-bounds requests are dropped silently.
    pub fn reply(&self) -> Option<ServerEvent> {
        match self {
            EditOutcome::OutOfBounds => None,
            EditOutcome::Noop { remaining }
            | EditOutcome::Exhausted { remaining }
            | EditOutcome::Accepted { remaining } => {
                Some(ServerEvent::pixels_remaining(*remaining))
            }
        }
    }
}

/// Shared mutable hub state; one lock, one serialization point.
struct HubState {
    grid: PixelGrid,
    ledger: QuotaLedger,
    dirty: bool,
}

/// The canvas synchronization hub.
///
/// Cheap to clone: every field is shared, so connection tasks and
/// schedulers each hold a handle to the same hub.
#[derive(Clone)]
pub struct CanvasServer {
    config: ServerConfig,
    state: Arc<Mutex<HubState>>,
    registry: Arc<ConnectionRegistry>,
    store: Option<Arc<SnapshotStore>>,
    stats: Arc<RwLock<ServerStats>>,
}

impl CanvasServer {
    /// Create a hub, opening the snapshot store and recovering the canvas.
    ///
    /// An empty (or absent) snapshot directory is not an error: the hub
    /// starts with a freshly generated canvas. A store that cannot be
    /// opened at all is fatal — running unable to persist would silently
    /// discard every edit at shutdown.
    pub fn new(config: ServerConfig) -> Result<Self, ServerError> {
        let store = match &config.snapshot_dir {
            Some(dir) => Some(Arc::new(SnapshotStore::new(dir)?)),
            None => None,
        };
        let grid = Self::recover_grid(&config, store.as_deref());

        Ok(Self {
            state: Arc::new(Mutex::new(HubState {
                grid,
                ledger: QuotaLedger::new(config.initial_quota),
                dirty: false,
            })),
            registry: Arc::new(ConnectionRegistry::new(config.broadcast_capacity)),
            store,
            stats: Arc::new(RwLock::new(ServerStats::default())),
            config,
        })
    }

    /// Create with default configuration (volatile, no persistence).
    pub fn with_defaults() -> Self {
        Self::new(ServerConfig::default()).expect("default config has no store to fail")
    }

    fn recover_grid(config: &ServerConfig, store: Option<&SnapshotStore>) -> PixelGrid {
        if let Some(store) = store {
            match store.load_most_recent() {
                Ok((size, cells)) => {
                    if size != config.grid_size {
                        let want = config.grid_size;
                        log::warn!(
                            "snapshot is {size}x{size} but config wants {want}x{want}; keeping the snapshot"
                        );
                    }
                    match PixelGrid::from_cells(size, cells) {
                        Ok(grid) => {
                            log::info!("recovered {size}x{size} canvas from snapshot");
                            return grid;
                        }
                        Err(e) => log::error!("discarding malformed snapshot: {e}"),
                    }
                }
                Err(StoreError::NoSnapshots) => {
                    log::info!("no snapshots found, starting with a fresh canvas");
                }
                Err(e) => log::error!("snapshot recovery failed, starting fresh: {e}"),
            }
        }
        PixelGrid::speckled(config.grid_size)
    }

    /// Run the hub: bind, start the schedulers, accept connections forever.
    pub async fn run(&self) -> Result<(), ServerError> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        log::info!("canvas server listening on {}", self.config.bind_addr);

        self.spawn_schedulers();

        loop {
            let (stream, addr) = listener.accept().await?;
            log::debug!("new TCP connection from {addr}");

            let server = self.clone();
            tokio::spawn(async move {
                if let Err(e) = server.handle_connection(stream, addr).await {
                    log::warn!("connection from {addr} ended with error: {e}");
                }
            });
        }
    }

    /// Spawn the periodic flush and quota-reset tasks.
    ///
    /// Tickers start one period out — there is nothing to flush and nothing
    /// to replenish at time zero.
    fn spawn_schedulers(&self) {
        if self.store.is_some() {
            let server = self.clone();
            let period = self.config.flush_interval;
            tokio::spawn(async move {
                let mut ticker = interval_at(Instant::now() + period, period);
                loop {
                    ticker.tick().await;
                    if let Err(e) = server.flush_if_dirty().await {
                        log::error!("snapshot flush failed, retrying next tick: {e}");
                    }
                }
            });
        }

        let server = self.clone();
        let period = self.config.reset_period;
        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            loop {
                ticker.tick().await;
                server.reset_quotas().await;
            }
        });
    }

    /// Serve one client for the lifetime of its connection.
    async fn handle_connection(
        self,
        stream: TcpStream,
        addr: SocketAddr,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let ws_stream = tokio_tungstenite::accept_async(stream).await?;
        let (mut ws_sender, mut ws_receiver) = ws_stream.split();

        // Identity is the origin host, not host:port — reconnects and
        // parallel sockets from one machine share a quota pool.
        let identity = addr.ip().to_string();
        log::info!("client connected from {addr} (identity {identity})");

        // Baseline under one critical section: the fan-out subscription and
        // the grid snapshot it applies to are taken together, so no delta
        // can fall in the gap and none can be duplicated.
        let (conn_id, mut fanout_rx, remaining, baseline) = {
            let mut st = self.state.lock().await;
            let remaining = st.ledger.remaining(&identity);
            let (conn_id, rx) = self.registry.register(identity.clone()).await;
            (conn_id, rx, remaining, st.grid.snapshot())
        };

        {
            let mut s = self.stats.write().await;
            s.total_connections += 1;
            s.active_connections += 1;
        }

        let served = self
            .serve(
                &mut ws_sender,
                &mut ws_receiver,
                &mut fanout_rx,
                conn_id,
                &identity,
                remaining,
                baseline,
            )
            .await;

        // Cleanup runs on every exit path; a broken connection degrades
        // only itself.
        self.registry.deregister(&conn_id).await;
        {
            let mut s = self.stats.write().await;
            s.active_connections -= 1;
        }
        log::info!("client {identity} disconnected");

        served
    }

    /// The per-connection protocol loop: handshake, then inbound edits
    /// interleaved with fan-out deliveries.
    #[allow(clippy::too_many_arguments)]
    async fn serve(
        &self,
        ws_sender: &mut WsSink,
        ws_receiver: &mut WsStream,
        fanout_rx: &mut broadcast::Receiver<Outbound>,
        conn_id: ConnectionId,
        identity: &str,
        remaining: u32,
        baseline: Vec<Color>,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        // Quota first, then the full image — the baseline order clients
        // rely on before any delta arrives.
        let quota_json = ServerEvent::pixels_remaining(remaining).encode()?;
        ws_sender.send(Message::Text(quota_json.into())).await?;
        let image_json = ServerEvent::initial_image(baseline).encode()?;
        ws_sender.send(Message::Text(image_json.into())).await?;

        loop {
            tokio::select! {
                inbound = ws_receiver.next() => {
                    match inbound {
                        Some(Ok(Message::Text(text))) => {
                            match ClientFrame::decode(text.as_str()) {
                                Ok(frame) => {
                                    let outcome = self.apply_edit(conn_id, identity, frame).await;
                                    if let Some(reply) = outcome.reply() {
                                        let json = reply.encode()?;
                                        ws_sender.send(Message::Text(json.into())).await?;
                                    }
                                }
                                Err(e) => {
                                    log::warn!("undecodable frame from {identity}: {e}");
                                }
                            }
                        }
                        Some(Ok(Message::Ping(data))) => {
                            ws_sender.send(Message::Pong(data)).await?;
                        }
                        Some(Ok(Message::Close(_))) | None => break,
                        Some(Ok(_)) => {
                            // Binary frames are not part of the protocol.
                            log::debug!("ignoring non-text frame from {identity}");
                        }
                        Some(Err(e)) => {
                            log::warn!("websocket error from {identity}: {e}");
                            break;
                        }
                    }
                }

                fanout = fanout_rx.recv() => {
                    match fanout {
                        Ok(out) => {
                            if out.delivers_to(conn_id) {
                                ws_sender.send(Message::Text(out.frame.as_str().into())).await?;
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            // This connection missed deltas; its view can no
                            // longer be patched consistently. Drop it and let
                            // the client reconnect for a fresh baseline.
                            log::warn!("connection of {identity} lagged by {n} frames, dropping");
                            break;
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            }
        }

        Ok(())
    }

    /// Decide one edit request. The whole pipeline — bounds check, no-op
    /// check, quota charge, cell write, delta fan-out — happens under the
    /// state lock, which is what gives cross-client ordering.
    ///
    /// Quota policy: the no-op check runs *before* the charge, so redundant
    /// edits never cost a pixel.
    pub async fn apply_edit(
        &self,
        origin: ConnectionId,
        identity: &str,
        frame: ClientFrame,
    ) -> EditOutcome {
        let outcome = {
            let mut st = self.state.lock().await;
            match st.grid.get(frame.index) {
                Err(_) => {
                    log::debug!(
                        "rejecting out-of-bounds index {} from {identity}",
                        frame.index
                    );
                    EditOutcome::OutOfBounds
                }
                Ok(current) if current == frame.color => EditOutcome::Noop {
                    remaining: st.ledger.remaining(identity),
                },
                Ok(_) => {
                    if !st.ledger.try_consume(identity, 1) {
                        log::debug!("no pixels left for {identity}");
                        EditOutcome::Exhausted {
                            remaining: st.ledger.remaining(identity),
                        }
                    } else {
                        if let Err(e) = st.grid.set(frame.index, frame.color) {
                            // Unreachable after the bounds check above; kept
                            // as a loud failure rather than a silent discard.
                            log::error!("grid write failed after bounds check: {e}");
                            return EditOutcome::OutOfBounds;
                        }
                        st.dirty = true;

                        match ServerEvent::draw_pixel(frame.index, frame.color).encode() {
                            Ok(json) => {
                                self.registry
                                    .send(Outbound::to_all_but(origin, Arc::new(json)));
                            }
                            Err(e) => log::error!("failed to encode delta: {e}"),
                        }

                        EditOutcome::Accepted {
                            remaining: st.ledger.remaining(identity),
                        }
                    }
                }
            }
        };

        let mut s = self.stats.write().await;
        match outcome {
            EditOutcome::Accepted { .. } => s.accepted_edits += 1,
            EditOutcome::Noop { .. } => s.noop_edits += 1,
            EditOutcome::OutOfBounds | EditOutcome::Exhausted { .. } => s.rejected_edits += 1,
        }
        outcome
    }

    /// Restore every identity's quota and tell each live connection its own
    /// new balance.
    pub async fn reset_quotas(&self) {
        let mut st = self.state.lock().await;
        st.ledger.reset_all();
        log::info!(
            "quota reset: {} identities back to {}",
            st.ledger.known(),
            st.ledger.initial_quota()
        );

        for (conn_id, identity) in self.registry.connections().await {
            let remaining = st.ledger.remaining(&identity);
            match ServerEvent::pixels_remaining(remaining).encode() {
                Ok(json) => {
                    self.registry.send(Outbound::to_one(conn_id, Arc::new(json)));
                }
                Err(e) => log::error!("failed to encode quota event: {e}"),
            }
        }
    }

    /// Write a snapshot if the canvas changed since the last one.
    ///
    /// The dirty flag is cleared when the snapshot copy is taken and put
    /// back on a failed write, so edits racing the write re-mark the canvas
    /// and a failure is retried on the next tick.
    pub async fn flush_if_dirty(&self) -> Result<Option<PathBuf>, StoreError> {
        let Some(store) = &self.store else {
            return Ok(None);
        };

        let (size, cells) = {
            let mut st = self.state.lock().await;
            if !st.dirty {
                return Ok(None);
            }
            st.dirty = false;
            (st.grid.size(), st.grid.snapshot())
        };

        match store.save(size, &cells) {
            Ok(path) => {
                self.stats.write().await.snapshots_written += 1;
                Ok(Some(path))
            }
            Err(e) => {
                self.state.lock().await.dirty = true;
                Err(e)
            }
        }
    }

    /// Graceful shutdown: one final flush so no more than the current flush
    /// window of edits can ever be lost. The caller bounds this with
    /// [`ServerConfig::shutdown_grace`].
    pub async fn shutdown(&self) {
        match self.flush_if_dirty().await {
            Ok(Some(path)) => log::info!("final snapshot written to {}", path.display()),
            Ok(None) => log::info!("canvas clean, no final snapshot needed"),
            Err(e) => log::error!("final snapshot failed: {e}"),
        }
    }

    /// Server statistics snapshot.
    pub async fn stats(&self) -> ServerStats {
        self.stats.read().await.clone()
    }

    /// The configured bind address.
    pub fn bind_addr(&self) -> &str {
        &self.config.bind_addr
    }

    /// The configuration this hub runs with.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// The snapshot store, if persistence is configured.
    pub fn store(&self) -> Option<&Arc<SnapshotStore>> {
        self.store.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fresco_core::Color;
    use tempfile::tempdir;
    use uuid::Uuid;

    fn volatile_server(grid_size: usize, initial_quota: u32) -> CanvasServer {
        CanvasServer::new(ServerConfig {
            grid_size,
            initial_quota,
            ..ServerConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn test_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr, "127.0.0.1:8080");
        assert_eq!(config.grid_size, 200);
        assert_eq!(config.initial_quota, 1000);
        assert_eq!(config.broadcast_capacity, 256);
        assert!(config.snapshot_dir.is_none());
        assert_eq!(config.flush_interval, Duration::from_secs(900));
        assert_eq!(config.reset_period, Duration::from_secs(43_200));
    }

    #[tokio::test]
    async fn test_stats_initial() {
        let server = CanvasServer::with_defaults();
        let stats = server.stats().await;
        assert_eq!(stats.total_connections, 0);
        assert_eq!(stats.active_connections, 0);
        assert_eq!(stats.accepted_edits, 0);
        assert_eq!(stats.rejected_edits, 0);
        assert_eq!(stats.snapshots_written, 0);
    }

    #[tokio::test]
    async fn test_accepted_edit_charges_and_mutates() {
        let server = volatile_server(4, 10);
        let origin = Uuid::new_v4();
        let red = Color::rgb(0xff, 0, 0);

        let outcome = server
            .apply_edit(origin, "10.0.0.1", ClientFrame::new(0, red))
            .await;
        assert_eq!(outcome, EditOutcome::Accepted { remaining: 9 });

        let st = server.state.lock().await;
        assert_eq!(st.grid.get(0).unwrap(), red);
        assert!(st.dirty);
    }

    #[tokio::test]
    async fn test_noop_edit_not_charged_not_broadcast() {
        let server = volatile_server(4, 2);
        let origin = Uuid::new_v4();
        let red = Color::rgb(0xff, 0, 0);
        let (_watcher, mut rx) = server.registry.register("watcher".into()).await;

        let first = server
            .apply_edit(origin, "10.0.0.1", ClientFrame::new(0, red))
            .await;
        assert_eq!(first, EditOutcome::Accepted { remaining: 1 });

        let second = server
            .apply_edit(origin, "10.0.0.1", ClientFrame::new(0, red))
            .await;
        assert_eq!(second, EditOutcome::Noop { remaining: 1 });

        // Exactly one delta on the fan-out channel.
        let out = rx.recv().await.unwrap();
        assert_eq!(
            ServerEvent::decode(&out.frame).unwrap(),
            ServerEvent::draw_pixel(0, red)
        );
        assert!(rx.try_recv().is_err());

        let stats = server.stats().await;
        assert_eq!(stats.accepted_edits, 1);
        assert_eq!(stats.noop_edits, 1);
    }

    #[tokio::test]
    async fn test_exhausted_edit_rejected_without_mutation() {
        let server = volatile_server(4, 1);
        let origin = Uuid::new_v4();

        let first = server
            .apply_edit(origin, "a", ClientFrame::new(0, Color::rgb(1, 2, 3)))
            .await;
        assert_eq!(first, EditOutcome::Accepted { remaining: 0 });

        let before = server.state.lock().await.grid.snapshot();
        let second = server
            .apply_edit(origin, "a", ClientFrame::new(1, Color::rgb(4, 5, 6)))
            .await;
        assert_eq!(second, EditOutcome::Exhausted { remaining: 0 });
        assert_eq!(second.reply(), Some(ServerEvent::pixels_remaining(0)));
        assert_eq!(server.state.lock().await.grid.snapshot(), before);
    }

    #[tokio::test]
    async fn test_out_of_bounds_silent_rejection() {
        let server = volatile_server(2, 5);
        let origin = Uuid::new_v4();

        let outcome = server
            .apply_edit(origin, "a", ClientFrame::new(4, Color::WHITE))
            .await;
        assert_eq!(outcome, EditOutcome::OutOfBounds);
        assert_eq!(outcome.reply(), None);

        // No charge for the failed request.
        let mut st = server.state.lock().await;
        assert_eq!(st.ledger.remaining("a"), 5);
    }

    #[tokio::test]
    async fn test_edits_from_same_identity_share_quota() {
        let server = volatile_server(4, 2);
        let conn_a = Uuid::new_v4();
        let conn_b = Uuid::new_v4();

        // Two connections, one identity (same host).
        server
            .apply_edit(conn_a, "10.0.0.1", ClientFrame::new(0, Color::rgb(1, 0, 0)))
            .await;
        server
            .apply_edit(conn_b, "10.0.0.1", ClientFrame::new(1, Color::rgb(2, 0, 0)))
            .await;

        let third = server
            .apply_edit(conn_a, "10.0.0.1", ClientFrame::new(2, Color::rgb(3, 0, 0)))
            .await;
        assert_eq!(third, EditOutcome::Exhausted { remaining: 0 });
    }

    #[tokio::test]
    async fn test_reset_quotas_pushes_targeted_events() {
        let server = volatile_server(4, 3);
        let origin = Uuid::new_v4();

        server
            .apply_edit(origin, "10.0.0.9", ClientFrame::new(0, Color::rgb(1, 2, 3)))
            .await;

        let (conn, mut rx) = server.registry.register("10.0.0.9".into()).await;
        server.reset_quotas().await;

        let out = rx.recv().await.unwrap();
        assert!(out.delivers_to(conn));
        assert_eq!(
            ServerEvent::decode(&out.frame).unwrap(),
            ServerEvent::pixels_remaining(3)
        );

        let mut st = server.state.lock().await;
        assert_eq!(st.ledger.remaining("10.0.0.9"), 3);
    }

    #[tokio::test]
    async fn test_flush_skips_clean_canvas() {
        let dir = tempdir().unwrap();
        let server = CanvasServer::new(ServerConfig {
            grid_size: 4,
            snapshot_dir: Some(dir.path().to_path_buf()),
            ..ServerConfig::default()
        })
        .unwrap();

        assert!(server.flush_if_dirty().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_flush_writes_then_clears_dirty() {
        let dir = tempdir().unwrap();
        let server = CanvasServer::new(ServerConfig {
            grid_size: 4,
            snapshot_dir: Some(dir.path().to_path_buf()),
            ..ServerConfig::default()
        })
        .unwrap();

        server
            .apply_edit(Uuid::new_v4(), "a", ClientFrame::new(3, Color::rgb(9, 9, 9)))
            .await;

        let path = server.flush_if_dirty().await.unwrap().unwrap();
        assert!(path.exists());
        assert_eq!(server.stats().await.snapshots_written, 1);

        // Clean again until the next edit.
        assert!(server.flush_if_dirty().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_recovery_from_prior_snapshot() {
        let dir = tempdir().unwrap();
        let cells: Vec<Color> = (0..16).map(|i| Color::rgb(i as u8, 0, 0)).collect();
        SnapshotStore::new(dir.path()).unwrap().save(4, &cells).unwrap();

        let server = CanvasServer::new(ServerConfig {
            grid_size: 4,
            snapshot_dir: Some(dir.path().to_path_buf()),
            ..ServerConfig::default()
        })
        .unwrap();

        let st = server.state.lock().await;
        assert_eq!(st.grid.snapshot(), cells);
    }

    #[tokio::test]
    async fn test_empty_snapshot_dir_generates_fresh_canvas() {
        let dir = tempdir().unwrap();
        let server = CanvasServer::new(ServerConfig {
            grid_size: 8,
            snapshot_dir: Some(dir.path().to_path_buf()),
            ..ServerConfig::default()
        })
        .unwrap();

        let st = server.state.lock().await;
        assert_eq!(st.grid.len(), 64);
        assert!(!st.dirty);
    }

    /// A 4×4 white canvas, quota 2, the same red pixel drawn twice:
    /// the second draw changes nothing and is free.
    #[tokio::test]
    async fn test_repeat_draw_scenario() {
        let dir = tempdir().unwrap();
        SnapshotStore::new(dir.path())
            .unwrap()
            .save(4, &vec![Color::WHITE; 16])
            .unwrap();

        let server = CanvasServer::new(ServerConfig {
            grid_size: 4,
            initial_quota: 2,
            snapshot_dir: Some(dir.path().to_path_buf()),
            ..ServerConfig::default()
        })
        .unwrap();

        let a = Uuid::new_v4();
        let red = Color::rgb(0xff, 0, 0);
        let (_watcher, mut rx) = server.registry.register("watcher".into()).await;

        let first = server
            .apply_edit(a, "client-a", ClientFrame::new(0, red))
            .await;
        assert_eq!(first, EditOutcome::Accepted { remaining: 1 });
        assert!(rx.recv().await.is_ok());

        let second = server
            .apply_edit(a, "client-a", ClientFrame::new(0, red))
            .await;
        assert_eq!(second, EditOutcome::Noop { remaining: 1 });
        assert!(rx.try_recv().is_err());

        let st = server.state.lock().await;
        assert_eq!(st.grid.get(0).unwrap(), red);
    }
}
