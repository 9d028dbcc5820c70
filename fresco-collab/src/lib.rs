//! # fresco-collab — shared-canvas synchronization core
//!
//! Many clients paint one fixed-size pixel grid in real time over
//! WebSockets, throttled by a replenishing per-host pixel quota, with the
//! grid persisted as timestamped PNG snapshots and recovered on restart.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐     WebSocket      ┌──────────────┐
//! │ CanvasClient │ ◄────────────────► │ CanvasServer │
//! │ (per user)   │     JSON frames    │ (authority)  │
//! └──────────────┘                    └──────┬───────┘
//!                                            │
//!                              ┌─────────────┼──────────────┐
//!                              ▼             ▼              ▼
//!                        PixelGrid     QuotaLedger   SnapshotStore
//!                        (authority)   (per host)    (PNG history)
//!                              │
//!                      ConnectionRegistry
//!                        (delta fan-out)
//! ```
//!
//! ## Modules
//!
//! - [`protocol`] — JSON wire messages (quota, baseline image, pixel delta)
//! - [`quota`] — per-identity remaining-pixel ledger with periodic reset
//! - [`registry`] — live-connection registry and fan-out channel
//! - [`server`] — the hub: edit pipeline, schedulers, graceful shutdown
//! - [`client`] — headless protocol client for tests and tooling
//! - [`storage`] — durable PNG snapshots with most-recent recovery

pub mod client;
pub mod protocol;
pub mod quota;
pub mod registry;
pub mod server;
pub mod storage;

// Re-exports for convenience
pub use client::{CanvasClient, CanvasEvent, ClientState};
pub use protocol::{ClientFrame, ProtocolError, ServerEvent};
pub use quota::QuotaLedger;
pub use registry::{ConnectionId, ConnectionInfo, ConnectionRegistry, Outbound, RegistryStats};
pub use server::{CanvasServer, EditOutcome, ServerConfig, ServerError, ServerStats};
pub use storage::{SnapshotStore, StoreError};
