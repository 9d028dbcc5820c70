//! Durable snapshot storage for the canvas.
//!
//! ```text
//! ┌─────────────┐   flush-if-dirty   ┌───────────────────────────┐
//! │ CanvasServer│ ─────────────────► │ SnapshotStore (directory) │
//! │ (in-memory) │                    │  canvas-<ts>.png           │
//! └──────┬──────┘                    │  canvas-<ts>.png           │
//!        │ on startup                │  ...  (append-only)        │
//!        ▼                           └───────────────────────────┘
//! ┌─────────────┐
//! │ PixelGrid   │  ◄── decoded from the most recent snapshot,
//! │ (restored)  │      or generated fresh when none exists
//! └─────────────┘
//! ```
//!
//! Snapshots are lossless PNGs of exactly `size × size` pixels, one file
//! per save, named by save time. Old files are never deleted here; the
//! directory doubles as a browsable history of the canvas.

pub mod snapshot;

pub use snapshot::{SnapshotStore, StoreError};
