//! # fresco-core — data layer for the shared canvas
//!
//! Pure data types shared by the sync server and its clients:
//!
//! - [`Color`] — a 24-bit RGB value with the `#rrggbb` wire form
//! - [`PixelGrid`] — the authoritative fixed-size canvas buffer
//!
//! No I/O and no async live here; everything is a value type with
//! invariants. The synchronization core (`fresco-collab`) owns the only
//! mutable instances of these types at runtime.

pub mod color;
pub mod grid;

pub use color::{Color, ColorError};
pub use grid::{GridError, PixelGrid, SetOutcome};
