//! The authoritative canvas buffer.
//!
//! A [`PixelGrid`] is a square of `size × size` cells addressed by the
//! flat index `i = y * size + x`. The buffer is always fully initialized:
//! its length is exactly `size²` from construction to drop, and the only
//! write path is [`PixelGrid::set`].

use crate::color::Color;
use std::fmt;

/// Result of a [`PixelGrid::set`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetOutcome {
    /// Cell value before the write.
    pub previous: Color,
    /// False when the requested color equals the current one; the cell is
    /// left untouched in that case.
    pub changed: bool,
}

/// Grid access errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GridError {
    /// Index outside `[0, size²)`.
    OutOfBounds { index: usize, len: usize },
    /// Cell vector length does not match `size²` on construction.
    SizeMismatch { expected: usize, actual: usize },
}

impl fmt::Display for GridError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GridError::OutOfBounds { index, len } => {
                write!(f, "index {index} out of bounds for grid of {len} cells")
            }
            GridError::SizeMismatch { expected, actual } => {
                write!(f, "expected {expected} cells, got {actual}")
            }
        }
    }
}

impl std::error::Error for GridError {}

/// The shared `size × size` pixel buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelGrid {
    size: usize,
    cells: Vec<Color>,
}

impl PixelGrid {
    /// A grid with every cell set to `fill`.
    pub fn new(size: usize, fill: Color) -> Self {
        Self {
            size,
            cells: vec![fill; size * size],
        }
    }

    /// The generated default: near-white noise, so a fresh canvas reads as
    /// blank paper rather than a flat color field.
    ///
    /// Shades are picked by a deterministic bit mix of the cell index, which
    /// keeps the default reproducible without an RNG dependency.
    pub fn speckled(size: usize) -> Self {
        let cells = (0..size * size)
            .map(|i| {
                let mut h = i as u64 ^ 0x9e37_79b9_7f4a_7c15;
                h ^= h >> 33;
                h = h.wrapping_mul(0xff51_afd7_ed55_8ccd);
                h ^= h >> 29;
                // Shades in 0xf4..=0xff: visibly paper-like, never pure gray.
                Color::gray(0xf4 + (h % 12) as u8)
            })
            .collect();
        Self { size, cells }
    }

    /// Rebuild a grid from a flat cell vector, e.g. a decoded snapshot.
    pub fn from_cells(size: usize, cells: Vec<Color>) -> Result<Self, GridError> {
        if cells.len() != size * size {
            return Err(GridError::SizeMismatch {
                expected: size * size,
                actual: cells.len(),
            });
        }
        Ok(Self { size, cells })
    }

    /// Read one cell.
    pub fn get(&self, index: usize) -> Result<Color, GridError> {
        self.cells
            .get(index)
            .copied()
            .ok_or(GridError::OutOfBounds {
                index,
                len: self.cells.len(),
            })
    }

    /// Write one cell. Writing the current color is a no-op and reports
    /// `changed: false` so callers can skip broadcast and charging.
    pub fn set(&mut self, index: usize, color: Color) -> Result<SetOutcome, GridError> {
        let len = self.cells.len();
        let cell = self
            .cells
            .get_mut(index)
            .ok_or(GridError::OutOfBounds { index, len })?;
        let previous = *cell;
        if previous == color {
            return Ok(SetOutcome {
                previous,
                changed: false,
            });
        }
        *cell = color;
        Ok(SetOutcome {
            previous,
            changed: true,
        })
    }

    /// Defensive copy of every cell, for persistence and joining clients.
    pub fn snapshot(&self) -> Vec<Color> {
        self.cells.clone()
    }

    /// Side length.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Total cell count (`size²`).
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// True only for the degenerate zero-size grid.
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Borrow the cells without copying.
    pub fn cells(&self) -> &[Color] {
        &self.cells
    }
}
