//! PNG snapshot writer/reader with most-recent-file recovery.

use fresco_core::Color;
use image::{ImageFormat, RgbImage};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Snapshot storage errors.
#[derive(Debug)]
pub enum StoreError {
    /// The snapshot directory holds no decodable snapshot.
    NoSnapshots,
    /// Filesystem error.
    Io(String),
    /// PNG encoding failed.
    Encode(String),
    /// PNG decoding failed, or the file is not a square canvas.
    Decode(String),
    /// Cell count does not match the stated grid size.
    SizeMismatch { expected: usize, actual: usize },
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::NoSnapshots => write!(f, "no snapshots in directory"),
            StoreError::Io(e) => write!(f, "I/O error: {e}"),
            StoreError::Encode(e) => write!(f, "snapshot encode error: {e}"),
            StoreError::Decode(e) => write!(f, "snapshot decode error: {e}"),
            StoreError::SizeMismatch { expected, actual } => {
                write!(f, "expected {expected} cells, got {actual}")
            }
        }
    }
}

impl std::error::Error for StoreError {}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        StoreError::Io(e.to_string())
    }
}

/// Append-only directory of timestamped canvas snapshots.
pub struct SnapshotStore {
    dir: PathBuf,
}

impl SnapshotStore {
    /// Open (creating if needed) the snapshot directory.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// The directory snapshots are written to.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Encode the cells as a `size × size` PNG and write it durably.
    ///
    /// The image is written to a `.tmp` sibling and renamed into place, so
    /// a crash mid-write leaves the prior snapshot as the most recent valid
    /// file rather than a truncated one.
    pub fn save(&self, size: usize, cells: &[Color]) -> Result<PathBuf, StoreError> {
        if cells.len() != size * size {
            return Err(StoreError::SizeMismatch {
                expected: size * size,
                actual: cells.len(),
            });
        }

        let mut img = RgbImage::new(size as u32, size as u32);
        for (i, cell) in cells.iter().enumerate() {
            let x = (i % size) as u32;
            let y = (i / size) as u32;
            img.put_pixel(x, y, image::Rgb(cell.channels()));
        }

        let stamp = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        let path = self.dir.join(format!("canvas-{stamp:013}.png"));
        let tmp = self.dir.join(format!("canvas-{stamp:013}.png.tmp"));

        img.save_with_format(&tmp, ImageFormat::Png)
            .map_err(|e| StoreError::Encode(e.to_string()))?;
        fs::rename(&tmp, &path)?;

        log::info!("wrote snapshot {}", path.display());
        Ok(path)
    }

    /// Decode the most recently written snapshot into `(size, cells)`.
    ///
    /// "Most recent" is by filesystem modification time; the timestamped
    /// names give the same order lexicographically for manual inspection.
    pub fn load_most_recent(&self) -> Result<(usize, Vec<Color>), StoreError> {
        let newest = self.newest_snapshot_path()?.ok_or(StoreError::NoSnapshots)?;
        log::info!("recovering canvas from {}", newest.display());
        Self::load(&newest)
    }

    /// Decode one snapshot file.
    pub fn load(path: &Path) -> Result<(usize, Vec<Color>), StoreError> {
        let img = image::open(path)
            .map_err(|e| StoreError::Decode(e.to_string()))?
            .into_rgb8();

        if img.width() != img.height() {
            return Err(StoreError::Decode(format!(
                "snapshot {} is {}x{}, not square",
                path.display(),
                img.width(),
                img.height()
            )));
        }

        let size = img.width() as usize;
        let cells = img
            .pixels()
            .map(|p| Color::rgb(p[0], p[1], p[2]))
            .collect();
        Ok((size, cells))
    }

    /// Number of completed snapshots in the directory.
    pub fn snapshot_count(&self) -> usize {
        match fs::read_dir(&self.dir) {
            Ok(entries) => entries
                .flatten()
                .filter(|e| Self::is_snapshot(&e.path()))
                .count(),
            Err(_) => 0,
        }
    }

    fn is_snapshot(path: &Path) -> bool {
        path.extension().is_some_and(|ext| ext == "png")
    }

    fn newest_snapshot_path(&self) -> Result<Option<PathBuf>, StoreError> {
        let mut newest: Option<(SystemTime, PathBuf)> = None;
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let path = entry.path();
            if !Self::is_snapshot(&path) {
                continue;
            }
            let modified = entry.metadata()?.modified()?;
            let newer = match &newest {
                Some((best, _)) => modified > *best,
                None => true,
            };
            if newer {
                newest = Some((modified, path));
            }
        }
        Ok(newest.map(|(_, path)| path))
    }
}
