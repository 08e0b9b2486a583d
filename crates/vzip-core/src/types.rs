use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::VzipError;

pub type Result<T> = std::result::Result<T, VzipError>;

/// One discovered frame file.
///
/// The numeric `order` is parsed from the file name and addresses the
/// frame's slot as `order - 1`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameEntry {
    pub order: usize,
    pub file_name: String,
    pub path: PathBuf,
    pub size: u64,
}

impl FrameEntry {
    /// Entry for a file of `size` bytes holding frame `order`.
    pub fn new(
        order: usize,
        file_name: impl Into<String>,
        path: impl Into<PathBuf>,
        size: u64,
    ) -> Self {
        Self {
            order,
            file_name: file_name.into(),
            path: path.into(),
            size,
        }
    }

    /// Zero-based slot index addressed by this frame.
    pub fn slot_index(&self) -> usize {
        self.order - 1
    }
}

/// Discovered frames in discovery order.
///
/// Discovery order is the order producers claim entries in; it need not match
/// frame order. Orders are unique and cover `1..=len()` exactly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameSet {
    root: PathBuf,
    entries: Vec<FrameEntry>,
}

impl FrameSet {
    /// Builds a frame set, rejecting zero, duplicate and missing orders.
    pub fn from_entries(root: impl Into<PathBuf>, entries: Vec<FrameEntry>) -> Result<Self> {
        let total = entries.len();
        let mut owners: Vec<Option<usize>> = vec![None; total];

        for (position, entry) in entries.iter().enumerate() {
            if entry.order == 0 {
                return Err(VzipError::InvalidFrameName {
                    name: entry.file_name.clone(),
                });
            }
            if entry.order > total {
                // Some order in 1..=total must then be missing.
                continue;
            }
            match owners[entry.order - 1] {
                Some(previous) => {
                    return Err(VzipError::DuplicateFrameOrder {
                        order: entry.order,
                        first: entries[previous].file_name.clone(),
                        second: entry.file_name.clone(),
                    });
                }
                None => owners[entry.order - 1] = Some(position),
            }
        }

        if let Some(missing) = owners.iter().position(Option::is_none) {
            return Err(VzipError::FrameOrderGap {
                missing: missing + 1,
                total,
            });
        }

        Ok(Self {
            root: root.into(),
            entries,
        })
    }

    /// An empty set rooted at `root`.
    pub fn empty(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            entries: Vec::new(),
        }
    }

    /// Directory the frames were discovered in.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Number of frames.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entry at a dispatch index (discovery position).
    pub fn get(&self, index: usize) -> Option<&FrameEntry> {
        self.entries.get(index)
    }

    /// Entries in discovery order.
    pub fn iter(&self) -> impl Iterator<Item = &FrameEntry> {
        self.entries.iter()
    }

    /// Entry carrying the given 1-based order.
    pub fn by_order(&self, order: usize) -> Option<&FrameEntry> {
        self.entries.iter().find(|entry| entry.order == order)
    }

    /// First entry in discovery order, not necessarily order 1.
    pub fn first_discovered(&self) -> Option<&FrameEntry> {
        self.entries.first()
    }

    /// Entry with the biggest file; the last one wins ties.
    pub fn largest(&self) -> Option<&FrameEntry> {
        self.entries.iter().max_by_key(|entry| entry.size)
    }

    /// Sum of all file sizes.
    pub fn total_size(&self) -> u64 {
        self.entries
            .iter()
            .fold(0u64, |total, entry| total.saturating_add(entry.size))
    }
}

/// Converts a duration to whole microseconds, clamped to `u64::MAX`.
#[inline]
pub fn duration_to_us(duration: Duration) -> u64 {
    duration.as_micros().min(u64::MAX as u128) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(order: usize, name: &str) -> FrameEntry {
        FrameEntry::new(order, name, format!("frames/{name}"), 16)
    }

    #[test]
    fn accepts_dense_orders_in_any_discovery_order() {
        let set = FrameSet::from_entries(
            "frames",
            vec![entry(2, "2.ppm"), entry(3, "3.ppm"), entry(1, "1.ppm")],
        )
        .expect("dense orders are valid");

        assert_eq!(set.len(), 3);
        assert_eq!(set.get(0).map(|e| e.order), Some(2));
        assert_eq!(set.by_order(1).map(|e| e.file_name.as_str()), Some("1.ppm"));
        assert_eq!(set.total_size(), 48);
    }

    #[test]
    fn rejects_duplicate_orders() {
        let err = FrameSet::from_entries("frames", vec![entry(1, "1.ppm"), entry(1, "01.ppm")])
            .expect_err("duplicate order must fail");

        assert!(matches!(err, VzipError::DuplicateFrameOrder { order: 1, .. }));
    }

    #[test]
    fn rejects_gaps() {
        let err = FrameSet::from_entries("frames", vec![entry(1, "1.ppm"), entry(3, "3.ppm")])
            .expect_err("gap must fail");

        assert!(matches!(
            err,
            VzipError::FrameOrderGap {
                missing: 2,
                total: 2
            }
        ));
    }
}
