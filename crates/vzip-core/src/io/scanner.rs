use std::fs;
use std::path::Path;
use std::time::Instant;

use jwalk::WalkDir;

use crate::error::VzipError;
use crate::telemetry::{self, tags};
use crate::types::{FrameEntry, FrameSet, Result, duration_to_us};

/// Default frame file extension.
pub const DEFAULT_EXTENSION: &str = "ppm";

/// Finds numbered frame files in a single directory.
///
/// A frame file is a regular file directly inside the directory whose name
/// ends in `.<extension>` and starts with a positive decimal order, such as
/// `12.ppm` or `0003-frame.ppm`.
///
/// Hidden entries (names starting with `.`), subdirectories and names with
/// another extension are skipped. A name with the right extension but no
/// positive leading order, such as `cover.ppm`, fails the scan with
/// [`VzipError::InvalidFrameName`].
#[derive(Debug, Clone)]
pub struct FrameScanner {
    extension: String,
}

impl FrameScanner {
    /// Scanner for `<n>.<extension>` files; a leading dot is dropped.
    pub fn new(extension: impl Into<String>) -> Self {
        let extension = extension.into().trim_start_matches('.').to_string();
        Self { extension }
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// Returns true when `file_name` carries this scanner's extension.
    pub fn matches(&self, file_name: &str) -> bool {
        file_name
            .strip_suffix(self.extension.as_str())
            .is_some_and(|stem| stem.ends_with('.'))
    }

    /// Lists the frames in `dir` sorted by file name.
    ///
    /// An empty set is not an error here; orders must be unique and dense.
    pub fn scan(&self, dir: &Path) -> Result<FrameSet> {
        if !dir.is_dir() {
            return Err(VzipError::SourceDirectory {
                path: dir.to_path_buf(),
            });
        }

        let started_at = Instant::now();
        let mut entries = Vec::new();
        let mut skipped = 0u64;

        let walk = WalkDir::new(dir)
            .min_depth(1)
            .max_depth(1)
            .skip_hidden(true)
            .sort(true);
        for entry in walk {
            let entry = entry.map_err(anyhow::Error::from)?;
            let Some(file_name) = entry.file_name().to_str().map(str::to_owned) else {
                skipped += 1;
                continue;
            };
            if !self.matches(&file_name) {
                skipped += 1;
                continue;
            }

            let path = entry.path();
            let metadata = match fs::metadata(&path) {
                Ok(metadata) => metadata,
                Err(error) => {
                    let message = format!("failed to stat {}", path.display());
                    return Err(VzipError::from(error).with_context(message));
                }
            };
            if !metadata.is_file() {
                skipped += 1;
                continue;
            }

            let order = parse_frame_order(&file_name)?;
            entries.push(FrameEntry::new(order, file_name, path, metadata.len()));
        }

        let frames = FrameSet::from_entries(dir, entries)?;
        let elapsed_us = duration_to_us(started_at.elapsed());

        telemetry::increment_counter(
            tags::METRIC_SCAN_FRAME_COUNT,
            frames.len() as u64,
            &[("subsystem", "scanner"), ("op", "scan")],
        );
        telemetry::increment_counter(
            tags::METRIC_SCAN_SKIPPED_COUNT,
            skipped,
            &[("subsystem", "scanner"), ("op", "scan")],
        );
        telemetry::record_histogram(
            tags::METRIC_SCAN_LATENCY_US,
            elapsed_us,
            &[("subsystem", "scanner"), ("op", "scan")],
        );
        tracing::debug!(
            target: tags::TARGET_SCANNER,
            dir = %dir.display(),
            frames = frames.len(),
            skipped,
            elapsed_us,
            "frame discovery finished"
        );

        Ok(frames)
    }
}

impl Default for FrameScanner {
    fn default() -> Self {
        Self::new(DEFAULT_EXTENSION)
    }
}

/// Parses the leading decimal digits of a frame file name.
pub fn parse_frame_order(file_name: &str) -> Result<usize> {
    let digits = file_name
        .bytes()
        .take_while(u8::is_ascii_digit)
        .count();

    file_name[..digits]
        .parse::<usize>()
        .ok()
        .filter(|&order| order > 0)
        .ok_or_else(|| VzipError::InvalidFrameName {
            name: file_name.to_string(),
        })
}
