use std::fs;
use std::io::Read;
use std::path::Path;
use std::time::{Duration, Instant};

use bytes::Bytes;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::compression;
use crate::error::VzipError;
use crate::format::split_entries;
use crate::io::DEFAULT_EXTENSION;
use crate::telemetry::{self, tags};
use crate::types::{Result, duration_to_us};

/// Summary of an extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractStats {
    pub entries: usize,
    pub archive_bytes: u64,
    pub output_bytes: u64,
    pub elapsed: Duration,
}

/// Restores numbered frame files from an archive.
///
/// Entry `i` (zero-based) becomes `<i + 1>.<extension>`; original file names
/// are not stored in the archive.
#[derive(Debug, Clone)]
pub struct FrameExtractor {
    extension: String,
}

impl FrameExtractor {
    /// Extractor writing `<n>.<extension>` files; a leading dot is dropped.
    pub fn new(extension: impl Into<String>) -> Self {
        let extension = extension.into().trim_start_matches('.').to_string();
        Self { extension }
    }

    /// Inflates every entry, in archive order.
    pub fn decode<R: Read>(&self, mut reader: R) -> Result<Vec<Vec<u8>>> {
        let mut raw = Vec::new();
        reader.read_to_end(&mut raw)?;
        Self::decode_bytes(Bytes::from(raw))
    }

    fn decode_bytes(archive: Bytes) -> Result<Vec<Vec<u8>>> {
        split_entries(archive)?
            .par_iter()
            .enumerate()
            .map(|(index, entry)| {
                compression::decompress_frame(entry, entry.len().saturating_mul(4))
                    .map_err(|error| error.with_context(format!("entry {}", index + 1)))
            })
            .collect()
    }

    /// Writes every entry of the archive into `out_dir`, creating it if needed.
    pub fn extract_to_dir<R, P>(&self, mut reader: R, out_dir: P) -> Result<ExtractStats>
    where
        R: Read,
        P: AsRef<Path>,
    {
        let started_at = Instant::now();
        let out_dir = out_dir.as_ref();

        let mut raw = Vec::new();
        reader.read_to_end(&mut raw)?;
        let archive_bytes = raw.len() as u64;
        let frames = Self::decode_bytes(Bytes::from(raw))?;

        fs::create_dir_all(out_dir)?;
        let mut output_bytes = 0u64;
        for (index, frame) in frames.iter().enumerate() {
            let path = out_dir.join(format!("{}.{}", index + 1, self.extension));
            if let Err(error) = fs::write(&path, frame) {
                let message = format!("failed to write {}", path.display());
                return Err(VzipError::from(error).with_context(message));
            }
            output_bytes += frame.len() as u64;
        }

        let stats = ExtractStats {
            entries: frames.len(),
            archive_bytes,
            output_bytes,
            elapsed: started_at.elapsed(),
        };
        telemetry::increment_counter(
            tags::METRIC_EXTRACT_ENTRY_COUNT,
            stats.entries as u64,
            &[("subsystem", "extract"), ("op", "extract")],
        );
        tracing::info!(
            target: tags::TARGET_EXTRACT,
            entries = stats.entries,
            output_bytes = stats.output_bytes,
            elapsed_us = duration_to_us(stats.elapsed),
            out_dir = %out_dir.display(),
            "archive extracted"
        );

        Ok(stats)
    }
}

impl Default for FrameExtractor {
    fn default() -> Self {
        Self::new(DEFAULT_EXTENSION)
    }
}
