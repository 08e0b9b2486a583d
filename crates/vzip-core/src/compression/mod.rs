use std::time::Instant;

use crate::telemetry::{self, tags};
use crate::types::{Result, duration_to_us};

pub mod deflate;

/// Highest zlib level, used unless configured otherwise.
pub const MAX_LEVEL: u32 = 9;

/// Compresses one frame into at most `capacity` bytes.
pub fn compress_frame(data: &[u8], level: u32, capacity: usize) -> Result<Vec<u8>> {
    let start = Instant::now();
    let result = deflate::apply(data, level, capacity);
    let elapsed_us = duration_to_us(start.elapsed());
    let labels = [("subsystem", "codec"), ("op", "compress")];

    match &result {
        Ok(compressed) => {
            telemetry::increment_counter(tags::METRIC_CONSUMER_COMPRESS_COUNT, 1, &labels);
            telemetry::record_histogram(tags::METRIC_CODEC_LATENCY_US, elapsed_us, &labels);
            telemetry::record_histogram(tags::METRIC_CODEC_INPUT_BYTES, data.len() as u64, &labels);
            telemetry::record_histogram(
                tags::METRIC_CODEC_OUTPUT_BYTES,
                compressed.len() as u64,
                &labels,
            );
        }
        Err(error) => {
            telemetry::increment_counter(tags::METRIC_CODEC_FAILURE_COUNT, 1, &labels);
            tracing::debug!(
                target: tags::TARGET_CODEC,
                op = "compress",
                input_bytes = data.len(),
                capacity,
                elapsed_us,
                %error,
                "frame compression failed"
            );
        }
    }

    result
}

/// Inflates one archive entry back to frame bytes.
pub fn decompress_frame(data: &[u8], size_hint: usize) -> Result<Vec<u8>> {
    let result = deflate::reverse(data, size_hint);
    if let Err(error) = &result {
        tracing::debug!(
            target: tags::TARGET_CODEC,
            op = "decompress",
            input_bytes = data.len(),
            %error,
            "entry decompression failed"
        );
    }
    result
}
