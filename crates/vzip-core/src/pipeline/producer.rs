use std::fs::File;
use std::io::Read;

use crate::core::StageMeter;
use crate::error::VzipError;
use crate::telemetry::{self, tags};
use crate::types::{FrameEntry, Result};

use super::context::PipelineContext;

/// Producer thread body: claims exactly its share of frame indices and loads
/// each frame into its slot.
pub fn run_producer(context: &PipelineContext, meter: &StageMeter<'_>) -> Result<usize> {
    let share = meter.assignment().share;

    for claimed in 0..share {
        let next = context
            .dispatch()
            .claim_next(context.cancel_token(), context.wait_policy())?;
        let Some(index) = next else {
            if context.is_cancelled() {
                return Err(VzipError::Cancelled);
            }
            return Err(VzipError::InvalidState(format!(
                "dispatch counter ran dry after {claimed} of {share} claims"
            )));
        };

        meter.run_task("read", || load_frame(context, index))?;
    }

    Ok(share)
}

/// Reads the frame at dispatch `index` into its slot and queues the slot.
pub fn load_frame(context: &PipelineContext, index: usize) -> Result<()> {
    let Some(entry) = context.frames().get(index) else {
        return Err(VzipError::Slot {
            index,
            reason: "dispatch index has no frame entry",
        });
    };

    let mut buffer = context.buffer_pool().acquire()?;
    read_frame(
        entry,
        context.frame_capacity(),
        context.strict_frame_size(),
        buffer.as_mut_vec(),
    )?;

    let slot = entry.slot_index();
    let len = context.slots().fill_input(slot, buffer)?;
    context.record_read(len);
    telemetry::increment_counter(
        tags::METRIC_PRODUCER_READ_COUNT,
        1,
        &[("subsystem", "producer"), ("op", "read")],
    );
    telemetry::record_histogram(
        tags::METRIC_PRODUCER_READ_BYTES,
        len as u64,
        &[("subsystem", "producer"), ("op", "read")],
    );

    context.ready().push(slot)
}

/// Reads up to `capacity` bytes of `entry` into `buffer`.
///
/// In strict mode the file must be exactly `capacity` bytes long.
pub fn read_frame(
    entry: &FrameEntry,
    capacity: usize,
    strict: bool,
    buffer: &mut Vec<u8>,
) -> Result<usize> {
    let with_path = |error: VzipError| {
        error.with_context(format!("failed to read frame {}", entry.path.display()))
    };

    let file = File::open(&entry.path).map_err(|error| with_path(error.into()))?;
    if strict {
        let actual = file
            .metadata()
            .map_err(|error| with_path(error.into()))?
            .len();
        if actual != capacity as u64 {
            return Err(VzipError::FrameSizeMismatch {
                path: entry.path.clone(),
                expected: capacity as u64,
                actual,
            });
        }
    }

    buffer.clear();
    buffer
        .try_reserve_exact(capacity)
        .map_err(|_| VzipError::Allocation { bytes: capacity })?;
    file.take(capacity as u64)
        .read_to_end(buffer)
        .map_err(|error| with_path(error.into()))
}
