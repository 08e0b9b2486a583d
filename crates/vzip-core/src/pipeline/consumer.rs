use crate::compression;
use crate::core::StageMeter;
use crate::error::VzipError;
use crate::types::Result;

use super::context::PipelineContext;

/// Consumer thread body: pops exactly its share of ready slots and compresses
/// each one.
pub fn run_consumer(context: &PipelineContext, meter: &StageMeter<'_>) -> Result<usize> {
    let share = meter.assignment().share;

    for _ in 0..share {
        let popped = context
            .ready()
            .pop(context.cancel_token(), context.wait_policy())?;
        let Some(slot) = popped else {
            return Err(VzipError::Cancelled);
        };
        meter.record_queue_depth(context.ready().len());
        meter.run_task("compress", || compress_slot(context, slot))?;
    }

    Ok(share)
}

/// Compresses a filled slot and stores the result in its output half.
pub fn compress_slot(context: &PipelineContext, slot: usize) -> Result<()> {
    let input = context.slots().take_input(slot)?;
    let level = context.compression_level();
    let compressed = compression::compress_frame(&input, level, context.frame_capacity())
        .map_err(|error| error.with_context(format!("frame {}", slot + 1)))?;
    drop(input);

    let len = context.slots().store_output(slot, compressed)?;
    context.record_compressed(len);
    context.dispatch().retire();
    Ok(())
}
