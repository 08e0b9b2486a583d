use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Instant;

use crate::buffer::{BufferPool, PoolMetricsSnapshot};
use crate::core::{
    CancellationToken, DispatchCounter, Interrupt, PoolRuntimeSnapshot, ReadyQueue, SlotTable,
    WaitPolicy,
};
use crate::types::{FrameSet, Result};

use super::types::{PipelineConfig, ProgressSnapshot};

#[derive(Debug, Default)]
struct RunCounters {
    frames_read: AtomicUsize,
    frames_compressed: AtomicUsize,
    bytes_read: AtomicU64,
    bytes_compressed: AtomicU64,
}

/// Everything the producer and consumer threads of one run share.
#[derive(Debug)]
pub struct PipelineContext {
    frames: FrameSet,
    slots: SlotTable,
    ready: ReadyQueue,
    dispatch: DispatchCounter,
    cancel: CancellationToken,
    buffer_pool: BufferPool,
    frame_capacity: usize,
    compression_level: u32,
    strict_frame_size: bool,
    wait_policy: WaitPolicy,
    counters: RunCounters,
}

impl PipelineContext {
    /// Builds the shared state for `frames`, sized for `frame_capacity`.
    pub fn new(
        frames: FrameSet,
        frame_capacity: usize,
        config: &PipelineConfig,
        cancel: CancellationToken,
    ) -> Result<Self> {
        let total = frames.len();
        let dispatch = match config.max_inflight {
            Some(window) => DispatchCounter::with_window(total, window),
            None => DispatchCounter::new(total),
        };
        let retained_buffers = config
            .max_inflight
            .unwrap_or(config.producer_threads + config.consumer_threads);

        Ok(Self {
            slots: SlotTable::new(total)?,
            ready: ReadyQueue::new(total),
            dispatch,
            cancel,
            buffer_pool: BufferPool::new(frame_capacity, retained_buffers),
            frame_capacity,
            compression_level: config.compression_level,
            strict_frame_size: config.strict_frame_size,
            wait_policy: config.wait_policy(),
            counters: RunCounters::default(),
            frames,
        })
    }

    /// Frames in discovery order.
    pub fn frames(&self) -> &FrameSet {
        &self.frames
    }

    /// Slot table, one slot per frame.
    pub fn slots(&self) -> &SlotTable {
        &self.slots
    }

    /// LIFO queue of filled slot indices.
    pub fn ready(&self) -> &ReadyQueue {
        &self.ready
    }

    /// Counter producers claim discovery indices from.
    pub fn dispatch(&self) -> &DispatchCounter {
        &self.dispatch
    }

    /// Pool of frame-sized input buffers.
    pub fn buffer_pool(&self) -> &BufferPool {
        &self.buffer_pool
    }

    /// Token every blocking wait of the run observes.
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Whether the run has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Bytes read per frame at most.
    pub fn frame_capacity(&self) -> usize {
        self.frame_capacity
    }

    /// zlib level consumers compress with.
    pub fn compression_level(&self) -> u32 {
        self.compression_level
    }

    /// Whether frames must be exactly `frame_capacity` bytes.
    pub fn strict_frame_size(&self) -> bool {
        self.strict_frame_size
    }

    /// Poll interval and stall timeout for blocking waits.
    pub fn wait_policy(&self) -> WaitPolicy {
        self.wait_policy
    }

    /// Cancels the run and wakes every thread blocked on the ready queue or
    /// the dispatch counter.
    pub fn abort(&self) {
        self.cancel.cancel();
        self.ready.interrupt();
        self.dispatch.interrupt();
    }

    /// Counts one frame read from disk.
    pub(crate) fn record_read(&self, bytes: usize) {
        let counters = &self.counters;
        let bytes = bytes as u64;
        counters.frames_read.fetch_add(1, Ordering::AcqRel);
        counters.bytes_read.fetch_add(bytes, Ordering::AcqRel);
    }

    /// Counts one frame through the codec.
    pub(crate) fn record_compressed(&self, bytes: usize) {
        let counters = &self.counters;
        let bytes = bytes as u64;
        counters.frames_compressed.fetch_add(1, Ordering::AcqRel);
        counters.bytes_compressed.fetch_add(bytes, Ordering::AcqRel);
    }

    /// Bytes read from frame files so far.
    pub fn bytes_read(&self) -> u64 {
        self.counters.bytes_read.load(Ordering::Acquire)
    }

    /// Buffer pool counters.
    pub fn buffer_metrics(&self) -> PoolMetricsSnapshot {
        self.buffer_pool.metrics()
    }

    /// Live progress view combining run counters and thread runtime.
    pub fn progress(&self, started_at: Instant, runtime: PoolRuntimeSnapshot) -> ProgressSnapshot {
        let counters = &self.counters;
        let frames_compressed = counters.frames_compressed.load(Ordering::Acquire);
        let bytes_compressed = counters.bytes_compressed.load(Ordering::Acquire);
        ProgressSnapshot {
            elapsed: started_at.elapsed(),
            frames_total: self.frames.len(),
            frames_read: counters.frames_read.load(Ordering::Acquire),
            frames_compressed,
            bytes_read: counters.bytes_read.load(Ordering::Acquire),
            bytes_compressed,
            ready_depth: self.ready.len(),
            in_flight: self.dispatch.in_flight(),
            runtime,
        }
    }
}

impl Interrupt for PipelineContext {
    fn interrupt(&self) {
        self.abort();
    }
}
