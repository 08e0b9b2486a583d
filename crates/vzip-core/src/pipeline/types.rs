use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::buffer::PoolMetricsSnapshot;
use crate::compression::MAX_LEVEL;
use crate::core::{
    PartitionStrategy, PoolRuntimeSnapshot, StageRuntimeSnapshot, WaitPolicy, WorkPlan,
};
use crate::error::VzipError;
use crate::io::DEFAULT_EXTENSION;
use crate::types::{FrameSet, Result};

pub const DEFAULT_PRODUCER_THREADS: usize = 8;
pub const DEFAULT_CONSUMER_THREADS: usize = 11;
pub const DEFAULT_ARCHIVE_NAME: &str = "video.vzip";

/// How the per-frame buffer capacity is chosen.
///
/// Frames longer than the capacity are truncated; shorter frames under-fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CapacityPolicy {
    /// Size of the frame with order 1.
    #[default]
    FirstFrame,
    /// Size of the largest discovered frame.
    LargestFrame,
    /// A fixed number of bytes.
    Fixed(usize),
}

impl CapacityPolicy {
    /// Buffer capacity in bytes for `frames`.
    pub fn resolve(self, frames: &FrameSet) -> Result<usize> {
        let bytes = match self {
            Self::FirstFrame => frames.by_order(1).map(|entry| entry.size),
            Self::LargestFrame => frames.largest().map(|entry| entry.size),
            Self::Fixed(bytes) => Some(bytes as u64),
        };
        let Some(bytes) = bytes else {
            return Err(VzipError::EmptyInput);
        };

        let Ok(capacity) = usize::try_from(bytes) else {
            return Err(VzipError::Allocation { bytes: usize::MAX });
        };
        if capacity == 0 {
            let message = "frame buffer capacity resolved to 0 bytes";
            return Err(VzipError::InvalidConfig(message.to_string()));
        }
        Ok(capacity)
    }
}

/// Settings for one archive run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub producer_threads: usize,
    pub consumer_threads: usize,
    /// Frame file extension without the leading dot.
    pub extension: String,
    /// zlib level, 0 to 9.
    pub compression_level: u32,
    pub partition: PartitionStrategy,
    pub capacity: CapacityPolicy,
    /// Most frames claimed by producers but not yet compressed. `None`
    /// leaves producers unthrottled.
    pub max_inflight: Option<usize>,
    /// Fail on frames whose size differs from the buffer capacity.
    pub strict_frame_size: bool,
    pub wait_poll_interval: Duration,
    pub stall_timeout: Option<Duration>,
}

impl PipelineConfig {
    /// Sets the producer and consumer thread counts.
    pub fn with_threads(mut self, producers: usize, consumers: usize) -> Self {
        self.producer_threads = producers;
        self.consumer_threads = consumers;
        self
    }

    /// Sets the frame extension; a leading dot is dropped.
    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into().trim_start_matches('.').to_string();
        self
    }

    /// Rejects settings no run could start with.
    pub fn validate(&self) -> Result<()> {
        if self.producer_threads == 0 || self.consumer_threads == 0 {
            return Err(VzipError::InvalidConfig(format!(
                "thread counts must be at least 1 (producers {}, consumers {})",
                self.producer_threads, self.consumer_threads
            )));
        }
        if self.compression_level > MAX_LEVEL {
            return Err(VzipError::InvalidConfig(format!(
                "compression level {} is outside 0..={MAX_LEVEL}",
                self.compression_level
            )));
        }
        let problem = if self.extension.is_empty() {
            Some("frame extension must not be empty")
        } else if self.max_inflight == Some(0) {
            Some("in-flight window must be at least 1")
        } else if self.capacity == CapacityPolicy::Fixed(0) {
            Some("fixed frame capacity must be at least 1 byte")
        } else if self.wait_poll_interval.is_zero() {
            Some("wait poll interval must be positive")
        } else {
            None
        };

        match problem {
            Some(message) => Err(VzipError::InvalidConfig(message.to_string())),
            None => Ok(()),
        }
    }

    /// Wait behaviour shared by every blocking pipeline call.
    pub fn wait_policy(&self) -> WaitPolicy {
        WaitPolicy {
            poll_interval: self.wait_poll_interval,
            stall_timeout: self.stall_timeout,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            producer_threads: DEFAULT_PRODUCER_THREADS,
            consumer_threads: DEFAULT_CONSUMER_THREADS,
            extension: DEFAULT_EXTENSION.to_string(),
            compression_level: MAX_LEVEL,
            partition: PartitionStrategy::Auto,
            capacity: CapacityPolicy::FirstFrame,
            max_inflight: None,
            strict_frame_size: false,
            wait_poll_interval: WaitPolicy::DEFAULT_POLL_INTERVAL,
            stall_timeout: None,
        }
    }
}

/// Lifecycle of one archive run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PipelineState {
    Idle,
    Partitioned,
    Running,
    Drained,
    Emitted,
    Closed,
}

impl PipelineState {
    /// Next state of a successful run; `None` once closed.
    pub fn successor(self) -> Option<Self> {
        match self {
            Self::Idle => Some(Self::Partitioned),
            Self::Partitioned => Some(Self::Running),
            Self::Running => Some(Self::Drained),
            Self::Drained => Some(Self::Emitted),
            Self::Emitted => Some(Self::Closed),
            Self::Closed => None,
        }
    }

    /// Moves to `next`, which must be the successor state or, to abandon a
    /// run, `Closed`.
    pub fn advance(self, next: Self) -> Result<Self> {
        let abandoning = next == Self::Closed && self != Self::Closed;
        if self.successor() == Some(next) || abandoning {
            Ok(next)
        } else {
            Err(VzipError::InvalidState(format!(
                "pipeline cannot move from {self} to {next}"
            )))
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Idle => "idle",
            Self::Partitioned => "partitioned",
            Self::Running => "running",
            Self::Drained => "drained",
            Self::Emitted => "emitted",
            Self::Closed => "closed",
        };
        f.write_str(label)
    }
}

/// Live view of a run, delivered to progress callbacks.
#[derive(Debug, Clone)]
pub struct ProgressSnapshot {
    pub elapsed: Duration,
    pub frames_total: usize,
    pub frames_read: usize,
    pub frames_compressed: usize,
    pub bytes_read: u64,
    pub bytes_compressed: u64,
    pub ready_depth: usize,
    pub in_flight: usize,
    pub runtime: PoolRuntimeSnapshot,
}

impl ProgressSnapshot {
    /// `true` once every frame has been compressed.
    pub fn is_complete(&self) -> bool {
        self.frames_compressed >= self.frames_total
    }
}

/// Summary of a finished archive run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchiveRunStats {
    pub frames_total: usize,
    pub frame_capacity: usize,
    /// Bytes actually read from frame files.
    pub bytes_read: u64,
    /// Sum of compressed entry sizes, prefixes excluded.
    pub payload_bytes: u64,
    /// Archive size, prefixes included.
    pub archive_bytes: u64,
    pub elapsed: Duration,
    pub producer_plan: WorkPlan,
    pub consumer_plan: WorkPlan,
    pub threads: Vec<StageRuntimeSnapshot>,
    pub buffer_pool: PoolMetricsSnapshot,
    pub state: PipelineState,
    /// Wall time per orchestrator phase, in microseconds.
    pub phase_us: BTreeMap<String, u64>,
}

impl ArchiveRunStats {
    /// Input size the compression rate is measured against: every frame
    /// counted at the full buffer capacity.
    pub fn nominal_input_bytes(&self) -> u64 {
        (self.frames_total as u64).saturating_mul(self.frame_capacity as u64)
    }

    /// Percentage of the nominal input saved by compression.
    pub fn compression_rate(&self) -> f64 {
        let input = self.nominal_input_bytes();
        if input == 0 {
            return 0.0;
        }
        100.0 * (input as f64 - self.payload_bytes as f64) / input as f64
    }
}
