pub mod buffer;
pub mod compression;
pub mod core;
pub mod error;
pub mod format;
pub mod io;
pub mod pipeline;
pub mod report;
pub mod telemetry;
pub mod types;

pub use crate::core::{
    CancellationToken, DispatchCounter, PartitionStrategy, PoolRuntimeSnapshot, ReadyQueue,
    SlotTable, StageRole, StageRuntimeSnapshot, WaitPolicy, WorkPlan,
};
pub use buffer::{BufferPool, PoolMetricsSnapshot, PooledBuffer};
pub use error::VzipError;
pub use format::{ArchiveReader, ArchiveWriter};
pub use io::FrameScanner;
pub use pipeline::{
    ArchiveRunStats, CapacityPolicy, ExtractStats, FrameExtractor, FramePipeline, PipelineConfig,
    PipelineState, ProgressSnapshot,
};
pub use report::{ArchiveReport, ExtractReport, ReportBuildOptions, ReportExport, ReportValue};
pub use telemetry::worker::{DefaultStageTelemetry, StageTelemetry};
pub use types::{FrameEntry, FrameSet, Result};
