use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::core::{CancellationToken, StagePool, WorkPlan};
use crate::error::VzipError;
use crate::format::ArchiveWriter;
use crate::io::FrameScanner;
use crate::telemetry::worker::{DefaultStageTelemetry, StageTelemetry};
use crate::telemetry::{self, tags};
use crate::types::{FrameSet, Result, duration_to_us};

pub mod consumer;
pub mod context;
pub mod extract;
pub mod producer;
pub mod types;

pub use context::PipelineContext;
pub use extract::{ExtractStats, FrameExtractor};
pub use types::{
    ArchiveRunStats, CapacityPolicy, DEFAULT_ARCHIVE_NAME, DEFAULT_CONSUMER_THREADS,
    DEFAULT_PRODUCER_THREADS, PipelineConfig, PipelineState, ProgressSnapshot,
};

// Progress interval used when the caller does not watch progress.
const QUIET_PROGRESS_INTERVAL: Duration = Duration::from_secs(3600);

/// Compresses a directory of numbered frames into one archive.
///
/// Producers read frames into a shared slot table and hand slot indices to
/// consumers through a LIFO ready queue; consumers compress each slot. Once
/// every thread has joined, slots are written in frame order.
pub struct FramePipeline {
    config: PipelineConfig,
    telemetry: Arc<dyn StageTelemetry>,
}

impl FramePipeline {
    /// Creates a pipeline using the default stage telemetry implementation.
    pub fn new(config: PipelineConfig) -> Result<Self> {
        Self::with_telemetry(config, Arc::new(DefaultStageTelemetry))
    }

    /// Creates a pipeline with a custom telemetry backend.
    pub fn with_telemetry(
        config: PipelineConfig,
        telemetry: Arc<dyn StageTelemetry>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, telemetry })
    }

    /// Validated configuration of this pipeline.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Lists the frames of `dir` with the configured extension.
    pub fn discover<P: AsRef<Path>>(&self, dir: P) -> Result<FrameSet> {
        FrameScanner::new(self.config.extension.as_str()).scan(dir.as_ref())
    }

    /// Work plans for the producer and consumer roles.
    pub fn plan(&self, total: usize) -> Result<(WorkPlan, WorkPlan)> {
        let partition = self.config.partition;
        let producers = WorkPlan::new(total, self.config.producer_threads, partition)
            .map_err(|error| error.with_context("partitioning producers"))?;
        let consumers = WorkPlan::new(total, self.config.consumer_threads, partition)
            .map_err(|error| error.with_context("partitioning consumers"))?;
        Ok((producers, consumers))
    }

    /// Discovers the frames in `dir` and archives them into `writer`.
    pub fn archive_directory<P, W>(&self, dir: P, writer: W) -> Result<(W, ArchiveRunStats)>
    where
        P: AsRef<Path>,
        W: Write,
    {
        let frames = self.discover(dir)?;
        self.archive_frames(frames, writer)
    }

    /// Archives already discovered `frames` into `writer`.
    pub fn archive_frames<W: Write>(
        &self,
        frames: FrameSet,
        writer: W,
    ) -> Result<(W, ArchiveRunStats)> {
        self.archive_frames_with(
            frames,
            writer,
            CancellationToken::new(),
            QUIET_PROGRESS_INTERVAL,
            |_snapshot| {},
        )
    }

    /// Archives `frames`, calling `on_progress` roughly every
    /// `progress_interval` while threads run and once after they join.
    pub fn archive_frames_with_progress<W, F>(
        &self,
        frames: FrameSet,
        writer: W,
        progress_interval: Duration,
        on_progress: F,
    ) -> Result<(W, ArchiveRunStats)>
    where
        W: Write,
        F: FnMut(ProgressSnapshot),
    {
        self.archive_frames_with(
            frames,
            writer,
            CancellationToken::new(),
            progress_interval,
            on_progress,
        )
    }

    /// Archives `frames`, stopping with [`VzipError::Cancelled`] if `cancel`
    /// is triggered before every frame is compressed.
    pub fn archive_frames_cancellable<W: Write>(
        &self,
        frames: FrameSet,
        writer: W,
        cancel: CancellationToken,
    ) -> Result<(W, ArchiveRunStats)> {
        self.archive_frames_with(frames, writer, cancel, QUIET_PROGRESS_INTERVAL, |_| {})
    }

    fn archive_frames_with<W, F>(
        &self,
        frames: FrameSet,
        writer: W,
        cancel: CancellationToken,
        progress_interval: Duration,
        mut on_progress: F,
    ) -> Result<(W, ArchiveRunStats)>
    where
        W: Write,
        F: FnMut(ProgressSnapshot),
    {
        let started_at = Instant::now();
        let mut phase_us = BTreeMap::new();
        let mut state = PipelineState::Idle;

        if frames.is_empty() {
            return Err(VzipError::EmptyInput);
        }
        let frames_total = frames.len();
        let frame_capacity = self.config.capacity.resolve(&frames)?;
        let (producer_plan, consumer_plan) = self.plan(frames_total)?;
        state = state.advance(PipelineState::Partitioned)?;
        let partition_us = duration_to_us(started_at.elapsed());
        phase_us.insert("partition".to_string(), partition_us);

        tracing::info!(
            target: tags::TARGET_PIPELINE,
            frames = frames_total,
            frame_capacity,
            producers = producer_plan.threads(),
            producer_regular = producer_plan.regular(),
            producer_remainder = producer_plan.remainder(),
            consumers = consumer_plan.threads(),
            consumer_regular = consumer_plan.regular(),
            consumer_remainder = consumer_plan.remainder(),
            "archive run partitioned"
        );

        let run_started_at = Instant::now();
        let context = PipelineContext::new(frames, frame_capacity, &self.config, cancel)?;
        let context = Arc::new(context);
        let telemetry = Arc::clone(&self.telemetry);
        let pool = StagePool::with_telemetry(producer_plan, consumer_plan, telemetry);
        let handle = pool.spawn(
            Arc::clone(&context),
            producer::run_producer,
            consumer::run_consumer,
        )?;
        state = state.advance(PipelineState::Running)?;

        let emit_every = progress_interval.max(Duration::from_millis(10));
        let joined = handle.finish_with_progress(emit_every, |runtime| {
            on_progress(context.progress(started_at, runtime.clone()));
        });
        let runtime = match joined {
            Ok(runtime) => runtime,
            Err(error) => {
                tracing::warn!(
                    target: tags::TARGET_PIPELINE,
                    state = %state,
                    %error,
                    "archive run failed; no archive emitted"
                );
                return Err(error);
            }
        };
        state = state.advance(PipelineState::Drained)?;
        let run_us = duration_to_us(run_started_at.elapsed());
        phase_us.insert("run".to_string(), run_us);
        on_progress(context.progress(started_at, runtime.clone()));

        let emit_started_at = Instant::now();
        let slots = context.slots();
        let mut archive = ArchiveWriter::new(writer);
        let mut payload_bytes = 0u64;
        for index in 0..slots.len() {
            let entry = slots.take_output(index)?;
            payload_bytes += entry.len() as u64;
            archive.write_entry(&entry)?;
        }
        let archive_bytes = archive.bytes_written();
        let writer = archive.finish()?;
        state = state.advance(PipelineState::Emitted)?;
        let emit_us = duration_to_us(emit_started_at.elapsed());
        phase_us.insert("emit".to_string(), emit_us);
        state = state.advance(PipelineState::Closed)?;

        let elapsed = started_at.elapsed();
        telemetry::increment_counter(
            tags::METRIC_ARCHIVE_RUN_COUNT,
            1,
            &[("subsystem", "pipeline"), ("op", "archive")],
        );
        telemetry::increment_counter(
            tags::METRIC_ARCHIVE_ENTRY_COUNT,
            frames_total as u64,
            &[("subsystem", "pipeline"), ("op", "archive")],
        );
        telemetry::increment_counter(
            tags::METRIC_ARCHIVE_BYTES,
            archive_bytes,
            &[("subsystem", "pipeline"), ("op", "archive")],
        );
        telemetry::record_histogram(
            tags::METRIC_ARCHIVE_LATENCY_US,
            duration_to_us(elapsed),
            &[("subsystem", "pipeline"), ("op", "archive")],
        );

        let stats = ArchiveRunStats {
            frames_total,
            frame_capacity,
            bytes_read: context.bytes_read(),
            payload_bytes,
            archive_bytes,
            elapsed,
            producer_plan,
            consumer_plan,
            threads: runtime.threads,
            buffer_pool: context.buffer_metrics(),
            state,
            phase_us,
        };
        tracing::info!(
            target: tags::TARGET_PIPELINE,
            frames = stats.frames_total,
            archive_bytes = stats.archive_bytes,
            compression_rate = stats.compression_rate(),
            elapsed_us = duration_to_us(stats.elapsed),
            "archive run finished"
        );

        Ok((writer, stats))
    }
}
