use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::{StageRole, StageRuntimeSnapshot};
use crate::pipeline::{ArchiveRunStats, ExtractStats};
use crate::telemetry::{self, TelemetrySnapshot};
use crate::types::duration_to_us;

/// Options controlling how reports are built.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportBuildOptions {
    /// Attaches a point-in-time telemetry snapshot to the report.
    pub include_telemetry_snapshot: bool,
}

/// Scalar value used by report exports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ReportValue {
    U64(u64),
    F64(f64),
    Duration(Duration),
    Bool(bool),
    Text(String),
}

/// Metrics for one producer or consumer thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerReport {
    pub role: StageRole,
    pub thread_id: usize,
    pub assigned: usize,
    pub tasks_completed: usize,
    pub uptime: Duration,
    pub busy: Duration,
    pub idle: Duration,
    pub utilization: f64,
}

impl WorkerReport {
    pub fn from_runtime(runtime: &StageRuntimeSnapshot) -> Self {
        Self {
            role: runtime.role,
            thread_id: runtime.thread_id,
            assigned: runtime.assigned,
            tasks_completed: runtime.tasks_completed,
            uptime: runtime.uptime,
            busy: runtime.busy,
            idle: runtime.idle,
            utilization: runtime.utilization,
        }
    }
}

/// Orchestrator phase timings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThreadReport {
    pub name: String,
    pub stage_us: BTreeMap<String, u64>,
}

impl ThreadReport {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stage_us: BTreeMap::new(),
        }
    }
}

/// Export-oriented view of an archive run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchiveReport {
    pub elapsed: Duration,
    pub frames_total: usize,
    pub frame_capacity: usize,
    pub nominal_input_bytes: u64,
    pub bytes_read: u64,
    pub payload_bytes: u64,
    pub archive_bytes: u64,
    pub compression_rate: f64,
    pub read_avg_bps: f64,
    pub workers: Vec<WorkerReport>,
    pub main_thread: ThreadReport,
    pub telemetry: Option<TelemetrySnapshot>,
}

impl ArchiveReport {
    pub fn from_run_stats(stats: &ArchiveRunStats, options: ReportBuildOptions) -> Self {
        let elapsed_secs = stats.elapsed.as_secs_f64().max(1e-6);

        let mut main_thread = ThreadReport::new("main");
        main_thread.stage_us = stats.phase_us.clone();

        Self {
            elapsed: stats.elapsed,
            frames_total: stats.frames_total,
            frame_capacity: stats.frame_capacity,
            nominal_input_bytes: stats.nominal_input_bytes(),
            bytes_read: stats.bytes_read,
            payload_bytes: stats.payload_bytes,
            archive_bytes: stats.archive_bytes,
            compression_rate: stats.compression_rate(),
            read_avg_bps: stats.bytes_read as f64 / elapsed_secs,
            workers: stats
                .threads
                .iter()
                .map(WorkerReport::from_runtime)
                .collect(),
            main_thread,
            telemetry: options
                .include_telemetry_snapshot
                .then(telemetry::snapshot),
        }
    }
}

/// Export-oriented view of an extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractReport {
    pub elapsed: Duration,
    pub entries: usize,
    pub archive_bytes: u64,
    pub output_bytes: u64,
    pub output_archive_ratio: f64,
    pub telemetry: Option<TelemetrySnapshot>,
}

impl ExtractReport {
    pub fn from_stats(stats: &ExtractStats, options: ReportBuildOptions) -> Self {
        let output_archive_ratio = if stats.archive_bytes == 0 {
            1.0
        } else {
            stats.output_bytes as f64 / stats.archive_bytes as f64
        };

        Self {
            elapsed: stats.elapsed,
            entries: stats.entries,
            archive_bytes: stats.archive_bytes,
            output_bytes: stats.output_bytes,
            output_archive_ratio,
            telemetry: options
                .include_telemetry_snapshot
                .then(telemetry::snapshot),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RunReport {
    Archive(ArchiveReport),
    Extract(ExtractReport),
}

/// Common export shape for report types.
pub trait ReportExport {
    fn to_flat_map(&self) -> BTreeMap<String, ReportValue>;
}

impl ReportExport for ArchiveReport {
    fn to_flat_map(&self) -> BTreeMap<String, ReportValue> {
        let mut out = BTreeMap::new();
        out.insert(
            "archive.elapsed_us".to_string(),
            ReportValue::U64(duration_to_us(self.elapsed)),
        );
        out.insert(
            "archive.frames_total".to_string(),
            ReportValue::U64(self.frames_total as u64),
        );
        out.insert(
            "archive.frame_capacity".to_string(),
            ReportValue::U64(self.frame_capacity as u64),
        );
        out.insert(
            "archive.nominal_input_bytes".to_string(),
            ReportValue::U64(self.nominal_input_bytes),
        );
        out.insert(
            "archive.bytes_read".to_string(),
            ReportValue::U64(self.bytes_read),
        );
        out.insert(
            "archive.payload_bytes".to_string(),
            ReportValue::U64(self.payload_bytes),
        );
        out.insert(
            "archive.archive_bytes".to_string(),
            ReportValue::U64(self.archive_bytes),
        );
        out.insert(
            "archive.compression_rate".to_string(),
            ReportValue::F64(self.compression_rate),
        );
        out.insert(
            "archive.read_avg_bps".to_string(),
            ReportValue::F64(self.read_avg_bps),
        );
        out.insert(
            "archive.worker_count".to_string(),
            ReportValue::U64(self.workers.len() as u64),
        );

        flatten_thread("thread.main", &self.main_thread, &mut out);
        flatten_workers(&self.workers, &mut out);
        if let Some(snapshot) = &self.telemetry {
            flatten_telemetry(snapshot, &mut out);
        }

        out
    }
}

impl ReportExport for ExtractReport {
    fn to_flat_map(&self) -> BTreeMap<String, ReportValue> {
        let mut out = BTreeMap::new();
        out.insert(
            "extract.elapsed_us".to_string(),
            ReportValue::U64(duration_to_us(self.elapsed)),
        );
        out.insert(
            "extract.entries".to_string(),
            ReportValue::U64(self.entries as u64),
        );
        out.insert(
            "extract.archive_bytes".to_string(),
            ReportValue::U64(self.archive_bytes),
        );
        out.insert(
            "extract.output_bytes".to_string(),
            ReportValue::U64(self.output_bytes),
        );
        out.insert(
            "extract.output_archive_ratio".to_string(),
            ReportValue::F64(self.output_archive_ratio),
        );
        if let Some(snapshot) = &self.telemetry {
            flatten_telemetry(snapshot, &mut out);
        }

        out
    }
}

impl ReportExport for RunReport {
    fn to_flat_map(&self) -> BTreeMap<String, ReportValue> {
        match self {
            RunReport::Archive(report) => report.to_flat_map(),
            RunReport::Extract(report) => report.to_flat_map(),
        }
    }
}

impl ArchiveRunStats {
    pub fn to_report(&self, options: ReportBuildOptions) -> ArchiveReport {
        ArchiveReport::from_run_stats(self, options)
    }

    pub fn to_flat_map(&self, options: ReportBuildOptions) -> BTreeMap<String, ReportValue> {
        self.to_report(options).to_flat_map()
    }
}

fn flatten_workers(workers: &[WorkerReport], out: &mut BTreeMap<String, ReportValue>) {
    for worker in workers {
        let prefix = format!("worker.{}.{}", worker.role, worker.thread_id);
        out.insert(
            format!("{prefix}.assigned"),
            ReportValue::U64(worker.assigned as u64),
        );
        out.insert(
            format!("{prefix}.tasks_completed"),
            ReportValue::U64(worker.tasks_completed as u64),
        );
        out.insert(
            format!("{prefix}.uptime_us"),
            ReportValue::U64(duration_to_us(worker.uptime)),
        );
        out.insert(
            format!("{prefix}.busy_us"),
            ReportValue::U64(duration_to_us(worker.busy)),
        );
        out.insert(
            format!("{prefix}.idle_us"),
            ReportValue::U64(duration_to_us(worker.idle)),
        );
        out.insert(
            format!("{prefix}.utilization"),
            ReportValue::F64(worker.utilization),
        );
    }
}

fn flatten_thread(prefix: &str, thread: &ThreadReport, out: &mut BTreeMap<String, ReportValue>) {
    out.insert(
        format!("{prefix}.name"),
        ReportValue::Text(thread.name.clone()),
    );
    for (stage, value) in &thread.stage_us {
        out.insert(
            format!("{prefix}.stage.{stage}_us"),
            ReportValue::U64(*value),
        );
    }
}

fn flatten_telemetry(snapshot: &TelemetrySnapshot, out: &mut BTreeMap<String, ReportValue>) {
    for (name, value) in &snapshot.counters {
        out.insert(
            format!("telemetry.counter.{name}"),
            ReportValue::U64(*value),
        );
    }

    for (name, value) in &snapshot.gauges {
        out.insert(format!("telemetry.gauge.{name}"), ReportValue::U64(*value));
    }
    for (name, value) in &snapshot.gauge_peaks {
        out.insert(format!("telemetry.peak.{name}"), ReportValue::U64(*value));
    }

    for (name, histogram) in &snapshot.histograms {
        out.insert(
            format!("telemetry.histogram.{name}.count"),
            ReportValue::U64(histogram.count),
        );
        out.insert(
            format!("telemetry.histogram.{name}.mean"),
            ReportValue::F64(histogram.mean),
        );
        out.insert(
            format!("telemetry.histogram.{name}.max"),
            ReportValue::U64(histogram.max),
        );
    }

    let pipeline = snapshot.pipeline();
    let figures = [
        ("frames_scanned", pipeline.frames_scanned),
        ("frames_read", pipeline.frames_read),
        ("frames_compressed", pipeline.frames_compressed),
        ("codec_failures", pipeline.codec_failures),
        ("peak_ready_depth", pipeline.peak_ready_depth),
        ("peak_active_tasks", pipeline.peak_active_tasks),
    ];
    for (name, value) in figures {
        let key = format!("telemetry.pipeline.{name}");
        out.insert(key, ReportValue::U64(value));
    }
    let codec_ratio = ReportValue::F64(pipeline.codec_ratio());
    out.insert("telemetry.pipeline.codec_ratio".to_string(), codec_ratio);
}
