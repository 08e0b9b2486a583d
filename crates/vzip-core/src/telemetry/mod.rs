//! In-process metrics for archive and extract runs.
//!
//! Recording calls are no-ops unless the `telemetry` feature is enabled.
//! Gauges also keep the highest value reached since the last [`reset`], so
//! ready-queue and active-task pressure stay visible after a run drains.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub mod tags;
pub mod worker;

pub use worker::{DefaultStageTelemetry, StageTelemetry};

/// Histogram summary captured in telemetry snapshots.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct HistogramSnapshot {
    pub count: u64,
    pub total: u64,
    pub min: u64,
    pub max: u64,
    pub mean: f64,
}

/// In-memory view of collected telemetry metrics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySnapshot {
    pub counters: BTreeMap<String, u64>,
    /// Current gauge values.
    pub gauges: BTreeMap<String, u64>,
    /// Highest value each gauge reached.
    pub gauge_peaks: BTreeMap<String, u64>,
    pub histograms: BTreeMap<String, HistogramSnapshot>,
}

impl TelemetrySnapshot {
    pub fn counter(&self, name: &str) -> Option<u64> {
        self.counters.get(name).copied()
    }

    pub fn gauge(&self, name: &str) -> Option<u64> {
        self.gauges.get(name).copied()
    }

    /// High-water mark of a gauge.
    pub fn gauge_peak(&self, name: &str) -> Option<u64> {
        self.gauge_peaks.get(name).copied()
    }

    pub fn histogram(&self, name: &str) -> Option<HistogramSnapshot> {
        self.histograms.get(name).copied()
    }

    /// Pipeline-level figures derived from the raw metrics.
    pub fn pipeline(&self) -> PipelineTelemetry {
        PipelineTelemetry::from_snapshot(self)
    }
}

/// Frame counts and pressure figures for the runs covered by a snapshot.
///
/// Missing metrics read as zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineTelemetry {
    pub frames_scanned: u64,
    pub frames_read: u64,
    pub frames_compressed: u64,
    pub codec_failures: u64,
    pub archive_entries: u64,
    pub extracted_entries: u64,
    pub peak_ready_depth: u64,
    pub peak_active_tasks: u64,
    pub codec_input_bytes: u64,
    pub codec_output_bytes: u64,
    pub mean_codec_latency_us: f64,
}

impl PipelineTelemetry {
    pub fn from_snapshot(snapshot: &TelemetrySnapshot) -> Self {
        let counter = |name: &str| snapshot.counter(name).unwrap_or(0);
        let peak = |name: &str| snapshot.gauge_peak(name).unwrap_or(0);
        let codec_input = snapshot.histogram(tags::METRIC_CODEC_INPUT_BYTES);
        let codec_output = snapshot.histogram(tags::METRIC_CODEC_OUTPUT_BYTES);
        let codec_latency = snapshot.histogram(tags::METRIC_CODEC_LATENCY_US);

        Self {
            frames_scanned: counter(tags::METRIC_SCAN_FRAME_COUNT),
            frames_read: counter(tags::METRIC_PRODUCER_READ_COUNT),
            frames_compressed: counter(tags::METRIC_CONSUMER_COMPRESS_COUNT),
            codec_failures: counter(tags::METRIC_CODEC_FAILURE_COUNT),
            archive_entries: counter(tags::METRIC_ARCHIVE_ENTRY_COUNT),
            extracted_entries: counter(tags::METRIC_EXTRACT_ENTRY_COUNT),
            peak_ready_depth: peak(tags::METRIC_READY_QUEUE_DEPTH),
            peak_active_tasks: peak(tags::METRIC_STAGE_ACTIVE_COUNT),
            codec_input_bytes: codec_input.map_or(0, |hist| hist.total),
            codec_output_bytes: codec_output.map_or(0, |hist| hist.total),
            mean_codec_latency_us: codec_latency.map_or(0.0, |hist| hist.mean),
        }
    }

    /// Compressed size over input size for frames the codec accepted.
    pub fn codec_ratio(&self) -> f64 {
        if self.codec_input_bytes == 0 {
            return 0.0;
        }
        self.codec_output_bytes as f64 / self.codec_input_bytes as f64
    }

    /// Frames read that have not been compressed yet.
    pub fn frames_pending(&self) -> u64 {
        self.frames_read.saturating_sub(self.frames_compressed)
    }
}

/// Increments a named counter by `value`.
///
/// Labels are accepted for call-site readability; the registry keys on the name only.
#[inline]
pub fn increment_counter(name: &'static str, value: u64, _labels: &[(&str, &str)]) {
    #[cfg(feature = "telemetry")]
    registry::increment_counter(name, value);

    let _ = (name, value);
}

#[inline]
pub fn record_histogram(name: &'static str, value: u64, _labels: &[(&str, &str)]) {
    #[cfg(feature = "telemetry")]
    registry::record_histogram(name, value);

    let _ = (name, value);
}

#[inline]
pub fn set_gauge(name: &'static str, value: u64, _labels: &[(&str, &str)]) {
    #[cfg(feature = "telemetry")]
    registry::update_gauge(name, |_| value);

    let _ = (name, value);
}

#[inline]
pub fn add_gauge(name: &'static str, delta: u64, _labels: &[(&str, &str)]) {
    #[cfg(feature = "telemetry")]
    registry::update_gauge(name, |current| current.saturating_add(delta));

    let _ = (name, delta);
}

/// Subtracts `delta` from a gauge, stopping at zero.
#[inline]
pub fn sub_gauge_saturating(name: &'static str, delta: u64, _labels: &[(&str, &str)]) {
    #[cfg(feature = "telemetry")]
    registry::update_gauge(name, |current| current.saturating_sub(delta));

    let _ = (name, delta);
}

/// Returns a point-in-time snapshot of all collected telemetry.
pub fn snapshot() -> TelemetrySnapshot {
    #[cfg(feature = "telemetry")]
    let snapshot = registry::snapshot();
    #[cfg(not(feature = "telemetry"))]
    let snapshot = TelemetrySnapshot::default();

    snapshot
}

/// Clears every metric, peaks included.
pub fn reset() {
    #[cfg(feature = "telemetry")]
    registry::reset();
}

#[cfg(feature = "telemetry")]
mod registry {
    use std::collections::BTreeMap;
    use std::sync::{Mutex, OnceLock};

    use super::{HistogramSnapshot, TelemetrySnapshot};
    use crate::core::sync::lock_unpoisoned;

    #[derive(Debug, Clone, Copy, Default)]
    struct HistogramAggregate {
        count: u64,
        total: u64,
        min: u64,
        max: u64,
    }

    impl HistogramAggregate {
        fn record(&mut self, value: u64) {
            if self.count == 0 {
                self.min = value;
                self.max = value;
            } else {
                self.min = self.min.min(value);
                self.max = self.max.max(value);
            }

            self.count = self.count.saturating_add(1);
            self.total = self.total.saturating_add(value);
        }

        fn snapshot(&self) -> HistogramSnapshot {
            let mean = if self.count == 0 {
                0.0
            } else {
                self.total as f64 / self.count as f64
            };

            HistogramSnapshot {
                count: self.count,
                total: self.total,
                min: self.min,
                max: self.max,
                mean,
            }
        }
    }

    #[derive(Debug, Clone, Copy, Default)]
    struct Gauge {
        current: u64,
        peak: u64,
    }

    #[derive(Default)]
    struct Registry {
        counters: BTreeMap<&'static str, u64>,
        gauges: BTreeMap<&'static str, Gauge>,
        histograms: BTreeMap<&'static str, HistogramAggregate>,
    }

    fn registry() -> &'static Mutex<Registry> {
        static REGISTRY: OnceLock<Mutex<Registry>> = OnceLock::new();
        REGISTRY.get_or_init(Mutex::default)
    }

    pub(super) fn increment_counter(name: &'static str, value: u64) {
        let mut registry = lock_unpoisoned(registry());
        let entry = registry.counters.entry(name).or_insert(0);
        *entry = entry.saturating_add(value);
    }

    pub(super) fn record_histogram(name: &'static str, value: u64) {
        let mut registry = lock_unpoisoned(registry());
        registry.histograms.entry(name).or_default().record(value);
    }

    pub(super) fn update_gauge(name: &'static str, update: impl FnOnce(u64) -> u64) {
        let mut registry = lock_unpoisoned(registry());
        let gauge = registry.gauges.entry(name).or_default();
        gauge.current = update(gauge.current);
        gauge.peak = gauge.peak.max(gauge.current);
    }

    pub(super) fn snapshot() -> TelemetrySnapshot {
        let registry = lock_unpoisoned(registry());
        let mut snapshot = TelemetrySnapshot::default();

        for (name, value) in &registry.counters {
            snapshot.counters.insert((*name).to_owned(), *value);
        }
        for (name, gauge) in &registry.gauges {
            let name = (*name).to_owned();
            snapshot.gauges.insert(name.clone(), gauge.current);
            snapshot.gauge_peaks.insert(name, gauge.peak);
        }
        for (name, histogram) in &registry.histograms {
            let name = (*name).to_owned();
            snapshot.histograms.insert(name, histogram.snapshot());
        }

        snapshot
    }

    pub(super) fn reset() {
        *lock_unpoisoned(registry()) = Registry::default();
    }
}
