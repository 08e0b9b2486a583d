use std::time::Duration;

use crate::core::StageRole;
use crate::telemetry;
use crate::telemetry::tags;
use crate::types::duration_to_us;

/// Hooks invoked by pipeline threads around each unit of work.
///
/// The stage pool owns one implementation and shares it across every
/// producer and consumer thread.
pub trait StageTelemetry: Send + Sync {
    fn on_queue_depth(&self, role: StageRole, thread_id: usize, depth: usize);
    fn on_task_started(&self, role: StageRole, thread_id: usize, task_kind: &str);
    fn on_task_finished(
        &self,
        role: StageRole,
        thread_id: usize,
        task_kind: &str,
        elapsed: Duration,
    );
    fn on_task_failed(
        &self,
        role: StageRole,
        thread_id: usize,
        task_kind: &str,
        elapsed: Duration,
    );
}

/// Records stage metrics in the telemetry registry and emits debug events.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultStageTelemetry;

impl StageTelemetry for DefaultStageTelemetry {
    fn on_queue_depth(&self, role: StageRole, thread_id: usize, depth: usize) {
        telemetry::set_gauge(
            tags::METRIC_READY_QUEUE_DEPTH,
            depth as u64,
            &[("subsystem", "stage"), ("op", "queue_depth")],
        );
        telemetry::record_histogram(
            tags::METRIC_READY_QUEUE_DEPTH_HIST,
            depth as u64,
            &[("subsystem", "stage"), ("op", "queue_depth")],
        );
        tracing::trace!(
            target: tags::TARGET_STAGE,
            op = "queue_depth",
            role = role.as_str(),
            thread_id,
            queue_depth = depth,
            "ready queue depth sampled"
        );
    }

    fn on_task_started(&self, role: StageRole, thread_id: usize, task_kind: &str) {
        telemetry::increment_counter(
            tags::METRIC_STAGE_TASK_START_COUNT,
            1,
            &[("subsystem", "stage"), ("op", "task_start")],
        );
        telemetry::add_gauge(
            tags::METRIC_STAGE_ACTIVE_COUNT,
            1,
            &[("subsystem", "stage"), ("op", "task_start")],
        );
        tracing::trace!(
            target: tags::TARGET_STAGE,
            op = "task_start",
            role = role.as_str(),
            thread_id,
            task_kind,
            "stage task started"
        );
    }

    fn on_task_finished(
        &self,
        role: StageRole,
        thread_id: usize,
        task_kind: &str,
        elapsed: Duration,
    ) {
        let elapsed_us = duration_to_us(elapsed);

        telemetry::increment_counter(
            tags::METRIC_STAGE_TASK_FINISH_COUNT,
            1,
            &[
                ("subsystem", "stage"),
                ("op", "task_finish"),
                ("result", "ok"),
            ],
        );
        telemetry::record_histogram(
            tags::METRIC_STAGE_TASK_LATENCY_US,
            elapsed_us,
            &[("subsystem", "stage"), ("op", "task"), ("result", "ok")],
        );
        telemetry::sub_gauge_saturating(
            tags::METRIC_STAGE_ACTIVE_COUNT,
            1,
            &[("subsystem", "stage"), ("op", "task_finish")],
        );
        tracing::debug!(
            target: tags::TARGET_STAGE,
            op = "task_finish",
            result = "ok",
            role = role.as_str(),
            thread_id,
            task_kind,
            elapsed_us,
            "stage task finished"
        );
    }

    fn on_task_failed(
        &self,
        role: StageRole,
        thread_id: usize,
        task_kind: &str,
        elapsed: Duration,
    ) {
        let elapsed_us = duration_to_us(elapsed);

        telemetry::increment_counter(
            tags::METRIC_STAGE_TASK_FAIL_COUNT,
            1,
            &[
                ("subsystem", "stage"),
                ("op", "task_finish"),
                ("result", "error"),
            ],
        );
        telemetry::record_histogram(
            tags::METRIC_STAGE_TASK_LATENCY_US,
            elapsed_us,
            &[("subsystem", "stage"), ("op", "task"), ("result", "error")],
        );
        telemetry::sub_gauge_saturating(
            tags::METRIC_STAGE_ACTIVE_COUNT,
            1,
            &[("subsystem", "stage"), ("op", "task_failed")],
        );
        tracing::warn!(
            target: tags::TARGET_STAGE,
            op = "task_finish",
            result = "error",
            role = role.as_str(),
            thread_id,
            task_kind,
            elapsed_us,
            "stage task failed"
        );
    }
}
