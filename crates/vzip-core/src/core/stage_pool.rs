use std::any::Any;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, unbounded};
use serde::{Deserialize, Serialize};

use crate::core::partition::WorkPlan;
use crate::error::VzipError;
use crate::telemetry::tags;
use crate::telemetry::worker::{DefaultStageTelemetry, StageTelemetry};
use crate::types::{Result, duration_to_us};

/// Which side of the pipeline a thread runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StageRole {
    Producer,
    Consumer,
}

impl StageRole {
    /// Lowercase role name used in thread names and metric labels.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Producer => "producer",
            Self::Consumer => "consumer",
        }
    }
}

impl fmt::Display for StageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The fixed share of work one thread was spawned with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageAssignment {
    pub role: StageRole,
    pub thread_id: usize,
    pub share: usize,
}

impl StageAssignment {
    /// Thread 0 of each role absorbs the partition remainder.
    pub fn is_remainder_thread(&self) -> bool {
        self.thread_id == 0
    }

    /// OS thread name, e.g. `vzip-consumer-3`.
    pub fn thread_name(&self) -> String {
        format!("vzip-{}-{}", self.role, self.thread_id)
    }
}

/// Shared state a stage pool wakes up when one of its threads fails.
pub trait Interrupt: Send + Sync {
    /// Cancels the run and wakes every blocked thread.
    fn interrupt(&self);
}

type StageFn<C> = Arc<dyn Fn(&C, &StageMeter<'_>) -> Result<usize> + Send + Sync>;

/// Fixed pools of producer and consumer threads sharing one context.
pub struct StagePool {
    producers: WorkPlan,
    consumers: WorkPlan,
    telemetry: Arc<dyn StageTelemetry>,
}

impl StagePool {
    /// Creates a stage pool using the default stage telemetry implementation.
    pub fn new(producers: WorkPlan, consumers: WorkPlan) -> Self {
        Self::with_telemetry(producers, consumers, Arc::new(DefaultStageTelemetry))
    }

    /// Creates a stage pool with a custom telemetry backend.
    pub fn with_telemetry(
        producers: WorkPlan,
        consumers: WorkPlan,
        telemetry: Arc<dyn StageTelemetry>,
    ) -> Self {
        Self {
            producers,
            consumers,
            telemetry,
        }
    }

    /// Number of threads the pool spawns across both roles.
    pub fn thread_count(&self) -> usize {
        self.producers.threads() + self.consumers.threads()
    }

    /// Producer assignments followed by consumer assignments, in thread order.
    pub fn assignments(&self) -> Vec<StageAssignment> {
        let producers = self
            .producers
            .shares()
            .enumerate()
            .map(|(thread_id, share)| StageAssignment {
                role: StageRole::Producer,
                thread_id,
                share,
            });
        let consumers = self
            .consumers
            .shares()
            .enumerate()
            .map(|(thread_id, share)| StageAssignment {
                role: StageRole::Consumer,
                thread_id,
                share,
            });
        producers.chain(consumers).collect()
    }

    /// Starts every producer and consumer thread.
    ///
    /// If a thread cannot be spawned the context is interrupted, the threads
    /// already running are joined, and the spawn error is returned.
    pub fn spawn<C, P, Q>(
        &self,
        context: Arc<C>,
        producer: P,
        consumer: Q,
    ) -> Result<StagePoolHandle>
    where
        C: Interrupt + 'static,
        P: Fn(&C, &StageMeter<'_>) -> Result<usize> + Send + Sync + 'static,
        Q: Fn(&C, &StageMeter<'_>) -> Result<usize> + Send + Sync + 'static,
    {
        let assignments = self.assignments();
        let telemetry = Arc::clone(&self.telemetry);
        let state = Arc::new(StagePoolState::new(assignments.clone(), telemetry));
        let producer: StageFn<C> = Arc::new(producer);
        let consumer: StageFn<C> = Arc::new(consumer);
        let (results_tx, results_rx) = unbounded();

        let mut thread_handles = Vec::with_capacity(assignments.len());
        for (position, assignment) in assignments.iter().copied().enumerate() {
            let stage = match assignment.role {
                StageRole::Producer => Arc::clone(&producer),
                StageRole::Consumer => Arc::clone(&consumer),
            };
            let thread_state = Arc::clone(&state);
            let thread_context = Arc::clone(&context);
            let thread_tx = results_tx.clone();
            let name = assignment.thread_name();

            let builder = thread::Builder::new().name(name.clone());
            let spawned = builder.spawn(move || {
                run_stage_thread(
                    thread_state,
                    position,
                    assignment,
                    thread_context,
                    stage,
                    thread_tx,
                );
            });

            match spawned {
                Ok(handle) => thread_handles.push(handle),
                Err(error) => {
                    context.interrupt();
                    drop(results_tx);
                    for handle in thread_handles {
                        let _ = handle.join();
                    }
                    let message = format!("failed to spawn {name}");
                    return Err(VzipError::Io(error).with_context(message));
                }
            }
        }

        drop(results_tx);
        tracing::debug!(
            target: tags::TARGET_STAGE,
            producers = self.producers.threads(),
            consumers = self.consumers.threads(),
            "stage threads started"
        );

        Ok(StagePoolHandle {
            expected: assignments.len(),
            state,
            results_rx,
            thread_handles,
        })
    }
}

struct StagePoolState {
    assignments: Vec<StageAssignment>,
    telemetry: Arc<dyn StageTelemetry>,
    started_at: Instant,
    finished: AtomicUsize,
    task_counts: Vec<AtomicUsize>,
    started_offsets_us: Vec<AtomicU64>,
    stopped_offsets_us: Vec<AtomicU64>,
    busy_us: Vec<AtomicU64>,
}

impl StagePoolState {
    fn new(assignments: Vec<StageAssignment>, telemetry: Arc<dyn StageTelemetry>) -> Self {
        let threads = assignments.len();
        Self {
            assignments,
            telemetry,
            started_at: Instant::now(),
            finished: AtomicUsize::new(0),
            task_counts: zeroed(threads),
            started_offsets_us: zeroed(threads),
            stopped_offsets_us: zeroed(threads),
            busy_us: zeroed(threads),
        }
    }

    // Offsets are stored plus one so zero means "not yet".
    fn mark(&self, offsets: &[AtomicU64], position: usize) {
        let offset_us = duration_to_us(self.started_at.elapsed());
        offsets[position].store(offset_us.saturating_add(1), Ordering::Release);
    }
}

/// Per-thread instrumentation handed to stage functions.
pub struct StageMeter<'a> {
    state: &'a StagePoolState,
    position: usize,
    assignment: StageAssignment,
}

impl StageMeter<'_> {
    /// Role, thread id and share of the thread this meter belongs to.
    pub fn assignment(&self) -> StageAssignment {
        self.assignment
    }

    /// Runs one unit of work, counting it as busy time.
    pub fn run_task<T>(
        &self,
        task_kind: &'static str,
        task: impl FnOnce() -> Result<T>,
    ) -> Result<T> {
        let role = self.assignment.role;
        let thread_id = self.assignment.thread_id;
        let telemetry = &self.state.telemetry;
        telemetry.on_task_started(role, thread_id, task_kind);

        let started_at = Instant::now();
        let result = task();
        let elapsed = started_at.elapsed();
        let elapsed_us = duration_to_us(elapsed);
        let busy_us = &self.state.busy_us[self.position];
        busy_us.fetch_add(elapsed_us, Ordering::AcqRel);

        match &result {
            Ok(_) => {
                let completed = &self.state.task_counts[self.position];
                completed.fetch_add(1, Ordering::AcqRel);
                telemetry.on_task_finished(role, thread_id, task_kind, elapsed);
            }
            Err(_) => telemetry.on_task_failed(role, thread_id, task_kind, elapsed),
        }

        result
    }

    /// Reports the ready queue depth observed by this thread.
    pub fn record_queue_depth(&self, depth: usize) {
        let role = self.assignment.role;
        let thread_id = self.assignment.thread_id;
        self.state.telemetry.on_queue_depth(role, thread_id, depth);
    }
}

/// Runtime metrics for one stage thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRuntimeSnapshot {
    pub role: StageRole,
    pub thread_id: usize,
    pub assigned: usize,
    pub tasks_completed: usize,
    pub uptime: Duration,
    pub busy: Duration,
    pub idle: Duration,
    pub utilization: f64,
}

/// Runtime metrics for every stage thread of a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PoolRuntimeSnapshot {
    pub elapsed: Duration,
    pub threads_finished: usize,
    pub threads: Vec<StageRuntimeSnapshot>,
}

impl PoolRuntimeSnapshot {
    /// Threads of one role, in thread-id order.
    pub fn by_role(&self, role: StageRole) -> impl Iterator<Item = &StageRuntimeSnapshot> {
        self.threads.iter().filter(move |thread| thread.role == role)
    }

    /// Total tasks completed by every thread of `role`.
    pub fn tasks_completed(&self, role: StageRole) -> usize {
        self.by_role(role).map(|run| run.tasks_completed).sum()
    }
}

struct StageOutcome {
    assignment: StageAssignment,
    result: Result<usize>,
}

/// Handle to running stage threads.
pub struct StagePoolHandle {
    expected: usize,
    state: Arc<StagePoolState>,
    results_rx: Receiver<StageOutcome>,
    thread_handles: Vec<JoinHandle<()>>,
}

impl StagePoolHandle {
    /// Number of threads that were spawned.
    pub fn thread_count(&self) -> usize {
        self.expected
    }

    /// Number of threads that have returned from their stage function.
    pub fn finished_count(&self) -> usize {
        self.state.finished.load(Ordering::Acquire)
    }

    /// Point-in-time runtime metrics for every thread.
    pub fn runtime_snapshot(&self) -> PoolRuntimeSnapshot {
        let elapsed = self.state.started_at.elapsed();
        let elapsed_us = duration_to_us(elapsed);

        let state = &self.state;
        let threads = state
            .assignments
            .iter()
            .enumerate()
            .map(|(position, assignment)| {
                let started_raw = state.started_offsets_us[position].load(Ordering::Acquire);
                let stopped_raw = state.stopped_offsets_us[position].load(Ordering::Acquire);
                let busy_raw = state.busy_us[position].load(Ordering::Acquire);
                let tasks_completed = state.task_counts[position].load(Ordering::Acquire);

                let start_us = started_raw.saturating_sub(1);
                let stop_us = if stopped_raw == 0 {
                    elapsed_us
                } else {
                    stopped_raw.saturating_sub(1)
                };
                let uptime_us = if started_raw == 0 {
                    0
                } else {
                    stop_us.saturating_sub(start_us)
                };
                let busy_us = busy_raw.min(uptime_us);
                let utilization = if uptime_us == 0 {
                    0.0
                } else {
                    busy_us as f64 / uptime_us as f64
                };

                StageRuntimeSnapshot {
                    role: assignment.role,
                    thread_id: assignment.thread_id,
                    assigned: assignment.share,
                    tasks_completed,
                    uptime: Duration::from_micros(uptime_us),
                    busy: Duration::from_micros(busy_us),
                    idle: Duration::from_micros(uptime_us.saturating_sub(busy_us)),
                    utilization,
                }
            })
            .collect();

        PoolRuntimeSnapshot {
            elapsed,
            threads_finished: self.finished_count(),
            threads,
        }
    }

    /// Waits for every thread to report and joins them.
    pub fn finish(self) -> Result<PoolRuntimeSnapshot> {
        self.finish_with_progress(Duration::from_millis(250), |_| {})
    }

    /// Like [`finish`](Self::finish), calling `on_tick` with a runtime
    /// snapshot each time `interval` passes without a thread reporting.
    ///
    /// The returned error is the first failure that is not a cancellation;
    /// threads that only stopped because of it are not reported.
    pub fn finish_with_progress<F>(
        mut self,
        interval: Duration,
        mut on_tick: F,
    ) -> Result<PoolRuntimeSnapshot>
    where
        F: FnMut(&PoolRuntimeSnapshot),
    {
        let mut root_cause: Option<VzipError> = None;
        let mut cancelled: Option<VzipError> = None;
        let mut record = |error: VzipError| {
            if error.is_cancelled() {
                cancelled.get_or_insert(error);
            } else if root_cause.is_none() {
                root_cause = Some(error);
            }
        };

        let mut received = 0;
        while received < self.expected {
            match self.results_rx.recv_timeout(interval) {
                Ok(outcome) => {
                    received += 1;
                    if let Err(error) = outcome.result {
                        let role = outcome.assignment.role;
                        let thread_id = outcome.assignment.thread_id;
                        record(error.with_context(format!("{role} thread {thread_id}")));
                    }
                }
                Err(RecvTimeoutError::Timeout) => on_tick(&self.runtime_snapshot()),
                Err(RecvTimeoutError::Disconnected) => {
                    record(VzipError::InvalidState(
                        "stage result channel closed before every thread reported".to_string(),
                    ));
                    break;
                }
            }
        }

        if let Err(details) = self.join_threads() {
            record(VzipError::InvalidState(details));
        }

        match root_cause.or(cancelled) {
            Some(error) => Err(error),
            None => Ok(self.runtime_snapshot()),
        }
    }

    fn join_threads(&mut self) -> std::result::Result<(), String> {
        let mut first_panic = None;
        for handle in self.thread_handles.drain(..) {
            let name = handle.thread().name().unwrap_or("stage").to_string();
            if let Err(payload) = handle.join() {
                first_panic.get_or_insert(format!(
                    "{name} panicked: {}",
                    panic_message(payload.as_ref())
                ));
            }
        }

        match first_panic {
            Some(details) => Err(details),
            None => Ok(()),
        }
    }
}

fn run_stage_thread<C: Interrupt>(
    state: Arc<StagePoolState>,
    position: usize,
    assignment: StageAssignment,
    context: Arc<C>,
    stage: StageFn<C>,
    results_tx: Sender<StageOutcome>,
) {
    state.mark(&state.started_offsets_us, position);
    let meter = StageMeter {
        state: &state,
        position,
        assignment,
    };

    let result = match catch_unwind(AssertUnwindSafe(|| stage(context.as_ref(), &meter))) {
        Ok(result) => result,
        Err(payload) => Err(VzipError::InvalidState(format!(
            "{} panicked: {}",
            assignment.thread_name(),
            panic_message(payload.as_ref())
        ))),
    };

    match &result {
        Ok(tasks) => tracing::debug!(
            target: tags::TARGET_STAGE,
            role = assignment.role.as_str(),
            thread_id = assignment.thread_id,
            tasks,
            "stage thread finished"
        ),
        Err(error) => {
            if !error.is_cancelled() {
                tracing::warn!(
                    target: tags::TARGET_STAGE,
                    role = assignment.role.as_str(),
                    thread_id = assignment.thread_id,
                    %error,
                    "stage thread failed; cancelling run"
                );
            }
            context.interrupt();
        }
    }

    state.mark(&state.stopped_offsets_us, position);
    state.finished.fetch_add(1, Ordering::AcqRel);
    let _ = results_tx.send(StageOutcome { assignment, result });
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

fn zeroed<T: Default>(len: usize) -> Vec<T> {
    (0..len).map(|_| T::default()).collect()
}
