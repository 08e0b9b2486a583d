use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::error::VzipError;
use crate::types::{Result, duration_to_us};

/// Cooperative cancellation flag shared by every thread of a run.
///
/// Blocking waits re-check the flag at least once per poll interval, so
/// cancelling from outside the pipeline is observed without a notification.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// A token that is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the flag; every clone observes it.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Whether any clone has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// How blocking waits on pipeline condition variables behave.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitPolicy {
    /// Upper bound on a single condition-variable wait before the predicate
    /// and the cancellation token are checked again.
    pub poll_interval: Duration,
    /// Total time a single wait may go without its predicate becoming true.
    /// `None` waits forever.
    pub stall_timeout: Option<Duration>,
}

impl WaitPolicy {
    pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

    /// Fails waits that make no progress for `timeout`.
    pub fn with_stall_timeout(mut self, timeout: Duration) -> Self {
        self.stall_timeout = Some(timeout);
        self
    }
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self {
            poll_interval: Self::DEFAULT_POLL_INTERVAL,
            stall_timeout: None,
        }
    }
}

pub(crate) fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Waits on `condvar` until `ready` produces a value.
///
/// Returns `Ok(None)` once `cancel` is set. The predicate is always evaluated
/// with the lock held, so spurious wakeups and notifications that race with
/// the check are harmless.
pub(crate) fn wait_until<T, R>(
    mut guard: MutexGuard<'_, T>,
    condvar: &Condvar,
    cancel: &CancellationToken,
    policy: WaitPolicy,
    what: &'static str,
    mut ready: impl FnMut(&mut T) -> Option<R>,
) -> Result<Option<R>> {
    let started_at = Instant::now();
    let poll_interval = policy.poll_interval.max(Duration::from_millis(1));

    loop {
        if cancel.is_cancelled() {
            return Ok(None);
        }
        if let Some(value) = ready(&mut guard) {
            return Ok(Some(value));
        }

        let waited = started_at.elapsed();
        if let Some(limit) = policy.stall_timeout {
            if waited >= limit {
                return Err(VzipError::Stalled {
                    what,
                    waited_ms: duration_to_us(waited) / 1_000,
                });
            }
        }

        let slice = match policy.stall_timeout {
            Some(limit) => poll_interval.min(limit.saturating_sub(waited)),
            None => poll_interval,
        };
        let (next, _timed_out) = condvar
            .wait_timeout(guard, slice)
            .unwrap_or_else(PoisonError::into_inner);
        guard = next;
    }
}
