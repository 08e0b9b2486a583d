use std::sync::{Condvar, Mutex};

use crate::core::sync::{CancellationToken, WaitPolicy, lock_unpoisoned, wait_until};
use crate::types::Result;

#[derive(Debug, Default)]
struct DispatchState {
    cursor: usize,
    retired: usize,
}

/// Shared cursor producers claim frame indices from.
///
/// Every index in `0..total` is handed out exactly once. With an in-flight
/// window, a claim additionally waits while `window` indices are claimed but
/// not yet retired by a consumer.
#[derive(Debug)]
pub struct DispatchCounter {
    total: usize,
    window: usize,
    state: Mutex<DispatchState>,
    space: Condvar,
}

impl DispatchCounter {
    /// A counter with no backpressure.
    pub fn new(total: usize) -> Self {
        Self::with_window(total, total)
    }

    /// A counter that keeps at most `window` claimed items outstanding.
    /// A zero window is treated as one.
    pub fn with_window(total: usize, window: usize) -> Self {
        Self {
            total,
            window: window.max(1),
            state: Mutex::new(DispatchState::default()),
            space: Condvar::new(),
        }
    }

    /// Number of indices this counter hands out.
    pub fn total(&self) -> usize {
        self.total
    }

    /// Maximum number of claimed but unretired indices.
    pub fn window(&self) -> usize {
        self.window
    }

    /// Claims the next index.
    ///
    /// Returns `Ok(None)` when every index has been handed out or the run is
    /// cancelled. Fails with `Stalled` when the window stays full for longer
    /// than the policy allows.
    pub fn claim_next(
        &self,
        cancel: &CancellationToken,
        policy: WaitPolicy,
    ) -> Result<Option<usize>> {
        let claim = |state: &mut DispatchState| {
            if state.cursor >= self.total {
                return Some(None);
            }
            if state.cursor - state.retired >= self.window {
                return None;
            }
            let index = state.cursor;
            state.cursor += 1;
            Some(Some(index))
        };

        let guard = lock_unpoisoned(&self.state);
        let claimed = wait_until(guard, &self.space, cancel, policy, "dispatch claim", claim)?;
        Ok(claimed.flatten())
    }

    /// Marks one claimed item as finished and wakes one waiting claimer.
    pub fn retire(&self) {
        {
            let mut state = lock_unpoisoned(&self.state);
            if state.retired < state.cursor {
                state.retired += 1;
            }
        }
        self.space.notify_one();
    }

    /// Wakes every waiting claimer so it can observe cancellation.
    pub fn interrupt(&self) {
        let _state = lock_unpoisoned(&self.state);
        self.space.notify_all();
    }

    /// Indices handed out so far.
    pub fn claimed(&self) -> usize {
        lock_unpoisoned(&self.state).cursor
    }

    /// Claimed indices a consumer has finished with.
    pub fn retired(&self) -> usize {
        lock_unpoisoned(&self.state).retired
    }

    /// Claimed indices not yet retired.
    pub fn in_flight(&self) -> usize {
        let state = lock_unpoisoned(&self.state);
        state.cursor - state.retired
    }

    /// `true` once every index has been claimed.
    pub fn is_exhausted(&self) -> bool {
        self.claimed() >= self.total
    }
}
