use std::sync::{Condvar, Mutex};

use crate::core::sync::{CancellationToken, WaitPolicy, lock_unpoisoned, wait_until};
use crate::error::VzipError;
use crate::types::Result;

#[derive(Debug)]
struct ReadyState {
    stack: Vec<usize>,
    queued: Vec<bool>,
    pushed: usize,
    popped: usize,
}

/// LIFO handoff of filled slot indices from producers to consumers.
///
/// An index can be queued at most once at a time; each push is consumed by
/// exactly one pop.
#[derive(Debug)]
pub struct ReadyQueue {
    state: Mutex<ReadyState>,
    available: Condvar,
}

impl ReadyQueue {
    /// A queue accepting slot indices in `0..slots`.
    pub fn new(slots: usize) -> Self {
        Self {
            state: Mutex::new(ReadyState {
                stack: Vec::with_capacity(slots),
                queued: vec![false; slots],
                pushed: 0,
                popped: 0,
            }),
            available: Condvar::new(),
        }
    }

    /// Pushes a filled slot index and wakes one waiting consumer.
    ///
    /// Fails for an index outside the queue or one that is already queued.
    pub fn push(&self, index: usize) -> Result<()> {
        {
            let mut state = lock_unpoisoned(&self.state);
            match state.queued.get(index).copied() {
                None => {
                    return Err(VzipError::Slot {
                        index,
                        reason: "index is outside the ready queue",
                    });
                }
                Some(true) => {
                    return Err(VzipError::Slot {
                        index,
                        reason: "index is already queued",
                    });
                }
                Some(false) => {}
            }
            state.queued[index] = true;
            state.stack.push(index);
            state.pushed += 1;
        }
        self.available.notify_one();
        Ok(())
    }

    /// Pops the most recently pushed index, waiting while the queue is empty.
    ///
    /// Returns `Ok(None)` once the run is cancelled.
    pub fn pop(&self, cancel: &CancellationToken, policy: WaitPolicy) -> Result<Option<usize>> {
        let guard = lock_unpoisoned(&self.state);
        wait_until(
            guard,
            &self.available,
            cancel,
            policy,
            "ready queue pop",
            take_top,
        )
    }

    /// Pops the most recently pushed index without waiting.
    pub fn try_pop(&self) -> Option<usize> {
        take_top(&mut lock_unpoisoned(&self.state))
    }

    /// Wakes every waiting consumer so it can observe cancellation.
    pub fn interrupt(&self) {
        let _state = lock_unpoisoned(&self.state);
        self.available.notify_all();
    }

    /// Number of indices currently queued.
    pub fn len(&self) -> usize {
        lock_unpoisoned(&self.state).stack.len()
    }

    /// `true` when no slot is waiting for a consumer.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Pushes accepted since the queue was created.
    pub fn pushed_total(&self) -> usize {
        lock_unpoisoned(&self.state).pushed
    }

    /// Pops served since the queue was created.
    pub fn popped_total(&self) -> usize {
        lock_unpoisoned(&self.state).popped
    }
}

fn take_top(state: &mut ReadyState) -> Option<usize> {
    let index = state.stack.pop()?;
    state.queued[index] = false;
    state.popped += 1;
    Some(index)
}
