use serde::{Deserialize, Serialize};

use crate::error::VzipError;
use crate::types::Result;

/// How a [`WorkPlan`] splits items across the threads of one role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PartitionStrategy {
    /// `regular = ceil(N / T)`; thread 0 takes `N - regular * (T - 1)`.
    /// Fails when that remainder is not positive.
    Ceil,
    /// `regular = floor(N / T)`; thread 0 takes `N - regular * (T - 1)`.
    /// Valid for every `N >= 1`, `T >= 1`.
    Floor,
    /// `Ceil` when its remainder is positive, `Floor` otherwise.
    #[default]
    Auto,
}

/// Fixed per-thread work shares for one pipeline role.
///
/// Thread 0 of the role is the remainder thread; every other thread performs
/// `regular` items. Shares are computed once, before any thread starts, and
/// always sum to `total`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkPlan {
    total: usize,
    threads: usize,
    regular: usize,
    remainder: usize,
    strategy: PartitionStrategy,
}

impl WorkPlan {
    /// Splits `total` items over `threads` threads using `strategy`.
    pub fn new(total: usize, threads: usize, strategy: PartitionStrategy) -> Result<Self> {
        if threads == 0 {
            return Err(VzipError::InvalidConfig("thread count must be at least 1".to_string()));
        }
        if total == 0 {
            return Err(VzipError::EmptyInput);
        }

        match strategy {
            PartitionStrategy::Ceil => Self::ceil(total, threads),
            PartitionStrategy::Floor => Ok(Self::floor(total, threads)),
            PartitionStrategy::Auto => match Self::ceil(total, threads) {
                Ok(plan) => Ok(plan),
                Err(_) => Ok(Self::floor(total, threads)),
            },
        }
    }

    fn ceil(total: usize, threads: usize) -> Result<Self> {
        let regular = total.div_ceil(threads);
        let assigned = regular as i128 * (threads as i128 - 1);
        let remainder = total as i128 - assigned;

        if remainder <= 0 {
            return Err(VzipError::InvalidPartition {
                total,
                threads,
                regular,
                remainder: i64::try_from(remainder).unwrap_or(i64::MIN),
            });
        }

        Ok(Self {
            total,
            threads,
            regular,
            remainder: remainder as usize,
            strategy: PartitionStrategy::Ceil,
        })
    }

    fn floor(total: usize, threads: usize) -> Self {
        let regular = total / threads;
        Self {
            total,
            threads,
            regular,
            remainder: total - regular * (threads - 1),
            strategy: PartitionStrategy::Floor,
        }
    }

    /// Items assigned to `thread_index`; zero for indices outside the plan.
    pub fn share(&self, thread_index: usize) -> usize {
        match thread_index {
            0 => self.remainder,
            index if index < self.threads => self.regular,
            _ => 0,
        }
    }

    /// Shares in thread order, starting with the remainder thread.
    pub fn shares(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.threads).map(|index| self.share(index))
    }

    /// Number of items split by this plan.
    pub fn total(&self) -> usize {
        self.total
    }

    /// Number of threads in the role.
    pub fn threads(&self) -> usize {
        self.threads
    }

    /// Share of every thread except thread 0.
    pub fn regular(&self) -> usize {
        self.regular
    }

    /// Share of thread 0.
    pub fn remainder(&self) -> usize {
        self.remainder
    }

    /// Strategy that produced the shares; never `Auto`.
    pub fn strategy(&self) -> PartitionStrategy {
        self.strategy
    }
}
