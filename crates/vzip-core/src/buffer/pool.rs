use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crossbeam_channel::{Receiver, Sender, TryRecvError, bounded};
use serde::{Deserialize, Serialize};

use crate::error::VzipError;
use crate::telemetry;
use crate::telemetry::tags;
use crate::types::Result;

/// Recycles frame input buffers between producers and consumers.
///
/// A producer acquires a buffer, reads a frame into it and hands it to the
/// slot table; the consumer drops it after compression, which sends it back
/// here. At most `max_buffers` idle buffers are retained.
///
/// # Example
/// ```
/// use vzip_core::BufferPool;
///
/// let pool = BufferPool::new(4096, 8);
/// let buffer = pool.acquire().unwrap();
/// assert!(buffer.capacity() >= 4096);
/// drop(buffer); // returns to the pool
/// assert_eq!(pool.metrics().created, 1);
/// ```
#[derive(Debug)]
pub struct BufferPool {
    recycler: Sender<Vec<u8>>,
    receiver: Receiver<Vec<u8>>,
    default_capacity: usize,
    max_buffers: usize,
    metrics: Arc<PoolMetricsInner>,
}

impl BufferPool {
    /// Pool of `default_capacity`-byte buffers retaining at most
    /// `max_buffers` for reuse.
    pub fn new(default_capacity: usize, max_buffers: usize) -> Self {
        let (tx, rx) = bounded(max_buffers.max(1));
        Self {
            recycler: tx,
            receiver: rx,
            default_capacity,
            max_buffers: max_buffers.max(1),
            metrics: Arc::new(PoolMetricsInner::default()),
        }
    }

    /// Returns an empty buffer with at least `default_capacity` bytes reserved.
    ///
    /// Fails only when a fresh buffer cannot be allocated.
    pub fn acquire(&self) -> Result<PooledBuffer> {
        let buffer = match self.receiver.try_recv() {
            Ok(mut buffer) => {
                buffer.clear();
                self.metrics.recycled.fetch_add(1, Ordering::Relaxed);
                telemetry::increment_counter(
                    tags::METRIC_BUFFER_ACQUIRE_RECYCLED_COUNT,
                    1,
                    &[
                        ("subsystem", "buffer"),
                        ("op", "acquire"),
                        ("result", "recycled"),
                    ],
                );
                telemetry::sub_gauge_saturating(
                    tags::METRIC_BUFFER_POOL_ESTIMATED_BYTES,
                    buffer.capacity() as u64,
                    &[("subsystem", "buffer"), ("op", "acquire")],
                );
                buffer
            }
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => {
                let mut buffer = Vec::new();
                buffer
                    .try_reserve_exact(self.default_capacity)
                    .map_err(|_| VzipError::Allocation {
                        bytes: self.default_capacity,
                    })?;
                self.metrics.created.fetch_add(1, Ordering::Relaxed);
                telemetry::increment_counter(
                    tags::METRIC_BUFFER_ACQUIRE_CREATED_COUNT,
                    1,
                    &[
                        ("subsystem", "buffer"),
                        ("op", "acquire"),
                        ("result", "created"),
                    ],
                );
                buffer
            }
        };

        Ok(PooledBuffer::new(
            buffer,
            self.recycler.clone(),
            Arc::clone(&self.metrics),
        ))
    }

    /// Buffer allocation and reuse counters.
    pub fn metrics(&self) -> PoolMetricsSnapshot {
        PoolMetricsSnapshot {
            created: self.metrics.created.load(Ordering::Relaxed),
            recycled: self.metrics.recycled.load(Ordering::Relaxed),
            dropped: self.metrics.dropped.load(Ordering::Relaxed),
        }
    }

    pub fn default_capacity(&self) -> usize {
        self.default_capacity
    }

    pub fn max_buffers(&self) -> usize {
        self.max_buffers
    }
}

/// Buffer pool counters at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PoolMetricsSnapshot {
    /// Buffers freshly allocated.
    pub created: usize,
    /// Acquisitions served from a returned buffer.
    pub recycled: usize,
    /// Buffers freed because the pool was full.
    pub dropped: usize,
}

#[derive(Debug, Default)]
struct PoolMetricsInner {
    created: AtomicUsize,
    recycled: AtomicUsize,
    dropped: AtomicUsize,
}

/// A buffer on loan from a [`BufferPool`]; returned to it on drop.
#[derive(Debug)]
pub struct PooledBuffer {
    buffer: Vec<u8>,
    recycler: Sender<Vec<u8>>,
    metrics: Arc<PoolMetricsInner>,
}

impl PooledBuffer {
    fn new(buffer: Vec<u8>, recycler: Sender<Vec<u8>>, metrics: Arc<PoolMetricsInner>) -> Self {
        Self {
            buffer,
            recycler,
            metrics,
        }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buffer
    }

    pub fn as_mut_vec(&mut self) -> &mut Vec<u8> {
        &mut self.buffer
    }
}

impl Deref for PooledBuffer {
    type Target = Vec<u8>;

    fn deref(&self) -> &Self::Target {
        &self.buffer
    }
}

impl DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.buffer
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        let buffer = std::mem::take(&mut self.buffer);
        let capacity = buffer.capacity() as u64;

        if self.recycler.try_send(buffer).is_err() {
            self.metrics.dropped.fetch_add(1, Ordering::Relaxed);
            telemetry::increment_counter(
                tags::METRIC_BUFFER_RECYCLE_DROPPED_COUNT,
                1,
                &[
                    ("subsystem", "buffer"),
                    ("op", "recycle"),
                    ("result", "dropped"),
                ],
            );
            tracing::trace!(
                target: tags::TARGET_BUFFER,
                op = "recycle",
                result = "dropped",
                buffer_capacity = capacity,
                "buffer dropped instead of recycled"
            );
        } else {
            telemetry::increment_counter(
                tags::METRIC_BUFFER_RECYCLE_OK_COUNT,
                1,
                &[
                    ("subsystem", "buffer"),
                    ("op", "recycle"),
                    ("result", "recycled"),
                ],
            );
            telemetry::add_gauge(
                tags::METRIC_BUFFER_POOL_ESTIMATED_BYTES,
                capacity,
                &[("subsystem", "buffer"), ("op", "recycle")],
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn returned_buffers_are_reused_and_cleared() {
        let pool = BufferPool::new(64, 2);
        {
            let mut buffer = pool.acquire().expect("acquire");
            buffer.extend_from_slice(b"frame bytes");
        }

        let buffer = pool.acquire().expect("acquire");
        assert!(buffer.is_empty());
        assert_eq!(
            pool.metrics(),
            PoolMetricsSnapshot {
                created: 1,
                recycled: 1,
                dropped: 0
            }
        );
    }

    #[test]
    fn overflow_buffers_are_dropped() {
        let pool = BufferPool::new(8, 1);
        let first = pool.acquire().expect("acquire");
        let second = pool.acquire().expect("acquire");
        drop(first);
        drop(second);

        assert_eq!(pool.metrics().dropped, 1);
    }
}
