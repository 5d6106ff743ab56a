/// Configuration for the [`OrderedExecutor`](super::OrderedExecutor).
///
/// ## Sentinel values
/// Both fields are clamped to a minimum of 1; a zero-sized pool or queue would
/// reject every submission.
#[derive(Clone, Debug)]
pub struct ExecutorConfig {
    /// Number of tasks allowed to run at the same time, across all keys.
    pub workers: usize,

    /// Capacity of the pending queue.
    ///
    /// When full, `execute()` fails with `CapacityExceeded`.
    pub queue_capacity: usize,
}

impl ExecutorConfig {
    #[inline]
    pub fn workers_clamped(&self) -> usize {
        self.workers.max(1)
    }

    #[inline]
    pub fn queue_capacity_clamped(&self) -> usize {
        self.queue_capacity.max(1)
    }
}

impl Default for ExecutorConfig {
    /// Single worker, 10k pending tasks.
    fn default() -> Self {
        Self {
            workers: 1,
            queue_capacity: 10_000,
        }
    }
}
