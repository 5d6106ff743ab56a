use std::collections::{HashMap, HashSet, VecDeque};
use std::hash::Hash;
use std::time::Instant;

/// A task waiting for its key (or a worker) to free up.
pub(super) struct Pending<K, T> {
    pub key: K,
    pub task: T,
    pub queued_at: Instant,
}

/// Scheduler state guarded by the executor's single lock.
///
/// ## Invariants
/// - A key in `in_flight` has exactly one running task.
/// - `queued` counts the pending entries per key; a key with queued entries is
///   busy even when nothing runs for it (worker pool was saturated).
/// - `pending` is in acceptance order.
/// - Outside the lock, no pending entry with a free key coexists with an
///   available worker.
pub(super) struct State<K, T> {
    pub in_flight: HashSet<K>,
    pub pending: VecDeque<Pending<K, T>>,
    queued: HashMap<K, usize>,
    pub shutdown: bool,
    /// The runtime dropped a task before it finished; nothing else will start.
    pub runtime_closed: bool,
}

impl<K, T> State<K, T>
where
    K: Eq + Hash + Clone,
{
    pub fn new() -> Self {
        Self {
            in_flight: HashSet::new(),
            pending: VecDeque::new(),
            queued: HashMap::new(),
            shutdown: false,
            runtime_closed: false,
        }
    }

    /// True if a new task for `key` must wait behind running or queued work.
    pub fn is_busy(&self, key: &K) -> bool {
        self.in_flight.contains(key) || self.queued.contains_key(key)
    }

    pub fn push(&mut self, key: K, task: T) {
        *self.queued.entry(key.clone()).or_insert(0) += 1;
        self.pending.push_back(Pending {
            key,
            task,
            queued_at: Instant::now(),
        });
    }

    /// Removes the pending entry at `idx`.
    pub fn take(&mut self, idx: usize) -> Option<Pending<K, T>> {
        let entry = self.pending.remove(idx)?;
        self.forget(&entry.key);
        Some(entry)
    }

    /// Empties the pending queue, preserving acceptance order.
    pub fn drain_pending(&mut self) -> Vec<T> {
        self.queued.clear();
        self.pending.drain(..).map(|p| p.task).collect()
    }

    /// Nothing runs and nothing queued can still start.
    pub fn is_settled(&self) -> bool {
        self.in_flight.is_empty() && (self.pending.is_empty() || self.runtime_closed)
    }

    fn forget(&mut self, key: &K) {
        if let Some(n) = self.queued.get_mut(key) {
            *n -= 1;
            if *n == 0 {
                self.queued.remove(key);
            }
        }
    }
}
