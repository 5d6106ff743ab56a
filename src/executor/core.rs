use std::fmt::Debug;
use std::hash::Hash;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::FutureExt;
use tokio::runtime::Handle;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::error::{ExecuteError, TaskError};

use super::{config::ExecutorConfig, state::State, task::OrderedTask};

/// Keyed scheduler over a shared worker pool.
///
/// Each ordering key runs at most one task at a time; tasks for the same key
/// start in acceptance order. Different keys run concurrently up to the
/// configured number of workers. A freed worker always goes to the oldest
/// queued task whose key is free, before any newly submitted task.
///
/// Cloning is cheap and yields a handle to the same executor.
pub struct OrderedExecutor<K, T> {
    inner: Arc<Inner<K, T>>,
}

impl<K, T> Clone for OrderedExecutor<K, T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct Inner<K, T> {
    state: Mutex<State<K, T>>,
    workers: Arc<Semaphore>,
    capacity: usize,
    runtime: Handle,
    terminated: CancellationToken,
}

/// A task that was granted a worker and is about to be spawned.
struct Start<K, T> {
    key: K,
    task: T,
    permit: OwnedSemaphorePermit,
}

/// Owns the key and the worker of a spawned task.
///
/// Dropping it frees both. When the future is dropped before it finished
/// (the runtime shut down), the executor stops dispatching.
struct Running<K, T>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    T: OrderedTask + Clone,
{
    inner: Arc<Inner<K, T>>,
    key: K,
    permit: Option<OwnedSemaphorePermit>,
    finished: bool,
}

impl<K, T> Drop for Running<K, T>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    T: OrderedTask + Clone,
{
    fn drop(&mut self) {
        self.inner.complete(&self.key, self.permit.take(), self.finished);
    }
}

impl<K, T> OrderedExecutor<K, T>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    T: OrderedTask + Clone,
{
    /// Creates an executor that spawns workers on the current Tokio runtime.
    ///
    /// # Panics
    /// Panics when called outside a Tokio runtime; use [`Self::with_runtime`] there.
    pub fn new(cfg: ExecutorConfig) -> Self {
        Self::with_runtime(cfg, Handle::current())
    }

    /// Creates an executor that spawns workers on `runtime`.
    ///
    /// If `runtime` shuts down while tasks are accepted, dispatching stops:
    /// queued tasks stay available through [`Self::unprocessed_tasks`] and
    /// [`Self::terminated`] still resolves after [`Self::shutdown`].
    pub fn with_runtime(cfg: ExecutorConfig, runtime: Handle) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State::new()),
                workers: Arc::new(Semaphore::new(cfg.workers_clamped())),
                capacity: cfg.queue_capacity_clamped(),
                runtime,
                terminated: CancellationToken::new(),
            }),
        }
    }

    /// Accepts `task` under ordering `key`; never waits for execution.
    ///
    /// - Key free, no older runnable task queued and a worker available → the
    ///   task starts right away.
    /// - Otherwise the task is appended to the pending queue.
    ///
    /// # Errors
    /// - [`ExecuteError::RejectedAfterShutdown`] once [`Self::shutdown`] was called.
    /// - [`ExecuteError::CapacityExceeded`] when the pending queue is full.
    pub fn execute(&self, task: T, key: K) -> Result<(), ExecuteError> {
        let (starts, res) = {
            let mut state = self.inner.lock();
            if state.shutdown {
                return Err(ExecuteError::RejectedAfterShutdown);
            }

            // Older queued work takes free workers first.
            let mut starts = self.inner.dispatch_ready(&mut state);

            let worker = if state.is_busy(&key) || state.runtime_closed {
                None
            } else {
                Arc::clone(&self.inner.workers).try_acquire_owned().ok()
            };

            let res = match worker {
                Some(permit) => {
                    state.in_flight.insert(key.clone());
                    starts.push(Start { key, task, permit });
                    Ok(())
                }
                None if state.pending.len() >= self.inner.capacity => Err(ExecuteError::CapacityExceeded {
                    capacity: self.inner.capacity,
                }),
                None => {
                    state.push(key, task);
                    Ok(())
                }
            };
            (starts, res)
        };

        self.inner.start(starts);
        res
    }

    /// Stops accepting new tasks; everything already accepted still runs.
    ///
    /// Idempotent. [`Self::is_terminated`] turns true once the queue is drained
    /// and the last running task has finished.
    pub fn shutdown(&self) {
        let mut state = self.inner.lock();
        state.shutdown = true;
        self.inner.check_terminated(&state);
    }

    pub fn is_shutdown(&self) -> bool {
        self.inner.lock().shutdown
    }

    /// True after shutdown once no task is running or pending.
    pub fn is_terminated(&self) -> bool {
        self.inner.terminated.is_cancelled()
    }

    /// Resolves when [`Self::is_terminated`] becomes true.
    pub async fn terminated(&self) {
        self.inner.terminated.cancelled().await;
    }

    /// Snapshot of tasks accepted but not started yet, in acceptance order.
    pub fn unprocessed_tasks(&self) -> Vec<T> {
        self.inner
            .lock()
            .pending
            .iter()
            .map(|p| p.task.clone())
            .collect()
    }

    /// Removes and returns every task that has not started yet.
    ///
    /// Abandoned tasks never run; the caller owns them from now on.
    pub fn abandon_pending(&self) -> Vec<T> {
        let mut state = self.inner.lock();
        let abandoned = state.drain_pending();
        self.inner.check_terminated(&state);
        abandoned
    }

    pub fn pending_len(&self) -> usize {
        self.inner.lock().pending.len()
    }

    pub fn in_flight_len(&self) -> usize {
        self.inner.lock().in_flight.len()
    }
}

impl<K, T> Inner<K, T>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    T: OrderedTask + Clone,
{
    fn lock(&self) -> MutexGuard<'_, State<K, T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Spawns tasks that already hold a worker. Must be called without the
    /// state lock: a closed runtime drops the future inside `spawn`.
    fn start(self: &Arc<Self>, starts: Vec<Start<K, T>>) {
        for Start { key, task, permit } in starts {
            let mut running = Running {
                inner: Arc::clone(self),
                key,
                permit: Some(permit),
                finished: false,
            };
            self.runtime.spawn(async move {
                let res = AssertUnwindSafe(task.run()).catch_unwind().await;
                match res {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        warn!(task = task.name(), key = ?running.key, label = e.as_label(), error = %e, "task failed");
                    }
                    Err(panic_err) => {
                        let e = TaskError::Panicked {
                            info: panic_info(panic_err.as_ref()),
                        };
                        error!(task = task.name(), key = ?running.key, label = e.as_label(), error = %e, "task panicked");
                    }
                }
                running.finished = true;
            });
        }
    }

    /// Frees `key` and its worker, then starts whatever became runnable.
    ///
    /// The worker is released under the state lock so that it can only be
    /// taken by the oldest ready task.
    fn complete(self: &Arc<Self>, key: &K, permit: Option<OwnedSemaphorePermit>, finished: bool) {
        let starts = {
            let mut state = self.lock();
            drop(permit);
            state.in_flight.remove(key);

            let starts = if finished {
                self.dispatch_ready(&mut state)
            } else {
                if !state.runtime_closed {
                    warn!(
                        key = ?key,
                        pending = state.pending.len(),
                        "task dropped before completion; runtime is gone, dispatching stopped"
                    );
                }
                state.runtime_closed = true;
                Vec::new()
            };
            self.check_terminated(&state);
            starts
        };
        self.start(starts);
    }

    /// Takes the oldest pending tasks whose keys are free, while workers remain.
    ///
    /// A task that finds no free worker stays queued and is retried on the next
    /// completion.
    fn dispatch_ready(&self, state: &mut State<K, T>) -> Vec<Start<K, T>> {
        let mut starts = Vec::new();
        if state.runtime_closed {
            return starts;
        }

        let mut idx = 0;
        while idx < state.pending.len() && self.workers.available_permits() > 0 {
            if state.in_flight.contains(&state.pending[idx].key) {
                idx += 1;
                continue;
            }
            let Ok(permit) = Arc::clone(&self.workers).try_acquire_owned() else {
                break;
            };
            let Some(next) = state.take(idx) else { break };

            debug!(
                task = next.task.name(),
                key = ?next.key,
                waited_ms = next.queued_at.elapsed().as_millis() as u64,
                "starting queued task"
            );
            state.in_flight.insert(next.key.clone());
            starts.push(Start {
                key: next.key,
                task: next.task,
                permit,
            });
        }
        starts
    }

    fn check_terminated(&self, state: &State<K, T>) {
        if state.shutdown && state.is_settled() {
            self.terminated.cancel();
        }
    }
}

fn panic_info(any: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = any.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = any.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
