//! Error types used by the eventvisor runtime and its tasks.
//!
//! - [`ExecuteError`]: synchronous admission failures from the ordered executor.
//! - [`SubscribeError`]: registration failures in the dispatcher registry.
//! - [`TaskError`]: failures raised (or panics caught) while a task runs.
//! - [`PersistError`]: failures reading or writing the unprocessed-work file.
//! - [`RuntimeError`]: failures of the shutdown sequence itself.
//!
//! Every enum provides `as_label` (stable snake_case, for logs/metrics).

use std::time::Duration;
use thiserror::Error;

/// # Errors returned synchronously by [`OrderedExecutor::execute`](crate::OrderedExecutor::execute).
///
/// The caller decides whether to drop, log or fall back; the executor never retries.
#[non_exhaustive]
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecuteError {
    /// The bounded pending queue is full.
    #[error("pending queue capacity {capacity} exceeded")]
    CapacityExceeded {
        /// Configured pending queue capacity.
        capacity: usize,
    },

    /// Submission arrived after shutdown began; do not retry.
    #[error("executor shutdown in progress")]
    RejectedAfterShutdown,
}

impl ExecuteError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use eventvisor::ExecuteError;
    ///
    /// let err = ExecuteError::CapacityExceeded { capacity: 8 };
    /// assert_eq!(err.as_label(), "capacity_exceeded");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            ExecuteError::CapacityExceeded { .. } => "capacity_exceeded",
            ExecuteError::RejectedAfterShutdown => "rejected_after_shutdown",
        }
    }
}

/// Error returned by [`Dispatcher::subscribe`](crate::Dispatcher::subscribe).
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubscribeError {
    /// Another listener with the same unique name is already registered for the event type.
    #[error("listener with unique name \"{listener}\" is already registered for event {event_type}")]
    NameCollision {
        /// Unique listener name.
        listener: String,
        /// Event type wire name.
        event_type: String,
    },
}

impl SubscribeError {
    pub fn as_label(&self) -> &'static str {
        match self {
            SubscribeError::NameCollision { .. } => "name_collision",
        }
    }
}

/// # Errors produced by task execution.
///
/// These never leave the worker: the executor logs them, frees the ordering key
/// and moves on to the next task.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    /// Task execution failed.
    #[error("execution failed: {error}")]
    Fail {
        /// The underlying error message.
        error: String,
    },

    /// Task panicked; the panic was caught by the worker.
    #[error("task panicked: {info}")]
    Panicked {
        /// Panic payload, if it was a string.
        info: String,
    },
}

impl TaskError {
    /// Shorthand for [`TaskError::Fail`].
    pub fn fail(error: impl Into<String>) -> Self {
        TaskError::Fail {
            error: error.into(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use eventvisor::TaskError;
    ///
    /// let err = TaskError::fail("boom");
    /// assert_eq!(err.as_label(), "task_failed");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            TaskError::Fail { .. } => "task_failed",
            TaskError::Panicked { .. } => "task_panicked",
        }
    }
}

/// # Errors produced while reading or writing the unprocessed-work file.
///
/// Never fatal to host startup or shutdown: the dispatcher logs and continues.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum PersistError {
    /// Filesystem error.
    #[error("io error on {path}: {source}")]
    Io {
        /// File or directory involved.
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Snapshot could not be serialized.
    #[error("failed to encode unprocessed tasks: {0}")]
    Encode(#[source] serde_json::Error),

    /// File content is not a valid snapshot.
    #[error("failed to decode unprocessed tasks: {0}")]
    Decode(#[source] serde_json::Error),

    /// Snapshot was written by an incompatible schema version.
    #[error("unsupported unprocessed tasks schema version {found} (expected {expected})")]
    UnsupportedVersion {
        /// Version read from the file.
        found: u32,
        /// Version this build understands.
        expected: u32,
    },
}

impl PersistError {
    pub fn as_label(&self) -> &'static str {
        match self {
            PersistError::Io { .. } => "persist_io",
            PersistError::Encode(_) => "persist_encode",
            PersistError::Decode(_) => "persist_decode",
            PersistError::UnsupportedVersion { .. } => "persist_unsupported_version",
        }
    }
}

/// # Errors produced by the dispatcher shutdown sequence.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    /// Grace period was exceeded; not-yet-started tasks were abandoned for persistence.
    #[error("shutdown grace {grace:?} exceeded; abandoned {abandoned} pending tasks")]
    GraceExceeded {
        /// The configured grace duration.
        grace: Duration,
        /// Number of pending tasks taken out of the queue.
        abandoned: usize,
    },
}

impl RuntimeError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use eventvisor::RuntimeError;
    /// use std::time::Duration;
    ///
    /// let err = RuntimeError::GraceExceeded { grace: Duration::from_secs(5), abandoned: 0 };
    /// assert_eq!(err.as_label(), "runtime_grace_exceeded");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            RuntimeError::GraceExceeded { .. } => "runtime_grace_exceeded",
        }
    }
}
