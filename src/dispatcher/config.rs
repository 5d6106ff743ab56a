//! # Dispatcher configuration.
//!
//! ## Sentinel values
//! - `grace = 0s` → wait for the executor to drain without a deadline
//! - `unprocessed_file = None` → nothing is persisted or replayed

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::executor::ExecutorConfig;

/// Relative location of the unprocessed-work file inside a data directory.
pub const UNPROCESSED_FILE: &str = "webhooks/unprocessed-events.json";

/// Settings for the [`Dispatcher`](super::Dispatcher).
///
/// ## Field semantics
/// - `workers`: size of the shared worker pool (min 1)
/// - `queue_capacity`: executor pending queue bound (min 1)
/// - `grace`: how long `shutdown()` waits for accepted work before abandoning
///   what has not started yet
/// - `unprocessed_file`: where abandoned work is written and replayed from
#[derive(Clone, Debug)]
pub struct DispatcherConfig {
    pub workers: usize,
    pub queue_capacity: usize,
    pub grace: Duration,
    pub unprocessed_file: Option<PathBuf>,
}

impl DispatcherConfig {
    /// Places the unprocessed-work file at `<dir>/webhooks/unprocessed-events.json`.
    pub fn with_data_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.unprocessed_file = Some(dir.as_ref().join(UNPROCESSED_FILE));
        self
    }

    /// Returns the grace period as an `Option`.
    ///
    /// - `None` → no deadline
    /// - `Some(d)` → abandon pending work after `d`
    #[inline]
    pub fn grace_limit(&self) -> Option<Duration> {
        if self.grace == Duration::ZERO {
            None
        } else {
            Some(self.grace)
        }
    }

    pub(crate) fn executor(&self) -> ExecutorConfig {
        ExecutorConfig {
            workers: self.workers,
            queue_capacity: self.queue_capacity,
        }
    }
}

impl Default for DispatcherConfig {
    /// Default configuration:
    ///
    /// - `workers = 1`, `queue_capacity = 10_000` (executor defaults)
    /// - `grace = 60s`
    /// - `unprocessed_file = None` (persistence off)
    fn default() -> Self {
        let exec = ExecutorConfig::default();
        Self {
            workers: exec.workers,
            queue_capacity: exec.queue_capacity,
            grace: Duration::from_secs(60),
            unprocessed_file: None,
        }
    }
}
