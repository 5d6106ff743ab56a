use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use tracing::{debug, warn};

/// Level a reported failure was logged at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warn,
    Debug,
}

/// Remembers the last problem code per source (project) and demotes repeats.
///
/// ## Rules
/// - First failure for a source, or a code different from the last one → `warn!`.
/// - Same code as the last one → `debug!`.
/// - [`ProblemLog::clear`] (after a successful delivery) forgets the source.
#[derive(Debug, Default)]
pub struct ProblemLog {
    last: Mutex<HashMap<String, String>>,
    warnings: AtomicU64,
}

impl ProblemLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn report(&self, source: &str, code: &str, message: &str) -> Severity {
        let fresh = {
            let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
            if last.get(source).map(String::as_str) == Some(code) {
                false
            } else {
                last.insert(source.to_string(), code.to_string());
                true
            }
        };

        if fresh {
            self.warnings.fetch_add(1, Ordering::Relaxed);
            warn!(
                project = source,
                code,
                "{message} The following failures with the same problem won't be logged for project {source}."
            );
            Severity::Warn
        } else {
            debug!(project = source, code, "{message}");
            Severity::Debug
        }
    }

    pub fn clear(&self, source: &str) {
        self.last
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(source);
    }

    /// Number of warn-level reports so far.
    pub fn warnings_emitted(&self) -> u64 {
        self.warnings.load(Ordering::Relaxed)
    }
}
