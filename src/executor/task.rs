//! # Unit of work scheduled by the ordered executor.
//!
//! [`OrderedTask`] is the async capability the executor drives on a worker.
//! [`TaskFn`] wraps a closure that creates a fresh future per run.
//!
//! Tasks must be `Clone` when handed to the executor so that the pending queue
//! can be snapshotted without giving the tasks up.

use std::borrow::Cow;
use std::future::Future;

use async_trait::async_trait;

use crate::error::TaskError;

/// # Asynchronous unit run by a worker.
///
/// Errors and panics are contained by the executor: they are logged, the
/// ordering key is freed and the next task proceeds.
///
/// # Example
/// ```
/// use async_trait::async_trait;
/// use eventvisor::{OrderedTask, TaskError};
///
/// #[derive(Clone)]
/// struct Ping;
///
/// #[async_trait]
/// impl OrderedTask for Ping {
///     fn name(&self) -> &str { "ping" }
///
///     async fn run(&self) -> Result<(), TaskError> {
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait OrderedTask: Send + Sync + 'static {
    /// Human-readable name used in logs.
    fn name(&self) -> &str;

    /// Executes the task once.
    async fn run(&self) -> Result<(), TaskError>;
}

/// Function-backed task.
///
/// ## Example
/// ```rust
/// use eventvisor::{TaskError, TaskFn, OrderedTask};
///
/// let t = TaskFn::new("noop", || async { Ok::<_, TaskError>(()) });
/// assert_eq!(t.name(), "noop");
/// ```
#[derive(Clone, Debug)]
pub struct TaskFn<F> {
    name: Cow<'static, str>,
    f: F,
}

impl<F> TaskFn<F> {
    pub fn new(name: impl Into<Cow<'static, str>>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

#[async_trait]
impl<F, Fut> OrderedTask for TaskFn<F>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), TaskError>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self) -> Result<(), TaskError> {
        (self.f)().await
    }
}
