//! # Listener contract and the task that binds a listener to one event.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::TaskError;
use crate::events::Event;
use crate::executor::OrderedTask;

/// Suppression/ordering source used for events without a project.
pub const ROOT_PROJECT: &str = "<Root Project>";

/// Ordering key: handlers with equal keys never run concurrently.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OrderingKey(Arc<str>);

impl OrderingKey {
    pub fn new(key: impl Into<Arc<str>>) -> Self {
        Self(key.into())
    }

    /// One key per listener: all of its handlers run strictly one at a time.
    pub fn listener(name: &str) -> Self {
        Self::new(format!("listener:{name}"))
    }

    /// One key per project of the event; project-less events share the root key.
    pub fn project(event: &Event) -> Self {
        Self::new(format!("project:{}", event.project_id().unwrap_or(ROOT_PROJECT)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrderingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// # Asynchronous consumer of dispatched events.
///
/// `name` must be stable across restarts: persisted work is matched back to its
/// listener by name on replay.
///
/// # Example
/// ```
/// use async_trait::async_trait;
/// use eventvisor::{Event, Listener, OrderingKey, TaskError};
///
/// struct Audit;
///
/// #[async_trait]
/// impl Listener for Audit {
///     fn name(&self) -> &str { "audit" }
///
///     fn ordering_key(&self, event: &Event) -> OrderingKey {
///         OrderingKey::project(event)
///     }
///
///     async fn handle(&self, event: &Event) -> Result<(), TaskError> {
///         println!("{event}");
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Listener: Send + Sync + 'static {
    /// Unique name within each event type.
    fn name(&self) -> &str;

    /// Key that serializes this listener's handling of `event`.
    fn ordering_key(&self, _event: &Event) -> OrderingKey {
        OrderingKey::listener(self.name())
    }

    /// Handles one event. Errors and panics are logged by the executor.
    async fn handle(&self, event: &Event) -> Result<(), TaskError>;
}

/// One listener bound to one event; the unit submitted to the executor.
#[derive(Clone)]
pub struct HandlingTask {
    listener: Arc<dyn Listener>,
    event: Event,
}

impl HandlingTask {
    pub fn new(listener: Arc<dyn Listener>, event: Event) -> Self {
        Self { listener, event }
    }

    pub fn listener_name(&self) -> &str {
        self.listener.name()
    }

    pub fn event(&self) -> &Event {
        &self.event
    }

    pub fn ordering_key(&self) -> OrderingKey {
        self.listener.ordering_key(&self.event)
    }
}

impl fmt::Debug for HandlingTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlingTask")
            .field("listener", &self.listener.name())
            .field("event", &self.event)
            .finish()
    }
}

#[async_trait]
impl OrderedTask for HandlingTask {
    fn name(&self) -> &str {
        self.listener.name()
    }

    async fn run(&self) -> Result<(), TaskError> {
        self.listener.handle(&self.event).await
    }
}
