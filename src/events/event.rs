//! # Lifecycle events delivered to listeners.
//!
//! An [`Event`] is an immutable fact: what happened ([`EventType`]), to which
//! object (`object_id`) and, optionally, inside which project (`project_id`).
//!
//! ## Wire form
//! Events serialize with named fields only, so they can be persisted and read
//! back by a later build:
//! ```text
//! {"type":"BUILD_STARTED","objectId":42,"projectId":"Backend"}
//! {"type":"AGENT_REMOVED","objectId":7,"projectId":null}
//! ```
//!
//! ## Example
//! ```rust
//! use eventvisor::{Event, EventType};
//!
//! let ev = Event::new(EventType::BuildStarted, 42).with_project("Backend");
//!
//! assert_eq!(ev.kind(), EventType::BuildStarted);
//! assert_eq!(ev.object_id(), 42);
//! assert_eq!(ev.project_id(), Some("Backend"));
//! assert_eq!(ev.to_string(), "BUILD_STARTED (objectId: 42, projectId: Backend)");
//! ```

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Closed set of lifecycle notifications.
///
/// The wire name (`as_str`) is what gets persisted and what per-project
/// configuration refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    // === Agent events ===
    AgentRegistered,
    AgentUnregistered,
    AgentRemoved,

    // === Build events ===
    BuildStarted,
    BuildFinished,
    BuildInterrupted,
    ChangesLoaded,

    // === Queue events ===
    BuildTypeAddedToQueue,
    BuildRemovedFromQueue,

    // === Problem events ===
    BuildProblemsChanged,
    /// Synthetic: a build with problems has none anymore.
    MarkedAsSuccessful,
    /// Synthetic: a build turned failed (new problems or status transition).
    FailureDetected,
}

impl EventType {
    /// Every variant, in declaration order.
    pub const ALL: [EventType; 12] = [
        EventType::AgentRegistered,
        EventType::AgentUnregistered,
        EventType::AgentRemoved,
        EventType::BuildStarted,
        EventType::BuildFinished,
        EventType::BuildInterrupted,
        EventType::ChangesLoaded,
        EventType::BuildTypeAddedToQueue,
        EventType::BuildRemovedFromQueue,
        EventType::BuildProblemsChanged,
        EventType::MarkedAsSuccessful,
        EventType::FailureDetected,
    ];

    /// Returns the stable wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::AgentRegistered => "AGENT_REGISTERED",
            EventType::AgentUnregistered => "AGENT_UNREGISTERED",
            EventType::AgentRemoved => "AGENT_REMOVED",
            EventType::BuildStarted => "BUILD_STARTED",
            EventType::BuildFinished => "BUILD_FINISHED",
            EventType::BuildInterrupted => "BUILD_INTERRUPTED",
            EventType::ChangesLoaded => "CHANGES_LOADED",
            EventType::BuildTypeAddedToQueue => "BUILD_TYPE_ADDED_TO_QUEUE",
            EventType::BuildRemovedFromQueue => "BUILD_REMOVED_FROM_QUEUE",
            EventType::BuildProblemsChanged => "BUILD_PROBLEMS_CHANGED",
            EventType::MarkedAsSuccessful => "MARKED_AS_SUCCESSFUL",
            EventType::FailureDetected => "FAILURE_DETECTED",
        }
    }

    /// True for events whose `object_id` identifies a build agent.
    pub fn is_agent(&self) -> bool {
        matches!(
            self,
            EventType::AgentRegistered | EventType::AgentUnregistered | EventType::AgentRemoved
        )
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a string is not a known [`EventType`] wire name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown event type: {0}")]
pub struct UnknownEventType(pub String);

impl FromStr for EventType {
    type Err = UnknownEventType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| UnknownEventType(s.to_string()))
    }
}

/// Immutable lifecycle event.
///
/// Cheap to clone: the project id is shared.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    #[serde(rename = "type")]
    kind: EventType,
    object_id: i64,
    project_id: Option<Arc<str>>,
}

impl Event {
    /// Creates an event that is not bound to a project.
    pub fn new(kind: EventType, object_id: i64) -> Self {
        Self {
            kind,
            object_id,
            project_id: None,
        }
    }

    /// Attaches the owning project id.
    #[inline]
    pub fn with_project(mut self, project_id: impl Into<Arc<str>>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }

    #[inline]
    pub fn kind(&self) -> EventType {
        self.kind
    }

    #[inline]
    pub fn object_id(&self) -> i64 {
        self.object_id
    }

    #[inline]
    pub fn project_id(&self) -> Option<&str> {
        self.project_id.as_deref()
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (objectId: {}, projectId: {})",
            self.kind,
            self.object_id,
            self.project_id.as_deref().unwrap_or("null")
        )
    }
}
