//! # Host notifications and their translation into events.
//!
//! The host reports what happened through a closed set of [`HostEvent`]
//! variants. [`HostEvent::into_events`] derives the [`Event`]s to publish,
//! including the synthetic problem transitions:
//!
//! ```text
//! BuildProblemsChanged { before, after, finished }
//!   ├─► BUILD_PROBLEMS_CHANGED                       (always)
//!   ├─► MARKED_AS_SUCCESSFUL   if !before.empty && after.empty
//!   └─► FAILURE_DETECTED       if before.empty && !after.empty && finished
//!
//! BuildStatusChanged { was_failed: false, is_failed: true }
//!   └─► FAILURE_DETECTED
//! ```
//!
//! Agent notifications never carry a project id.

use std::sync::Arc;

use crate::dispatcher::Dispatcher;

use super::event::{Event, EventType};

/// Identifies a build (or queued build) by its promotion id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRef {
    pub promotion_id: i64,
    pub project_id: Option<Arc<str>>,
}

impl BuildRef {
    pub fn new(promotion_id: i64, project_id: impl Into<Arc<str>>) -> Self {
        Self {
            promotion_id,
            project_id: Some(project_id.into()),
        }
    }

    fn event(&self, kind: EventType) -> Event {
        let ev = Event::new(kind, self.promotion_id);
        match &self.project_id {
            Some(p) => ev.with_project(Arc::clone(p)),
            None => ev,
        }
    }
}

/// Notification raised by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    AgentRegistered { agent_id: i64 },
    AgentUnregistered { agent_id: i64 },
    AgentRemoved { agent_id: i64 },

    BuildQueued(BuildRef),
    BuildRemovedFromQueue(BuildRef),
    BuildStarted(BuildRef),
    BuildFinished(BuildRef),
    BuildInterrupted(BuildRef),
    ChangesLoaded(BuildRef),

    /// Problem set of a build changed; `before`/`after` hold problem identities.
    BuildProblemsChanged {
        build: BuildRef,
        finished: bool,
        before: Vec<String>,
        after: Vec<String>,
    },

    BuildStatusChanged {
        build: BuildRef,
        was_failed: bool,
        is_failed: bool,
    },
}

impl HostEvent {
    /// Returns the events to publish for this notification, in publish order.
    pub fn into_events(self) -> Vec<Event> {
        match self {
            HostEvent::AgentRegistered { agent_id } => {
                vec![Event::new(EventType::AgentRegistered, agent_id)]
            }
            HostEvent::AgentUnregistered { agent_id } => {
                vec![Event::new(EventType::AgentUnregistered, agent_id)]
            }
            HostEvent::AgentRemoved { agent_id } => {
                vec![Event::new(EventType::AgentRemoved, agent_id)]
            }
            HostEvent::BuildQueued(b) => vec![b.event(EventType::BuildTypeAddedToQueue)],
            HostEvent::BuildRemovedFromQueue(b) => vec![b.event(EventType::BuildRemovedFromQueue)],
            HostEvent::BuildStarted(b) => vec![b.event(EventType::BuildStarted)],
            HostEvent::BuildFinished(b) => vec![b.event(EventType::BuildFinished)],
            HostEvent::BuildInterrupted(b) => vec![b.event(EventType::BuildInterrupted)],
            HostEvent::ChangesLoaded(b) => vec![b.event(EventType::ChangesLoaded)],
            HostEvent::BuildProblemsChanged {
                build,
                finished,
                before,
                after,
            } => {
                let mut out = vec![build.event(EventType::BuildProblemsChanged)];
                if !before.is_empty() && after.is_empty() {
                    out.push(build.event(EventType::MarkedAsSuccessful));
                } else if before.is_empty() && !after.is_empty() && finished {
                    out.push(build.event(EventType::FailureDetected));
                }
                out
            }
            HostEvent::BuildStatusChanged {
                build,
                was_failed,
                is_failed,
            } => {
                if !was_failed && is_failed {
                    vec![build.event(EventType::FailureDetected)]
                } else {
                    Vec::new()
                }
            }
        }
    }
}

/// Narrow bridge from host notifications to the dispatcher.
#[derive(Clone)]
pub struct EventSource {
    dispatcher: Arc<Dispatcher>,
}

impl EventSource {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self { dispatcher }
    }

    /// Publishes every event derived from `host`.
    ///
    /// Returns the number of handling tasks accepted across all derived events;
    /// rejections are logged by the dispatcher.
    pub fn raise(&self, host: HostEvent) -> usize {
        host.into_events()
            .into_iter()
            .map(|ev| self.dispatcher.publish(ev).accepted)
            .sum()
    }
}
