//! # Lifecycle events and the host-facing event source.
//!
//! - [`Event`] / [`EventType`]: immutable, serializable event values.
//! - [`HostEvent`]: closed set of host notifications.
//! - [`EventSource`]: turns host notifications into published events.

mod event;
mod source;

pub use event::{Event, EventType, UnknownEventType};
pub use source::{BuildRef, EventSource, HostEvent};
