//! # Event dispatcher: registry, fan-out and durable shutdown.
//!
//! The [`Dispatcher`] maps each [`EventType`](crate::EventType) to the listeners
//! subscribed to it, wraps every (listener, event) pair into a [`HandlingTask`]
//! and submits it to the ordered executor under the listener's [`OrderingKey`].
//!
//! ## Architecture
//! ```text
//! publish(event)
//!    └─► Registry.listeners(event.type)         (snapshot, subscription order)
//!           └─► for each listener:
//!                 executor.execute(HandlingTask, listener.ordering_key(event))
//!                    ├─ Ok   → accepted
//!                    └─ Err  → logged, reported in PublishOutcome
//!
//! shutdown()
//!    ├─► executor.shutdown()                    (no new work)
//!    ├─► wait up to grace for termination
//!    │      ├─ drained  → save(unprocessed_tasks)   (empty list)
//!    │      └─ timeout  → save(abandon_pending())   → Err(GraceExceeded)
//!    └─► unprocessed file: <data>/webhooks/unprocessed-events.json
//!
//! startup_replay()
//!    └─► load file → for each (listenerName, event):
//!           listener registered for event.type with that name?
//!              ├─ yes → executor.execute(..)
//!              └─ no  → warn, dropped
//! ```
//!
//! ## Rules
//! - Listener names are unique per event type, not globally.
//! - A rejection for one listener never affects the others.
//! - Persistence failures are logged and never abort startup or shutdown.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use async_trait::async_trait;
//! use eventvisor::{Dispatcher, DispatcherConfig, Event, EventType, Listener, OrderingKey, TaskError};
//!
//! struct Print;
//!
//! #[async_trait]
//! impl Listener for Print {
//!     fn name(&self) -> &str { "print" }
//!     fn ordering_key(&self, _event: &Event) -> OrderingKey { OrderingKey::listener("print") }
//!     async fn handle(&self, event: &Event) -> Result<(), TaskError> {
//!         println!("{event}");
//!         Ok(())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let dispatcher = Dispatcher::new(DispatcherConfig::default());
//!     dispatcher.subscribe(EventType::BuildStarted, Arc::new(Print)).unwrap();
//!
//!     let out = dispatcher.publish(Event::new(EventType::BuildStarted, 1).with_project("P"));
//!     assert_eq!(out.accepted, 1);
//!
//!     dispatcher.shutdown().await.unwrap();
//! }
//! ```

mod config;
mod core;
mod listener;
mod persist;
mod registry;
mod signal;

pub use config::{DispatcherConfig, UNPROCESSED_FILE};
pub use core::{Dispatcher, PublishOutcome, ReplayReport};
pub use listener::{HandlingTask, Listener, OrderingKey, ROOT_PROJECT};
pub use persist::{TaskInfo, UnprocessedStore};
