//! # eventvisor
//!
//! **Eventvisor** is an asynchronous event dispatch engine for Rust.
//!
//! Publishers hand off lifecycle events without waiting; subscribed listeners
//! handle them on a bounded worker pool, one at a time per ordering key. Work
//! that cannot finish before shutdown is written to disk and replayed on the
//! next start.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!   HostEvent ──► EventSource ──► Dispatcher.publish(Event)
//!                                      │
//!                         Registry: EventType → [Listener]
//!                                      │  one HandlingTask per listener
//!                                      ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  OrderedExecutor                                                  │
//! │  - pending queue (bounded, acceptance order)                      │
//! │  - in_flight keys (at most one running task per key)              │
//! │  - worker pool (Semaphore permits)                                │
//! └──────┬──────────────────┬──────────────────┬──────────────────────┘
//!        ▼                  ▼                  ▼
//!   key "listener:a"   key "project:X"    key "project:Y"
//!        │                  │                  │
//!        ▼                  ▼                  ▼
//!   Listener::handle(&Event)   (errors/panics logged, key released)
//!        │
//!        ▼
//!   WebhookListener ──► ConfigResolver ──► PayloadProducer ──► Transport
//! ```
//!
//! ### Lifecycle
//! ```text
//! startup_replay()
//!   └─► load <data>/webhooks/unprocessed-events.json → resubmit by listener name
//!
//! publish(event)*                           (never blocks on handling)
//!
//! shutdown()
//!   ├─► executor stops accepting work
//!   ├─► wait up to grace for accepted work
//!   │      ├─ drained   → file rewritten with no tasks
//!   │      └─ exceeded  → not-started tasks abandoned and persisted
//!   └─► terminated once the last running task finishes
//! ```
//!
//! ## Features
//! | Area             | Description                                              | Key types / traits                         |
//! |------------------|----------------------------------------------------------|--------------------------------------------|
//! | **Events**       | Closed set of lifecycle events and host notifications.   | [`Event`], [`EventType`], [`HostEvent`]    |
//! | **Ordering**     | Per-key FIFO over a shared, bounded worker pool.         | [`OrderedExecutor`], [`OrderedTask`]       |
//! | **Dispatch**     | Subscribe, publish, shutdown persistence, replay.        | [`Dispatcher`], [`Listener`]               |
//! | **Delivery**     | Webhook listener with retry and failure-log suppression. | [`delivery::WebhookListener`]              |
//! | **Errors**       | Typed errors with stable labels.                         | [`ExecuteError`], [`TaskError`], [`RuntimeError`] |
//!
//! ## Optional features
//! - `http` (default): reqwest-backed [`delivery::HttpTransport`].
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use async_trait::async_trait;
//! use eventvisor::{
//!     BuildRef, Dispatcher, DispatcherConfig, Event, EventSource, EventType, HostEvent,
//!     Listener, OrderingKey, TaskError,
//! };
//!
//! struct Audit;
//!
//! #[async_trait]
//! impl Listener for Audit {
//!     fn name(&self) -> &str { "audit" }
//!
//!     fn ordering_key(&self, event: &Event) -> OrderingKey {
//!         OrderingKey::project(event)
//!     }
//!
//!     async fn handle(&self, event: &Event) -> Result<(), TaskError> {
//!         println!("{event}");
//!         Ok(())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let dir = std::env::temp_dir().join("eventvisor-doc");
//!     let cfg = DispatcherConfig { workers: 4, ..DispatcherConfig::default() }.with_data_dir(&dir);
//!
//!     let dispatcher = Arc::new(Dispatcher::new(cfg));
//!     dispatcher.subscribe(EventType::BuildStarted, Arc::new(Audit))?;
//!     dispatcher.startup_replay().await;
//!
//!     let source = EventSource::new(Arc::clone(&dispatcher));
//!     source.raise(HostEvent::BuildStarted(BuildRef::new(42, "Backend")));
//!
//!     dispatcher.shutdown().await?;
//!     Ok(())
//! }
//! ```

pub mod delivery;
mod dispatcher;
mod error;
mod events;
mod executor;

// ---- Public re-exports ----

pub use dispatcher::{
    Dispatcher, DispatcherConfig, HandlingTask, Listener, OrderingKey, PublishOutcome,
    ROOT_PROJECT, ReplayReport, TaskInfo, UNPROCESSED_FILE, UnprocessedStore,
};
pub use error::{ExecuteError, PersistError, RuntimeError, SubscribeError, TaskError};
pub use events::{BuildRef, Event, EventSource, EventType, HostEvent, UnknownEventType};
pub use executor::{ExecutorConfig, OrderedExecutor, OrderedTask, TaskFn};
