//! # Ordered executor: per-key FIFO over a shared worker pool.
//!
//! Tasks are submitted together with an ordering key. Tasks with equal keys
//! never overlap and start in acceptance order; tasks with different keys run
//! in parallel, limited only by the pool size.
//!
//! ## Architecture
//! ```text
//! execute(task, key)
//!      │
//!      ├── shutdown? ─────────────────────────────► Err(RejectedAfterShutdown)
//!      │
//!      ├── key free && worker free? ──► in_flight += key ──► spawn(run)
//!      │
//!      ├── pending.len() >= capacity? ─────────────► Err(CapacityExceeded)
//!      │
//!      └── pending.push_back(key, task)
//!
//! worker finished(key)
//!      │
//!      ├── in_flight -= key, release worker
//!      ├── scan pending oldest-first:
//!      │      skip entries whose key is in flight,
//!      │      start entries while workers remain
//!      └── shutdown && idle? ──► terminated
//! ```
//!
//! ## Rules
//! - A key with queued entries counts as busy, so a late submission can never
//!   overtake an earlier one for the same key.
//! - A failing or panicking task is logged and frees its key like a successful one.
//! - `execute` never blocks on task execution.
//!
//! ## Example
//! ```rust
//! use eventvisor::{ExecutorConfig, OrderedExecutor, TaskError, TaskFn};
//!
//! #[tokio::main]
//! async fn main() {
//!     let exec = OrderedExecutor::new(ExecutorConfig { workers: 2, queue_capacity: 16 });
//!
//!     for n in 0..3 {
//!         let task = TaskFn::new(format!("step-{n}"), || async { Ok::<_, TaskError>(()) });
//!         exec.execute(task, "project-a").unwrap();
//!     }
//!
//!     exec.shutdown();
//!     exec.terminated().await;
//!     assert!(exec.is_terminated());
//! }
//! ```

mod config;
mod core;
mod state;
mod task;

pub use config::ExecutorConfig;
pub use core::OrderedExecutor;
pub use task::{OrderedTask, TaskFn};
