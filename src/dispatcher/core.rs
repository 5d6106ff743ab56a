use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::runtime::Handle;
use tracing::{debug, error, info, warn};

use crate::error::{ExecuteError, RuntimeError, SubscribeError};
use crate::events::{Event, EventType};
use crate::executor::OrderedExecutor;

use super::config::DispatcherConfig;
use super::listener::{HandlingTask, Listener, OrderingKey};
use super::persist::{TaskInfo, UnprocessedStore};
use super::registry::Registry;
use super::signal::wait_for_shutdown_signal;

/// Result of a single [`Dispatcher::publish`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PublishOutcome {
    /// Handling tasks accepted by the executor.
    pub accepted: usize,
    /// Listeners whose task was refused, with the reason.
    pub rejected: Vec<(String, ExecuteError)>,
}

/// Result of [`Dispatcher::startup_replay`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReplayReport {
    /// Persisted tasks resubmitted to the executor.
    pub replayed: usize,
    /// Persisted tasks whose listener is no longer registered.
    pub dropped: usize,
    /// Persisted tasks the executor refused.
    pub rejected: usize,
    /// The unprocessed file exists but could not be read or decoded.
    pub load_failed: bool,
}

/// Routes events to subscribed listeners through the ordered executor.
///
/// ## Lifecycle
/// ```text
/// startup_replay() ──► publish()* ──► shutdown()
///       ▲                                 │
///       └──────── unprocessed file ◄──────┘  (work abandoned after grace)
/// ```
pub struct Dispatcher {
    registry: Registry,
    executor: OrderedExecutor<OrderingKey, HandlingTask>,
    store: Option<UnprocessedStore>,
    cfg: DispatcherConfig,
    shutdown_started: AtomicBool,
}

impl Dispatcher {
    /// Creates a dispatcher whose handlers run on the current Tokio runtime.
    ///
    /// # Panics
    /// Panics when called outside a Tokio runtime; use [`Self::with_runtime`] there.
    pub fn new(cfg: DispatcherConfig) -> Self {
        Self::with_runtime(cfg, Handle::current())
    }

    pub fn with_runtime(cfg: DispatcherConfig, runtime: Handle) -> Self {
        Self {
            registry: Registry::new(),
            executor: OrderedExecutor::with_runtime(cfg.executor(), runtime),
            store: cfg.unprocessed_file.clone().map(UnprocessedStore::new),
            cfg,
            shutdown_started: AtomicBool::new(false),
        }
    }

    /// Registers `listener` for `kind`.
    ///
    /// # Errors
    /// [`SubscribeError::NameCollision`] if a listener with the same name is
    /// already registered for `kind`; the registry is left unchanged.
    pub fn subscribe(&self, kind: EventType, listener: Arc<dyn Listener>) -> Result<(), SubscribeError> {
        self.registry.subscribe(kind, listener)
    }

    /// Registers `listener` for each of `kinds`; collisions are logged and
    /// returned while the remaining registrations succeed.
    pub fn subscribe_all(&self, kinds: &[EventType], listener: Arc<dyn Listener>) -> Vec<SubscribeError> {
        self.registry.subscribe_all(kinds, listener)
    }

    /// Removes `listener` from every event type; returns the number of removed
    /// registrations. Already accepted tasks still run.
    pub fn unsubscribe<L: Listener + ?Sized>(&self, listener: &Arc<L>) -> usize {
        self.registry.unsubscribe(listener)
    }

    /// Hands `event` to every listener subscribed to its type.
    ///
    /// Never waits for handling. A refusal for one listener is logged and does
    /// not affect the others.
    pub fn publish(&self, event: Event) -> PublishOutcome {
        let mut outcome = PublishOutcome::default();
        for listener in self.registry.listeners(event.kind()) {
            let task = HandlingTask::new(Arc::clone(&listener), event.clone());
            let key = task.ordering_key();
            match self.executor.execute(task, key) {
                Ok(()) => outcome.accepted += 1,
                Err(e) => {
                    error!(listener = listener.name(), event = %event, label = e.as_label(), error = %e, "cannot handle event");
                    outcome.rejected.push((listener.name().to_string(), e));
                }
            }
        }
        outcome
    }

    /// Stops intake, waits for accepted work and persists what could not run.
    ///
    /// - Drained within `grace`: the unprocessed file is rewritten (normally with
    ///   no tasks) and the number of persisted tasks is returned.
    /// - Grace exceeded: tasks that have not started are taken out of the
    ///   executor and persisted, so each of them is either executed or stored,
    ///   never both.
    ///
    /// Calling it again is a no-op returning `Ok(0)`.
    ///
    /// # Errors
    /// [`RuntimeError::GraceExceeded`] after the abandoned tasks were persisted.
    /// Persistence failures are logged, not returned.
    pub async fn shutdown(&self) -> Result<usize, RuntimeError> {
        if self.shutdown_started.swap(true, Ordering::SeqCst) {
            debug!("dispatcher shutdown already requested");
            return Ok(0);
        }
        info!(
            pending = self.executor.pending_len(),
            in_flight = self.executor.in_flight_len(),
            "dispatcher shutting down"
        );
        self.executor.shutdown();

        let drained = match self.cfg.grace_limit() {
            None => {
                self.executor.terminated().await;
                true
            }
            Some(grace) => tokio::time::timeout(grace, self.executor.terminated())
                .await
                .is_ok(),
        };

        if drained {
            let rest: Vec<TaskInfo> = self
                .executor
                .unprocessed_tasks()
                .iter()
                .map(TaskInfo::from)
                .collect();
            self.persist(&rest).await;
            return Ok(rest.len());
        }

        let abandoned: Vec<TaskInfo> = self
            .executor
            .abandon_pending()
            .iter()
            .map(TaskInfo::from)
            .collect();
        warn!(
            grace = ?self.cfg.grace,
            abandoned = abandoned.len(),
            in_flight = self.executor.in_flight_len(),
            "shutdown grace exceeded; persisting pending events"
        );
        self.persist(&abandoned).await;
        Err(RuntimeError::GraceExceeded {
            grace: self.cfg.grace,
            abandoned: abandoned.len(),
        })
    }

    /// True once shutdown was requested and all accepted work has finished or
    /// been abandoned.
    pub fn is_terminated(&self) -> bool {
        self.executor.is_terminated()
    }

    /// Resubmits persisted tasks to the listeners registered under the same
    /// name and event type.
    ///
    /// The file is left in place; a later shutdown overwrites it. Replaying
    /// twice delivers twice.
    pub async fn startup_replay(&self) -> ReplayReport {
        let mut report = ReplayReport::default();
        let Some(store) = &self.store else {
            return report;
        };

        let tasks = match store.load().await {
            Ok(Some(tasks)) => tasks,
            Ok(None) => return report,
            Err(e) => {
                error!(path = %store.path().display(), label = e.as_label(), error = %e, "failed to replay saved events");
                report.load_failed = true;
                return report;
            }
        };

        for info in tasks {
            let Some(listener) = self.registry.find(info.event.kind(), &info.listener_name) else {
                warn!(listener = %info.listener_name, event = %info.event, "no listener registered for saved event; dropping");
                report.dropped += 1;
                continue;
            };
            let task = HandlingTask::new(listener, info.event);
            let key = task.ordering_key();
            match self.executor.execute(task, key) {
                Ok(()) => report.replayed += 1,
                Err(e) => {
                    error!(listener = %info.listener_name, label = e.as_label(), error = %e, "cannot replay saved event");
                    report.rejected += 1;
                }
            }
        }

        info!(
            replayed = report.replayed,
            dropped = report.dropped,
            rejected = report.rejected,
            "replayed saved events"
        );
        report
    }

    /// Replays saved work, runs until a termination signal, then shuts down.
    pub async fn run_until_signal(&self) -> Result<usize, RuntimeError> {
        self.run_until(async {
            if let Err(e) = wait_for_shutdown_signal().await {
                error!(error = %e, "failed to listen for shutdown signals; shutting down");
            }
        })
        .await
    }

    /// Replays saved work, waits for `stop`, then shuts down.
    pub async fn run_until<F>(&self, stop: F) -> Result<usize, RuntimeError>
    where
        F: Future<Output = ()>,
    {
        self.startup_replay().await;
        stop.await;
        self.shutdown().await
    }

    async fn persist(&self, tasks: &[TaskInfo]) {
        let Some(store) = &self.store else {
            if !tasks.is_empty() {
                warn!(count = tasks.len(), "no unprocessed file configured; events are lost");
            }
            return;
        };
        match store.save(tasks).await {
            Ok(()) => debug!(path = %store.path().display(), count = tasks.len(), "saved unprocessed events"),
            Err(e) => {
                error!(path = %store.path().display(), label = e.as_label(), error = %e, "failed to save unprocessed events")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TaskError;
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::Mutex;
    use std::time::Duration;

    type Log = Arc<Mutex<Vec<(String, i64)>>>;

    struct Recording {
        name: &'static str,
        delay: Duration,
        log: Log,
    }

    impl Recording {
        fn new(name: &'static str, delay_ms: u64, log: &Log) -> Arc<Self> {
            Arc::new(Self {
                name,
                delay: Duration::from_millis(delay_ms),
                log: Arc::clone(log),
            })
        }
    }

    #[async_trait]
    impl Listener for Recording {
        fn name(&self) -> &str {
            self.name
        }

        fn ordering_key(&self, _event: &Event) -> OrderingKey {
            OrderingKey::listener(self.name)
        }

        async fn handle(&self, event: &Event) -> Result<(), TaskError> {
            tokio::time::sleep(self.delay).await;
            self.log
                .lock()
                .unwrap()
                .push((self.name.to_string(), event.object_id()));
            Ok(())
        }
    }

    fn config(dir: &Path, workers: usize, grace_ms: u64) -> DispatcherConfig {
        DispatcherConfig {
            workers,
            grace: Duration::from_millis(grace_ms),
            ..DispatcherConfig::default()
        }
        .with_data_dir(dir)
    }

    fn started(id: i64) -> Event {
        Event::new(EventType::BuildStarted, id).with_project("P")
    }

    fn store_at(dir: &Path) -> UnprocessedStore {
        UnprocessedStore::new(dir.join(crate::dispatcher::config::UNPROCESSED_FILE))
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_duplicate_name_rejected_other_type_allowed() {
        let log = Log::default();
        let d = Dispatcher::new(DispatcherConfig::default());

        d.subscribe(EventType::BuildStarted, Recording::new("L", 0, &log)).unwrap();
        let err = d
            .subscribe(EventType::BuildStarted, Recording::new("L", 0, &log))
            .unwrap_err();
        assert!(matches!(err, SubscribeError::NameCollision { .. }));
        assert!(d.subscribe(EventType::BuildFinished, Recording::new("L", 0, &log)).is_ok());

        assert_eq!(d.publish(started(1)).accepted, 1);
        d.shutdown().await.unwrap();
        assert_eq!(log.lock().unwrap().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_publish_without_listeners_is_noop() {
        let d = Dispatcher::new(DispatcherConfig::default());
        assert_eq!(d.publish(started(1)), PublishOutcome::default());
        assert_eq!(d.shutdown().await, Ok(0));
        assert!(d.is_terminated());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_fan_out_in_subscription_order() {
        let log = Log::default();
        let d = Dispatcher::new(DispatcherConfig::default());
        d.subscribe(EventType::BuildStarted, Recording::new("a", 0, &log)).unwrap();
        d.subscribe(EventType::BuildStarted, Recording::new("b", 0, &log)).unwrap();

        let out = d.publish(started(9));
        assert_eq!(out.accepted, 2);
        assert!(out.rejected.is_empty());

        d.shutdown().await.unwrap();
        let got: Vec<String> = log.lock().unwrap().iter().map(|(n, _)| n.clone()).collect();
        assert_eq!(got, vec!["a", "b"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_rejections_are_reported_per_listener() {
        let log = Log::default();
        let d = Dispatcher::new(DispatcherConfig {
            queue_capacity: 1,
            ..DispatcherConfig::default()
        });
        d.subscribe(EventType::BuildStarted, Recording::new("slow", 200, &log)).unwrap();

        assert_eq!(d.publish(started(1)).accepted, 1);
        assert_eq!(d.publish(started(2)).accepted, 1);
        let out = d.publish(started(3));
        assert_eq!(out.accepted, 0);
        assert_eq!(
            out.rejected,
            vec![("slow".to_string(), ExecuteError::CapacityExceeded { capacity: 1 })]
        );

        d.shutdown().await.unwrap();
        let out = d.publish(started(4));
        assert_eq!(out.rejected[0].1, ExecuteError::RejectedAfterShutdown);
        assert_eq!(log.lock().unwrap().len(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_unsubscribe_stops_future_deliveries() {
        let log = Log::default();
        let d = Dispatcher::new(DispatcherConfig::default());
        let l = Recording::new("L", 0, &log);
        d.subscribe_all(&[EventType::BuildStarted, EventType::BuildFinished], l.clone());

        assert_eq!(d.unsubscribe(&l), 2);
        assert_eq!(d.publish(started(1)).accepted, 0);
        d.shutdown().await.unwrap();
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_shutdown_drains_and_leaves_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let log = Log::default();
        let d = Dispatcher::new(config(dir.path(), 1, 5_000));
        d.subscribe(EventType::BuildStarted, Recording::new("L", 30, &log)).unwrap();
        d.subscribe(EventType::BuildStarted, Recording::new("M", 30, &log)).unwrap();

        for id in 1..=3 {
            d.publish(started(id));
        }
        assert_eq!(d.shutdown().await, Ok(0));
        assert!(d.is_terminated());
        assert_eq!(log.lock().unwrap().len(), 6);

        let saved = store_at(dir.path()).load().await.unwrap();
        assert_eq!(saved, Some(Vec::new()));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_grace_exceeded_persists_and_replays_abandoned_work() {
        let dir = tempfile::tempdir().unwrap();
        let log = Log::default();
        let first = Dispatcher::new(config(dir.path(), 1, 100));
        first
            .subscribe(EventType::BuildStarted, Recording::new("L", 400, &log))
            .unwrap();

        for id in 1..=3 {
            assert_eq!(first.publish(started(id)).accepted, 1);
        }
        assert_eq!(
            first.shutdown().await,
            Err(RuntimeError::GraceExceeded {
                grace: Duration::from_millis(100),
                abandoned: 2,
            })
        );

        let saved = store_at(dir.path()).load().await.unwrap().unwrap();
        let ids: Vec<i64> = saved.iter().map(|t| t.event.object_id()).collect();
        assert_eq!(ids, vec![2, 3]);
        assert!(saved.iter().all(|t| t.listener_name == "L"));

        let replay_log = Log::default();
        let second = Dispatcher::new(config(dir.path(), 1, 5_000));
        second
            .subscribe(EventType::BuildStarted, Recording::new("L", 0, &replay_log))
            .unwrap();
        assert_eq!(
            second.startup_replay().await,
            ReplayReport {
                replayed: 2,
                dropped: 0,
                rejected: 0,
                load_failed: false,
            }
        );
        second.shutdown().await.unwrap();
        assert_eq!(
            *replay_log.lock().unwrap(),
            vec![("L".to_string(), 2), ("L".to_string(), 3)]
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_replay_twice_delivers_twice_and_drops_unknown() {
        let dir = tempfile::tempdir().unwrap();
        store_at(dir.path())
            .save(&[
                TaskInfo {
                    listener_name: "L".into(),
                    event: started(5),
                },
                TaskInfo {
                    listener_name: "gone".into(),
                    event: started(6),
                },
            ])
            .await
            .unwrap();

        let log = Log::default();
        let d = Dispatcher::new(config(dir.path(), 1, 5_000));
        d.subscribe(EventType::BuildStarted, Recording::new("L", 0, &log)).unwrap();

        let expected = ReplayReport {
            replayed: 1,
            dropped: 1,
            rejected: 0,
            load_failed: false,
        };
        assert_eq!(d.startup_replay().await, expected);
        assert_eq!(d.startup_replay().await, expected);

        d.shutdown().await.unwrap();
        assert_eq!(
            *log.lock().unwrap(),
            vec![("L".to_string(), 5), ("L".to_string(), 5)]
        );
    }

    #[tokio::test]
    async fn test_replay_without_file_or_store() {
        let dir = tempfile::tempdir().unwrap();
        let with_dir = Dispatcher::new(config(dir.path(), 1, 1_000));
        assert_eq!(with_dir.startup_replay().await, ReplayReport::default());

        let no_store = Dispatcher::new(DispatcherConfig::default());
        assert_eq!(no_store.startup_replay().await, ReplayReport::default());
    }

    #[tokio::test]
    async fn test_second_shutdown_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let d = Dispatcher::new(config(dir.path(), 1, 1_000));
        assert_eq!(d.shutdown().await, Ok(0));
        assert_eq!(d.shutdown().await, Ok(0));
    }

    #[tokio::test]
    async fn test_corrupt_file_is_reported_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(crate::dispatcher::config::UNPROCESSED_FILE);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "{ not json").unwrap();

        let d = Dispatcher::new(config(dir.path(), 1, 1_000));
        assert_eq!(
            d.startup_replay().await,
            ReplayReport {
                load_failed: true,
                ..ReplayReport::default()
            }
        );

        assert_eq!(d.shutdown().await, Ok(0));
        assert_eq!(store_at(dir.path()).load().await.unwrap(), Some(Vec::new()));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_unwritable_file_does_not_fail_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "").unwrap();

        let log = Log::default();
        let d = Dispatcher::new(DispatcherConfig {
            unprocessed_file: Some(blocker.join("unprocessed-events.json")),
            ..DispatcherConfig::default()
        });
        d.subscribe(EventType::BuildStarted, Recording::new("L", 0, &log)).unwrap();
        d.publish(started(1));

        assert_eq!(d.shutdown().await, Ok(0));
        assert!(d.is_terminated());
        assert_eq!(log.lock().unwrap().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_run_until_replays_before_shutting_down() {
        let dir = tempfile::tempdir().unwrap();
        store_at(dir.path())
            .save(&[
                TaskInfo {
                    listener_name: "L".into(),
                    event: started(7),
                },
                TaskInfo {
                    listener_name: "L".into(),
                    event: started(8),
                },
            ])
            .await
            .unwrap();

        let log = Log::default();
        let d = Dispatcher::new(config(dir.path(), 1, 5_000));
        d.subscribe(EventType::BuildStarted, Recording::new("L", 0, &log)).unwrap();

        assert_eq!(d.run_until(async {}).await, Ok(0));
        assert!(d.is_terminated());
        assert_eq!(
            *log.lock().unwrap(),
            vec![("L".to_string(), 7), ("L".to_string(), 8)]
        );
        assert_eq!(store_at(dir.path()).load().await.unwrap(), Some(Vec::new()));
    }
}
