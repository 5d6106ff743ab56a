use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::dispatcher::{Dispatcher, Listener, OrderingKey, ROOT_PROJECT};
use crate::error::{SubscribeError, TaskError};
use crate::events::{Event, EventType};

use super::config::ConfigResolver;
use super::error::DeliveryError;
use super::producer::PayloadProducer;
use super::suppress::ProblemLog;
use super::transport::{Transport, WebhookRequest};

/// How webhook deliveries are serialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyScope {
    /// All deliveries of this listener run one at a time.
    #[default]
    Listener,
    /// Deliveries are serialized per project; projects proceed in parallel.
    Project,
}

/// Outcome of a delivery that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Sent { attempts: u32 },
    /// Webhooks disabled for the project, or the event type is not subscribed.
    Skipped,
    /// The producer has no payload for this event type.
    Unsupported,
}

/// Listener that posts events to the per-project webhook endpoint.
///
/// Failures never escape `handle`: they are reported to the [`ProblemLog`]
/// keyed by project, so a broken endpoint logs one warning per distinct
/// problem instead of one per event.
pub struct WebhookListener {
    name: String,
    scope: KeyScope,
    config: Arc<dyn ConfigResolver>,
    producer: Arc<dyn PayloadProducer>,
    transport: Arc<dyn Transport>,
    problems: ProblemLog,
}

impl WebhookListener {
    pub const NAME: &'static str = "webhooks";

    /// Event types the listener subscribes to on [`install`](Self::install).
    pub const EVENTS: [EventType; 10] = [
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
    ];

    pub fn new(
        config: Arc<dyn ConfigResolver>,
        producer: Arc<dyn PayloadProducer>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            name: Self::NAME.to_string(),
            scope: KeyScope::default(),
            config,
            producer,
            transport,
            problems: ProblemLog::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_key_scope(mut self, scope: KeyScope) -> Self {
        self.scope = scope;
        self
    }

    pub fn problems(&self) -> &ProblemLog {
        &self.problems
    }

    /// Subscribes this listener to [`Self::EVENTS`]; returns the collisions.
    pub fn install(self: &Arc<Self>, dispatcher: &Dispatcher) -> Vec<SubscribeError> {
        dispatcher.subscribe_all(&Self::EVENTS, Arc::clone(self) as Arc<dyn Listener>)
    }

    /// Delivers `event` without touching the problem log.
    pub async fn deliver(&self, event: &Event) -> Result<Delivery, DeliveryError> {
        let settings = self.config.resolve(event.project_id())?;
        if !settings.accepts(event.kind()) {
            return Ok(Delivery::Skipped);
        }
        let url = settings
            .url
            .clone()
            .ok_or_else(|| DeliveryError::UrlNotDefined {
                project: settings.project.clone(),
            })?;
        if !self.producer.supports(event) {
            return Ok(Delivery::Unsupported);
        }

        let body = self
            .producer
            .render(event, settings.fields_for(event.kind()))
            .await?;
        let request = WebhookRequest {
            url,
            body,
            credentials: settings.credentials.clone(),
        };
        let attempts = self.send_with_retry(&request, settings.retry_count).await?;
        Ok(Delivery::Sent { attempts })
    }

    /// Up to `1 + retry_count` immediate attempts; stops early on success or on
    /// an error that cannot be retried.
    async fn send_with_retry(&self, request: &WebhookRequest, retry_count: u32) -> Result<u32, DeliveryError> {
        let mut remaining = retry_count;
        let mut attempts = 0;
        loop {
            attempts += 1;
            match self.transport.post(request).await {
                Ok(()) => return Ok(attempts),
                Err(e) if e.is_retryable() && remaining > 0 => {
                    remaining -= 1;
                    debug!(url = %request.url, attempt = attempts, remaining, error = %e, "webhook attempt failed; retrying");
                }
                Err(e) => {
                    return Err(DeliveryError::Send {
                        url: request.url.clone(),
                        source: e,
                    });
                }
            }
        }
    }
}

#[async_trait]
impl Listener for WebhookListener {
    fn name(&self) -> &str {
        &self.name
    }

    fn ordering_key(&self, event: &Event) -> OrderingKey {
        match self.scope {
            KeyScope::Listener => OrderingKey::listener(&self.name),
            KeyScope::Project => OrderingKey::project(event),
        }
    }

    async fn handle(&self, event: &Event) -> Result<(), TaskError> {
        let source = event.project_id().unwrap_or(ROOT_PROJECT);
        match self.deliver(event).await {
            Ok(Delivery::Sent { attempts }) => {
                self.problems.clear(source);
                debug!(listener = %self.name, event = %event, attempts, "webhook sent");
            }
            Ok(Delivery::Skipped) => {}
            Ok(Delivery::Unsupported) => {
                warn!(listener = %self.name, "Unsupported event type {}", event.kind());
            }
            Err(e) => {
                self.problems.report(source, &e.problem_code(), &e.to_string());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::config::{self, ProjectParameters, fields_key};
    use crate::delivery::error::{ProducerError, TransportError};
    use crate::delivery::suppress::Severity;
    use crate::dispatcher::DispatcherConfig;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Pops scripted results; succeeds once the script is exhausted.
    #[derive(Default)]
    struct ScriptedTransport {
        script: Mutex<VecDeque<Result<(), TransportError>>>,
        sent: Mutex<Vec<WebhookRequest>>,
    }

    impl ScriptedTransport {
        fn new(script: impl IntoIterator<Item = Result<(), TransportError>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into_iter().collect()),
                sent: Mutex::default(),
            })
        }

        fn calls(&self) -> usize {
            self.sent.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn post(&self, request: &WebhookRequest) -> Result<(), TransportError> {
            self.sent.lock().unwrap().push(request.clone());
            self.script.lock().unwrap().pop_front().unwrap_or(Ok(()))
        }
    }

    struct EchoProducer;

    #[async_trait]
    impl PayloadProducer for EchoProducer {
        fn supports(&self, event: &Event) -> bool {
            event.kind() != EventType::FailureDetected
        }

        async fn render(&self, event: &Event, fields: &str) -> Result<String, ProducerError> {
            Ok(format!(r#"{{"type":"{}","fields":"{fields}"}}"#, event.kind()))
        }
    }

    fn status(code: u16) -> Result<(), TransportError> {
        Err(TransportError::Status {
            status: code,
            message: "Internal Server Error".into(),
        })
    }

    fn params(retry: &str) -> ProjectParameters {
        let mut p = ProjectParameters::new();
        p.set_root(config::ENABLE, "true")
            .set_root(config::EVENTS, "AGENT_REGISTERED;BUILD_STARTED;FAILURE_DETECTED")
            .set_root(config::URL, "http://hook.local/in")
            .set_root(config::RETRY_COUNT, retry)
            .add_project("P", None)
            .set("P", config::USERNAME, "bot")
            .set("P", config::PASSWORD, "pw")
            .set("P", &fields_key(EventType::BuildStarted), "id");
        p
    }

    fn listener(p: ProjectParameters, transport: &Arc<ScriptedTransport>) -> WebhookListener {
        WebhookListener::new(Arc::new(p), Arc::new(EchoProducer), transport.clone())
    }

    fn build(id: i64) -> Event {
        Event::new(EventType::BuildStarted, id).with_project("P")
    }

    #[tokio::test]
    async fn test_sends_body_credentials_and_fields() {
        let t = Arc::new(ScriptedTransport::default());
        let l = listener(params("0"), &t);

        assert_eq!(l.deliver(&build(1)).await.unwrap(), Delivery::Sent { attempts: 1 });
        let sent = t.sent.lock().unwrap();
        assert_eq!(sent[0].url, "http://hook.local/in");
        assert_eq!(sent[0].body, r#"{"type":"BUILD_STARTED","fields":"id"}"#);
        assert_eq!(sent[0].credentials.as_ref().map(|c| c.username.as_str()), Some("bot"));
    }

    #[tokio::test]
    async fn test_retry_count_bounds_attempts() {
        let t = ScriptedTransport::new([status(500), status(500), status(500), status(500)]);
        let l = listener(params("2"), &t);

        let err = l.deliver(&build(1)).await.unwrap_err();
        assert_eq!(err.problem_code(), "500");
        assert_eq!(t.calls(), 3);

        let t = ScriptedTransport::new([status(502)]);
        let l = listener(params("2"), &t);
        assert_eq!(l.deliver(&build(1)).await.unwrap(), Delivery::Sent { attempts: 2 });
    }

    #[tokio::test]
    async fn test_invalid_url_is_not_retried() {
        let t = ScriptedTransport::new([Err(TransportError::InvalidUrl {
            message: "bad".into(),
        })]);
        let l = listener(params("5"), &t);

        let err = l.deliver(&build(1)).await.unwrap_err();
        assert_eq!(err.problem_code(), "INVALID_URL");
        assert_eq!(t.calls(), 1);
    }

    #[tokio::test]
    async fn test_same_problem_logged_once_until_success() {
        let t = ScriptedTransport::new([
            status(500),
            status(500),
            status(500),
            Ok(()),
            Err(TransportError::Timeout {
                message: "60s".into(),
            }),
        ]);
        let l = listener(params("0"), &t);

        for _ in 0..3 {
            l.handle(&build(1)).await.unwrap();
        }
        assert_eq!(l.problems().warnings_emitted(), 1);

        l.handle(&build(2)).await.unwrap();
        l.handle(&build(3)).await.unwrap();
        assert_eq!(l.problems().warnings_emitted(), 2);
        assert_eq!(l.problems().report("P", "timeout", "again"), Severity::Debug);
    }

    #[tokio::test]
    async fn test_missing_url_and_unknown_project_are_problems() {
        let t = Arc::new(ScriptedTransport::default());
        let mut p = params("0");
        p.set("P", config::URL, "");
        let l = listener(p, &t);

        let err = l.deliver(&build(1)).await.unwrap_err();
        assert_eq!(err.problem_code(), "WEBHOOKS_URL_IS_NOT_DEFINED");

        let orphan = Event::new(EventType::BuildStarted, 1).with_project("Deleted");
        let err = l.deliver(&orphan).await.unwrap_err();
        assert_eq!(err.problem_code(), "PROJECT_NOT_FOUND");

        l.handle(&orphan).await.unwrap();
        l.handle(&orphan).await.unwrap();
        assert_eq!(l.problems().warnings_emitted(), 1);
        assert_eq!(t.calls(), 0);
    }

    #[tokio::test]
    async fn test_disabled_unsubscribed_and_unsupported_are_quiet() {
        let t = Arc::new(ScriptedTransport::default());
        let mut p = params("0");
        p.set("P", config::ENABLE, "false");
        let l = listener(p, &t);

        assert_eq!(l.deliver(&build(1)).await.unwrap(), Delivery::Skipped);
        let removed = Event::new(EventType::AgentRemoved, 3);
        assert_eq!(l.deliver(&removed).await.unwrap(), Delivery::Skipped);
        let failure = Event::new(EventType::FailureDetected, 3);
        assert_eq!(l.deliver(&failure).await.unwrap(), Delivery::Unsupported);

        l.handle(&failure).await.unwrap();
        assert_eq!(l.problems().warnings_emitted(), 0);
        assert_eq!(t.calls(), 0);
    }

    #[test]
    fn test_key_scope() {
        let t = Arc::new(ScriptedTransport::default());
        let per_listener = listener(params("0"), &t);
        let per_project = listener(params("0"), &t).with_key_scope(KeyScope::Project);

        let a = build(1);
        let root = Event::new(EventType::AgentRegistered, 1);
        assert_eq!(per_listener.ordering_key(&a), per_listener.ordering_key(&root));
        assert_ne!(per_project.ordering_key(&a), per_project.ordering_key(&root));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_installed_listener_delivers_through_dispatcher() {
        let t = Arc::new(ScriptedTransport::default());
        let l = Arc::new(listener(params("0"), &t));
        let dispatcher = Dispatcher::new(DispatcherConfig::default());

        assert!(l.install(&dispatcher).is_empty());
        assert_eq!(l.install(&dispatcher).len(), WebhookListener::EVENTS.len());

        dispatcher.publish(Event::new(EventType::AgentRegistered, 7));
        dispatcher.publish(build(8));
        tokio::time::timeout(Duration::from_secs(5), dispatcher.shutdown())
            .await
            .unwrap()
            .unwrap();

        let bodies: Vec<String> = t.sent.lock().unwrap().iter().map(|r| r.body.clone()).collect();
        assert_eq!(
            bodies,
            vec![
                r#"{"type":"AGENT_REGISTERED","fields":""}"#.to_string(),
                r#"{"type":"BUILD_STARTED","fields":"id"}"#.to_string(),
            ]
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_renamed_listener_installs_next_to_default() {
        let t = Arc::new(ScriptedTransport::default());
        let dispatcher = Dispatcher::new(DispatcherConfig::default());
        let default = Arc::new(listener(params("0"), &t));
        let mirror = Arc::new(listener(params("0"), &t).with_name("webhooks-mirror"));

        assert!(default.install(&dispatcher).is_empty());
        assert!(mirror.install(&dispatcher).is_empty());
        assert_eq!(mirror.name(), "webhooks-mirror");

        assert_eq!(dispatcher.publish(build(3)).accepted, 2);
        dispatcher.shutdown().await.unwrap();
        assert_eq!(t.calls(), 2);
    }
}
