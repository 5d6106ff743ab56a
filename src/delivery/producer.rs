//! # Webhook payload production.
//!
//! [`PayloadProducer`] turns an event into the JSON body of a webhook.
//! [`RestEnvelopeProducer`] fetches the object description from the host's
//! REST API and wraps it:
//!
//! ```text
//! AGENT_*            → /app/rest/agents/id:<objectId>
//! BUILD_STARTED,
//! BUILD_FINISHED,
//! BUILD_INTERRUPTED,
//! CHANGES_LOADED     → /app/rest/builds/promotionId:<objectId>
//!
//! body = {"eventType":"BUILD_STARTED","payload":<fetched json>}
//! ```

use async_trait::async_trait;
use serde::Serialize;
use serde_json::value::RawValue;

use crate::events::{Event, EventType};

use super::error::ProducerError;

/// Produces the JSON body for an event.
#[async_trait]
pub trait PayloadProducer: Send + Sync + 'static {
    /// False if no payload can be produced for `event`.
    fn supports(&self, event: &Event) -> bool;

    /// Renders the body, restricted to the `fields` selector (may be empty).
    async fn render(&self, event: &Event, fields: &str) -> Result<String, ProducerError>;
}

/// Reads an object description (JSON) from the host.
#[async_trait]
pub trait ObjectFetcher: Send + Sync + 'static {
    async fn fetch(&self, path: &str, fields: &str) -> Result<String, ProducerError>;
}

/// Producer backed by the host REST API.
pub struct RestEnvelopeProducer<F> {
    fetcher: F,
}

impl<F: ObjectFetcher> RestEnvelopeProducer<F> {
    pub fn new(fetcher: F) -> Self {
        Self { fetcher }
    }

    /// REST path describing the event's object, if the event is supported.
    pub fn rest_path(event: &Event) -> Option<String> {
        let kind = event.kind();
        let prefix = match kind {
            _ if kind.is_agent() => "/app/rest/agents/id:",
            EventType::BuildStarted
            | EventType::BuildFinished
            | EventType::BuildInterrupted
            | EventType::ChangesLoaded => "/app/rest/builds/promotionId:",
            _ => return None,
        };
        Some(format!("{prefix}{}", event.object_id()))
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Envelope<'a> {
    event_type: &'a str,
    payload: &'a RawValue,
}

#[async_trait]
impl<F: ObjectFetcher> PayloadProducer for RestEnvelopeProducer<F> {
    fn supports(&self, event: &Event) -> bool {
        Self::rest_path(event).is_some()
    }

    async fn render(&self, event: &Event, fields: &str) -> Result<String, ProducerError> {
        let path = Self::rest_path(event).ok_or(ProducerError::Unsupported(event.kind()))?;
        let body = self.fetcher.fetch(&path, fields).await?;
        let payload = RawValue::from_string(body).map_err(ProducerError::InvalidPayload)?;

        serde_json::to_string(&Envelope {
            event_type: event.kind().as_str(),
            payload: &payload,
        })
        .map_err(ProducerError::InvalidPayload)
    }
}
