//! # Webhook delivery agent.
//!
//! [`WebhookListener`] is a [`Listener`](crate::Listener) that posts events to a
//! per-project HTTP endpoint.
//!
//! ## Flow
//! ```text
//! handle(event)
//!   ├─► ConfigResolver.resolve(project | root)     ── unknown → PROJECT_NOT_FOUND
//!   ├─► disabled / type not subscribed ─────────────► skip
//!   ├─► url missing ────────────────────────────────► WEBHOOKS_URL_IS_NOT_DEFINED
//!   ├─► producer.supports(event)? no ───────────────► warn "Unsupported event type"
//!   ├─► producer.render(event, fields)
//!   └─► send_with_retry(1 + retry_count attempts, no delay)
//!          ├─ ok     → ProblemLog.clear(project)
//!          └─ error  → ProblemLog.report(project, code, message)
//!                        first / changed code → warn!, repeat → debug!
//! ```
//!
//! ## Collaborators
//! - [`ConfigResolver`]: per-project settings ([`ProjectParameters`] ships in-crate).
//! - [`PayloadProducer`]: JSON body ([`RestEnvelopeProducer`] over an [`ObjectFetcher`]).
//! - [`Transport`]: one POST attempt ([`HttpTransport`] with feature `http`).

mod agent;
mod config;
mod error;
mod producer;
mod suppress;
mod transport;

pub use agent::{Delivery, KeyScope, WebhookListener};
pub use config::{ConfigResolver, Credentials, ProjectParameters, WebhookSettings};
pub use error::{ConfigError, DeliveryError, ProducerError, TransportError};
pub use producer::{ObjectFetcher, PayloadProducer, RestEnvelopeProducer};
pub use suppress::{ProblemLog, Severity};
#[cfg(feature = "http")]
pub use transport::HttpTransport;
pub use transport::{Transport, WebhookRequest};

/// Parameter keys read by [`ProjectParameters`].
pub mod keys {
    pub use super::config::{ENABLE, EVENTS, PASSWORD, RETRY_COUNT, URL, USERNAME, fields_key};
}
