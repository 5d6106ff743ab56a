//! Delivery errors and their problem codes.
//!
//! Each error maps to a problem code via `problem_code()`. Two consecutive
//! failures with equal codes for the same project are "the same problem" and
//! only the first one is logged at warn level.

use thiserror::Error;

use crate::events::EventType;

/// Failure of a single HTTP attempt.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Endpoint answered with a non-success status.
    #[error("HTTP code: {status} {message}")]
    Status { status: u16, message: String },

    #[error("request timed out: {message}")]
    Timeout { message: String },

    #[error("connection failed: {message}")]
    Connect { message: String },

    /// Any other client-side failure.
    #[error("request failed: {message}")]
    Request { message: String },

    /// URL cannot be parsed; never retried.
    #[error("wrong URL syntax: {message}")]
    InvalidUrl { message: String },
}

impl TransportError {
    pub fn problem_code(&self) -> String {
        match self {
            TransportError::Status { status, .. } => status.to_string(),
            TransportError::Timeout { .. } => "timeout".into(),
            TransportError::Connect { .. } => "connect".into(),
            TransportError::Request { .. } => "request".into(),
            TransportError::InvalidUrl { .. } => "INVALID_URL".into(),
        }
    }

    /// False for errors another attempt cannot fix.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, TransportError::InvalidUrl { .. })
    }
}

/// Per-project configuration could not be resolved.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("related project not found: {project_id}")]
    ProjectNotFound { project_id: String },
}

/// Payload could not be produced.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ProducerError {
    #[error("event {0} is not supported")]
    Unsupported(EventType),

    /// Fetching the object description failed.
    #[error("failed to fetch {path}: {message}")]
    Fetch { path: String, message: String },

    /// Fetched description is not valid JSON.
    #[error("fetched payload is not valid JSON: {0}")]
    InvalidPayload(#[source] serde_json::Error),
}

/// # Errors of one webhook delivery.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum DeliveryError {
    #[error("webhooks url is not defined for project {project}")]
    UrlNotDefined { project: String },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to render payload: {0}")]
    Render(#[from] ProducerError),

    /// Last attempt failed (retries exhausted or not retryable).
    #[error("sending webhook to {url} failed: {source}")]
    Send {
        url: String,
        #[source]
        source: TransportError,
    },
}

impl DeliveryError {
    /// Code used to recognize repeats of the same problem.
    pub fn problem_code(&self) -> String {
        match self {
            DeliveryError::UrlNotDefined { .. } => "WEBHOOKS_URL_IS_NOT_DEFINED".into(),
            DeliveryError::Config(ConfigError::ProjectNotFound { .. }) => "PROJECT_NOT_FOUND".into(),
            DeliveryError::Render(_) => "RENDER_FAILED".into(),
            DeliveryError::Send { source, .. } => source.problem_code(),
        }
    }

    pub fn as_label(&self) -> &'static str {
        match self {
            DeliveryError::UrlNotDefined { .. } => "delivery_url_not_defined",
            DeliveryError::Config(_) => "delivery_config",
            DeliveryError::Render(_) => "delivery_render",
            DeliveryError::Send { .. } => "delivery_send",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_problem_codes() {
        let status = DeliveryError::Send {
            url: "http://hook".into(),
            source: TransportError::Status {
                status: 503,
                message: "Service Unavailable".into(),
            },
        };
        assert_eq!(status.problem_code(), "503");

        let missing = DeliveryError::from(ConfigError::ProjectNotFound {
            project_id: "P".into(),
        });
        assert_eq!(missing.problem_code(), "PROJECT_NOT_FOUND");

        let url = DeliveryError::UrlNotDefined { project: "P".into() };
        assert_eq!(url.problem_code(), "WEBHOOKS_URL_IS_NOT_DEFINED");

        let render = DeliveryError::from(ProducerError::Unsupported(EventType::AgentRemoved));
        assert_eq!(render.problem_code(), "RENDER_FAILED");
    }

    #[test]
    fn test_only_invalid_url_is_final() {
        assert!(!TransportError::InvalidUrl { message: "x".into() }.is_retryable());
        assert!(TransportError::Timeout { message: "x".into() }.is_retryable());
        assert!(TransportError::Status { status: 404, message: String::new() }.is_retryable());
    }
}
