//! # Per-project webhook settings.
//!
//! Settings are resolved for the project an event belongs to; events without a
//! project resolve against the root project.
//!
//! ## Parameters
//! | key                          | meaning                                   |
//! |------------------------------|-------------------------------------------|
//! | `webhooks.enable`            | `true` to deliver anything at all         |
//! | `webhooks.events`            | `;`-separated event type names            |
//! | `webhooks.url`               | endpoint; empty → `WEBHOOKS_URL_IS_NOT_DEFINED` |
//! | `webhooks.username`          | basic auth user (needs a password too)    |
//! | `webhooks.password`          | basic auth password                       |
//! | `webhooks.retry_count`       | extra attempts; not a number → 0          |
//! | `webhooks.<EVENT>.fields`    | field selector handed to the producer     |
//!
//! [`ProjectParameters`] looks a key up in the project itself, then in its
//! ancestors, then in the root project.

use std::collections::{HashMap, HashSet};
use std::fmt;

use tracing::{debug, warn};

use crate::dispatcher::ROOT_PROJECT;
use crate::events::EventType;

use super::error::ConfigError;

pub const ENABLE: &str = "webhooks.enable";
pub const EVENTS: &str = "webhooks.events";
pub const URL: &str = "webhooks.url";
pub const USERNAME: &str = "webhooks.username";
pub const PASSWORD: &str = "webhooks.password";
pub const RETRY_COUNT: &str = "webhooks.retry_count";

/// Key of the field selector for `kind`.
pub fn fields_key(kind: EventType) -> String {
    format!("webhooks.{kind}.fields")
}

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// Effective settings of one project.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WebhookSettings {
    /// Project id, or `<Root Project>`.
    pub project: String,
    pub enabled: bool,
    pub events: HashSet<EventType>,
    pub url: Option<String>,
    pub credentials: Option<Credentials>,
    pub retry_count: u32,
    pub fields: HashMap<EventType, String>,
}

impl WebhookSettings {
    /// True if webhooks are enabled and `kind` is subscribed.
    pub fn accepts(&self, kind: EventType) -> bool {
        self.enabled && self.events.contains(&kind)
    }

    /// Field selector for `kind`; empty when not configured.
    pub fn fields_for(&self, kind: EventType) -> &str {
        self.fields.get(&kind).map(String::as_str).unwrap_or("")
    }
}

/// Source of per-project webhook settings.
pub trait ConfigResolver: Send + Sync + 'static {
    /// Resolves settings for `project_id` (`None` → root project).
    ///
    /// # Errors
    /// [`ConfigError::ProjectNotFound`] when the project is unknown.
    fn resolve(&self, project_id: Option<&str>) -> Result<WebhookSettings, ConfigError>;
}

#[derive(Debug, Clone, Default)]
struct ProjectNode {
    parent: Option<String>,
    params: HashMap<String, String>,
}

/// In-memory parameter tree with inheritance.
///
/// ## Example
/// ```rust
/// use eventvisor::delivery::{ConfigResolver, ProjectParameters};
/// use eventvisor::EventType;
///
/// let mut params = ProjectParameters::new();
/// params
///     .set_root("webhooks.url", "https://hooks.example.com")
///     .add_project("Backend", None)
///     .set("Backend", "webhooks.enable", "true")
///     .set("Backend", "webhooks.events", "BUILD_STARTED;BUILD_FINISHED");
///
/// let settings = params.resolve(Some("Backend")).unwrap();
/// assert!(settings.accepts(EventType::BuildStarted));
/// assert_eq!(settings.url.as_deref(), Some("https://hooks.example.com"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct ProjectParameters {
    root: HashMap<String, String>,
    projects: HashMap<String, ProjectNode>,
}

impl ProjectParameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_root(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.root.insert(key.into(), value.into());
        self
    }

    /// Declares a project; `parent = None` attaches it to the root.
    pub fn add_project(&mut self, id: impl Into<String>, parent: Option<&str>) -> &mut Self {
        let node = self.projects.entry(id.into()).or_default();
        node.parent = parent.map(str::to_string);
        self
    }

    /// Sets a parameter on `project_id`, declaring the project if needed.
    pub fn set(
        &mut self,
        project_id: &str,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> &mut Self {
        self.projects
            .entry(project_id.to_string())
            .or_default()
            .params
            .insert(key.into(), value.into());
        self
    }

    pub fn remove_project(&mut self, id: &str) -> &mut Self {
        self.projects.remove(id);
        self
    }

    /// Looks `key` up along the inheritance chain of `project_id`.
    pub fn get(&self, project_id: Option<&str>, key: &str) -> Result<Option<&str>, ConfigError> {
        let Some(mut id) = project_id else {
            return Ok(self.root.get(key).map(String::as_str));
        };
        if !self.projects.contains_key(id) {
            return Err(ConfigError::ProjectNotFound {
                project_id: id.to_string(),
            });
        }

        // Bounded walk: a parent cycle ends at the root.
        for _ in 0..=self.projects.len() {
            let Some(node) = self.projects.get(id) else { break };
            if let Some(v) = node.params.get(key) {
                return Ok(Some(v));
            }
            match node.parent.as_deref() {
                Some(parent) => id = parent,
                None => break,
            }
        }
        Ok(self.root.get(key).map(String::as_str))
    }
}

impl ConfigResolver for ProjectParameters {
    fn resolve(&self, project_id: Option<&str>) -> Result<WebhookSettings, ConfigError> {
        let project = project_id.unwrap_or(ROOT_PROJECT).to_string();
        let get = |key: &str| self.get(project_id, key);

        let enabled = get(ENABLE)?.is_some_and(|v| v.trim().eq_ignore_ascii_case("true"));

        let mut events = HashSet::new();
        for name in get(EVENTS)?.unwrap_or("").split(';').map(str::trim) {
            if name.is_empty() {
                continue;
            }
            match name.parse::<EventType>() {
                Ok(kind) => {
                    events.insert(kind);
                }
                Err(e) => debug!(project = %project, error = %e, "ignoring unknown webhook event name"),
            }
        }

        let url = get(URL)?.filter(|u| !u.is_empty()).map(str::to_string);

        let credentials = match (get(USERNAME)?, get(PASSWORD)?) {
            (Some(user), Some(password)) if !user.is_empty() => Some(Credentials {
                username: user.to_string(),
                password: password.to_string(),
            }),
            _ => None,
        };

        let retry_count = match get(RETRY_COUNT)? {
            None => 0,
            Some(raw) => raw.trim().parse::<u32>().unwrap_or_else(|_| {
                warn!(
                    project = %project,
                    value = raw,
                    "Project {project} parameter {RETRY_COUNT} is not a number. Default value 0 will be used."
                );
                0
            }),
        };

        let mut fields = HashMap::new();
        for kind in EventType::ALL {
            if let Some(sel) = get(fields_key(kind).as_str())? {
                fields.insert(kind, sel.to_string());
            }
        }

        Ok(WebhookSettings {
            project,
            enabled,
            events,
            url,
            credentials,
            retry_count,
            fields,
        })
    }
}
