//! # Durable snapshot of work accepted but not executed.
//!
//! ## Format (version 1)
//! ```text
//! {
//!   "version": 1,
//!   "tasks": [
//!     {"listenerName": "webhooks", "event": {"type": "BUILD_STARTED", "objectId": 42, "projectId": null}}
//!   ]
//! }
//! ```
//!
//! ## Rules
//! - Every save is a full snapshot: write `<file>.tmp`, then rename over the target.
//! - Parent directories are created on demand.
//! - A missing file loads as `None`; a file with another version is rejected.

use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::PersistError;
use crate::events::Event;

use super::listener::HandlingTask;

/// Schema version written by this build.
pub const VERSION: u32 = 1;

/// One persisted handling task: which listener, which event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskInfo {
    pub listener_name: String,
    pub event: Event,
}

impl From<&HandlingTask> for TaskInfo {
    fn from(task: &HandlingTask) -> Self {
        Self {
            listener_name: task.listener_name().to_string(),
            event: task.event().clone(),
        }
    }
}

#[derive(Serialize, Deserialize)]
struct UnprocessedFile {
    version: u32,
    tasks: Vec<TaskInfo>,
}

pub fn encode(tasks: &[TaskInfo]) -> Result<Vec<u8>, PersistError> {
    #[derive(Serialize)]
    struct Out<'a> {
        version: u32,
        tasks: &'a [TaskInfo],
    }
    serde_json::to_vec_pretty(&Out {
        version: VERSION,
        tasks,
    })
    .map_err(PersistError::Encode)
}

pub fn decode(bytes: &[u8]) -> Result<Vec<TaskInfo>, PersistError> {
    let file: UnprocessedFile = serde_json::from_slice(bytes).map_err(PersistError::Decode)?;
    if file.version != VERSION {
        return Err(PersistError::UnsupportedVersion {
            found: file.version,
            expected: VERSION,
        });
    }
    Ok(file.tasks)
}

/// File-backed store; saves and loads are serialized against each other.
pub struct UnprocessedStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl UnprocessedStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replaces the file content with `tasks` (an empty list included).
    pub async fn save(&self, tasks: &[TaskInfo]) -> Result<(), PersistError> {
        let bytes = encode(tasks)?;
        let _guard = self.lock.lock().await;

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| io_err(parent, e))?;
        }

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        tokio::fs::write(&tmp, &bytes)
            .await
            .map_err(|e| io_err(&tmp, e))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| io_err(&self.path, e))?;
        Ok(())
    }

    /// Reads the snapshot; `Ok(None)` when no file exists yet.
    pub async fn load(&self) -> Result<Option<Vec<TaskInfo>>, PersistError> {
        let _guard = self.lock.lock().await;
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => decode(&bytes).map(Some),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_err(&self.path, e)),
        }
    }
}

fn io_err(path: &Path, source: io::Error) -> PersistError {
    PersistError::Io {
        path: path.display().to_string(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventType;

    fn sample() -> Vec<TaskInfo> {
        vec![
            TaskInfo {
                listener_name: "webhooks".into(),
                event: Event::new(EventType::BuildStarted, 42).with_project("Backend"),
            },
            TaskInfo {
                listener_name: "webhooks".into(),
                event: Event::new(EventType::AgentRemoved, 7),
            },
        ]
    }

    #[test]
    fn test_decode_rejects_other_versions() {
        let err = decode(br#"{"version":2,"tasks":[]}"#).unwrap_err();
        assert!(matches!(
            err,
            PersistError::UnsupportedVersion {
                found: 2,
                expected: 1
            }
        ));
        assert_eq!(decode(b"not json").unwrap_err().as_label(), "persist_decode");
    }

    #[test]
    fn test_decode_reads_documented_layout() {
        let raw = br#"{"version":1,"tasks":[{"listenerName":"L","event":{"type":"CHANGES_LOADED","objectId":3,"projectId":null}}]}"#;
        let tasks = decode(raw).unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].listener_name, "L");
        assert_eq!(tasks[0].event, Event::new(EventType::ChangesLoaded, 3));
    }

    #[tokio::test]
    async fn test_store_creates_dirs_and_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let store = UnprocessedStore::new(dir.path().join("webhooks").join("unprocessed-events.json"));

        assert!(store.load().await.unwrap().is_none());

        store.save(&sample()).await.unwrap();
        assert_eq!(store.load().await.unwrap(), Some(sample()));

        store.save(&[]).await.unwrap();
        assert_eq!(store.load().await.unwrap(), Some(Vec::new()));
        assert!(!dir.path().join("webhooks/unprocessed-events.json.tmp").exists());
    }
}
