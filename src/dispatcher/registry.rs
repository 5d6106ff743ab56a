use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::error;

use crate::error::SubscribeError;
use crate::events::EventType;

use super::listener::Listener;

/// Event type → listeners, in subscription order.
///
/// Guarded by its own lock, never held while the executor lock is taken.
pub(super) struct Registry {
    by_type: RwLock<HashMap<EventType, Vec<Arc<dyn Listener>>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            by_type: RwLock::new(HashMap::new()),
        }
    }

    pub fn subscribe(&self, kind: EventType, listener: Arc<dyn Listener>) -> Result<(), SubscribeError> {
        let mut map = self.by_type.write().unwrap_or_else(PoisonError::into_inner);
        insert(&mut map, kind, listener)
    }

    /// Subscribes to every type in `kinds` atomically with respect to other
    /// registry changes; collisions are logged and returned, the rest succeed.
    pub fn subscribe_all(&self, kinds: &[EventType], listener: Arc<dyn Listener>) -> Vec<SubscribeError> {
        let mut map = self.by_type.write().unwrap_or_else(PoisonError::into_inner);
        let mut errors = Vec::new();
        for &kind in kinds {
            if let Err(e) = insert(&mut map, kind, Arc::clone(&listener)) {
                error!(label = e.as_label(), error = %e, "subscribe failed");
                errors.push(e);
            }
        }
        errors
    }

    /// Removes `listener` (by identity) from every event type; returns how many
    /// registrations were dropped.
    pub fn unsubscribe<L: Listener + ?Sized>(&self, listener: &Arc<L>) -> usize {
        let target = Arc::as_ptr(listener).cast::<()>();
        let mut map = self.by_type.write().unwrap_or_else(PoisonError::into_inner);
        let mut removed = 0;
        for list in map.values_mut() {
            let before = list.len();
            list.retain(|l| Arc::as_ptr(l).cast::<()>() != target);
            removed += before - list.len();
        }
        map.retain(|_, list| !list.is_empty());
        removed
    }

    /// Snapshot of the listeners for `kind`.
    pub fn listeners(&self, kind: EventType) -> Vec<Arc<dyn Listener>> {
        let map = self.by_type.read().unwrap_or_else(PoisonError::into_inner);
        map.get(&kind).cloned().unwrap_or_default()
    }

    pub fn find(&self, kind: EventType, name: &str) -> Option<Arc<dyn Listener>> {
        let map = self.by_type.read().unwrap_or_else(PoisonError::into_inner);
        map.get(&kind)?.iter().find(|l| l.name() == name).cloned()
    }
}

fn insert(
    map: &mut HashMap<EventType, Vec<Arc<dyn Listener>>>,
    kind: EventType,
    listener: Arc<dyn Listener>,
) -> Result<(), SubscribeError> {
    let list = map.entry(kind).or_default();
    if list.iter().any(|l| l.name() == listener.name()) {
        return Err(SubscribeError::NameCollision {
            listener: listener.name().to_string(),
            event_type: kind.as_str().to_string(),
        });
    }
    list.push(listener);
    Ok(())
}
