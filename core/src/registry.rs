//! Tag-keyed tracking of in-flight calls.
//!
//! # Design
//! `CallRegistry` is a concurrent multi-map from caller-chosen tag to the
//! handles currently in flight under it. Each map entry is locked
//! independently (`DashMap` shards), so calls under unrelated tags never
//! contend. A tag whose last handle leaves is removed from the map; there
//! are no empty entries.
//!
//! Membership is normally held through a `CallGuard`, which registers on
//! creation and deregisters on drop, so every exit path of a call releases
//! it.

use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::Lazy;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

static GLOBAL: Lazy<Arc<CallRegistry>> = Lazy::new(|| Arc::new(CallRegistry::new()));

/// Opaque reference to one submitted call.
///
/// Clones share the same cancellation state. Cancelling a call that already
/// finished is a no-op.
#[derive(Debug, Clone)]
pub struct CallHandle {
    id: Uuid,
    tag: String,
    token: CancellationToken,
}

impl CallHandle {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            tag: tag.into(),
            token: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub(crate) fn token(&self) -> &CancellationToken {
        &self.token
    }
}

#[derive(Debug, Default)]
pub struct CallRegistry {
    calls: DashMap<String, Vec<CallHandle>>,
}

impl CallRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide registry used by `Performer::new`.
    pub fn global() -> Arc<CallRegistry> {
        Arc::clone(&GLOBAL)
    }

    pub fn register(&self, tag: &str, handle: CallHandle) {
        tracing::trace!(target: "callway::registry", tag, id=%handle.id, "register");
        self.calls.entry(tag.to_string()).or_default().push(handle);
    }

    /// Removes `handle` from `tag`. Returns `false` if it was not present,
    /// e.g. because the tag was cancelled in the meantime.
    pub fn deregister(&self, tag: &str, handle: &CallHandle) -> bool {
        let removed = match self.calls.get_mut(tag) {
            Some(mut handles) => {
                let before = handles.len();
                handles.retain(|h| h.id != handle.id);
                handles.len() != before
            }
            None => false,
        };
        // Re-checked under the shard lock, so a concurrent register keeps the entry.
        self.calls.remove_if(tag, |_, handles| handles.is_empty());
        tracing::trace!(target: "callway::registry", tag, id=%handle.id, removed, "deregister");
        removed
    }

    /// Cancels and removes every handle under `tag`, returning how many there
    /// were. Unknown tags cancel nothing.
    pub fn cancel(&self, tag: &str) -> usize {
        match self.calls.remove(tag) {
            Some((_, handles)) => {
                for handle in &handles {
                    handle.cancel();
                }
                tracing::debug!(target: "callway::registry", tag, count = handles.len(), "cancelled tag");
                handles.len()
            }
            None => 0,
        }
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.calls.contains_key(tag)
    }

    /// Number of in-flight handles under `tag`.
    pub fn len(&self, tag: &str) -> usize {
        self.calls.get(tag).map_or(0, |handles| handles.len())
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    pub fn tags(&self) -> Vec<String> {
        self.calls.iter().map(|entry| entry.key().clone()).collect()
    }
}

/// Registry membership for the lifetime of one call.
pub(crate) struct CallGuard {
    registry: Arc<CallRegistry>,
    handle: CallHandle,
}

impl CallGuard {
    pub(crate) fn register(registry: &Arc<CallRegistry>, tag: &str) -> Self {
        let handle = CallHandle::new(tag);
        registry.register(tag, handle.clone());
        Self {
            registry: Arc::clone(registry),
            handle,
        }
    }

    pub(crate) fn handle(&self) -> &CallHandle {
        &self.handle
    }
}

impl Drop for CallGuard {
    fn drop(&mut self) {
        self.registry.deregister(&self.handle.tag, &self.handle);
    }
}
