//! Per-config cache entries and the listener fan-out

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use tracing::warn;

use super::listener::ListenerAdapter;
use crate::model::{compute_md5, ConfigChangeEvent, ConfigKey};

/// How long a single listener may run before the fan-out stops waiting on it.
const LISTENER_TIMEOUT: Duration = Duration::from_secs(30);

/// Map of cache key (`dataId+group[+tenant]`) to entry.
pub(crate) type SubscriptionCache = DashMap<String, Arc<CacheData>>;

struct CacheState {
    content: String,
    md5: String,
    content_type: String,
    listeners: Vec<Arc<ListenerAdapter>>,
}

/// Cache entry for a single config item, tracking content, MD5, and
/// listeners.
///
/// The lock is held only to swap content and snapshot the listener list;
/// listener bodies always run outside it.
pub(crate) struct CacheData {
    key: ConfigKey,
    state: Mutex<CacheState>,
}

impl CacheData {
    pub(crate) fn new(key: ConfigKey) -> Self {
        Self {
            key,
            state: Mutex::new(CacheState {
                content: String::new(),
                md5: String::new(),
                content_type: "text".to_string(),
                listeners: Vec::new(),
            }),
        }
    }

    pub(crate) fn key(&self) -> &ConfigKey {
        &self.key
    }

    /// Register a listener. Duplicate registration of the same callback
    /// identity is a no-op; returns whether the listener was inserted.
    pub(crate) fn add_listener(&self, adapter: Arc<ListenerAdapter>) -> bool {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.listeners.iter().any(|l| l.id() == adapter.id()) {
            return false;
        }
        state.listeners.push(adapter);
        true
    }

    /// Remove a listener by identity; returns the remaining listener count.
    pub(crate) fn remove_listener(&self, id: u64) -> usize {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.listeners.retain(|l| l.id() != id);
        state.listeners.len()
    }

    pub(crate) fn has_listeners(&self) -> bool {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        !state.listeners.is_empty()
    }

    /// Key and current MD5, as sent in the probe request.
    pub(crate) fn listen_item(&self) -> (ConfigKey, String) {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        (self.key.clone(), state.md5.clone())
    }

    /// Set initial content without notifying anyone. Only effective while
    /// the entry has never seen content, so a concurrent server update wins.
    pub(crate) fn seed_content(&self, content: &str, content_type: &str) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if !state.md5.is_empty() {
            return;
        }
        state.md5 = compute_md5(content);
        state.content = content.to_string();
        state.content_type = content_type.to_string();
    }

    /// Apply a server-side update.
    ///
    /// When the MD5 actually changed, the content is swapped and the
    /// listener list snapshotted under the same lock; the caller fans out
    /// after the lock is released. `None` means no change.
    pub(crate) fn update_content(
        &self,
        content: &str,
        content_type: &str,
    ) -> Option<(ConfigChangeEvent, Vec<Arc<ListenerAdapter>>)> {
        let new_md5 = compute_md5(content);
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if new_md5 == state.md5 {
            return None;
        }
        let old_content = std::mem::replace(&mut state.content, content.to_string());
        state.md5 = new_md5;
        state.content_type = content_type.to_string();
        let listeners = state.listeners.clone();
        drop(state);

        let event = ConfigChangeEvent {
            key: self.key.clone(),
            content: content.to_string(),
            old_content,
            content_type: content_type.to_string(),
            timestamp: Utc::now(),
        };
        Some((event, listeners))
    }
}

/// Fan the event out to a listener snapshot.
///
/// Each listener runs in its own task: a panic, an error, or an overrun of
/// the per-listener timeout is logged and never touches its siblings. An
/// overrunning listener keeps running; the fan-out just stops waiting.
pub(crate) fn notify_listeners(event: ConfigChangeEvent, listeners: Vec<Arc<ListenerAdapter>>) {
    for adapter in listeners {
        let event = event.clone();
        let key = event.key.clone();
        let future = adapter.invoke(event);
        tokio::spawn(async move {
            let mut task = tokio::spawn(future);
            match tokio::time::timeout(LISTENER_TIMEOUT, &mut task).await {
                Err(_) => {
                    warn!(key = %key, "listener exceeded {}s, abandoning wait", LISTENER_TIMEOUT.as_secs());
                }
                Ok(Err(join_err)) if join_err.is_panic() => {
                    warn!(key = %key, "listener panicked");
                }
                Ok(Err(_)) => {}
                Ok(Ok(Err(e))) => {
                    warn!(key = %key, error = %e, "listener failed");
                }
                Ok(Ok(Ok(()))) => {}
            }
        });
    }
}
