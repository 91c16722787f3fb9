//! Config change listener traits and subscription handle

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::future::BoxFuture;

use super::cache::SubscriptionCache;
pub use crate::model::ConfigChangeEvent;

/// Trait for receiving config change notifications.
///
/// Implement this trait to be notified when a config value changes on the
/// server.
pub trait ConfigChangeListener: Send + Sync + 'static {
    /// Called when the config content has changed.
    fn receive_config_info(&self, event: ConfigChangeEvent);
}

/// Asynchronous variant whose completion (or failure) the fan-out observes.
pub trait AsyncConfigChangeListener: Send + Sync + 'static {
    fn receive_config_info(&self, event: ConfigChangeEvent)
        -> BoxFuture<'static, anyhow::Result<()>>;
}

/// A simple listener that invokes a closure.
pub struct FnConfigChangeListener<F>
where
    F: Fn(ConfigChangeEvent) + Send + Sync + 'static,
{
    f: F,
}

impl<F> FnConfigChangeListener<F>
where
    F: Fn(ConfigChangeEvent) + Send + Sync + 'static,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F> ConfigChangeListener for FnConfigChangeListener<F>
where
    F: Fn(ConfigChangeEvent) + Send + Sync + 'static,
{
    fn receive_config_info(&self, event: ConfigChangeEvent) {
        (self.f)(event);
    }
}

/// Uniform internal listener shape.
///
/// Synchronous listeners are wrapped into the asynchronous form so a single
/// list serves both; the identity of the original callback object survives
/// for removal and duplicate detection.
pub(crate) struct ListenerAdapter {
    id: u64,
    kind: ListenerKind,
}

enum ListenerKind {
    Sync(Arc<dyn ConfigChangeListener>),
    Async(Arc<dyn AsyncConfigChangeListener>),
}

impl ListenerAdapter {
    pub(crate) fn from_sync(listener: Arc<dyn ConfigChangeListener>) -> Self {
        let id = Arc::as_ptr(&listener) as *const () as usize as u64;
        Self {
            id,
            kind: ListenerKind::Sync(listener),
        }
    }

    pub(crate) fn from_async(listener: Arc<dyn AsyncConfigChangeListener>) -> Self {
        let id = Arc::as_ptr(&listener) as *const () as usize as u64;
        Self {
            id,
            kind: ListenerKind::Async(listener),
        }
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    /// Build the notification future. The future owns its listener, so it
    /// outlives the adapter borrow.
    pub(crate) fn invoke(&self, event: ConfigChangeEvent) -> BoxFuture<'static, anyhow::Result<()>> {
        match &self.kind {
            ListenerKind::Sync(listener) => {
                let listener = listener.clone();
                Box::pin(async move {
                    listener.receive_config_info(event);
                    Ok(())
                })
            }
            ListenerKind::Async(listener) => listener.receive_config_info(event),
        }
    }
}

/// Live subscription. Dropping (or calling [`unsubscribe`]) removes the
/// listener; the cache entry is evicted once its last listener leaves.
///
/// [`unsubscribe`]: ListenerHandle::unsubscribe
pub struct ListenerHandle {
    cache: Arc<SubscriptionCache>,
    cache_key: String,
    listener_id: u64,
    released: AtomicBool,
}

impl ListenerHandle {
    pub(crate) fn new(cache: Arc<SubscriptionCache>, cache_key: String, listener_id: u64) -> Self {
        Self {
            cache,
            cache_key,
            listener_id,
            released: AtomicBool::new(false),
        }
    }

    /// Remove the listener. Idempotent.
    pub fn unsubscribe(&self) {
        if self.released.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(entry) = self.cache.get(&self.cache_key) {
            let entry = entry.value().clone();
            entry.remove_listener(self.listener_id);
        }
        self.cache
            .remove_if(&self.cache_key, |_, entry| !entry.has_listeners());
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::atomic::AtomicBool;

    use crate::model::ConfigKey;

    fn event() -> ConfigChangeEvent {
        ConfigChangeEvent {
            key: ConfigKey::new("test-id", "DEFAULT_GROUP", "").unwrap(),
            content: "new".to_string(),
            old_content: "old".to_string(),
            content_type: "text".to_string(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_fn_listener() {
        let called = Arc::new(AtomicBool::new(false));
        let called_clone = called.clone();

        let listener = FnConfigChangeListener::new(move |event: ConfigChangeEvent| {
            assert_eq!(event.key.data_id, "test-id");
            assert_eq!(event.content, "new");
            called_clone.store(true, Ordering::SeqCst);
        });

        listener.receive_config_info(event());
        assert!(called.load(Ordering::SeqCst));
    }

    #[test]
    fn test_adapter_identity_tracks_object() {
        let listener: Arc<dyn ConfigChangeListener> =
            Arc::new(FnConfigChangeListener::new(|_| {}));

        let a = ListenerAdapter::from_sync(listener.clone());
        let b = ListenerAdapter::from_sync(listener);
        assert_eq!(a.id(), b.id());

        let other: Arc<dyn ConfigChangeListener> =
            Arc::new(FnConfigChangeListener::new(|_| {}));
        let c = ListenerAdapter::from_sync(other);
        assert_ne!(a.id(), c.id());
    }

    #[tokio::test]
    async fn test_sync_adapter_invokes() {
        let called = Arc::new(AtomicBool::new(false));
        let called_clone = called.clone();
        let listener: Arc<dyn ConfigChangeListener> =
            Arc::new(FnConfigChangeListener::new(move |_| {
                called_clone.store(true, Ordering::SeqCst);
            }));

        let adapter = ListenerAdapter::from_sync(listener);
        adapter.invoke(event()).await.unwrap();
        assert!(called.load(Ordering::SeqCst));
    }
}
