//! Config service facade
//!
//! `NacosConfigService` composes auth, the API client, local failover and
//! snapshot files, and the subscription machinery behind the public API.

pub mod cache;
pub mod listener;
mod worker;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::warn;

use self::cache::{CacheData, SubscriptionCache};
use self::listener::{
    AsyncConfigChangeListener, ConfigChangeListener, ListenerAdapter, ListenerHandle,
};
use self::worker::ConfigListenWorker;
use crate::api::ConfigApiClient;
use crate::auth::AuthPlugin;
use crate::client_config::ClientConfig;
use crate::error::{ConfigError, Result};
use crate::http::HttpTransport;
use crate::local_config::LocalConfigInfoProcessor;
use crate::model::{ConfigKey, DEFAULT_GROUP};
use crate::server_list::ServerListManager;

/// Nacos config service over the HTTP open API.
///
/// Reads resolve in three tiers: an operator-placed failover file wins, then
/// the server, then the last snapshot when the server is unreachable.
pub struct NacosConfigService {
    config: ClientConfig,
    auth: AuthPlugin,
    api: Arc<ConfigApiClient>,
    local: Arc<LocalConfigInfoProcessor>,
    cache: Arc<SubscriptionCache>,
    worker: ConfigListenWorker,
    worker_started: AtomicBool,
}

impl NacosConfigService {
    /// Build the service and perform the initial login when credentials are
    /// configured.
    pub async fn new(config: ClientConfig) -> Result<Self> {
        config.validate()?;

        let servers = Arc::new(ServerListManager::new(&config.server_addrs)?);
        let auth = AuthPlugin::from_config(&config, servers.all_servers());
        auth.initialize().await;

        let transport = HttpTransport::new(
            servers,
            &config.context_path,
            config.max_retry,
            config.retry_delay_ms,
        )?;
        let api = Arc::new(ConfigApiClient::new(
            transport,
            auth.clone(),
            &config.namespace,
        ));
        let local = Arc::new(LocalConfigInfoProcessor::new(
            config.snapshot_path.clone(),
            config.enable_snapshot,
        ));
        let cache = Arc::new(SubscriptionCache::new());
        let worker = ConfigListenWorker::new(api.clone(), local.clone(), cache.clone(), &config);

        Ok(Self {
            config,
            auth,
            api,
            local,
            cache,
            worker,
            worker_started: AtomicBool::new(false),
        })
    }

    /// Get a config value. `Ok(None)` means the config does not exist.
    pub async fn get_config(&self, data_id: &str, group: &str) -> Result<Option<String>> {
        let key = self.build_key(data_id, group)?;

        if let Some(failover) = self.local.get_failover(&key) {
            if !failover.is_empty() {
                warn!(key = %key, "serving failover config, server value ignored");
                return Ok(Some(failover.content));
            }
        }

        match self
            .api
            .get_config(&key, self.config.default_timeout_ms)
            .await
        {
            Ok(Some(data)) => {
                self.local.save_snapshot(&key, Some(&data.content));
                Ok(Some(data.content))
            }
            Ok(None) => {
                self.local.save_snapshot(&key, None);
                Ok(None)
            }
            // only transport failures fall back to the snapshot; the server
            // answering 403 or another error is authoritative
            Err(e @ ConfigError::Http(_)) => match self.local.get_snapshot(&key) {
                Some(snapshot) => {
                    warn!(key = %key, error = %e, "serving snapshot after remote failure");
                    if snapshot.is_empty() {
                        Ok(None)
                    } else {
                        Ok(Some(snapshot.content))
                    }
                }
                None => Err(e),
            },
            Err(e) => Err(e),
        }
    }

    /// Publish (create or update) a config with content type `text`.
    pub async fn publish_config(&self, data_id: &str, group: &str, content: &str) -> Result<bool> {
        self.publish_config_with_type(data_id, group, content, "text")
            .await
    }

    /// Publish a config with an explicit content type.
    pub async fn publish_config_with_type(
        &self,
        data_id: &str,
        group: &str,
        content: &str,
        content_type: &str,
    ) -> Result<bool> {
        let key = self.build_key(data_id, group)?;
        if content.is_empty() {
            return Err(ConfigError::Validation(
                "content must not be empty".to_string(),
            ));
        }

        let published = self
            .api
            .publish_config(&key, content, content_type, self.config.default_timeout_ms)
            .await?;
        if published {
            self.local.save_snapshot(&key, Some(content));
        }
        Ok(published)
    }

    /// Remove a config from the server.
    ///
    /// The snapshot is overwritten with the empty string so a later read
    /// does not resurrect the removed value.
    pub async fn remove_config(&self, data_id: &str, group: &str) -> Result<bool> {
        let key = self.build_key(data_id, group)?;

        let removed = self
            .api
            .remove_config(&key, self.config.default_timeout_ms)
            .await?;
        if removed {
            self.local.save_snapshot(&key, Some(""));
        }
        Ok(removed)
    }

    /// Subscribe to changes of a config.
    ///
    /// The returned handle removes the listener when dropped. Registering
    /// the same listener object twice yields a single registration.
    pub async fn subscribe(
        &self,
        data_id: &str,
        group: &str,
        listener: Arc<dyn ConfigChangeListener>,
    ) -> Result<ListenerHandle> {
        self.subscribe_inner(data_id, group, ListenerAdapter::from_sync(listener))
            .await
    }

    /// Subscribe with an asynchronous listener.
    pub async fn subscribe_async(
        &self,
        data_id: &str,
        group: &str,
        listener: Arc<dyn AsyncConfigChangeListener>,
    ) -> Result<ListenerHandle> {
        self.subscribe_inner(data_id, group, ListenerAdapter::from_async(listener))
            .await
    }

    async fn subscribe_inner(
        &self,
        data_id: &str,
        group: &str,
        adapter: ListenerAdapter,
    ) -> Result<ListenerHandle> {
        let key = self.build_key(data_id, group)?;
        self.ensure_worker();

        let cache_key = key.to_string();
        let (entry, created) = match self.cache.get(&cache_key) {
            Some(existing) => (existing.value().clone(), false),
            None => {
                let entry = self
                    .cache
                    .entry(cache_key.clone())
                    .or_insert_with(|| Arc::new(CacheData::new(key.clone())));
                (entry.value().clone(), true)
            }
        };

        // seed the entry so the first change event carries a real old value
        if created {
            match self
                .api
                .get_config(&key, self.config.default_timeout_ms)
                .await
            {
                Ok(Some(data)) => entry.seed_content(&data.content, &data.content_type),
                Ok(None) => {}
                Err(e) => warn!(key = %key, error = %e, "initial fetch for subscription failed"),
            }
        }

        let listener_id = adapter.id();
        adapter_register(&entry, adapter);
        Ok(ListenerHandle::new(
            self.cache.clone(),
            cache_key,
            listener_id,
        ))
    }

    /// Stop background workers and the auth refresh task.
    pub async fn shutdown(&self) {
        self.worker.stop().await;
        self.auth.stop();
        self.worker_started.store(false, Ordering::SeqCst);
    }

    fn ensure_worker(&self) {
        if !self.worker_started.swap(true, Ordering::SeqCst) {
            self.worker.start();
        }
    }

    fn build_key(&self, data_id: &str, group: &str) -> Result<ConfigKey> {
        let group = if group.trim().is_empty() {
            DEFAULT_GROUP
        } else {
            group
        };
        ConfigKey::new(data_id, group, &self.config.namespace)
    }
}

fn adapter_register(entry: &Arc<CacheData>, adapter: ListenerAdapter) {
    if !entry.add_listener(Arc::new(adapter)) {
        warn!(key = %entry.key(), "listener already registered, ignoring duplicate");
    }
}
