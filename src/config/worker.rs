//! Long-polling worker: probes for changes and dispatches notifications

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use super::cache::{notify_listeners, SubscriptionCache};
use crate::api::ConfigApiClient;
use crate::client_config::ClientConfig;
use crate::local_config::LocalConfigInfoProcessor;
use crate::model::ConfigKey;

/// Pause after a successful probe round, yielding between long polls.
const PROBE_YIELD: Duration = Duration::from_millis(100);

/// Pause after a failed probe round before retrying.
const PROBE_ERROR_BACKOFF: Duration = Duration::from_secs(5);

struct WorkerState {
    running: bool,
    shutdown: Option<broadcast::Sender<()>>,
    handles: Vec<JoinHandle<()>>,
}

/// Runs the two background tasks behind subscriptions.
///
/// The prober drives the long-polling loop and feeds changed keys into an
/// unbounded queue; the dispatcher is the queue's single consumer, fetching
/// fresh content and fanning out per-entry. Per-key event order follows the
/// order the prober observed.
pub(crate) struct ConfigListenWorker {
    api: Arc<ConfigApiClient>,
    local: Arc<LocalConfigInfoProcessor>,
    cache: Arc<SubscriptionCache>,
    listen_interval: Duration,
    long_polling_timeout_ms: u64,
    default_timeout_ms: u64,
    state: Mutex<WorkerState>,
}

impl ConfigListenWorker {
    pub(crate) fn new(
        api: Arc<ConfigApiClient>,
        local: Arc<LocalConfigInfoProcessor>,
        cache: Arc<SubscriptionCache>,
        config: &ClientConfig,
    ) -> Self {
        Self {
            api,
            local,
            cache,
            listen_interval: Duration::from_millis(config.listen_interval_ms),
            long_polling_timeout_ms: config.long_polling_timeout_ms,
            default_timeout_ms: config.default_timeout_ms,
            state: Mutex::new(WorkerState {
                running: false,
                shutdown: None,
                handles: Vec::new(),
            }),
        }
    }

    /// Start the prober and dispatcher. Refuses while already running.
    pub(crate) fn start(&self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.running {
            warn!("config listen worker already running");
            return;
        }

        let (shutdown_tx, _) = broadcast::channel(1);
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();

        let prober = tokio::spawn(probe_loop(
            self.api.clone(),
            self.cache.clone(),
            queue_tx,
            self.listen_interval,
            self.long_polling_timeout_ms,
            shutdown_tx.subscribe(),
        ));
        let dispatcher = tokio::spawn(dispatch_loop(
            self.api.clone(),
            self.local.clone(),
            self.cache.clone(),
            queue_rx,
            self.default_timeout_ms,
        ));

        state.running = true;
        state.shutdown = Some(shutdown_tx);
        state.handles = vec![prober, dispatcher];
        debug!("config listen worker started");
    }

    /// Stop both tasks and wait for them. Safe to call repeatedly.
    pub(crate) async fn stop(&self) {
        let (shutdown, handles) = {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            if !state.running {
                return;
            }
            state.running = false;
            (state.shutdown.take(), std::mem::take(&mut state.handles))
        };

        if let Some(tx) = shutdown {
            let _ = tx.send(());
        }
        for handle in handles {
            let _ = handle.await;
        }
        debug!("config listen worker stopped");
    }
}

async fn probe_loop(
    api: Arc<ConfigApiClient>,
    cache: Arc<SubscriptionCache>,
    queue: mpsc::UnboundedSender<ConfigKey>,
    listen_interval: Duration,
    long_polling_timeout_ms: u64,
    mut shutdown: broadcast::Receiver<()>,
) {
    debug!("config prober started");
    loop {
        let tracked: Vec<(ConfigKey, String)> = cache
            .iter()
            .filter(|entry| entry.has_listeners())
            .map(|entry| entry.listen_item())
            .collect();

        if tracked.is_empty() {
            tokio::select! {
                _ = shutdown.recv() => break,
                _ = tokio::time::sleep(listen_interval) => continue,
            }
        }

        let result = tokio::select! {
            _ = shutdown.recv() => break,
            result = api.listen_configs(&tracked, long_polling_timeout_ms) => result,
        };

        match result {
            Ok(changed) => {
                for key in changed {
                    if queue.send(key).is_err() {
                        debug!("dispatcher queue closed, prober exiting");
                        return;
                    }
                }
                tokio::select! {
                    _ = shutdown.recv() => break,
                    _ = tokio::time::sleep(PROBE_YIELD) => {}
                }
            }
            Err(e) => {
                error!(error = %e, "config probe failed");
                tokio::select! {
                    _ = shutdown.recv() => break,
                    _ = tokio::time::sleep(PROBE_ERROR_BACKOFF) => {}
                }
            }
        }
    }
    debug!("config prober stopped");
}

/// The dispatcher takes no shutdown signal of its own: the prober is the
/// queue's only sender, so once it exits the channel closes and `recv()`
/// drains what is already buffered before returning `None`.
async fn dispatch_loop(
    api: Arc<ConfigApiClient>,
    local: Arc<LocalConfigInfoProcessor>,
    cache: Arc<SubscriptionCache>,
    mut queue: mpsc::UnboundedReceiver<ConfigKey>,
    default_timeout_ms: u64,
) {
    debug!("config dispatcher started");
    loop {
        let key = match queue.recv().await {
            Some(key) => key,
            None => break,
        };

        // entry may have been evicted while the key sat in the queue
        let entry = match cache.get(&key.to_string()) {
            Some(entry) => entry.value().clone(),
            None => continue,
        };

        match api.get_config(&key, default_timeout_ms).await {
            Ok(Some(data)) => {
                local.save_snapshot(&key, Some(&data.content));
                if let Some((event, listeners)) =
                    entry.update_content(&data.content, &data.content_type)
                {
                    debug!(key = %key, "config changed, notifying {} listener(s)", listeners.len());
                    notify_listeners(event, listeners);
                }
            }
            Ok(None) => {
                warn!(key = %key, "config was removed on the server");
                local.save_snapshot(&key, None);
            }
            Err(e) => {
                warn!(key = %key, error = %e, "failed to fetch changed config");
            }
        }
    }
    debug!("config dispatcher stopped");
}
