//! Server address pool with health-aware round-robin selection

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::{debug, warn};

use crate::error::{ConfigError, Result};

/// Consecutive failures after which a server is considered unhealthy.
const MAX_FAILURE_COUNT: u32 = 3;

/// How long an unhealthy server stays excluded before it may be retried.
const RECOVERY_WINDOW: Duration = Duration::from_secs(10);

/// Per-server failure accounting.
struct ServerHealth {
    failure_count: AtomicU32,
    last_failure: Mutex<Option<Instant>>,
}

impl ServerHealth {
    fn new() -> Self {
        Self {
            failure_count: AtomicU32::new(0),
            last_failure: Mutex::new(None),
        }
    }

    fn is_healthy(&self) -> bool {
        self.failure_count.load(Ordering::Acquire) < MAX_FAILURE_COUNT
    }
}

/// Maintains the normalized server address list and routes requests
/// round-robin across the currently healthy members.
pub struct ServerListManager {
    servers: Vec<String>,
    health: DashMap<String, ServerHealth>,
    index: AtomicUsize,
    healthy_cache: Mutex<Option<Arc<Vec<String>>>>,
}

impl ServerListManager {
    pub fn new(addrs: &[String]) -> Result<Self> {
        if addrs.is_empty() {
            return Err(ConfigError::Configuration(
                "server address list must not be empty".to_string(),
            ));
        }

        let servers: Vec<String> = addrs.iter().map(|a| normalize_address(a)).collect();
        let health = DashMap::new();
        for server in &servers {
            health.insert(server.clone(), ServerHealth::new());
        }

        Ok(Self {
            servers,
            health,
            index: AtomicUsize::new(0),
            healthy_cache: Mutex::new(None),
        })
    }

    /// Pick the next server for a request.
    ///
    /// Rotates over healthy servers; when none is healthy, servers whose last
    /// failure is old enough are reset first, and the first configured
    /// address is the last resort.
    pub fn select(&self) -> String {
        let mut healthy = self.healthy_list();
        if healthy.is_empty() {
            self.recover_stale_failures();
            healthy = self.healthy_list();
        }
        if healthy.is_empty() {
            warn!("no healthy server available, falling back to the first address");
            return self.servers[0].clone();
        }
        let idx = self.index.fetch_add(1, Ordering::Relaxed) % healthy.len();
        healthy[idx].clone()
    }

    /// Record a failed request against a server.
    pub fn mark_failed(&self, addr: &str) {
        if let Some(health) = self.health.get(addr) {
            let previous = health.failure_count.fetch_add(1, Ordering::AcqRel);
            {
                let mut last = health
                    .last_failure
                    .lock()
                    .unwrap_or_else(|e| e.into_inner());
                *last = Some(Instant::now());
            }
            // only a healthy -> unhealthy transition invalidates the cache
            if previous + 1 == MAX_FAILURE_COUNT {
                debug!(server = %addr, "server marked unhealthy");
                self.invalidate_cache();
            }
        }
    }

    /// Record a successful request against a server.
    pub fn mark_healthy(&self, addr: &str) {
        if let Some(health) = self.health.get(addr) {
            let previous = health.failure_count.swap(0, Ordering::AcqRel);
            if previous >= MAX_FAILURE_COUNT {
                debug!(server = %addr, "server recovered");
                self.invalidate_cache();
            }
        }
    }

    /// All configured servers, normalized.
    pub fn all_servers(&self) -> &[String] {
        &self.servers
    }

    fn healthy_list(&self) -> Arc<Vec<String>> {
        let mut cache = self
            .healthy_cache
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        if let Some(ref list) = *cache {
            return list.clone();
        }
        let list: Arc<Vec<String>> = Arc::new(
            self.servers
                .iter()
                .filter(|s| self.health.get(*s).map(|h| h.is_healthy()).unwrap_or(true))
                .cloned()
                .collect(),
        );
        *cache = Some(list.clone());
        list
    }

    fn invalidate_cache(&self) {
        let mut cache = self
            .healthy_cache
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        *cache = None;
    }

    /// Reset servers whose last failure is older than the recovery window.
    fn recover_stale_failures(&self) {
        let mut recovered = false;
        for entry in self.health.iter() {
            if entry.is_healthy() {
                continue;
            }
            let stale = {
                let last = entry
                    .last_failure
                    .lock()
                    .unwrap_or_else(|e| e.into_inner());
                last.map(|t| t.elapsed() >= RECOVERY_WINDOW).unwrap_or(true)
            };
            if stale {
                entry.failure_count.store(0, Ordering::Release);
                recovered = true;
                debug!(server = %entry.key(), "unhealthy server reset after recovery window");
            }
        }
        if recovered {
            self.invalidate_cache();
        }
    }

    #[cfg(test)]
    fn age_last_failure(&self, addr: &str, age: Duration) {
        if let Some(health) = self.health.get(addr) {
            let mut last = health
                .last_failure
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            *last = Some(Instant::now() - age);
        }
    }
}

/// Strip trailing slashes and default the scheme to `http://`.
fn normalize_address(addr: &str) -> String {
    let trimmed = addr.trim().trim_end_matches('/');
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("http://{}", trimmed)
    }
}
