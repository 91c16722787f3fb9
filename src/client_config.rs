//! Client configuration options

use std::path::PathBuf;

use crate::error::{ConfigError, Result};

/// Configuration for the Nacos config client.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// List of server base URLs to connect to
    pub server_addrs: Vec<String>,
    /// Namespace (tenant) applied to every request
    pub namespace: String,
    /// URL segment between host and API (default: "nacos")
    pub context_path: String,
    /// Per-request timeout for CRUD operations in milliseconds
    pub default_timeout_ms: u64,
    /// Long-polling timeout sent to the server in milliseconds
    pub long_polling_timeout_ms: u64,
    /// Pause between probe rounds when no subscriptions exist
    pub listen_interval_ms: u64,
    /// Maximum retry attempts for retryable responses
    pub max_retry: u32,
    /// Base delay for exponential retry backoff in milliseconds
    pub retry_delay_ms: u64,
    /// Whether snapshot and failover files are used
    pub enable_snapshot: bool,
    /// Root directory for failover and snapshot files
    pub snapshot_path: PathBuf,
    /// Username for authentication (empty disables credential login)
    pub username: String,
    /// Password for authentication
    pub password: String,
    /// Access key for signed authentication (used only when username is empty)
    pub access_key: String,
    /// Secret key for signed authentication
    pub secret_key: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_addrs: vec!["http://127.0.0.1:8848".to_string()],
            namespace: String::new(),
            context_path: "nacos".to_string(),
            default_timeout_ms: 15000,
            long_polling_timeout_ms: 30000,
            listen_interval_ms: 1000,
            max_retry: 3,
            retry_delay_ms: 2000,
            enable_snapshot: true,
            snapshot_path: default_snapshot_path(),
            username: String::new(),
            password: String::new(),
            access_key: String::new(),
            secret_key: String::new(),
        }
    }
}

impl ClientConfig {
    /// Create a new config with a single server address.
    pub fn new(server_addr: &str) -> Self {
        Self {
            server_addrs: vec![server_addr.to_string()],
            ..Default::default()
        }
    }

    /// Create a config with multiple server addresses.
    pub fn with_servers(server_addrs: Vec<String>) -> Self {
        Self {
            server_addrs,
            ..Default::default()
        }
    }

    /// Set the namespace (tenant) for all requests.
    pub fn with_namespace(mut self, namespace: &str) -> Self {
        self.namespace = namespace.to_string();
        self
    }

    /// Set username/password credentials.
    pub fn with_auth(mut self, username: &str, password: &str) -> Self {
        self.username = username.to_string();
        self.password = password.to_string();
        self
    }

    /// Set access-key/secret-key credentials for signed requests.
    pub fn with_access_keys(mut self, access_key: &str, secret_key: &str) -> Self {
        self.access_key = access_key.to_string();
        self.secret_key = secret_key.to_string();
        self
    }

    /// Set context path.
    pub fn with_context_path(mut self, path: &str) -> Self {
        self.context_path = path.trim_matches('/').to_string();
        self
    }

    /// Set CRUD and long-polling timeouts.
    pub fn with_timeouts(mut self, default_ms: u64, long_polling_ms: u64) -> Self {
        self.default_timeout_ms = default_ms;
        self.long_polling_timeout_ms = long_polling_ms;
        self
    }

    /// Set the retry policy.
    pub fn with_retry(mut self, max_retry: u32, retry_delay_ms: u64) -> Self {
        self.max_retry = max_retry;
        self.retry_delay_ms = retry_delay_ms;
        self
    }

    /// Enable or disable local snapshot persistence.
    pub fn with_snapshot_enabled(mut self, enabled: bool) -> Self {
        self.enable_snapshot = enabled;
        self
    }

    /// Set the snapshot root directory.
    pub fn with_snapshot_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.snapshot_path = path.into();
        self
    }

    /// Set the pause between probe rounds when nothing is subscribed.
    pub fn with_listen_interval(mut self, interval_ms: u64) -> Self {
        self.listen_interval_ms = interval_ms;
        self
    }

    /// Validate the configuration, returning an error for unusable settings.
    pub fn validate(&self) -> Result<()> {
        if self.server_addrs.is_empty() {
            return Err(ConfigError::Configuration(
                "server address list must not be empty".to_string(),
            ));
        }
        if self.server_addrs.iter().any(|a| a.trim().is_empty()) {
            return Err(ConfigError::Configuration(
                "server address must not be blank".to_string(),
            ));
        }
        Ok(())
    }
}

/// Snapshot root from environment or the user's home directory.
fn default_snapshot_path() -> PathBuf {
    if let Ok(path) = std::env::var("NACOS_CACHE_PATH") {
        return PathBuf::from(path);
    }
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".nacos").join("config");
    }
    PathBuf::from(".nacos").join("config")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = ClientConfig::default();
        assert_eq!(config.server_addrs, vec!["http://127.0.0.1:8848"]);
        assert_eq!(config.context_path, "nacos");
        assert_eq!(config.default_timeout_ms, 15000);
        assert_eq!(config.long_polling_timeout_ms, 30000);
        assert_eq!(config.listen_interval_ms, 1000);
        assert_eq!(config.max_retry, 3);
        assert_eq!(config.retry_delay_ms, 2000);
        assert!(config.enable_snapshot);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = ClientConfig::new("http://localhost:8848")
            .with_namespace("dev")
            .with_auth("admin", "secret")
            .with_context_path("/nacos/")
            .with_timeouts(5000, 10000)
            .with_retry(5, 500)
            .with_snapshot_enabled(false);

        assert_eq!(config.server_addrs, vec!["http://localhost:8848"]);
        assert_eq!(config.namespace, "dev");
        assert_eq!(config.username, "admin");
        assert_eq!(config.password, "secret");
        assert_eq!(config.context_path, "nacos");
        assert_eq!(config.default_timeout_ms, 5000);
        assert_eq!(config.long_polling_timeout_ms, 10000);
        assert_eq!(config.max_retry, 5);
        assert!(!config.enable_snapshot);
    }

    #[test]
    fn test_config_empty_servers_rejected() {
        let config = ClientConfig::with_servers(Vec::new());
        assert!(config.validate().is_err());

        let config = ClientConfig::with_servers(vec!["  ".to_string()]);
        assert!(config.validate().is_err());
    }
}
