//! Core data types shared across the client

use std::fmt;
use std::time::Instant;

use chrono::{DateTime, Utc};
use md5::{Digest, Md5};
use serde::Serialize;

use crate::error::{ConfigError, Result};

/// Group used when the caller leaves the group blank.
pub const DEFAULT_GROUP: &str = "DEFAULT_GROUP";

/// Tenant directory name used for the default/public namespace.
pub const PUBLIC_TENANT: &str = "public";

/// Value reported in the `Client-Version` request header.
pub const CLIENT_VERSION: &str = concat!("Nacos-Rust-Client:v", env!("CARGO_PKG_VERSION"));

/// Identity of a single config item: `(dataId, group, tenant)`.
///
/// `data_id` and `group` are non-empty after trimming; `tenant` may be empty,
/// which addresses the server's public namespace.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigKey {
    pub data_id: String,
    pub group: String,
    pub tenant: String,
}

impl ConfigKey {
    pub fn new(data_id: &str, group: &str, tenant: &str) -> Result<Self> {
        let data_id = data_id.trim();
        let group = group.trim();
        if data_id.is_empty() {
            return Err(ConfigError::Validation(
                "dataId must not be blank".to_string(),
            ));
        }
        if group.is_empty() {
            return Err(ConfigError::Validation(
                "group must not be blank".to_string(),
            ));
        }
        Ok(Self {
            data_id: data_id.to_string(),
            group: group.to_string(),
            tenant: tenant.trim().to_string(),
        })
    }
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.tenant.is_empty() {
            write!(f, "{}+{}", self.data_id, self.group)
        } else {
            write!(f, "{}+{}+{}", self.data_id, self.group, self.tenant)
        }
    }
}

/// Config content as returned by the server.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigData {
    pub content: String,
    /// text, json, properties, html, xml, yaml ...
    pub content_type: String,
    pub md5: String,
    pub encrypted_data_key: Option<String>,
}

impl ConfigData {
    pub fn new(content: String, content_type: Option<String>) -> Self {
        let md5 = compute_md5(&content);
        Self {
            content,
            content_type: content_type.unwrap_or_else(|| "text".to_string()),
            md5,
            encrypted_data_key: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }
}

/// Config content sourced from a local failover or snapshot file.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalConfigData {
    pub content: String,
    pub last_modified: i64,
}

impl LocalConfigData {
    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }
}

/// Change notification delivered to subscribers.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigChangeEvent {
    pub key: ConfigKey,
    pub content: String,
    pub old_content: String,
    pub content_type: String,
    pub timestamp: DateTime<Utc>,
}

/// Access token state for username/password authentication.
///
/// The token is considered stale once 90% of its lifetime has passed, so a
/// refresh always lands before the server-side expiry.
#[derive(Clone, Debug)]
pub struct TokenInfo {
    pub access_token: String,
    pub token_ttl_secs: u64,
    pub last_refresh: Instant,
}

impl TokenInfo {
    pub fn new(access_token: String, token_ttl_secs: u64) -> Self {
        Self {
            access_token,
            token_ttl_secs,
            last_refresh: Instant::now(),
        }
    }

    pub fn is_valid(&self) -> bool {
        if self.access_token.is_empty() {
            return false;
        }
        let refresh_window = self.token_ttl_secs / 10;
        let usable_ms = self.token_ttl_secs.saturating_sub(refresh_window) * 1000;
        (self.last_refresh.elapsed().as_millis() as u64) < usable_ms
    }
}

/// Compute the MD5 hash of a string, returning the lowercase hex digest.
pub fn compute_md5(content: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(content.as_bytes());
    let result = hasher.finalize();
    format!("{:x}", result)
}
