//! Typed API client for the config endpoints

use std::time::Duration;

use reqwest::Method;
use tracing::{debug, warn};

use crate::auth::AuthPlugin;
use crate::error::{ConfigError, Result};
use crate::http::{HttpTransport, RequestSpec};
use crate::model::{ConfigData, ConfigKey};
use crate::wire;

const CONFIGS_PATH: &str = "v1/cs/configs";
const LISTENER_PATH: &str = "v1/cs/configs/listener";

/// Client for the config CRUD and long-polling endpoints.
pub struct ConfigApiClient {
    transport: HttpTransport,
    auth: AuthPlugin,
    namespace: String,
}

impl ConfigApiClient {
    pub fn new(transport: HttpTransport, auth: AuthPlugin, namespace: &str) -> Self {
        Self {
            transport,
            auth,
            namespace: namespace.to_string(),
        }
    }

    /// Fetch a config value. `Ok(None)` means the config does not exist.
    pub async fn get_config(
        &self,
        key: &ConfigKey,
        timeout_ms: u64,
    ) -> Result<Option<ConfigData>> {
        self.precheck_auth().await;

        let mut spec = RequestSpec::new(
            Method::GET,
            CONFIGS_PATH,
            Duration::from_millis(timeout_ms),
        );
        spec.params = key_params(key);
        self.auth
            .apply_to_params(&mut spec.params, &key.tenant, &key.group);
        spec.headers.push(("notify".to_string(), "false".to_string()));

        let response = self.transport.execute(&spec).await?;
        let status = response.status().as_u16();
        match status {
            200 => {
                let content_type = header_value(&response, "Config-Type");
                let encrypted_data_key = header_value(&response, "Encrypted-Data-Key");
                let content = response.text().await?;
                let mut data = ConfigData::new(content, content_type);
                data.encrypted_data_key = encrypted_data_key;
                Ok(Some(data))
            }
            404 => Ok(None),
            403 => Err(unauthorized(response).await),
            _ => Err(remote_error(status, response).await),
        }
    }

    /// Create or update a config. `Ok(false)` means the server refused
    /// without an auth failure.
    pub async fn publish_config(
        &self,
        key: &ConfigKey,
        content: &str,
        content_type: &str,
        timeout_ms: u64,
    ) -> Result<bool> {
        self.precheck_auth().await;

        let mut spec = RequestSpec::new(
            Method::POST,
            CONFIGS_PATH,
            Duration::from_millis(timeout_ms),
        );
        let mut form = key_params(key);
        form.push(("content".to_string(), content.to_string()));
        form.push(("type".to_string(), content_type.to_string()));
        self.auth.apply_to_params(&mut form, &key.tenant, &key.group);
        spec.form = Some(form);

        let response = self.transport.execute(&spec).await?;
        let status = response.status().as_u16();
        match status {
            200 => Ok(true),
            403 => Err(unauthorized(response).await),
            _ => {
                warn!(key = %key, status, "publish rejected");
                Ok(false)
            }
        }
    }

    /// Delete a config. Outcomes mirror `publish_config`.
    pub async fn remove_config(&self, key: &ConfigKey, timeout_ms: u64) -> Result<bool> {
        self.precheck_auth().await;

        let mut spec = RequestSpec::new(
            Method::DELETE,
            CONFIGS_PATH,
            Duration::from_millis(timeout_ms),
        );
        spec.params = key_params(key);
        self.auth
            .apply_to_params(&mut spec.params, &key.tenant, &key.group);

        let response = self.transport.execute(&spec).await?;
        let status = response.status().as_u16();
        match status {
            200 => Ok(true),
            403 => Err(unauthorized(response).await),
            _ => {
                warn!(key = %key, status, "remove rejected");
                Ok(false)
            }
        }
    }

    /// One long-polling probe round.
    ///
    /// Returns the keys the server reported changed; an empty list when the
    /// probe timed out without changes.
    pub async fn listen_configs(
        &self,
        tracked: &[(ConfigKey, String)],
        long_polling_timeout_ms: u64,
    ) -> Result<Vec<ConfigKey>> {
        if tracked.is_empty() {
            return Ok(Vec::new());
        }
        self.precheck_auth().await;

        // HTTP timeout leaves the server the full probe budget
        let http_timeout = Duration::from_millis(long_polling_timeout_ms * 3 / 2);
        let mut spec = RequestSpec::new(Method::POST, LISTENER_PATH, http_timeout);

        // authorization is read from the query string on this endpoint
        if !self.namespace.is_empty() {
            spec.params
                .push(("tenant".to_string(), self.namespace.clone()));
        }
        self.auth.apply_to_params(&mut spec.params, &self.namespace, "");

        spec.headers.push((
            wire::LONG_PULLING_TIMEOUT_HEADER.to_string(),
            long_polling_timeout_ms.to_string(),
        ));
        spec.form = Some(vec![(
            wire::LISTENING_CONFIGS.to_string(),
            wire::encode_probe(tracked),
        )]);

        match self.transport.execute(&spec).await {
            Ok(response) => {
                let status = response.status().as_u16();
                match status {
                    200 => {
                        let body = response.text().await?;
                        let changed = wire::parse_probe_response(&body);
                        if !changed.is_empty() {
                            debug!(count = changed.len(), "probe reported changed configs");
                        }
                        Ok(changed)
                    }
                    403 => Err(unauthorized(response).await),
                    _ => Err(remote_error(status, response).await),
                }
            }
            // a probe cut off by its own deadline means "no changes yet"
            Err(ConfigError::Http(e)) if e.is_timeout() => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    /// Login failures are tolerated here so the server's own 403 decides.
    async fn precheck_auth(&self) {
        if let Err(e) = self.auth.ensure_authenticated().await {
            warn!(error = %e, "authentication precheck failed");
        }
    }
}

fn key_params(key: &ConfigKey) -> Vec<(String, String)> {
    let mut params = vec![
        ("dataId".to_string(), key.data_id.clone()),
        ("group".to_string(), key.group.clone()),
    ];
    if !key.tenant.is_empty() {
        params.push(("tenant".to_string(), key.tenant.clone()));
    }
    params
}

fn header_value(response: &reqwest::Response, name: &str) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string())
}

async fn unauthorized(response: reqwest::Response) -> ConfigError {
    let body = response.text().await.unwrap_or_default();
    ConfigError::Unauthorized(body)
}

async fn remote_error(status: u16, response: reqwest::Response) -> ConfigError {
    let body = response.text().await.unwrap_or_default();
    ConfigError::Remote { status, body }
}
