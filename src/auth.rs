//! Authentication plugins: credential login, token lifetime, request signing

use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use hmac::{Hmac, Mac};
use sha1::Sha1;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::client_config::ClientConfig;
use crate::error::{ConfigError, Result};
use crate::model::TokenInfo;

type HmacSha1 = Hmac<Sha1>;

/// Hard timeout for a single login attempt.
const LOGIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Bounds for the background refresh period.
const MIN_REFRESH_PERIOD: Duration = Duration::from_secs(30);
const MAX_REFRESH_PERIOD: Duration = Duration::from_secs(300);

/// Authentication strategy derived from the client configuration.
///
/// Username/password wins when both credential pairs are configured.
#[derive(Clone)]
pub enum AuthPlugin {
    None,
    UserPassword(Arc<UserPasswordAuth>),
    Signed(SignedAuth),
}

impl AuthPlugin {
    pub fn from_config(config: &ClientConfig, servers: &[String]) -> Self {
        if !config.username.is_empty() {
            AuthPlugin::UserPassword(Arc::new(UserPasswordAuth::new(
                servers.to_vec(),
                &config.context_path,
                &config.username,
                &config.password,
            )))
        } else if !config.access_key.is_empty() {
            AuthPlugin::Signed(SignedAuth {
                access_key: config.access_key.clone(),
                secret_key: config.secret_key.clone(),
            })
        } else {
            AuthPlugin::None
        }
    }

    pub fn is_enabled(&self) -> bool {
        !matches!(self, AuthPlugin::None)
    }

    /// Perform the initial login and start the background refresh task.
    ///
    /// A rejected login is logged and tolerated: later requests surface the
    /// server's 403.
    pub async fn initialize(&self) {
        if let AuthPlugin::UserPassword(auth) = self {
            if let Err(e) = auth.ensure_authenticated().await {
                warn!(error = %e, "initial login failed, will retry on demand");
            }
            auth.start_refresh_task();
        }
    }

    /// Make sure a usable token exists before an outbound request.
    pub async fn ensure_authenticated(&self) -> Result<()> {
        match self {
            AuthPlugin::UserPassword(auth) => auth.ensure_authenticated().await,
            _ => Ok(()),
        }
    }

    /// Contribute authentication query/form parameters to a request.
    pub fn apply_to_params(&self, params: &mut Vec<(String, String)>, tenant: &str, group: &str) {
        match self {
            AuthPlugin::None => {}
            AuthPlugin::UserPassword(auth) => {
                if let Some(token) = auth.access_token() {
                    params.push(("accessToken".to_string(), token));
                }
            }
            AuthPlugin::Signed(signed) => signed.apply_to_params(params, tenant, group),
        }
    }

    /// Stop the background refresh task.
    pub fn stop(&self) {
        if let AuthPlugin::UserPassword(auth) = self {
            auth.stop();
        }
    }
}

/// Stateful username/password session: login, token cache, background refresh.
pub struct UserPasswordAuth {
    http: reqwest::Client,
    servers: Vec<String>,
    context_path: String,
    username: String,
    password: String,
    token: RwLock<Option<TokenInfo>>,
    login_lock: tokio::sync::Mutex<()>,
    shutdown: Mutex<Option<broadcast::Sender<()>>>,
}

impl UserPasswordAuth {
    fn new(servers: Vec<String>, context_path: &str, username: &str, password: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            servers,
            context_path: context_path.to_string(),
            username: username.to_string(),
            password: password.to_string(),
            token: RwLock::new(None),
            login_lock: tokio::sync::Mutex::new(()),
            shutdown: Mutex::new(None),
        }
    }

    pub fn access_token(&self) -> Option<String> {
        let guard = self.token.read().unwrap_or_else(|e| e.into_inner());
        guard.as_ref().map(|t| t.access_token.clone())
    }

    fn token_is_valid(&self) -> bool {
        let guard = self.token.read().unwrap_or_else(|e| e.into_inner());
        guard.as_ref().map(|t| t.is_valid()).unwrap_or(false)
    }

    /// Log in when the cached token went stale.
    ///
    /// Concurrent callers collapse into a single login: the lock holder
    /// re-checks validity before hitting the network.
    pub async fn ensure_authenticated(&self) -> Result<()> {
        if self.token_is_valid() {
            return Ok(());
        }
        let _guard = self.login_lock.lock().await;
        if self.token_is_valid() {
            return Ok(());
        }
        self.login().await
    }

    /// Attempt a login against each server in order.
    async fn login(&self) -> Result<()> {
        for server in &self.servers {
            let url = format!("{}/{}/v1/auth/users/login", server, self.context_path);
            debug!(url = %url, "attempting login");

            let response = self
                .http
                .post(&url)
                .timeout(LOGIN_TIMEOUT)
                .form(&[("username", &self.username), ("password", &self.password)])
                .send()
                .await;

            let response = match response {
                Ok(r) => r,
                Err(e) => {
                    warn!(server = %server, error = %e, "login request failed");
                    continue;
                }
            };

            if !response.status().is_success() {
                warn!(server = %server, status = %response.status(), "login rejected");
                continue;
            }

            let body: serde_json::Value = match response.json().await {
                Ok(v) => v,
                Err(e) => {
                    warn!(server = %server, error = %e, "login response unreadable");
                    continue;
                }
            };

            let access_token = body.get("accessToken").and_then(|v| v.as_str());
            let token_ttl = body
                .get("tokenTtl")
                .and_then(|v| v.as_i64())
                .unwrap_or(18000);

            if let Some(access_token) = access_token {
                {
                    let mut guard = self.token.write().unwrap_or_else(|e| e.into_inner());
                    *guard = Some(TokenInfo::new(access_token.to_string(), token_ttl as u64));
                }
                debug!(ttl_secs = token_ttl, "login successful");
                return Ok(());
            }
            warn!(server = %server, "login response carried no accessToken");
        }

        Err(ConfigError::AuthFailed(
            "login rejected by all configured servers".to_string(),
        ))
    }

    /// Refresh period: 80% of the token TTL, clamped to [30s, 300s].
    fn refresh_period(&self) -> Duration {
        let guard = self.token.read().unwrap_or_else(|e| e.into_inner());
        let ttl = guard.as_ref().map(|t| t.token_ttl_secs).unwrap_or(0);
        let period = Duration::from_millis(ttl * 800);
        period.clamp(MIN_REFRESH_PERIOD, MAX_REFRESH_PERIOD)
    }

    fn start_refresh_task(self: &Arc<Self>) {
        let (tx, mut rx) = broadcast::channel(1);
        {
            let mut slot = self.shutdown.lock().unwrap_or_else(|e| e.into_inner());
            *slot = Some(tx);
        }

        let auth = self.clone();
        tokio::spawn(async move {
            loop {
                let period = auth.refresh_period();
                tokio::select! {
                    _ = rx.recv() => break,
                    _ = tokio::time::sleep(period) => {
                        if !auth.token_is_valid() {
                            if let Err(e) = auth.ensure_authenticated().await {
                                warn!(error = %e, "token refresh failed");
                            }
                        }
                    }
                }
            }
            debug!("token refresh task stopped");
        });
    }

    fn stop(&self) {
        let sender = {
            let mut slot = self.shutdown.lock().unwrap_or_else(|e| e.into_inner());
            slot.take()
        };
        if let Some(tx) = sender {
            let _ = tx.send(());
        }
    }
}

/// Stateless access-key/secret-key signing.
#[derive(Clone)]
pub struct SignedAuth {
    access_key: String,
    secret_key: String,
}

impl SignedAuth {
    fn apply_to_params(&self, params: &mut Vec<(String, String)>, tenant: &str, group: &str) {
        let resource = if !tenant.is_empty() && !group.is_empty() {
            format!("{}+{}", tenant, group)
        } else {
            group.to_string()
        };

        let timestamp = chrono::Utc::now().timestamp_millis().to_string();
        let sign_input = if resource.is_empty() {
            timestamp.clone()
        } else {
            format!("{}+{}", resource, timestamp)
        };

        params.push(("Spas-AccessKey".to_string(), self.access_key.clone()));
        params.push(("Timestamp".to_string(), timestamp));
        params.push(("Spas-Signature".to_string(), sign(&self.secret_key, &sign_input)));
    }
}

fn sign(secret_key: &str, input: &str) -> String {
    let mut mac =
        HmacSha1::new_from_slice(secret_key.as_bytes()).expect("HMAC can take key of any size");
    mac.update(input.as_bytes());
    BASE64.encode(mac.finalize().into_bytes())
}
