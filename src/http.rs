//! HTTP transport: server selection, URL rewrite, retries, health outcomes

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Method, Response, StatusCode};
use tracing::{debug, warn};

use crate::error::Result;
use crate::model::{compute_md5, CLIENT_VERSION};
use crate::server_list::ServerListManager;

/// One outbound request, before server selection and URL rewrite.
pub struct RequestSpec {
    pub method: Method,
    pub path: String,
    pub params: Vec<(String, String)>,
    pub form: Option<Vec<(String, String)>>,
    pub headers: Vec<(String, String)>,
    pub timeout: Duration,
}

impl RequestSpec {
    pub fn new(method: Method, path: &str, timeout: Duration) -> Self {
        Self {
            method,
            path: path.trim_start_matches('/').to_string(),
            params: Vec::new(),
            form: None,
            headers: Vec::new(),
            timeout,
        }
    }
}

/// Transport over the server pool.
///
/// Each send picks one server, rewrites the URL to
/// `{server}/{context_path}/{path}`, records the health outcome, and retries
/// 5xx/429 and transport failures with exponential backoff.
pub struct HttpTransport {
    client: reqwest::Client,
    servers: Arc<ServerListManager>,
    context_path: String,
    max_retry: u32,
    retry_delay_ms: u64,
}

impl HttpTransport {
    pub fn new(
        servers: Arc<ServerListManager>,
        context_path: &str,
        max_retry: u32,
        retry_delay_ms: u64,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(crate::error::ConfigError::Http)?;
        Ok(Self {
            client,
            servers,
            context_path: context_path.trim_matches('/').to_string(),
            max_retry: max_retry.max(1),
            retry_delay_ms,
        })
    }

    /// Send the request, retrying retryable outcomes within the budget.
    pub async fn execute(&self, spec: &RequestSpec) -> Result<Response> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let server = self.servers.select();
            let url = self.build_url(&server, &spec.path);

            let mut builder = self
                .client
                .request(spec.method.clone(), &url)
                .timeout(spec.timeout)
                .query(&spec.params);
            for (name, value) in common_headers() {
                builder = builder.header(name.as_str(), value.as_str());
            }
            for (name, value) in &spec.headers {
                builder = builder.header(name.as_str(), value.as_str());
            }
            if let Some(form) = &spec.form {
                builder = builder.form(form);
            }

            match builder.send().await {
                Ok(response) => {
                    let status = response.status();
                    if is_server_fault(status) {
                        self.servers.mark_failed(&server);
                    } else {
                        self.servers.mark_healthy(&server);
                    }

                    let retryable = is_server_fault(status) || status.as_u16() == 429;
                    if retryable && attempt < self.max_retry {
                        warn!(url = %url, status = %status, attempt, "retryable response");
                        tokio::time::sleep(self.backoff(attempt)).await;
                        continue;
                    }
                    return Ok(response);
                }
                Err(e) => {
                    self.servers.mark_failed(&server);
                    if attempt < self.max_retry {
                        warn!(url = %url, error = %e, attempt, "request failed, retrying");
                        tokio::time::sleep(self.backoff(attempt)).await;
                        continue;
                    }
                    debug!(url = %url, error = %e, "request failed, retry budget exhausted");
                    return Err(e.into());
                }
            }
        }
    }

    fn build_url(&self, server: &str, path: &str) -> String {
        if self.context_path.is_empty() {
            format!("{}/{}", server, path)
        } else {
            format!("{}/{}/{}", server, self.context_path, path)
        }
    }

    fn backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.retry_delay_ms.saturating_mul(1 << (attempt - 1)))
    }
}

/// A status the server pool counts as a server fault.
fn is_server_fault(status: StatusCode) -> bool {
    matches!(status.as_u16(), 500 | 502 | 503)
}

/// Headers every request carries.
fn common_headers() -> Vec<(String, String)> {
    let ts = chrono::Utc::now().timestamp_millis().to_string();
    let token = compute_md5(&ts);
    vec![
        ("Client-Version".to_string(), CLIENT_VERSION.to_string()),
        ("Client-RequestTS".to_string(), ts),
        ("Client-RequestToken".to_string(), token),
        (
            "Request-Id".to_string(),
            uuid::Uuid::new_v4().simple().to_string(),
        ),
        ("Accept-Charset".to_string(), "UTF-8".to_string()),
        ("exConfigInfo".to_string(), "true".to_string()),
    ]
}
