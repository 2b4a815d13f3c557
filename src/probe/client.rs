//! Management API client used to test a proxy endpoint.
//!
//! # Responsibilities
//! - Build an HTTP client honouring the target's TLS and timeout settings
//! - Authenticate with the management key as a bearer token
//! - Turn transport failures into messages the classifier understands

use std::error::Error as _;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::StatusCode;
use serde_json::Value;
use thiserror::Error;
use url::Url;

use crate::config::LocalProxyConfig;
use crate::connection::RemoteConnectionConfig;

/// Path probed to decide whether a proxy is reachable and the key accepted.
pub const MANAGEMENT_CONFIG_PATH: &str = "/v0/management/config";

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("no remote connection is configured")]
    NotConfigured,

    #[error("invalid endpoint URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("invalid management key header")]
    InvalidKey,

    #[error("request timed out after {0} seconds")]
    Timeout(u64),

    #[error("{0}")]
    Request(String),

    #[error("management API returned {0}")]
    Status(StatusCode),
}

/// Everything needed to reach one proxy instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeTarget {
    pub endpoint_url: String,
    pub management_key: Option<String>,
    pub verify_ssl: bool,
    pub timeout: Duration,
}

impl ProbeTarget {
    pub fn local(config: &LocalProxyConfig) -> Self {
        Self {
            endpoint_url: config.endpoint_url.clone(),
            management_key: config.management_key.clone(),
            verify_ssl: true,
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    pub fn remote(config: &RemoteConnectionConfig, management_key: Option<String>) -> Self {
        Self {
            endpoint_url: config.endpoint_url.clone(),
            management_key,
            verify_ssl: config.verify_ssl,
            timeout: config.timeout(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ManagementClient {
    client: reqwest::Client,
    base_url: Url,
    timeout: Duration,
}

impl ManagementClient {
    pub fn new(target: &ProbeTarget) -> Result<Self, ProbeError> {
        let base_url = parse_base_url(&target.endpoint_url)?;

        let mut headers = HeaderMap::new();
        if let Some(key) = target.management_key.as_deref().filter(|k| !k.is_empty()) {
            let value = HeaderValue::from_str(&format!("Bearer {key}")).map_err(|_| ProbeError::InvalidKey)?;
            headers.insert(AUTHORIZATION, value);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(target.timeout)
            .danger_accept_invalid_certs(!target.verify_ssl)
            .no_proxy()
            .build()
            .map_err(|e| ProbeError::Request(error_chain(&e)))?;

        Ok(Self {
            client,
            base_url,
            timeout: target.timeout,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Succeeds when the management API answers with a 2xx status.
    pub async fn check(&self) -> Result<(), ProbeError> {
        self.fetch_config().await.map(|_| ())
    }

    /// Current proxy configuration as reported by the management API.
    pub async fn fetch_config(&self) -> Result<Value, ProbeError> {
        let url = self.endpoint(MANAGEMENT_CONFIG_PATH)?;
        let response = self.client.get(url).send().await.map_err(|e| self.map_error(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProbeError::Status(status));
        }
        // Some proxies answer with an empty body.
        let body = response.bytes().await.map_err(|e| self.map_error(e))?;
        if body.is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_slice(&body).map_err(|e| ProbeError::Request(format!("invalid response body: {e}")))
    }

    fn endpoint(&self, path: &str) -> Result<Url, ProbeError> {
        self.base_url.join(path.trim_start_matches('/')).map_err(|e| ProbeError::InvalidUrl {
            url: self.base_url.to_string(),
            reason: e.to_string(),
        })
    }

    fn map_error(&self, e: reqwest::Error) -> ProbeError {
        if e.is_timeout() {
            ProbeError::Timeout(self.timeout.as_secs())
        } else {
            ProbeError::Request(error_chain(&e.without_url()))
        }
    }
}

/// Base URL with a trailing slash so joins keep any path prefix.
fn parse_base_url(raw: &str) -> Result<Url, ProbeError> {
    let trimmed = raw.trim();
    let with_slash = if trimmed.ends_with('/') {
        trimmed.to_string()
    } else {
        format!("{trimmed}/")
    };
    let url = Url::parse(&with_slash).map_err(|e| ProbeError::InvalidUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })?;
    if !matches!(url.scheme(), "http" | "https") || url.host().is_none() {
        return Err(ProbeError::InvalidUrl {
            url: raw.to_string(),
            reason: "expected an http(s) URL with a host".to_string(),
        });
    }
    Ok(url)
}

/// Error text including every source, e.g. `... tcp connect error: Connection refused`.
fn error_chain(e: &reqwest::Error) -> String {
    let mut message = e.to_string();
    let mut source = e.source();
    while let Some(inner) = source {
        let text = inner.to_string();
        if !message.contains(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        source = inner.source();
    }
    message
}
