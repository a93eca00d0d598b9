//! HTTP transport capability
//!
//! Every fetcher talks to the network through `HttpTransport`, so tests can swap
//! the reqwest-backed client for canned responses.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use tracing::{debug, warn};

use crate::config::HttpConfig;
use crate::error::ApiError;

/// Query parameters for a GET request
pub type QueryParams = Vec<(&'static str, String)>;

/// A completed HTTP exchange
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// HTTP status code
    pub status: u16,
    /// Parsed JSON body, or `Null` when the body was not JSON
    pub body: serde_json::Value,
    /// When the response was received
    pub timestamp: DateTime<Utc>,
    /// Name of the transport that produced the response
    pub source: String,
    /// Request URL (without query parameters)
    pub url: String,
}

impl HttpResponse {
    /// Whether the status is 2xx
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Capability for issuing GET requests
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Issues a GET request and returns the response, whatever its status
    ///
    /// Only transport-level failures are errors; an HTTP 404 is a response.
    async fn get(&self, url: &str, params: &QueryParams) -> Result<HttpResponse, ApiError>;

    /// Releases the transport. Subsequent requests fail.
    async fn close(&self);
}

/// `HttpTransport` backed by a shared `reqwest::Client`
#[derive(Debug)]
pub struct ReqwestTransport {
    client: Client,
    max_retries: u32,
    closed: AtomicBool,
}

impl ReqwestTransport {
    /// Creates a transport using the timeout, user agent and retry count from config
    pub fn new(config: &HttpConfig) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| ApiError::Generic(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self::with_client(client, config.max_retries))
    }

    /// Creates a transport around an existing client
    pub fn with_client(client: Client, max_retries: u32) -> Self {
        Self {
            client,
            max_retries,
            closed: AtomicBool::new(false),
        }
    }

    async fn send_once(&self, url: &str, params: &QueryParams) -> Result<HttpResponse, reqwest::Error> {
        let response = self.client.get(url).query(params).send().await?;
        let status = response.status().as_u16();
        let text = response.text().await?;
        let body = serde_json::from_str(&text).unwrap_or(serde_json::Value::Null);

        Ok(HttpResponse {
            status,
            body,
            timestamp: Utc::now(),
            source: "reqwest".to_string(),
            url: url.to_string(),
        })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn get(&self, url: &str, params: &QueryParams) -> Result<HttpResponse, ApiError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ApiError::Network("transport closed".to_string()));
        }

        let mut attempt = 0;
        loop {
            match self.send_once(url, params).await {
                Ok(response) => {
                    debug!(url, status = response.status, "HTTP GET completed");
                    return Ok(response);
                }
                Err(e) if attempt < self.max_retries && (e.is_timeout() || e.is_connect()) => {
                    attempt += 1;
                    warn!(url, attempt, error = %e, "HTTP GET failed, retrying");
                    tokio::time::sleep(Duration::from_millis(500 * u64::from(attempt))).await;
                }
                Err(e) => return Err(ApiError::from(e)),
            }
        }
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}
