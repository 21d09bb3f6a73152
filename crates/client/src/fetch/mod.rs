//! Network seam for the worker.
//!
//! ### Transport contract
//! - Non-2xx statuses are responses, not failures; only transport problems
//!   (connect, timeout, body read, size limit) are `NetworkFailure`s.
//! - The body is read completely before a response is returned.
//! - `CacheMode::NoStore` and `CacheMode::Reload` ask intermediaries for a
//!   fresh copy via `Cache-Control: no-cache`.
//!
//! ### Limits
//! - Max redirects: 5
//! - Max body bytes: 5MB (configurable)

pub mod url;

use async_trait::async_trait;
use reqwest::header::{self, HeaderValue};
use reqwest::{Client, StatusCode};
use std::time::{Duration, Instant};

pub use self::url::{UrlError, canonicalize, resolve};

use shellcache_core::{AppConfig, Error};

use crate::worker::{ResponseSource, WorkerRequest, WorkerResponse};

/// How a fetch should treat HTTP caches between the worker and the origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheMode {
    Default,
    /// Never reuse an intermediary copy (bypass and revalidation fetches).
    NoStore,
    /// Always go to the origin, used while precaching.
    Reload,
}

/// Transport-level failure.
#[derive(Debug, Clone, thiserror::Error)]
pub enum NetworkFailure {
    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("failed to read response body: {0}")]
    Body(String),

    #[error("response too large: {size} bytes exceeds {limit}")]
    TooLarge { size: u64, limit: usize },

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl From<reqwest::Error> for NetworkFailure {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            NetworkFailure::Timeout(err.to_string())
        } else if err.is_body() || err.is_decode() {
            NetworkFailure::Body(err.to_string())
        } else if err.is_builder() {
            NetworkFailure::InvalidRequest(err.to_string())
        } else {
            NetworkFailure::Connect(err.to_string())
        }
    }
}

/// Anything able to perform a request on the worker's behalf.
#[async_trait]
pub trait Network: Send + Sync {
    async fn fetch(&self, request: &WorkerRequest, mode: CacheMode) -> Result<WorkerResponse, NetworkFailure>;
}

/// Configuration for the fetch client.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// User agent string (default: "shellcache/0.1")
    pub user_agent: String,

    /// Maximum response body size in bytes (default: 5MB)
    pub max_bytes: usize,

    /// Request timeout (default: 20s)
    pub timeout: Duration,

    /// Maximum number of redirects to follow (default: 5)
    pub max_redirects: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: "shellcache/0.1".to_string(),
            max_bytes: 5 * 1024 * 1024,
            timeout: Duration::from_millis(20000),
            max_redirects: 5,
        }
    }
}

impl From<&AppConfig> for FetchConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            user_agent: config.user_agent.clone(),
            max_bytes: config.max_bytes,
            timeout: config.timeout(),
            ..Default::default()
        }
    }
}

/// HTTP client performing the worker's real network requests.
pub struct FetchClient {
    http: Client,
    config: FetchConfig,
}

impl FetchClient {
    /// Create a new fetch client with the given configuration.
    pub fn new(config: FetchConfig) -> Result<Self, Error> {
        let http = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .use_rustls_tls()
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()
            .map_err(|e| Error::NetworkFailure(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { http, config })
    }

    /// Get reference to the configuration.
    pub fn config(&self) -> &FetchConfig {
        &self.config
    }
}

#[async_trait]
impl Network for FetchClient {
    async fn fetch(&self, request: &WorkerRequest, mode: CacheMode) -> Result<WorkerResponse, NetworkFailure> {
        let start = Instant::now();

        let mut builder = self
            .http
            .request(request.method.clone(), request.url.clone())
            .headers(request.headers.clone());
        if mode != CacheMode::Default {
            builder = builder
                .header(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"))
                .header(header::PRAGMA, HeaderValue::from_static("no-cache"));
        }

        let response = builder.send().await?;
        let status: StatusCode = response.status();

        if let Some(len) = response.content_length()
            && len as usize > self.config.max_bytes
        {
            return Err(NetworkFailure::TooLarge { size: len, limit: self.config.max_bytes });
        }

        let final_url = response.url().clone();
        let headers = response.headers().clone();
        let body = response.bytes().await.map_err(|e| NetworkFailure::Body(e.to_string()))?;

        if body.len() > self.config.max_bytes {
            return Err(NetworkFailure::TooLarge { size: body.len() as u64, limit: self.config.max_bytes });
        }

        tracing::debug!(
            "fetched {} {} -> {} ({}) in {}ms ({} bytes)",
            request.method,
            request.url,
            final_url,
            status.as_u16(),
            start.elapsed().as_millis(),
            body.len()
        );

        Ok(WorkerResponse { url: final_url, status, headers, body, source: ResponseSource::Network })
    }
}
