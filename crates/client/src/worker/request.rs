//! Requests seen by the worker and the responses it answers with.

use std::borrow::Cow;

use bytes::Bytes;
use reqwest::header::{self, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, StatusCode};
use serde::Serialize;
use shellcache_core::{Error, StoredEntry};
use url::Url;

use crate::fetch::url::{UrlError, canonicalize};

/// An intercepted request.
#[derive(Debug, Clone)]
pub struct WorkerRequest {
    pub method: Method,
    /// Canonical URL (fragment removed, host lowercased).
    pub url: Url,
    /// Top-level page navigation rather than a sub-resource load.
    pub navigate: bool,
    pub headers: HeaderMap,
}

impl WorkerRequest {
    /// Build a request from a raw URL string, canonicalizing it.
    pub fn new(method: Method, url: &str) -> Result<Self, UrlError> {
        Ok(Self { method, url: canonicalize(url)?, navigate: false, headers: HeaderMap::new() })
    }

    /// Build a request from wire-level parts as delivered by the host.
    pub fn from_parts<'a>(
        method: &str, url: &str, headers: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Result<Self, Error> {
        let method = Method::from_bytes(method.trim().to_ascii_uppercase().as_bytes())
            .map_err(|_| Error::InvalidInput(format!("invalid method: {method}")))?;
        let mut request = Self::new(method, url).map_err(|e| Error::InvalidUrl(e.to_string()))?;
        for (name, value) in headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| Error::InvalidInput(format!("invalid header name: {name}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|_| Error::InvalidInput(format!("invalid value for header {name}")))?;
            request.headers.append(name, value);
        }
        Ok(request)
    }

    /// A GET sub-resource request for an already canonical URL.
    pub fn get(mut url: Url) -> Self {
        url.set_fragment(None);
        Self { method: Method::GET, url, navigate: false, headers: HeaderMap::new() }
    }

    pub fn with_navigate(mut self, navigate: bool) -> Self {
        self.navigate = navigate;
        self
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn is_get(&self) -> bool {
        self.method == Method::GET
    }

    /// Storage key: method plus full URL including the query string.
    pub fn cache_key(&self) -> String {
        shellcache_core::cache::hash::compute_request_key(self.method.as_str(), self.url.as_str())
    }

    /// First value of a query parameter.
    pub fn query_param(&self, name: &str) -> Option<Cow<'_, str>> {
        self.url.query_pairs().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    pub fn is_same_origin(&self, origin: &Url) -> bool {
        self.url.origin() == origin.origin()
    }
}

/// Where a response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseSource {
    Network,
    Cache,
    /// The generic offline document served in place of the requested page.
    OfflineDocument,
    /// Generated by the worker itself (e.g. the 504 offline response).
    Synthetic,
}

/// A fully read response.
///
/// The body is always complete; a response is only constructed after the
/// transport finished reading it, so storing one never captures a partial
/// body.
#[derive(Debug, Clone)]
pub struct WorkerResponse {
    pub url: Url,
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub source: ResponseSource,
}

impl WorkerResponse {
    /// 2xx status.
    pub fn is_ok(&self) -> bool {
        self.status.is_success()
    }

    /// Synthetic gateway-timeout response used when an asset is neither
    /// reachable nor cached.
    pub fn unavailable(url: Url) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
        Self {
            url,
            status: StatusCode::GATEWAY_TIMEOUT,
            headers,
            body: Bytes::from_static(b"Offline"),
            source: ResponseSource::Synthetic,
        }
    }

    pub fn with_source(mut self, source: ResponseSource) -> Self {
        self.source = source;
        self
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers.get(header::CONTENT_TYPE).and_then(|v| v.to_str().ok())
    }

    /// Headers as text pairs; values that are not visible ASCII are skipped.
    pub fn header_pairs(&self) -> Vec<(String, String)> {
        self.headers
            .iter()
            .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str().to_string(), v.to_string())))
            .collect()
    }

    /// Capture this response as a stored entry for `request`.
    pub fn to_entry(&self, partition: &str, request: &WorkerRequest) -> StoredEntry {
        StoredEntry::new(
            partition,
            request.method.as_str(),
            request.url.as_str(),
            self.status.as_u16(),
            self.header_pairs(),
            self.body.to_vec(),
        )
    }

    /// Rebuild a response from a stored entry.
    ///
    /// Header pairs that are no longer valid are dropped; an unparseable URL
    /// or status marks the entry as corrupt.
    pub fn from_entry(entry: StoredEntry) -> Result<Self, Error> {
        let url = Url::parse(&entry.url).map_err(|e| Error::CorruptEntry(format!("url {}: {e}", entry.url)))?;
        let status =
            StatusCode::from_u16(entry.status).map_err(|_| Error::CorruptEntry(format!("status {}", entry.status)))?;

        let mut headers = HeaderMap::new();
        for (name, value) in &entry.headers {
            if let (Ok(name), Ok(value)) = (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(value)) {
                headers.append(name, value);
            }
        }

        Ok(Self { url, status, headers, body: Bytes::from(entry.body), source: ResponseSource::Cache })
    }
}
