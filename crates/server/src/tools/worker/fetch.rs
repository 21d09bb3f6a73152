//! worker_fetch tool implementation.
//!
//! Delivers one fetch event to the worker and reports how it was answered.

use std::collections::BTreeMap;

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use shellcache_client::worker::ResponseSource;
use shellcache_client::{FetchDisposition, RouteClass, ServiceWorker, WorkerRequest};
use shellcache_core::Error;

use crate::tools::json_result;

/// Input parameters for worker_fetch tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct WorkerFetchParams {
    /// Absolute URL requested by the page.
    pub url: String,

    /// HTTP method (default: GET). Only GET requests are intercepted.
    #[serde(default = "default_method")]
    pub method: String,

    /// Whether the request is a top-level page navigation.
    #[serde(default)]
    pub navigate: bool,

    /// Request headers.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    /// Wait for background revalidation and cache writes before returning.
    #[serde(default)]
    pub settle: bool,
}

fn default_method() -> String {
    "GET".into()
}

/// Output structure for worker_fetch tool.
#[derive(Debug, Clone, Serialize)]
pub struct WorkerFetchOutput {
    /// False when the worker left the request to the page's network stack.
    pub intercepted: bool,
    pub route: Option<RouteClass>,
    pub status: Option<u16>,
    pub source: Option<ResponseSource>,
    pub content_type: Option<String>,
    pub headers: Vec<(String, String)>,
    /// Body decoded as lossy UTF-8.
    pub body: Option<String>,
    pub body_bytes: usize,
    /// RFC 3339 time the response was produced.
    pub served_at: String,
}

/// Implementation of the worker_fetch tool.
pub async fn fetch_impl(worker: &ServiceWorker, params: WorkerFetchParams) -> Result<CallToolResult, McpError> {
    if params.url.trim().is_empty() {
        return Err(Error::InvalidInput("url cannot be empty".into()).into());
    }

    let request = WorkerRequest::from_parts(
        &params.method,
        &params.url,
        params.headers.iter().map(|(k, v)| (k.as_str(), v.as_str())),
    )?
    .with_navigate(params.navigate);

    let disposition = worker.handle_fetch(&request).await.map_err(Error::from);
    if params.settle {
        worker.settle().await;
    }
    let served_at = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true);

    let output = match disposition? {
        FetchDisposition::Ignored => WorkerFetchOutput {
            intercepted: false,
            route: None,
            status: None,
            source: None,
            content_type: None,
            headers: Vec::new(),
            body: None,
            body_bytes: 0,
            served_at,
        },
        FetchDisposition::Responded { route, response } => WorkerFetchOutput {
            intercepted: true,
            route: Some(route),
            status: Some(response.status.as_u16()),
            source: Some(response.source),
            content_type: response.content_type().map(str::to_string),
            headers: response.header_pairs(),
            body: Some(String::from_utf8_lossy(&response.body).into_owned()),
            body_bytes: response.body.len(),
            served_at,
        },
    };

    tracing::debug!(url = %request.url, intercepted = output.intercepted, status = ?output.status, "fetch delivered");
    json_result(&output)
}
