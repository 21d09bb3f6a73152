//! cache_get tool implementation.
//!
//! Retrieves the stored response for a request in one partition.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use shellcache_client::{ServiceWorker, WorkerRequest};
use shellcache_core::Error;

use crate::tools::json_result;

/// Parameters for the cache_get tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheGetParams {
    /// Absolute URL of the cached request.
    pub url: String,

    /// Partition to read (default: the current generation's main partition).
    #[serde(default)]
    pub partition: Option<String>,
}

/// Output from the cache_get tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheGetOutput {
    pub partition: String,
    pub url: String,
    pub status: u16,
    pub headers: Vec<(String, String)>,
    /// Body decoded as lossy UTF-8.
    pub body: String,
    pub size: usize,
    pub stored_at: String,
}

/// Implementation of the cache_get tool.
pub async fn get_impl(worker: &ServiceWorker, params: CacheGetParams) -> Result<CallToolResult, McpError> {
    let request = WorkerRequest::from_parts("GET", &params.url, [])?;
    let partition = params
        .partition
        .unwrap_or_else(|| worker.generation().main_partition().to_string());

    let entry = worker
        .store()
        .get_entry(&partition, &request.cache_key())
        .await?
        .ok_or_else(|| Error::CacheMiss(format!("{} in {partition}", request.url)))?;

    let output = CacheGetOutput {
        partition: entry.partition,
        url: entry.url,
        status: entry.status,
        headers: entry.headers,
        size: entry.body.len(),
        body: String::from_utf8_lossy(&entry.body).into_owned(),
        stored_at: entry.stored_at,
    };
    json_result(&output)
}
