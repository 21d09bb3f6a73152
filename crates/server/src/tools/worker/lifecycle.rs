//! worker_install and worker_activate tool implementations.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use shellcache_client::ServiceWorker;
use shellcache_core::Error;

use crate::tools::json_result;

/// Implementation of the worker_install tool.
pub async fn install_impl(worker: &ServiceWorker) -> Result<CallToolResult, McpError> {
    let report = worker.install().await.map_err(Error::from)?;
    json_result(&report)
}

/// Implementation of the worker_activate tool.
pub async fn activate_impl(worker: &ServiceWorker) -> Result<CallToolResult, McpError> {
    let report = worker.activate().await.map_err(Error::from)?;
    json_result(&report)
}
