//! cache_generations tool implementation.
//!
//! Lists partitions alongside the generation that currently owns the cache.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use serde::Serialize;
use shellcache_client::{LifecycleState, ServiceWorker};

use crate::tools::json_result;

#[derive(Debug, Clone, Serialize)]
pub struct PartitionInfo {
    pub name: String,
    pub entries: usize,
    pub bytes: u64,
    /// Owned by the current generation; anything else is removed on activation.
    pub current: bool,
}

/// Output from the cache_generations tool.
#[derive(Debug, Clone, Serialize)]
pub struct CacheGenerationsOutput {
    pub generation: String,
    pub main_partition: String,
    pub data_partition: String,
    pub state: LifecycleState,
    pub partitions: Vec<PartitionInfo>,
}

/// Implementation of the cache_generations tool.
pub async fn generations_impl(worker: &ServiceWorker) -> Result<CallToolResult, McpError> {
    let generation = worker.generation();
    let store = worker.store();

    let mut partitions = Vec::new();
    for name in store.partition_names().await? {
        let entries = store.partition_entries(&name).await?;
        partitions.push(PartitionInfo {
            current: generation.owns(&name),
            entries: entries.len(),
            bytes: entries.iter().map(|e| e.size).sum(),
            name,
        });
    }

    let output = CacheGenerationsOutput {
        generation: generation.version().to_string(),
        main_partition: generation.main_partition().to_string(),
        data_partition: generation.data_partition(),
        state: worker.state().await,
        partitions,
    };
    json_result(&output)
}
