//! Cache inspection MCP tools.
//!
//! This module provides read-only views of the worker's partitioned store.

pub mod generations;
pub mod get;

pub use generations::{CacheGenerationsOutput, PartitionInfo, generations_impl};
pub use get::{CacheGetOutput, CacheGetParams, get_impl};
