//! SQLite-backed partitioned response cache.
//!
//! This module provides the storage layer of the worker: named partitions
//! holding complete captured responses keyed by request identity. It supports:
//!
//! - Request keys using SHA-256 hashing of method and URL
//! - Automatic schema migrations
//! - WAL mode for concurrent access
//! - Atomic whole-row replacement on put
//! - Whole-partition deletion for generation turnover

pub mod connection;
pub mod entries;
pub mod generation;
pub mod hash;
pub mod migrations;
pub mod store;

pub use crate::Error;

pub use connection::CacheDb;
pub use entries::{EntrySummary, StoredEntry};
pub use generation::Generation;
pub use store::CacheStore;
