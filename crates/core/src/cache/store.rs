//! Storage seam used by the worker.

use std::collections::BTreeSet;

use async_trait::async_trait;

use super::connection::CacheDb;
use super::entries::{EntrySummary, StoredEntry};
use crate::Error;

/// Partitioned key-value storage for captured responses.
///
/// Holds no policy: callers decide what to store and when. Implementations
/// must refuse non-GET or non-2xx entries without corrupting state, and a
/// put must replace an entry atomically.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Create the named partition if absent.
    async fn open_partition(&self, name: &str) -> Result<(), Error>;

    /// Look up an entry by request key.
    async fn get_entry(&self, partition: &str, key: &str) -> Result<Option<StoredEntry>, Error>;

    /// Store an entry; returns false when it was refused.
    async fn put_entry(&self, entry: &StoredEntry) -> Result<bool, Error>;

    /// Remove a partition with all its entries.
    async fn delete_partition(&self, name: &str) -> Result<bool, Error>;

    /// Names of every existing partition.
    async fn partition_names(&self) -> Result<BTreeSet<String>, Error>;

    /// Entry metadata for a partition.
    async fn partition_entries(&self, name: &str) -> Result<Vec<EntrySummary>, Error>;
}

#[async_trait]
impl CacheStore for CacheDb {
    async fn open_partition(&self, name: &str) -> Result<(), Error> {
        CacheDb::open_partition(self, name).await
    }

    async fn get_entry(&self, partition: &str, key: &str) -> Result<Option<StoredEntry>, Error> {
        CacheDb::get_entry(self, partition, key).await
    }

    async fn put_entry(&self, entry: &StoredEntry) -> Result<bool, Error> {
        CacheDb::put_entry(self, entry).await
    }

    async fn delete_partition(&self, name: &str) -> Result<bool, Error> {
        CacheDb::delete_partition(self, name).await
    }

    async fn partition_names(&self) -> Result<BTreeSet<String>, Error> {
        CacheDb::partition_names(self).await
    }

    async fn partition_entries(&self, name: &str) -> Result<Vec<EntrySummary>, Error> {
        CacheDb::partition_entries(self, name).await
    }
}
