//! Partitioned response entries.
//!
//! Each row is a complete captured response. A put replaces the whole row
//! in one statement, so concurrent writers for the same key never leave
//! headers from one response next to the body of another.

use std::collections::BTreeSet;

use super::connection::CacheDb;
use super::hash::compute_request_key;
use crate::Error;
use serde::{Deserialize, Serialize};
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite;

/// A stored response, keyed by request identity within a partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct StoredEntry {
    pub partition: String,
    pub key: String,
    pub method: String,
    pub url: String,
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    pub stored_at: String,
}

impl StoredEntry {
    /// Capture a response for `method url` into `partition`, stamped now.
    pub fn new(
        partition: impl Into<String>, method: &str, url: &str, status: u16, headers: Vec<(String, String)>,
        body: Vec<u8>,
    ) -> Self {
        Self {
            partition: partition.into(),
            key: compute_request_key(method, url),
            method: method.to_ascii_uppercase(),
            url: url.to_string(),
            status,
            headers,
            body,
            stored_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Only successful GET responses may be stored.
    pub fn is_storable(&self) -> bool {
        self.method == "GET" && (200..300).contains(&self.status)
    }
}

/// Entry metadata without the body, for inspection.
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct EntrySummary {
    pub url: String,
    pub method: String,
    pub status: u16,
    pub size: u64,
    pub stored_at: String,
}

impl CacheDb {
    /// Create a partition if it does not exist yet.
    pub async fn open_partition(&self, name: &str) -> Result<(), Error> {
        let name = name.to_string();
        let now = chrono::Utc::now().to_rfc3339();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT OR IGNORE INTO partitions (name, created_at) VALUES (?1, ?2)",
                    params![name, now],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Get an entry by request key.
    ///
    /// Returns None if the partition or the key doesn't exist.
    pub async fn get_entry(&self, partition: &str, key: &str) -> Result<Option<StoredEntry>, Error> {
        let partition = partition.to_string();
        let key = key.to_string();
        self.conn
            .call(move |conn| -> Result<Option<StoredEntry>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT partition, key, method, url, status, headers_json, body, stored_at
                     FROM entries WHERE partition = ?1 AND key = ?2",
                )?;

                let result = stmt.query_row(params![partition, key], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, i64>(4)?,
                        row.get::<_, String>(5)?,
                        row.get::<_, Vec<u8>>(6)?,
                        row.get::<_, String>(7)?,
                    ))
                });

                let (partition, key, method, url, status, headers_json, body, stored_at) = match result {
                    Ok(row) => row,
                    Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(None),
                    Err(e) => return Err(e.into()),
                };

                let status = u16::try_from(status).map_err(|_| Error::CorruptEntry(format!("status {status}")))?;
                let headers: Vec<(String, String)> = serde_json::from_str(&headers_json)?;

                Ok(Some(StoredEntry { partition, key, method, url, status, headers, body, stored_at }))
            })
            .await
            .map_err(Error::from)
    }

    /// Store an entry, replacing any previous entry for the same key.
    ///
    /// Non-GET requests and non-2xx responses are refused without touching
    /// the database, as are entries for a partition that is not open. A
    /// write never recreates a partition deleted by activation. The return
    /// value tells whether the entry was written.
    pub async fn put_entry(&self, entry: &StoredEntry) -> Result<bool, Error> {
        if !entry.is_storable() {
            tracing::debug!(
                method = %entry.method,
                status = entry.status,
                url = %entry.url,
                "refusing to store response"
            );
            return Ok(false);
        }

        let entry = entry.clone();
        let headers_json = serde_json::to_string(&entry.headers)?;
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let tx = conn.transaction()?;
                let written = tx.execute(
                    "INSERT INTO entries (
                        partition, key, method, url, status, headers_json, body, stored_at
                    )
                    SELECT ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8
                    WHERE EXISTS (SELECT 1 FROM partitions WHERE name = ?1)
                    ON CONFLICT(partition, key) DO UPDATE SET
                        method = excluded.method,
                        url = excluded.url,
                        status = excluded.status,
                        headers_json = excluded.headers_json,
                        body = excluded.body,
                        stored_at = excluded.stored_at",
                    params![
                        &entry.partition,
                        &entry.key,
                        &entry.method,
                        &entry.url,
                        entry.status as i64,
                        &headers_json,
                        &entry.body,
                        &entry.stored_at,
                    ],
                )?;
                tx.commit()?;
                if written == 0 {
                    tracing::debug!(partition = %entry.partition, url = %entry.url, "partition not open, write dropped");
                }
                Ok(written > 0)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete a partition and every entry in it.
    ///
    /// Returns false if the partition did not exist.
    pub async fn delete_partition(&self, name: &str) -> Result<bool, Error> {
        let name = name.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let tx = conn.transaction()?;
                tx.execute("DELETE FROM entries WHERE partition = ?1", params![&name])?;
                let deleted = tx.execute("DELETE FROM partitions WHERE name = ?1", params![&name])?;
                tx.commit()?;
                Ok(deleted > 0)
            })
            .await
            .map_err(Error::from)
    }

    /// Names of all existing partitions.
    pub async fn partition_names(&self) -> Result<BTreeSet<String>, Error> {
        self.conn
            .call(|conn| -> Result<BTreeSet<String>, Error> {
                let mut stmt = conn.prepare("SELECT name FROM partitions")?;
                let names = stmt
                    .query_map([], |row| row.get::<_, String>(0))?
                    .collect::<Result<BTreeSet<_>, _>>()?;
                Ok(names)
            })
            .await
            .map_err(Error::from)
    }

    /// List entries in a partition, ordered by URL.
    pub async fn partition_entries(&self, name: &str) -> Result<Vec<EntrySummary>, Error> {
        let name = name.to_string();
        self.conn
            .call(move |conn| -> Result<Vec<EntrySummary>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT url, method, status, LENGTH(body), stored_at
                     FROM entries WHERE partition = ?1 ORDER BY url",
                )?;
                let rows = stmt
                    .query_map(params![name], |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, i64>(2)?,
                            row.get::<_, i64>(3)?,
                            row.get::<_, String>(4)?,
                        ))
                    })?
                    .collect::<Result<Vec<_>, _>>()?;

                rows.into_iter()
                    .map(|(url, method, status, size, stored_at)| -> Result<EntrySummary, Error> {
                        let status =
                            u16::try_from(status).map_err(|_| Error::CorruptEntry(format!("status {status} for {url}")))?;
                        let size = u64::try_from(size).map_err(|_| Error::CorruptEntry(format!("size {size} for {url}")))?;
                        Ok(EntrySummary { url, method, status, size, stored_at })
                    })
                    .collect()
            })
            .await
            .map_err(Error::from)
    }
}
