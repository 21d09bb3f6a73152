//! Test doubles for the network and store seams.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::StatusCode;
use reqwest::header::{self, HeaderMap, HeaderValue};
use shellcache_core::{CacheDb, CacheStore, EntrySummary, Error, StoredEntry};
use tokio::sync::Semaphore;

use super::request::{ResponseSource, WorkerRequest, WorkerResponse};
use crate::fetch::{CacheMode, Network, NetworkFailure};

pub(crate) const ORIGIN: &str = "https://portal.example";
pub(crate) const SHEET_URL: &str = "https://docs.google.com/spreadsheets/d/e/2PACX/pub?gid=0&single=true&output=csv";

#[derive(Clone)]
enum Scripted {
    Respond { status: u16, body: Bytes },
    Fail,
    Panic,
}

/// Network double answering from per-URL scripts.
///
/// Each URL has a queue of outcomes; the last one repeats forever. URLs
/// without a script fail like an unplugged cable. A held URL blocks each
/// fetch until `release` hands out a permit.
#[derive(Default)]
pub(crate) struct ScriptedNetwork {
    scripts: Mutex<HashMap<String, VecDeque<Scripted>>>,
    calls: Mutex<Vec<(String, CacheMode)>>,
    gates: Mutex<HashMap<String, Arc<Semaphore>>>,
}

impl ScriptedNetwork {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn push(&self, url: &str, outcome: Scripted) {
        self.scripts
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default()
            .push_back(outcome);
    }

    pub(crate) fn respond(&self, url: &str, status: u16, body: &str) {
        self.push(url, Scripted::Respond { status, body: Bytes::copy_from_slice(body.as_bytes()) });
    }

    pub(crate) fn fail(&self, url: &str) {
        self.push(url, Scripted::Fail);
    }

    pub(crate) fn panic_on(&self, url: &str) {
        self.push(url, Scripted::Panic);
    }

    /// Block fetches of `url` until released.
    pub(crate) fn hold(&self, url: &str) {
        self.gates
            .lock()
            .unwrap()
            .insert(url.to_string(), Arc::new(Semaphore::new(0)));
    }

    /// Let `n` held fetches of `url` proceed.
    pub(crate) fn release(&self, url: &str, n: usize) {
        if let Some(gate) = self.gates.lock().unwrap().get(url) {
            gate.add_permits(n);
        }
    }

    pub(crate) fn calls(&self, url: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|(u, _)| u == url).count()
    }

    pub(crate) fn modes(&self, url: &str) -> Vec<CacheMode> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(u, _)| u == url)
            .map(|(_, m)| *m)
            .collect()
    }

    fn next(&self, url: &str) -> Option<Scripted> {
        let mut scripts = self.scripts.lock().unwrap();
        let queue = scripts.get_mut(url)?;
        if queue.len() > 1 { queue.pop_front() } else { queue.front().cloned() }
    }
}

#[async_trait]
impl Network for ScriptedNetwork {
    async fn fetch(&self, request: &WorkerRequest, mode: CacheMode) -> Result<WorkerResponse, NetworkFailure> {
        let url = request.url.as_str().to_string();
        self.calls.lock().unwrap().push((url.clone(), mode));

        let gate = self.gates.lock().unwrap().get(&url).cloned();
        if let Some(gate) = gate {
            gate.acquire().await.unwrap().forget();
        }

        match self.next(&url) {
            Some(Scripted::Respond { status, body }) => {
                let mut headers = HeaderMap::new();
                headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));
                headers.insert("x-body-len", HeaderValue::from(body.len()));
                Ok(WorkerResponse {
                    url: request.url.clone(),
                    status: StatusCode::from_u16(status).unwrap(),
                    headers,
                    body,
                    source: ResponseSource::Network,
                })
            }
            Some(Scripted::Panic) => panic!("scripted network panic for {url}"),
            Some(Scripted::Fail) | None => Err(NetworkFailure::Connect(format!("offline: {url}"))),
        }
    }
}

/// Store wrapper whose reads or writes can be made to fail.
pub(crate) struct FlakyStore {
    pub(crate) inner: CacheDb,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl FlakyStore {
    pub(crate) async fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: CacheDb::open_in_memory().await.unwrap(),
            fail_reads: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
        })
    }

    pub(crate) fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl CacheStore for FlakyStore {
    async fn open_partition(&self, name: &str) -> Result<(), Error> {
        self.inner.open_partition(name).await
    }

    async fn get_entry(&self, partition: &str, key: &str) -> Result<Option<StoredEntry>, Error> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(Error::CorruptEntry(format!("unreadable entry {key}")));
        }
        self.inner.get_entry(partition, key).await
    }

    async fn put_entry(&self, entry: &StoredEntry) -> Result<bool, Error> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::CorruptEntry("disk full".into()));
        }
        self.inner.put_entry(entry).await
    }

    async fn delete_partition(&self, name: &str) -> Result<bool, Error> {
        self.inner.delete_partition(name).await
    }

    async fn partition_names(&self) -> Result<BTreeSet<String>, Error> {
        self.inner.partition_names().await
    }

    async fn partition_entries(&self, name: &str) -> Result<Vec<EntrySummary>, Error> {
        self.inner.partition_entries(name).await
    }
}

pub(crate) fn get(url: &str) -> WorkerRequest {
    WorkerRequest::new(reqwest::Method::GET, url).unwrap()
}

pub(crate) fn navigate(url: &str) -> WorkerRequest {
    get(url).with_navigate(true)
}
