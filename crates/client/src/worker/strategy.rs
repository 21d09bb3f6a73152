//! Fetch/cache strategies.
//!
//! Every strategy takes the partition it works on as an argument; the
//! engine itself holds no notion of a current generation. Cache writes are
//! spawned as background tasks so they never delay or alter the response
//! already chosen for the caller.

use std::sync::Arc;

use shellcache_core::CacheStore;
use tokio::sync::oneshot;
use url::Url;

use super::background::BackgroundTasks;
use super::error::WorkerError;
use super::request::{ResponseSource, WorkerRequest, WorkerResponse};
use crate::fetch::{CacheMode, Network, NetworkFailure};

/// Executes strategies against a store and a network.
#[derive(Clone)]
pub struct StrategyEngine {
    store: Arc<dyn CacheStore>,
    network: Arc<dyn Network>,
    background: BackgroundTasks,
}

impl StrategyEngine {
    pub fn new(store: Arc<dyn CacheStore>, network: Arc<dyn Network>) -> Self {
        Self { store, network, background: BackgroundTasks::new() }
    }

    pub fn store(&self) -> &Arc<dyn CacheStore> {
        &self.store
    }

    pub fn network(&self) -> &Arc<dyn Network> {
        &self.network
    }

    /// Wait for outstanding revalidations and cache writes.
    pub async fn settle(&self) {
        self.background.settle().await;
    }

    /// Network only, bypassing every cache.
    pub async fn network_only(&self, request: &WorkerRequest) -> Result<WorkerResponse, WorkerError> {
        Ok(self.network.fetch(request, CacheMode::NoStore).await?)
    }

    /// Plain network fetch with no cache involvement.
    pub async fn passthrough(&self, request: &WorkerRequest) -> Result<WorkerResponse, WorkerError> {
        Ok(self.network.fetch(request, CacheMode::Default).await?)
    }

    /// Serve the cached entry if any, and refresh it in the background.
    ///
    /// Without a cached entry the caller waits for the refresh and sees its
    /// result, failure included. The refresh runs in its own task and keeps
    /// populating the cache even if the caller stops waiting.
    pub async fn stale_while_revalidate(
        &self, request: &WorkerRequest, partition: &str,
    ) -> Result<WorkerResponse, WorkerError> {
        let cached = match self.lookup(partition, request).await {
            Ok(cached) => cached,
            Err(e) => {
                tracing::warn!(url = %request.url, "treating unreadable cache entry as a miss: {e}");
                None
            }
        };

        let (tx, rx) = oneshot::channel();
        let network = self.network.clone();
        let store = self.store.clone();
        let partition_name = partition.to_string();
        let revalidate = request.clone();
        self.background
            .spawn(async move {
                let result = network.fetch(&revalidate, CacheMode::NoStore).await;
                let fresh = result.as_ref().ok().filter(|r| r.is_ok()).cloned();
                // receiver is gone when a cached copy was served or the caller left
                let _ = tx.send(result);
                if let Some(fresh) = fresh {
                    write_entry(store.as_ref(), &partition_name, &revalidate, &fresh).await;
                }
            })
            .await;

        if let Some(cached) = cached {
            tracing::debug!(url = %request.url, "serving stale copy while revalidating");
            return Ok(cached);
        }

        match rx.await {
            Ok(result) => Ok(result?),
            Err(_) => Err(WorkerError::Panicked(format!("revalidation of {} aborted", request.url))),
        }
    }

    /// Network first, then the cached copy of this request, then the
    /// offline document.
    pub async fn network_first(
        &self, request: &WorkerRequest, partition: &str, offline_document: &Url,
    ) -> Result<WorkerResponse, WorkerError> {
        let cause = match self.network.fetch(request, CacheMode::Default).await {
            Ok(fresh) => {
                if fresh.is_ok() {
                    self.commit(partition, request, &fresh).await;
                }
                return Ok(fresh);
            }
            Err(failure) => failure,
        };

        tracing::warn!(url = %request.url, "navigation fetch failed, falling back to cache: {cause}");

        if let Some(cached) = self.lookup(partition, request).await? {
            return Ok(cached);
        }

        let offline = WorkerRequest::get(offline_document.clone());
        if let Some(document) = self.lookup(partition, &offline).await? {
            return Ok(document.with_source(ResponseSource::OfflineDocument));
        }

        Err(WorkerError::StoreMiss { url: request.url.to_string(), cause })
    }

    /// Cache first; on a miss fetch and store same-origin successes. A
    /// network failure yields the last known copy or a synthetic 504.
    pub async fn cache_first(
        &self, request: &WorkerRequest, partition: &str, origin: &Url,
    ) -> Result<WorkerResponse, WorkerError> {
        match self.lookup(partition, request).await {
            Ok(Some(cached)) => {
                tracing::debug!(url = %request.url, "cache hit");
                return Ok(cached);
            }
            Ok(None) => tracing::debug!(url = %request.url, "cache miss"),
            Err(e) => tracing::warn!(url = %request.url, "treating unreadable cache entry as a miss: {e}"),
        }

        match self.network.fetch(request, CacheMode::Default).await {
            Ok(fresh) => {
                if fresh.is_ok() && request.is_get() && request.is_same_origin(origin) {
                    self.commit(partition, request, &fresh).await;
                }
                Ok(fresh)
            }
            Err(failure) => Ok(self.last_known_or_unavailable(partition, request, &failure).await),
        }
    }

    async fn last_known_or_unavailable(
        &self, partition: &str, request: &WorkerRequest, failure: &NetworkFailure,
    ) -> WorkerResponse {
        match self.lookup(partition, request).await {
            Ok(Some(cached)) => cached,
            Ok(None) | Err(_) => {
                tracing::warn!(url = %request.url, "asset unavailable offline: {failure}");
                WorkerResponse::unavailable(request.url.clone())
            }
        }
    }

    /// Read the stored response for `request` in `partition`.
    pub async fn lookup(
        &self, partition: &str, request: &WorkerRequest,
    ) -> Result<Option<WorkerResponse>, WorkerError> {
        let entry = self.store.get_entry(partition, &request.cache_key()).await?;
        Ok(entry.map(WorkerResponse::from_entry).transpose()?)
    }

    /// Store `response` for `request` without blocking the caller.
    async fn commit(&self, partition: &str, request: &WorkerRequest, response: &WorkerResponse) {
        let store = self.store.clone();
        let partition = partition.to_string();
        let request = request.clone();
        let response = response.clone();
        self.background
            .spawn(async move { write_entry(store.as_ref(), &partition, &request, &response).await })
            .await;
    }
}

/// Best-effort write; failures are logged and otherwise ignored.
pub(crate) async fn write_entry(
    store: &dyn CacheStore, partition: &str, request: &WorkerRequest, response: &WorkerResponse,
) {
    if !request.is_get() {
        return;
    }
    let entry = response.to_entry(partition, request);
    match store.put_entry(&entry).await {
        Ok(true) => tracing::debug!(url = %request.url, partition, "cached response"),
        Ok(false) => {}
        Err(e) => tracing::warn!(url = %request.url, partition, "cache write failed: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worker::testing::{FlakyStore, ORIGIN, SHEET_URL, ScriptedNetwork, get, navigate};
    use reqwest::StatusCode;
    use shellcache_core::CacheDb;

    const MAIN: &str = "v1";
    const DATA: &str = "v1-csv";

    async fn engine() -> (StrategyEngine, Arc<ScriptedNetwork>, Arc<CacheDb>) {
        let network = ScriptedNetwork::new();
        let store = Arc::new(CacheDb::open_in_memory().await.unwrap());
        store.open_partition(MAIN).await.unwrap();
        store.open_partition(DATA).await.unwrap();
        (StrategyEngine::new(store.clone(), network.clone()), network, store)
    }

    fn origin() -> Url {
        Url::parse(ORIGIN).unwrap()
    }

    fn offline_document() -> Url {
        Url::parse(&format!("{ORIGIN}/index.html")).unwrap()
    }

    async fn seed(engine: &StrategyEngine, partition: &str, url: &str, body: &str) {
        let request = get(url);
        let response = WorkerResponse {
            url: request.url.clone(),
            status: StatusCode::OK,
            headers: Default::default(),
            body: bytes::Bytes::copy_from_slice(body.as_bytes()),
            source: ResponseSource::Network,
        };
        write_entry(engine.store().as_ref(), partition, &request, &response).await;
    }

    #[tokio::test]
    async fn test_network_only_propagates_failure() {
        let (engine, network, _) = engine().await;
        let url = format!("{ORIGIN}/api/session");

        let result = engine.network_only(&get(&url)).await;
        assert!(matches!(result, Err(WorkerError::Network(NetworkFailure::Connect(_)))));
        assert_eq!(network.modes(&url), vec![CacheMode::NoStore]);
    }

    #[tokio::test]
    async fn test_network_only_returns_error_status_verbatim() {
        let (engine, network, store) = engine().await;
        let url = format!("{ORIGIN}/api/session");
        network.respond(&url, 403, "{\"error\":\"domain\"}");

        let response = engine.network_only(&get(&url)).await.unwrap();
        engine.settle().await;
        assert_eq!(response.status, StatusCode::FORBIDDEN);
        assert!(store.partition_entries(MAIN).await.unwrap().is_empty());
        assert!(store.partition_entries(DATA).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_swr_miss_waits_for_network_and_stores() {
        let (engine, network, _) = engine().await;
        network.respond(SHEET_URL, 200, "name,link\nA,https://a");

        let response = engine.stale_while_revalidate(&get(SHEET_URL), DATA).await.unwrap();
        assert_eq!(response.source, ResponseSource::Network);
        assert_eq!(&response.body[..], b"name,link\nA,https://a");

        engine.settle().await;
        let cached = engine.lookup(DATA, &get(SHEET_URL)).await.unwrap().unwrap();
        assert_eq!(cached.body, response.body);
        assert_eq!(network.modes(SHEET_URL), vec![CacheMode::NoStore]);
    }

    #[tokio::test]
    async fn test_swr_miss_and_network_failure_surfaces_failure() {
        let (engine, _, _) = engine().await;
        let result = engine.stale_while_revalidate(&get(SHEET_URL), DATA).await;
        assert!(matches!(result, Err(WorkerError::Network(_))));
    }

    #[tokio::test]
    async fn test_swr_serves_stale_without_waiting() {
        let (engine, network, _) = engine().await;
        seed(&engine, DATA, SHEET_URL, "old").await;
        network.hold(SHEET_URL);
        network.respond(SHEET_URL, 200, "new");

        let response = engine.stale_while_revalidate(&get(SHEET_URL), DATA).await.unwrap();
        assert_eq!(response.source, ResponseSource::Cache);
        assert_eq!(&response.body[..], b"old");

        network.release(SHEET_URL, 1);
        engine.settle().await;
        let refreshed = engine.lookup(DATA, &get(SHEET_URL)).await.unwrap().unwrap();
        assert_eq!(&refreshed.body[..], b"new");
    }

    #[tokio::test]
    async fn test_swr_failed_revalidation_keeps_stale_entry() {
        let (engine, network, _) = engine().await;
        seed(&engine, DATA, SHEET_URL, "old").await;
        network.respond(SHEET_URL, 500, "oops");

        let response = engine.stale_while_revalidate(&get(SHEET_URL), DATA).await.unwrap();
        engine.settle().await;
        assert_eq!(&response.body[..], b"old");

        let still = engine.lookup(DATA, &get(SHEET_URL)).await.unwrap().unwrap();
        assert_eq!(&still.body[..], b"old");
    }

    #[tokio::test]
    async fn test_swr_overlapping_revalidations_leave_consistent_entry() {
        let (engine, network, _) = engine().await;
        seed(&engine, DATA, SHEET_URL, "seed").await;
        network.respond(SHEET_URL, 200, "first");
        network.respond(SHEET_URL, 200, "second-longer");

        let request = get(SHEET_URL);
        let (a, b) = tokio::join!(
            engine.stale_while_revalidate(&request, DATA),
            engine.stale_while_revalidate(&request, DATA)
        );
        assert_eq!(&a.unwrap().body[..], b"seed");
        assert_eq!(&b.unwrap().body[..], b"seed");

        engine.settle().await;
        let stored = engine.lookup(DATA, &request).await.unwrap().unwrap();
        let len = stored.headers.get("x-body-len").unwrap().to_str().unwrap();
        assert_eq!(len, stored.body.len().to_string());
    }

    #[tokio::test]
    async fn test_swr_caller_drop_still_populates_cache() {
        let (engine, network, _) = engine().await;
        network.hold(SHEET_URL);
        network.respond(SHEET_URL, 200, "late");

        let request = get(SHEET_URL);
        let pending = tokio::time::timeout(
            std::time::Duration::from_millis(20),
            engine.stale_while_revalidate(&request, DATA),
        )
        .await;
        assert!(pending.is_err());

        network.release(SHEET_URL, 1);
        engine.settle().await;
        let cached = engine.lookup(DATA, &request).await.unwrap().unwrap();
        assert_eq!(&cached.body[..], b"late");
    }

    #[tokio::test]
    async fn test_network_first_success_writes_cache() {
        let (engine, network, _) = engine().await;
        let url = format!("{ORIGIN}/prof/");
        network.respond(&url, 200, "<h1>prof</h1>");

        let response = engine.network_first(&navigate(&url), MAIN, &offline_document()).await.unwrap();
        assert_eq!(response.source, ResponseSource::Network);

        engine.settle().await;
        assert!(engine.lookup(MAIN, &get(&url)).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_network_first_does_not_cache_error_status() {
        let (engine, network, _) = engine().await;
        let url = format!("{ORIGIN}/missing/");
        network.respond(&url, 404, "not found");

        let response = engine.network_first(&navigate(&url), MAIN, &offline_document()).await.unwrap();
        engine.settle().await;
        assert_eq!(response.status, StatusCode::NOT_FOUND);
        assert!(engine.lookup(MAIN, &get(&url)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_network_first_falls_back_to_same_request() {
        let (engine, _, _) = engine().await;
        let url = format!("{ORIGIN}/prof/");
        seed(&engine, MAIN, &url, "cached prof").await;
        seed(&engine, MAIN, offline_document().as_str(), "shell").await;

        let response = engine.network_first(&navigate(&url), MAIN, &offline_document()).await.unwrap();
        assert_eq!(response.source, ResponseSource::Cache);
        assert_eq!(&response.body[..], b"cached prof");
    }

    #[tokio::test]
    async fn test_network_first_falls_back_to_offline_document() {
        let (engine, _, _) = engine().await;
        seed(&engine, MAIN, offline_document().as_str(), "shell").await;

        let url = format!("{ORIGIN}/never-visited/");
        let response = engine.network_first(&navigate(&url), MAIN, &offline_document()).await.unwrap();
        assert_eq!(response.source, ResponseSource::OfflineDocument);
        assert_eq!(&response.body[..], b"shell");
    }

    #[tokio::test]
    async fn test_network_first_store_miss_when_nothing_cached() {
        let (engine, _, _) = engine().await;
        let url = format!("{ORIGIN}/prof/");
        let result = engine.network_first(&navigate(&url), MAIN, &offline_document()).await;
        assert!(matches!(result, Err(WorkerError::StoreMiss { url: u, .. }) if u.ends_with("/prof/")));
    }

    #[tokio::test]
    async fn test_cache_first_hit_skips_network() {
        let (engine, network, _) = engine().await;
        let url = format!("{ORIGIN}/app.js");
        seed(&engine, MAIN, &url, "cached js").await;

        let response = engine.cache_first(&get(&url), MAIN, &origin()).await.unwrap();
        assert_eq!(&response.body[..], b"cached js");
        assert_eq!(network.calls(&url), 0);
    }

    #[tokio::test]
    async fn test_cache_first_miss_fetches_and_stores() {
        let (engine, network, _) = engine().await;
        let url = format!("{ORIGIN}/style.css");
        network.respond(&url, 200, "body{}");

        let response = engine.cache_first(&get(&url), MAIN, &origin()).await.unwrap();
        assert_eq!(response.source, ResponseSource::Network);
        engine.settle().await;

        let again = engine.cache_first(&get(&url), MAIN, &origin()).await.unwrap();
        assert_eq!(again.source, ResponseSource::Cache);
        assert_eq!(network.calls(&url), 1);
    }

    #[tokio::test]
    async fn test_cache_first_skips_cross_origin_write() {
        let (engine, network, _) = engine().await;
        let url = "https://cdn.example/lib.js";
        network.respond(url, 200, "lib");

        engine.cache_first(&get(url), MAIN, &origin()).await.unwrap();
        engine.settle().await;
        assert!(engine.lookup(MAIN, &get(url)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_cache_first_offline_is_504() {
        let (engine, _, _) = engine().await;
        let url = format!("{ORIGIN}/icon-512.png");

        let response = engine.cache_first(&get(&url), MAIN, &origin()).await.unwrap();
        assert_eq!(response.status, StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(response.source, ResponseSource::Synthetic);
    }

    #[tokio::test]
    async fn test_cache_first_unreadable_entry_degrades_to_network() {
        let network = ScriptedNetwork::new();
        let store = FlakyStore::new().await;
        let engine = StrategyEngine::new(store.clone(), network.clone());
        let url = format!("{ORIGIN}/app.js");
        network.respond(&url, 200, "fresh js");
        store.fail_reads(true);

        let response = engine.cache_first(&get(&url), MAIN, &origin()).await.unwrap();
        assert_eq!(&response.body[..], b"fresh js");
        assert_eq!(network.calls(&url), 1);
    }

    #[tokio::test]
    async fn test_write_to_deleted_partition_is_dropped() {
        let (engine, network, store) = engine().await;
        network.respond(SHEET_URL, 200, "a,1");
        store.delete_partition(DATA).await.unwrap();

        let response = engine.stale_while_revalidate(&get(SHEET_URL), DATA).await.unwrap();
        engine.settle().await;
        assert_eq!(&response.body[..], b"a,1");
        assert!(!store.partition_names().await.unwrap().contains(DATA));
    }

    #[tokio::test]
    async fn test_failed_write_does_not_alter_response() {
        let network = ScriptedNetwork::new();
        let store = FlakyStore::new().await;
        let engine = StrategyEngine::new(store.clone(), network.clone());
        let url = format!("{ORIGIN}/app.js");
        network.respond(&url, 200, "fresh js");
        store.fail_writes(true);

        let response = engine.cache_first(&get(&url), MAIN, &origin()).await.unwrap();
        engine.settle().await;
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(&response.body[..], b"fresh js");
        assert!(store.inner.partition_names().await.unwrap().is_empty());
    }
}
