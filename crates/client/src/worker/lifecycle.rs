//! Install and activation of a cache generation.
//!
//! ```text
//! Pending -> Installing -> Waiting -> Activating -> Active
//! ```
//!
//! Install precaches the manifest into the main partition and skips the
//! waiting phase. Activation deletes every partition the current
//! generation does not own and claims open clients.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures_util::future::join_all;
use serde::Serialize;
use shellcache_core::{CacheStore, Generation};
use tokio::sync::RwLock;
use url::Url;

use super::error::WorkerError;
use super::request::WorkerRequest;
use crate::fetch::{CacheMode, Network, resolve};

/// Lifecycle position of the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Pending,
    Installing,
    Waiting,
    Activating,
    Active,
}

impl LifecycleState {
    pub fn as_str(self) -> &'static str {
        match self {
            LifecycleState::Pending => "pending",
            LifecycleState::Installing => "installing",
            LifecycleState::Waiting => "waiting",
            LifecycleState::Activating => "activating",
            LifecycleState::Active => "active",
        }
    }
}

/// Why a manifest entry could not be precached.
#[derive(Debug, Clone, Serialize, thiserror::Error)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum PrecacheError {
    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("network failure: {0}")]
    Network(String),

    #[error("unexpected status {0}")]
    Status(u16),

    #[error("store failure: {0}")]
    Store(String),
}

/// One manifest entry that did not make it into the cache.
#[derive(Debug, Clone, Serialize)]
pub struct PartialPrecacheFailure {
    pub path: String,
    pub error: PrecacheError,
}

#[derive(Debug, Clone, Serialize)]
pub struct InstallReport {
    pub generation: String,
    pub cached: Vec<String>,
    pub failed: Vec<PartialPrecacheFailure>,
    pub skip_waiting: bool,
}

impl InstallReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ActivationReport {
    pub generation: String,
    pub kept: Vec<String>,
    pub deleted: Vec<String>,
    pub clients_claimed: bool,
}

/// Owns the generation's install/activate state machine.
pub struct Lifecycle {
    generation: Generation,
    origin: Url,
    manifest: Vec<String>,
    store: Arc<dyn CacheStore>,
    network: Arc<dyn Network>,
    state: RwLock<LifecycleState>,
    /// Set by the first activation and never cleared; a later install
    /// refreshes the cache without releasing the clients.
    claimed: AtomicBool,
}

impl Lifecycle {
    pub fn new(
        generation: Generation, origin: Url, manifest: Vec<String>, store: Arc<dyn CacheStore>,
        network: Arc<dyn Network>,
    ) -> Self {
        Self {
            generation,
            origin,
            manifest,
            store,
            network,
            state: RwLock::new(LifecycleState::Pending),
            claimed: AtomicBool::new(false),
        }
    }

    pub fn generation(&self) -> &Generation {
        &self.generation
    }

    pub async fn state(&self) -> LifecycleState {
        *self.state.read().await
    }

    /// Whether activation has claimed the clients.
    pub fn controls_clients(&self) -> bool {
        self.claimed.load(Ordering::SeqCst)
    }

    async fn enter(
        &self, event: &'static str, allowed: &[LifecycleState], next: LifecycleState,
    ) -> Result<LifecycleState, WorkerError> {
        let mut state = self.state.write().await;
        if !allowed.contains(&*state) {
            return Err(WorkerError::InvalidTransition { event, state: state.as_str() });
        }
        let previous = *state;
        *state = next;
        tracing::info!(generation = self.generation.version(), "{} -> {}", previous.as_str(), next.as_str());
        Ok(previous)
    }

    async fn set(&self, next: LifecycleState) {
        *self.state.write().await = next;
    }

    /// Open the generation's partitions, precache the manifest and skip
    /// waiting.
    ///
    /// Individual entries may fail; they are logged and reported, and the
    /// install still completes. Only a store that cannot open the partitions
    /// fails the install. Re-installing an active worker leaves it active.
    pub async fn install(&self) -> Result<InstallReport, WorkerError> {
        let previous = self
            .enter(
                "install",
                &[LifecycleState::Pending, LifecycleState::Waiting, LifecycleState::Active],
                LifecycleState::Installing,
            )
            .await?;

        let partition = self.generation.main_partition();
        let opened = match self.store.open_partition(partition).await {
            Ok(()) => self.store.open_partition(&self.generation.data_partition()).await,
            Err(e) => Err(e),
        };
        if let Err(e) = opened {
            self.set(previous).await;
            return Err(e.into());
        }

        let outcomes = join_all(self.manifest.iter().map(|path| self.precache(partition, path))).await;

        let mut cached = Vec::new();
        let mut failed = Vec::new();
        for (path, outcome) in self.manifest.iter().zip(outcomes) {
            match outcome {
                Ok(()) => cached.push(path.clone()),
                Err(error) => {
                    tracing::warn!(path = %path, "precache failed: {error}");
                    failed.push(PartialPrecacheFailure { path: path.clone(), error });
                }
            }
        }

        // skip waiting: become eligible for activation immediately
        let next = if previous == LifecycleState::Active { LifecycleState::Active } else { LifecycleState::Waiting };
        self.set(next).await;
        tracing::info!(
            generation = self.generation.version(),
            cached = cached.len(),
            failed = failed.len(),
            "install complete"
        );

        Ok(InstallReport { generation: self.generation.version().to_string(), cached, failed, skip_waiting: true })
    }

    async fn precache(&self, partition: &str, path: &str) -> Result<(), PrecacheError> {
        let url = resolve(&self.origin, path).map_err(|e| PrecacheError::InvalidPath(e.to_string()))?;
        let request = WorkerRequest::get(url);

        let response = self
            .network
            .fetch(&request, CacheMode::Reload)
            .await
            .map_err(|e| PrecacheError::Network(e.to_string()))?;
        if !response.is_ok() {
            return Err(PrecacheError::Status(response.status.as_u16()));
        }

        let entry = response.to_entry(partition, &request);
        match self.store.put_entry(&entry).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(PrecacheError::Store("entry refused".into())),
            Err(e) => Err(PrecacheError::Store(e.to_string())),
        }
    }

    /// Delete stale generations and claim clients.
    pub async fn activate(&self) -> Result<ActivationReport, WorkerError> {
        let previous = self
            .enter("activate", &[LifecycleState::Waiting, LifecycleState::Active], LifecycleState::Activating)
            .await?;

        let names = match self.store.partition_names().await {
            Ok(names) => names,
            Err(e) => {
                self.set(previous).await;
                return Err(e.into());
            }
        };

        let mut kept = Vec::new();
        let mut deleted = Vec::new();
        for name in names {
            if self.generation.owns(&name) {
                kept.push(name);
                continue;
            }
            match self.store.delete_partition(&name).await {
                Ok(_) => {
                    tracing::info!(partition = %name, "deleted stale cache partition");
                    deleted.push(name);
                }
                Err(e) => tracing::warn!(partition = %name, "failed to delete stale partition: {e}"),
            }
        }

        // claim clients: from here on every page is served by this generation
        self.claimed.store(true, Ordering::SeqCst);
        self.set(LifecycleState::Active).await;
        tracing::info!(generation = self.generation.version(), "clients claimed");

        Ok(ActivationReport {
            generation: self.generation.version().to_string(),
            kept,
            deleted,
            clients_claimed: true,
        })
    }
}
