//! The caching and routing worker.
//!
//! [`ServiceWorker`] ties the pieces together: a [`Lifecycle`] that installs
//! and activates one cache generation, and an [`Interceptor`] that answers
//! fetches once that generation controls its clients.

pub mod background;
pub mod error;
pub mod interceptor;
pub mod lifecycle;
pub mod request;
pub mod route;
pub mod strategy;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;

use shellcache_core::{AppConfig, CacheStore, Error, Generation};
use url::Url;

pub use background::BackgroundTasks;
pub use error::WorkerError;
pub use interceptor::{FetchDisposition, Interceptor};
pub use lifecycle::{
    ActivationReport, InstallReport, Lifecycle, LifecycleState, PartialPrecacheFailure, PrecacheError,
};
pub use request::{ResponseSource, WorkerRequest, WorkerResponse};
pub use route::{RouteClass, Router, Strategy};
pub use strategy::StrategyEngine;

use crate::fetch::{Network, canonicalize, resolve};

/// Resolved worker settings.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub generation: Generation,
    pub origin: Url,
    pub sheet_host: String,
    pub offline_document: Url,
    pub manifest: Vec<String>,
}

impl WorkerConfig {
    pub fn from_app(config: &AppConfig) -> Result<Self, Error> {
        let origin = canonicalize(&config.origin).map_err(|e| Error::InvalidUrl(format!("origin: {e}")))?;
        let offline_document = resolve(&origin, &config.offline_document)
            .map_err(|e| Error::InvalidUrl(format!("offline_document: {e}")))?;

        Ok(Self {
            generation: config.current_generation(),
            origin,
            sheet_host: config.sheet_host.clone(),
            offline_document,
            manifest: config.manifest.clone(),
        })
    }
}

pub struct ServiceWorker {
    lifecycle: Lifecycle,
    interceptor: Interceptor,
}

impl ServiceWorker {
    pub fn new(config: WorkerConfig, store: Arc<dyn CacheStore>, network: Arc<dyn Network>) -> Self {
        let engine = StrategyEngine::new(store.clone(), network.clone());
        let router = Router::new(config.origin.clone(), config.sheet_host);
        let interceptor =
            Interceptor::new(router, engine, config.generation.clone(), config.offline_document);
        let lifecycle = Lifecycle::new(config.generation, config.origin, config.manifest, store, network);
        Self { lifecycle, interceptor }
    }

    pub fn generation(&self) -> &Generation {
        self.lifecycle.generation()
    }

    pub fn store(&self) -> &Arc<dyn CacheStore> {
        self.interceptor.engine().store()
    }

    pub async fn state(&self) -> LifecycleState {
        self.lifecycle.state().await
    }

    pub async fn install(&self) -> Result<InstallReport, WorkerError> {
        self.lifecycle.install().await
    }

    pub async fn activate(&self) -> Result<ActivationReport, WorkerError> {
        self.lifecycle.activate().await
    }

    /// Handle a page fetch.
    ///
    /// Until activation claims the clients, every request is left to the
    /// page's own network stack. Once claimed, clients stay controlled.
    pub async fn handle_fetch(&self, request: &WorkerRequest) -> Result<FetchDisposition, WorkerError> {
        if !self.lifecycle.controls_clients() {
            let state = self.lifecycle.state().await;
            tracing::debug!(url = %request.url, state = state.as_str(), "worker not controlling clients");
            return Ok(FetchDisposition::Ignored);
        }
        self.interceptor.intercept(request).await
    }

    /// Wait for background revalidations and cache writes to finish.
    pub async fn settle(&self) {
        self.interceptor.engine().settle().await;
    }
}
