//! Fetch interception: classify, dispatch, and recover.
//!
//! Every classified request gets exactly one response or one error. An
//! unexpected failure inside a cache-reading route, a panic included, is
//! answered with the stored offline document when one exists.

use std::any::Any;
use std::panic::AssertUnwindSafe;

use futures_util::FutureExt;
use shellcache_core::Generation;
use url::Url;

use super::error::WorkerError;
use super::request::{ResponseSource, WorkerRequest, WorkerResponse};
use super::route::{RouteClass, Router, Strategy};
use super::strategy::StrategyEngine;

/// What the worker did with an intercepted request.
#[derive(Debug, Clone)]
pub enum FetchDisposition {
    /// Not handled; the page's own network stack takes it.
    Ignored,
    Responded { route: RouteClass, response: WorkerResponse },
}

impl FetchDisposition {
    pub fn response(&self) -> Option<&WorkerResponse> {
        match self {
            FetchDisposition::Ignored => None,
            FetchDisposition::Responded { response, .. } => Some(response),
        }
    }

    pub fn route(&self) -> Option<RouteClass> {
        match self {
            FetchDisposition::Ignored => None,
            FetchDisposition::Responded { route, .. } => Some(*route),
        }
    }
}

pub struct Interceptor {
    router: Router,
    engine: StrategyEngine,
    generation: Generation,
    offline_document: Url,
}

impl Interceptor {
    pub fn new(router: Router, engine: StrategyEngine, generation: Generation, offline_document: Url) -> Self {
        Self { router, engine, generation, offline_document }
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn engine(&self) -> &StrategyEngine {
        &self.engine
    }

    pub async fn intercept(&self, request: &WorkerRequest) -> Result<FetchDisposition, WorkerError> {
        let Some(route) = self.router.classify(request) else {
            tracing::trace!(method = %request.method, url = %request.url, "not intercepted");
            return Ok(FetchDisposition::Ignored);
        };
        tracing::debug!(url = %request.url, route = route.as_str(), "intercepted");

        let outcome = AssertUnwindSafe(self.dispatch(route, request))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(WorkerError::Panicked(panic_message(panic.as_ref()))));

        match outcome {
            Ok(response) => Ok(FetchDisposition::Responded { route, response }),
            Err(err) if err.is_expected() || !route.reads_cache() => Err(err),
            Err(err) => self.recover(route, request, err).await,
        }
    }

    async fn dispatch(&self, route: RouteClass, request: &WorkerRequest) -> Result<WorkerResponse, WorkerError> {
        let main = self.generation.main_partition();
        match route.strategy() {
            Strategy::NetworkOnly => self.engine.network_only(request).await,
            Strategy::StaleWhileRevalidate => {
                self.engine
                    .stale_while_revalidate(request, &self.generation.data_partition())
                    .await
            }
            Strategy::NetworkFirst => self.engine.network_first(request, main, &self.offline_document).await,
            Strategy::CacheFirst => self.engine.cache_first(request, main, self.router.origin()).await,
            Strategy::Passthrough => self.engine.passthrough(request).await,
        }
    }

    async fn recover(
        &self, route: RouteClass, request: &WorkerRequest, err: WorkerError,
    ) -> Result<FetchDisposition, WorkerError> {
        tracing::error!(url = %request.url, route = route.as_str(), "handler failed: {err}");

        let offline = WorkerRequest::get(self.offline_document.clone());
        match self.engine.lookup(self.generation.main_partition(), &offline).await {
            Ok(Some(document)) => Ok(FetchDisposition::Responded {
                route,
                response: document.with_source(ResponseSource::OfflineDocument),
            }),
            Ok(None) => Err(err),
            Err(lookup) => {
                tracing::warn!(url = %offline.url, "offline document unreadable: {lookup}");
                Err(err)
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "handler panicked".to_string()
    }
}
