//! Client side of shellcache.
//!
//! This crate provides the network seam and the worker: request
//! classification, fetch/cache strategies, and the install/activate
//! lifecycle over a partitioned response store.

pub mod fetch;
pub mod worker;

pub use fetch::{CacheMode, FetchClient, FetchConfig, Network, NetworkFailure};
pub use worker::{
    ActivationReport, FetchDisposition, InstallReport, LifecycleState, RouteClass, ServiceWorker, WorkerConfig,
    WorkerError, WorkerRequest, WorkerResponse,
};
