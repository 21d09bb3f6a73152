//! Core types and shared functionality for shellcache.
//!
//! This crate provides:
//! - Partitioned response store with SQLite backend
//! - Cache generation naming
//! - Unified error types
//! - Configuration structures

pub mod cache;
pub mod config;
pub mod error;

pub use cache::{CacheDb, CacheStore, EntrySummary, Generation, StoredEntry};
pub use config::{AppConfig, ConfigError};
pub use error::Error;
