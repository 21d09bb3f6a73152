//! Configuration validation rules.
//!
//! This module provides validation logic for `AppConfig` values
//! after they have been loaded from environment, files, or defaults.

use crate::config::AppConfig;
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },

    #[error("missing required configuration: {field} ({hint})")]
    Missing { field: String, hint: String },
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Missing` if `generation` is empty, and
    /// `ConfigError::Invalid` if:
    /// - `generation` contains whitespace
    /// - `origin` is not an absolute http(s) URL
    /// - `sheet_host` is empty
    /// - `offline_document` or any manifest entry is not root-relative
    /// - `max_bytes` is 0 or exceeds 50MB
    /// - `timeout_ms` is less than 100ms or exceeds 5 minutes
    /// - `user_agent` is empty
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.generation.is_empty() {
            return Err(ConfigError::Missing {
                field: "generation".into(),
                hint: "Set SHELLCACHE_GENERATION to the deployed version string".into(),
            });
        }
        if self.generation.chars().any(char::is_whitespace) {
            return Err(ConfigError::Invalid {
                field: "generation".into(),
                reason: "must not contain whitespace".into(),
            });
        }

        match url::Url::parse(&self.origin) {
            Ok(origin) if matches!(origin.scheme(), "http" | "https") && origin.host_str().is_some() => {}
            _ => {
                return Err(ConfigError::Invalid {
                    field: "origin".into(),
                    reason: "must be an absolute http(s) URL".into(),
                });
            }
        }

        if self.sheet_host.is_empty() {
            return Err(ConfigError::Invalid { field: "sheet_host".into(), reason: "must not be empty".into() });
        }

        if !self.offline_document.starts_with('/') {
            return Err(ConfigError::Invalid {
                field: "offline_document".into(),
                reason: "must be a root-relative path".into(),
            });
        }

        if let Some(entry) = self.manifest.iter().find(|p| !p.starts_with('/')) {
            return Err(ConfigError::Invalid {
                field: "manifest".into(),
                reason: format!("entry {entry:?} must be a root-relative path"),
            });
        }

        if self.max_bytes == 0 {
            return Err(ConfigError::Invalid { field: "max_bytes".into(), reason: "must be greater than 0".into() });
        }
        if self.max_bytes > 50 * 1024 * 1024 {
            return Err(ConfigError::Invalid { field: "max_bytes".into(), reason: "must not exceed 50MB".into() });
        }

        if self.timeout_ms < 100 {
            return Err(ConfigError::Invalid { field: "timeout_ms".into(), reason: "must be at least 100ms".into() });
        }
        if self.timeout_ms > 300_000 {
            return Err(ConfigError::Invalid {
                field: "timeout_ms".into(),
                reason: "must not exceed 5 minutes (300000ms)".into(),
            });
        }

        if self.user_agent.is_empty() {
            return Err(ConfigError::Invalid { field: "user_agent".into(), reason: "must not be empty".into() });
        }

        if !self.manifest.contains(&self.offline_document) {
            tracing::warn!(
                offline_document = %self.offline_document,
                "offline_document is not in the precache manifest; \
                 navigations will only fall back to it once it has been visited"
            );
        }

        Ok(())
    }
}
