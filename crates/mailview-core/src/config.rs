#![forbid(unsafe_code)]

//! Tunables for the page window and its channels.
//!
//! [`WindowConfig`] can be loaded from JSON, or from TOML with the
//! `config-file` feature:
//!
//! ```toml
//! page_size = 50
//! reconnect_delay_ms = 2000
//! sync_safety_factor = 2.0
//! ```
//!
//! Every field has a default, so partial files are fine.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for a list session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    /// Items per page; also the `limit` of every page query.
    pub page_size: usize,
    /// Fixed delay between reconnect attempts.
    pub reconnect_delay_ms: u64,
    /// Over-request multiplier for the anchored sync query.
    pub sync_safety_factor: f64,
    /// How often a connected channel wakes up to check for cancellation and
    /// outbound values.
    pub poll_interval_ms: u64,
    /// Number of sync-feed entries retained for the caller.
    pub sync_log_capacity: usize,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            page_size: 50,
            reconnect_delay_ms: 2_000,
            sync_safety_factor: 2.0,
            poll_interval_ms: 50,
            sync_log_capacity: 64,
        }
    }
}

impl WindowConfig {
    /// Set the page size.
    #[must_use]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    /// Set the reconnect delay.
    #[must_use]
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Set the receive poll interval.
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Set the sync safety factor.
    #[must_use]
    pub fn with_sync_safety_factor(mut self, factor: f64) -> Self {
        self.sync_safety_factor = factor;
        self
    }

    /// Reconnect delay as a duration.
    #[must_use]
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    /// Poll interval as a duration.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Load from a JSON string and validate.
    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(s)?;
        config.validated()
    }

    /// Load from a JSON file and validate.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&content)
    }

    /// Load from a TOML string and validate.
    #[cfg(feature = "config-file")]
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validated()
    }

    /// Load from a TOML file and validate.
    #[cfg(feature = "config-file")]
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&content)
    }

    /// Load from a file, picking the format from its extension.
    ///
    /// `.toml` requires the `config-file` feature; anything else is read
    /// as JSON.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        match path.extension().and_then(|e| e.to_str()) {
            #[cfg(feature = "config-file")]
            Some("toml") => Self::from_toml_file(path),
            #[cfg(not(feature = "config-file"))]
            Some("toml") => Err(ConfigError::UnsupportedFormat("toml".into())),
            _ => Self::from_json_file(path),
        }
    }

    /// Check parameter ranges. An empty list means the config is valid.
    #[must_use]
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.page_size == 0 {
            errors.push("page_size must be > 0".into());
        }

        if !self.sync_safety_factor.is_finite() || self.sync_safety_factor < 1.0 {
            errors.push(format!(
                "sync_safety_factor must be a finite value >= 1.0, got {}",
                self.sync_safety_factor
            ));
        }

        if self.poll_interval_ms == 0 {
            errors.push("poll_interval_ms must be > 0".into());
        }

        if self.sync_log_capacity == 0 {
            errors.push("sync_log_capacity must be > 0".into());
        }

        errors
    }

    fn validated(self) -> Result<Self, ConfigError> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(self)
        } else {
            Err(ConfigError::Validation(errors))
        }
    }
}

/// Errors that can occur when loading a [`WindowConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[cfg(feature = "config-file")]
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("unsupported config format: {0}")]
    UnsupportedFormat(String),

    #[error("validation errors: {}", .0.join("; "))]
    Validation(Vec<String>),
}
