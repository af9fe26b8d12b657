//! Coordinator configuration

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Errors loading or validating a [`CoordinatorConfig`]
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File could not be read
    #[error("failed to read {path}: {source}")]
    Io {
        /// Offending path
        path: String,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// TOML did not parse
    #[error("invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// Value out of range
    #[error("invalid value: {0}")]
    Invalid(String),
}

/// Tuning knobs of one coordinator instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Quiet period after the last cell edit before the record commits
    pub debounce_ms: u64,
    /// Pointer displacement that turns a press into a drag
    pub drag_threshold_px: f64,
    /// Longest press still treated as a click
    pub click_max_ms: u64,
    /// Notification channel capacity
    pub notification_capacity: usize,
    /// Upper bound on a single write; `None` waits for the service
    pub commit_timeout_ms: Option<u64>,
    /// Re-fetch a record after its write failed
    pub refresh_after_failure: bool,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 500,
            drag_threshold_px: 8.0,
            click_max_ms: 300,
            notification_capacity: 64,
            commit_timeout_ms: None,
            refresh_after_failure: true,
        }
    }
}

impl CoordinatorConfig {
    /// Create with default values
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set debounce quiet period
    #[inline]
    #[must_use]
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce_ms = duration_ms(debounce);
        self
    }

    /// Set drag threshold in pixels
    #[inline]
    #[must_use]
    pub fn with_drag_threshold(mut self, pixels: f64) -> Self {
        self.drag_threshold_px = pixels;
        self
    }

    /// Set maximum click duration
    #[inline]
    #[must_use]
    pub fn with_click_max(mut self, click_max: Duration) -> Self {
        self.click_max_ms = duration_ms(click_max);
        self
    }

    /// Set notification channel capacity
    #[inline]
    #[must_use]
    pub fn with_notification_capacity(mut self, capacity: usize) -> Self {
        self.notification_capacity = capacity;
        self
    }

    /// Bound every write by `timeout`
    #[inline]
    #[must_use]
    pub fn with_commit_timeout(mut self, timeout: Duration) -> Self {
        self.commit_timeout_ms = Some(duration_ms(timeout));
        self
    }

    /// Enable or disable the post-failure refresh
    #[inline]
    #[must_use]
    pub fn with_refresh_after_failure(mut self, enabled: bool) -> Self {
        self.refresh_after_failure = enabled;
        self
    }

    /// Debounce quiet period
    #[inline]
    #[must_use]
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Maximum click duration
    #[inline]
    #[must_use]
    pub fn click_max(&self) -> Duration {
        Duration::from_millis(self.click_max_ms)
    }

    /// Write timeout, if any
    #[inline]
    #[must_use]
    pub fn commit_timeout(&self) -> Option<Duration> {
        self.commit_timeout_ms.map(Duration::from_millis)
    }

    /// Check value ranges
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.drag_threshold_px.is_finite() || self.drag_threshold_px < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "drag_threshold_px must be a non-negative number, got {}",
                self.drag_threshold_px
            )));
        }
        if self.notification_capacity == 0 {
            return Err(ConfigError::Invalid(
                "notification_capacity must be at least 1".into(),
            ));
        }
        if self.commit_timeout_ms == Some(0) {
            return Err(ConfigError::Invalid(
                "commit_timeout_ms must be positive when set".into(),
            ));
        }
        Ok(())
    }

    /// Parse and validate a TOML document
    ///
    /// Missing keys take their default.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the document is malformed or out of range.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file is unreadable, malformed or out of range.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&source)
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
