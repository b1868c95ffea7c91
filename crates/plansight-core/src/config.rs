//! Accessor configuration
//!
//! Durations are written in whole seconds in TOML:
//!
//! ```toml
//! table = "reports"
//! freshness_window_secs = 300
//! eviction_horizon_secs = 1800
//! fetch_timeout_secs = 10
//! max_capacity = 10000
//! ```

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default table holding report rows
pub const DEFAULT_TABLE: &str = "reports";

/// Default time a fetched record is served without revalidation
pub const DEFAULT_FRESHNESS_WINDOW: Duration = Duration::from_secs(5 * 60);

/// Default idle time after which an entry is dropped
pub const DEFAULT_EVICTION_HORIZON: Duration = Duration::from_secs(30 * 60);

/// Default per-read network timeout
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Default maximum number of cached reports
pub const DEFAULT_MAX_CAPACITY: u64 = 10_000;

/// Report accessor configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AccessorConfig {
    /// Store table holding report rows
    pub table: String,
    /// Age after which a cached record is stale
    #[serde(rename = "freshness_window_secs", with = "duration_secs")]
    pub freshness_window: Duration,
    /// Idle time after which an entry is evicted
    #[serde(rename = "eviction_horizon_secs", with = "duration_secs")]
    pub eviction_horizon: Duration,
    /// Network-level timeout for one store read
    #[serde(rename = "fetch_timeout_secs", with = "duration_secs")]
    pub fetch_timeout: Duration,
    /// Upper bound on cached entries
    pub max_capacity: u64,
}

impl Default for AccessorConfig {
    fn default() -> Self {
        Self {
            table: DEFAULT_TABLE.to_string(),
            freshness_window: DEFAULT_FRESHNESS_WINDOW,
            eviction_horizon: DEFAULT_EVICTION_HORIZON,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            max_capacity: DEFAULT_MAX_CAPACITY,
        }
    }
}

impl AccessorConfig {
    /// Create config with defaults
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set table name
    #[inline]
    #[must_use]
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    /// Set freshness window
    #[inline]
    #[must_use]
    pub fn with_freshness_window(mut self, window: Duration) -> Self {
        self.freshness_window = window;
        self
    }

    /// Set eviction horizon
    #[inline]
    #[must_use]
    pub fn with_eviction_horizon(mut self, horizon: Duration) -> Self {
        self.eviction_horizon = horizon;
        self
    }

    /// Set fetch timeout
    #[inline]
    #[must_use]
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Set maximum capacity
    #[inline]
    #[must_use]
    pub fn with_max_capacity(mut self, capacity: u64) -> Self {
        self.max_capacity = capacity;
        self
    }

    /// Check that the values are usable together
    ///
    /// # Errors
    /// - `ConfigError::Invalid` for an empty table, zero durations or capacity,
    ///   or a freshness window longer than the eviction horizon
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.table.trim().is_empty() {
            return Err(ConfigError::Invalid("table must not be empty".to_string()));
        }
        if self.freshness_window.is_zero()
            || self.eviction_horizon.is_zero()
            || self.fetch_timeout.is_zero()
        {
            return Err(ConfigError::Invalid("durations must be non-zero".to_string()));
        }
        if self.freshness_window > self.eviction_horizon {
            return Err(ConfigError::Invalid(format!(
                "freshness window ({}s) exceeds eviction horizon ({}s)",
                self.freshness_window.as_secs(),
                self.eviction_horizon.as_secs()
            )));
        }
        if self.max_capacity == 0 {
            return Err(ConfigError::Invalid("max_capacity must be positive".to_string()));
        }
        Ok(())
    }

    /// Parse and validate TOML
    ///
    /// # Errors
    /// - `ConfigError::Parse` on syntax or unknown keys
    /// - `ConfigError::Invalid` if validation fails
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file
    ///
    /// # Errors
    /// - `ConfigError::Io` if the file cannot be read
    /// - Any error from [`AccessorConfig::from_toml_str`]
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::io_error(path, e))?;
        Self::from_toml_str(&raw)
    }

    /// Render as TOML
    ///
    /// # Errors
    /// - `ConfigError::Invalid` if serialization fails
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Invalid(e.to_string()))
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub(super) fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
