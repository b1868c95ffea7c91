//! Error types for report access
//!
//! Provides error handling for:
//! - Consumer-facing fetch failures (`ReportError`)
//! - Backing store failures (`StoreError`)
//! - Configuration loading (`ConfigError`)

use crate::types::ReportId;
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;

/// Fetch failure as surfaced to consumers
///
/// Cloneable so one failure can be handed to every caller that joined the
/// same coalesced fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReportError {
    /// No record exists for the identifier
    #[error("report not found: {id}")]
    NotFound {
        /// Identifier that was requested
        id: ReportId,
    },

    /// Transport failure or timeout
    #[error("network error: {message}")]
    Network {
        /// Transport-level detail
        message: String,
    },

    /// The store rejected the read
    #[error("permission denied: {message}")]
    PermissionDenied {
        /// Reason given by the store
        message: String,
    },
}

impl ReportError {
    /// Create not-found error
    #[inline]
    #[must_use]
    pub fn not_found(id: ReportId) -> Self {
        Self::NotFound { id }
    }

    /// Create network error
    #[inline]
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Create permission error
    #[inline]
    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::PermissionDenied {
            message: message.into(),
        }
    }

    /// Check if a caller-side retry could plausibly succeed
    ///
    /// The access layer itself never retries.
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network { .. })
    }

    /// Short machine-readable label
    #[inline]
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::Network { .. } => "network",
            Self::PermissionDenied { .. } => "permission_denied",
        }
    }
}

/// Errors raised by a backing store implementation
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// Row absent
    #[error("no row for id {0}")]
    NotFound(ReportId),

    /// Store refused access
    #[error("access denied: {0}")]
    PermissionDenied(String),

    /// Connection or protocol failure
    #[error("transport failure: {0}")]
    Transport(String),

    /// Read did not finish in time
    #[error("read timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    /// Response could not be decoded into a record
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl From<StoreError> for ReportError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::NotFound(id) => Self::NotFound { id },
            StoreError::PermissionDenied(message) => Self::PermissionDenied { message },
            other @ (StoreError::Transport(_)
            | StoreError::Timeout(_)
            | StoreError::Malformed(_)) => Self::Network {
                message: other.to_string(),
            },
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// IO error reading a config file
    #[error("io error reading {path}: {source}")]
    Io {
        /// File that failed to load
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// TOML could not be parsed
    #[error("invalid config syntax: {0}")]
    Parse(#[from] toml::de::Error),

    /// Values parsed but are inconsistent
    #[error("invalid config: {0}")]
    Invalid(String),
}

impl ConfigError {
    /// Create IO error for path
    pub fn io_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
