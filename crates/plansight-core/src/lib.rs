//! plansight core
//!
//! Shared vocabulary for the report data-access layer:
//! - `ReportId` / `ReportRecord`: what is fetched and how it is keyed
//! - `ReportSnapshot`: the `{data, isLoading, error}` view handed to consumers
//! - Error taxonomy for store reads and configuration
//! - `AccessorConfig`: freshness window, eviction horizon and fetch timeout
//! - `sanitize_input`: defense-in-depth filter for user-supplied strings
//!
//! # Example
//!
//! ```rust,ignore
//! use plansight_core::{sanitize_input, AccessorConfig, ReportId};
//!
//! let config = AccessorConfig::new().with_table("reports");
//! let id = ReportId::parse("  plan-42 ").expect("non-empty id");
//! assert_eq!(id.as_str(), "plan-42");
//! assert_eq!(sanitize_input("<b>hi</b>"), "bhi/b");
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod config;
pub mod error;
pub mod sanitize;
pub mod types;

pub use config::AccessorConfig;
pub use error::{ConfigError, ReportError, StoreError};
pub use sanitize::{sanitize_input, sanitize_with_limit, MAX_INPUT_LEN};
pub use types::{ReportId, ReportRecord, ReportSnapshot};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with report data
    pub use crate::config::AccessorConfig;
    pub use crate::error::{ReportError, StoreError};
    pub use crate::sanitize::sanitize_input;
    pub use crate::types::{ReportId, ReportRecord, ReportSnapshot};
}
