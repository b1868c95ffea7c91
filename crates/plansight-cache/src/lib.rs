//! plansight cache
//!
//! Stale-while-revalidate access to report records kept in a remote table.
//!
//! # Architecture
//!
//! ```text
//! ReportQuery (view) ──▶ ReportAccessor ──▶ ReportCache (moka, per-id entries)
//!        ▲                    │
//!        └── CacheEvent ◀─────┴──▶ in-flight table ──▶ ReportStore (memory / REST)
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use plansight_cache::{MemoryStore, ReportAccessor, ReportQuery};
//! use plansight_core::{AccessorConfig, ReportId};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(MemoryStore::from_json_file("reports", "fixtures.json")?);
//! let accessor = ReportAccessor::new(store, &AccessorConfig::default())?;
//!
//! let snapshot = accessor.fetch_report(ReportId::parse("plan-1").as_ref()).await;
//! assert!(snapshot.is_loading);
//!
//! let query = ReportQuery::new(accessor.clone(), ReportId::parse("plan-1")).await;
//! let settled = query.settled().await;
//! println!("{:?}", settled.data);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod accessor;
pub mod cache;
pub mod clock;
pub mod entry;
pub mod query;
pub mod rest;
pub mod store;

pub use accessor::{AccessorStats, CacheEvent, FetchResult, PendingFetch, ReportAccessor};
pub use cache::ReportCache;
pub use clock::{Clock, ManualClock, SystemClock};
pub use entry::{allowed_transitions, validate_transition, CacheEntry, EntryState, StateMachineError};
pub use query::ReportQuery;
pub use rest::{RestStore, RestStoreConfig};
pub use store::{MemoryStore, ReportStore};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for reading reports
    pub use crate::{MemoryStore, ReportAccessor, ReportQuery, ReportStore, RestStore};
    pub use plansight_core::prelude::*;
}
