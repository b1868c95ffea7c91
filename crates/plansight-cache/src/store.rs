//! Backing store seam
//!
//! The remote table is an opaque service with a single read operation.
//! [`MemoryStore`] serves fixtures in-process; [`crate::rest::RestStore`]
//! reads rows over HTTP.

use async_trait::async_trait;
use parking_lot::RwLock;
use plansight_core::{ReportId, ReportRecord, StoreError};
use std::collections::HashMap;
use std::path::Path;

/// Single-row read against a remote table
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ReportStore: Send + Sync {
    /// Fetch the row keyed by `id` from `table`
    ///
    /// # Errors
    /// - `StoreError::NotFound` if no row matches
    /// - `StoreError::PermissionDenied` if the store refuses the read
    /// - `StoreError::Transport` / `StoreError::Malformed` on I/O or decoding failure
    async fn get(&self, table: &str, id: &ReportId) -> Result<ReportRecord, StoreError>;
}

/// In-process store keyed by table then id
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<HashMap<String, HashMap<ReportId, ReportRecord>>>,
}

impl MemoryStore {
    /// Create empty store
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create store with rows in one table
    #[must_use]
    pub fn with_records(table: &str, records: impl IntoIterator<Item = ReportRecord>) -> Self {
        let store = Self::new();
        for record in records {
            store.insert(table, record);
        }
        store
    }

    /// Load a JSON array of rows into `table`
    ///
    /// # Errors
    /// - `StoreError::Transport` if the file cannot be read
    /// - `StoreError::Malformed` if it is not an array of rows with ids
    pub fn from_json_file(table: &str, path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| StoreError::Transport(format!("{}: {e}", path.display())))?;
        Self::from_json_str(table, &raw)
    }

    /// Parse a JSON array of rows into `table`
    ///
    /// # Errors
    /// - `StoreError::Malformed` if it is not an array of rows with ids
    pub fn from_json_str(table: &str, raw: &str) -> Result<Self, StoreError> {
        let rows: Vec<serde_json::Value> =
            serde_json::from_str(raw).map_err(|e| StoreError::Malformed(e.to_string()))?;
        let records = rows
            .into_iter()
            .map(ReportRecord::from_row)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::with_records(table, records))
    }

    /// Insert or replace a row
    pub fn insert(&self, table: &str, record: ReportRecord) {
        self.tables
            .write()
            .entry(table.to_string())
            .or_default()
            .insert(record.id.clone(), record);
    }

    /// Remove a row
    pub fn remove(&self, table: &str, id: &ReportId) -> Option<ReportRecord> {
        self.tables.write().get_mut(table)?.remove(id)
    }

    /// Number of rows in a table
    #[must_use]
    pub fn len(&self, table: &str) -> usize {
        self.tables.read().get(table).map_or(0, HashMap::len)
    }

    /// Whether a table has no rows
    #[must_use]
    pub fn is_empty(&self, table: &str) -> bool {
        self.len(table) == 0
    }
}

#[async_trait]
impl ReportStore for MemoryStore {
    async fn get(&self, table: &str, id: &ReportId) -> Result<ReportRecord, StoreError> {
        self.tables
            .read()
            .get(table)
            .and_then(|rows| rows.get(id))
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.clone()))
    }
}
