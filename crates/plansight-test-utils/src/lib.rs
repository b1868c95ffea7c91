//! Testing utilities for plansight workspace
//!
//! Shared test helpers, fixtures, and a store whose responses can be held
//! back and released on demand.

#![allow(missing_docs)]

use async_trait::async_trait;
use parking_lot::Mutex;
use plansight_cache::{ManualClock, ReportAccessor, ReportStore};
use plansight_core::{AccessorConfig, ReportId, ReportRecord, StoreError};
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

pub fn report_id(raw: &str) -> ReportId {
    ReportId::parse(raw).unwrap()
}

pub fn report(raw: &str, title: &str) -> ReportRecord {
    ReportRecord::from_row(json!({ "id": raw, "title": title })).unwrap()
}

/// Store that counts calls and stamps each response with its call number
///
/// Every served record carries a `revision` field equal to the number of
/// calls made for that id so far, so tests can tell fetches apart.
#[derive(Debug, Default)]
pub struct ScriptedStore {
    records: Mutex<HashMap<ReportId, ReportRecord>>,
    failures: Mutex<HashMap<ReportId, StoreError>>,
    gates: Mutex<HashMap<ReportId, Arc<Semaphore>>>,
    calls: Mutex<HashMap<ReportId, usize>>,
    total_calls: AtomicUsize,
}

impl ScriptedStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_report(self, raw: &str, title: &str) -> Self {
        self.records.lock().insert(report_id(raw), report(raw, title));
        self
    }

    /// Add a row after construction
    pub fn add_report(&self, raw: &str, title: &str) {
        self.records.lock().insert(report_id(raw), report(raw, title));
    }

    /// Make reads for `raw` fail until cleared
    pub fn fail(&self, raw: &str, error: StoreError) {
        self.failures.lock().insert(report_id(raw), error);
    }

    pub fn clear_failure(&self, raw: &str) {
        self.failures.lock().remove(&report_id(raw));
    }

    /// Block reads for `raw` until [`ScriptedStore::release`] is called
    pub fn hold(&self, raw: &str) {
        self.gates
            .lock()
            .insert(report_id(raw), Arc::new(Semaphore::new(0)));
    }

    /// Let `n` held reads for `raw` proceed
    pub fn release(&self, raw: &str, n: usize) {
        if let Some(gate) = self.gates.lock().get(&report_id(raw)) {
            gate.add_permits(n);
        }
    }

    pub fn calls(&self, raw: &str) -> usize {
        self.calls.lock().get(&report_id(raw)).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.total_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReportStore for ScriptedStore {
    async fn get(&self, _table: &str, id: &ReportId) -> Result<ReportRecord, StoreError> {
        self.total_calls.fetch_add(1, Ordering::SeqCst);
        let revision = {
            let mut calls = self.calls.lock();
            let count = calls.entry(id.clone()).or_insert(0);
            *count += 1;
            *count
        };

        let gate = self.gates.lock().get(id).cloned();
        if let Some(gate) = gate {
            let permit = gate
                .acquire()
                .await
                .map_err(|_| StoreError::Transport("gate closed".to_string()))?;
            permit.forget();
        }

        if let Some(error) = self.failures.lock().get(id).cloned() {
            return Err(error);
        }

        let mut record = self
            .records
            .lock()
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        record.fields.insert("revision".to_string(), json!(revision));
        Ok(record)
    }
}

/// Accessor on a manual clock with the reference 5 min / 30 min policy
pub fn accessor_with_clock(store: Arc<ScriptedStore>) -> (ReportAccessor, Arc<ManualClock>) {
    accessor_with_config(store, AccessorConfig::default())
}

pub fn accessor_with_config(
    store: Arc<ScriptedStore>,
    config: AccessorConfig,
) -> (ReportAccessor, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new());
    let accessor = ReportAccessor::with_clock(store, &config, clock.clone()).unwrap();
    (accessor, clock)
}

pub fn minutes(n: u64) -> Duration {
    Duration::from_secs(n * 60)
}

/// Revision stamped on a record by [`ScriptedStore`]
pub fn revision(record: &ReportRecord) -> u64 {
    record
        .field("revision")
        .and_then(serde_json::Value::as_u64)
        .unwrap_or(0)
}
