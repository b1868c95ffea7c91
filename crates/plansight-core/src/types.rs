//! Core types for report access
//!
//! Defines the fundamental types shared by the cache and its consumers:
//! - Report identifiers (never empty)
//! - Report records (opaque store-defined fields)
//! - Snapshots of what a consumer should render

use crate::error::{ReportError, StoreError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::str::FromStr;
use std::sync::Arc;

/// Opaque key identifying one report
///
/// Surrounding whitespace is trimmed and an empty key is rejected, so an
/// absent identifier is always expressed as `Option::<ReportId>::None`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ReportId(String);

impl ReportId {
    /// Parse a raw identifier, returning `None` when it is empty or blank
    #[inline]
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_owned()))
        }
    }

    /// Parse an optional raw identifier
    #[inline]
    #[must_use]
    pub fn parse_opt(raw: Option<&str>) -> Option<Self> {
        raw.and_then(Self::parse)
    }

    /// Borrow the identifier text
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for ReportId {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| StoreError::Malformed("empty report id".to_string()))
    }
}

impl TryFrom<String> for ReportId {
    type Error = StoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ReportId> for String {
    fn from(value: ReportId) -> Self {
        value.0
    }
}

impl std::fmt::Display for ReportId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One fetched report row
///
/// The accessor never interprets `fields`; they are whatever the store
/// returned alongside the identifier (plan sections, financials, metadata).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportRecord {
    /// Row identifier
    pub id: ReportId,
    /// Remaining store-defined columns
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl ReportRecord {
    /// Create a record from an identifier and its columns
    #[inline]
    #[must_use]
    pub fn new(id: ReportId, fields: Map<String, Value>) -> Self {
        Self { id, fields }
    }

    /// Build a record from a raw JSON row
    ///
    /// The row must be an object with an `id` column holding a non-empty
    /// string or a number.
    ///
    /// # Errors
    /// - `StoreError::Malformed` if the row is not an object or lacks a usable id
    pub fn from_row(row: Value) -> Result<Self, StoreError> {
        let Value::Object(mut fields) = row else {
            return Err(StoreError::Malformed("row is not a JSON object".to_string()));
        };

        let id = match fields.remove("id") {
            Some(Value::String(raw)) => ReportId::parse(&raw),
            Some(Value::Number(n)) => ReportId::parse(&n.to_string()),
            _ => None,
        }
        .ok_or_else(|| StoreError::Malformed("row has no usable id column".to_string()))?;

        Ok(Self { id, fields })
    }

    /// Look up a single column
    #[inline]
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }
}

/// What a consumer should render for one report at one moment
///
/// `is_loading` is only true while there is nothing to show yet;
/// `is_fetching` is true whenever a store read is in flight, including
/// background revalidation of a stale value.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReportSnapshot {
    /// Latest known record, if any
    pub data: Option<Arc<ReportRecord>>,
    /// No data yet and a fetch is outstanding
    pub is_loading: bool,
    /// A fetch is outstanding (initial or background)
    pub is_fetching: bool,
    /// Error from the most recent fetch, if it failed
    pub error: Option<ReportError>,
}

impl ReportSnapshot {
    /// Nothing requested: no data, not loading, no error
    #[inline]
    #[must_use]
    pub fn idle() -> Self {
        Self::default()
    }

    /// First fetch outstanding
    #[inline]
    #[must_use]
    pub fn loading() -> Self {
        Self {
            data: None,
            is_loading: true,
            is_fetching: true,
            error: None,
        }
    }

    /// Data available
    #[inline]
    #[must_use]
    pub fn ready(data: Arc<ReportRecord>) -> Self {
        Self {
            data: Some(data),
            ..Self::default()
        }
    }

    /// Build from the outcome of a fetch
    #[must_use]
    pub fn from_result(result: &Result<Arc<ReportRecord>, ReportError>) -> Self {
        match result {
            Ok(record) => Self::ready(Arc::clone(record)),
            Err(error) => Self {
                error: Some(error.clone()),
                ..Self::default()
            },
        }
    }

    /// Whether there is data to render
    #[inline]
    #[must_use]
    pub fn has_data(&self) -> bool {
        self.data.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn report_id_trims_and_rejects_blank() {
        assert_eq!(ReportId::parse("  plan-1 ").unwrap().as_str(), "plan-1");
        assert!(ReportId::parse("").is_none());
        assert!(ReportId::parse("   \t").is_none());
        assert!(ReportId::parse_opt(None).is_none());
        assert!("".parse::<ReportId>().is_err());
    }

    #[test]
    fn report_id_serde_rejects_empty() {
        let ok: ReportId = serde_json::from_value(json!("abc")).unwrap();
        assert_eq!(ok.as_str(), "abc");
        assert!(serde_json::from_value::<ReportId>(json!("")).is_err());
    }

    #[test]
    fn record_from_row_accepts_numeric_id() {
        let record = ReportRecord::from_row(json!({"id": 7, "title": "Plan"})).unwrap();
        assert_eq!(record.id.as_str(), "7");
        assert_eq!(record.field("title"), Some(&json!("Plan")));
        assert!(record.field("id").is_none());
    }

    #[test]
    fn record_from_row_rejects_missing_id() {
        assert!(matches!(
            ReportRecord::from_row(json!({"title": "Plan"})),
            Err(StoreError::Malformed(_))
        ));
        assert!(matches!(
            ReportRecord::from_row(json!([1, 2])),
            Err(StoreError::Malformed(_))
        ));
    }

    #[test]
    fn record_serializes_flat() {
        let record = ReportRecord::from_row(json!({"id": "a", "revenue": 10})).unwrap();
        assert_eq!(
            serde_json::to_value(&record).unwrap(),
            json!({"id": "a", "revenue": 10})
        );
    }

    #[test]
    fn snapshot_constructors() {
        let idle = ReportSnapshot::idle();
        assert!(!idle.is_loading && !idle.is_fetching && idle.data.is_none() && idle.error.is_none());

        let loading = ReportSnapshot::loading();
        assert!(loading.is_loading && loading.is_fetching);

        let err = ReportSnapshot::from_result(&Err(ReportError::network("down")));
        assert_eq!(err.error, Some(ReportError::network("down")));
        assert!(!err.has_data());
    }
}
