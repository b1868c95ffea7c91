//! HTTP row store
//!
//! Reads a single row through a PostgREST-style endpoint:
//! `GET {base}/rest/v1/{table}?id=eq.{id}&select=*`, authenticated with an
//! `apikey` header and a bearer token carrying the same key.

use crate::store::ReportStore;
use async_trait::async_trait;
use plansight_core::{ReportId, ReportRecord, StoreError};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Connection settings for [`RestStore`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestStoreConfig {
    /// Project URL, e.g. `https://example.supabase.co`
    pub base_url: String,
    /// Anonymous or service key
    pub api_key: Option<String>,
    /// Client-level request timeout in milliseconds
    pub request_timeout_ms: u64,
}

impl RestStoreConfig {
    /// Create config for a base URL with a 10 second timeout
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: None,
            request_timeout_ms: 10_000,
        }
    }

    /// Set API key
    #[must_use]
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }
}

/// [`ReportStore`] backed by a REST endpoint
#[derive(Debug, Clone)]
pub struct RestStore {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl RestStore {
    /// Build the HTTP client
    ///
    /// # Errors
    /// - `StoreError::Transport` if the URL is empty or the client cannot be built
    pub fn new(config: &RestStoreConfig) -> Result<Self, StoreError> {
        let base_url = config.base_url.trim().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(StoreError::Transport("base url is empty".to_string()));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|e| StoreError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base_url,
            api_key: config.api_key.clone(),
        })
    }

    /// Endpoint for a table
    #[must_use]
    pub fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }
}

/// Map a non-success status to a store error
#[must_use]
pub fn status_error(status: StatusCode, id: &ReportId) -> Option<StoreError> {
    if status.is_success() {
        return None;
    }
    Some(match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            StoreError::PermissionDenied(format!("store returned {status}"))
        }
        StatusCode::NOT_FOUND => StoreError::NotFound(id.clone()),
        _ => StoreError::Transport(format!("store returned {status}")),
    })
}

#[async_trait]
impl ReportStore for RestStore {
    async fn get(&self, table: &str, id: &ReportId) -> Result<ReportRecord, StoreError> {
        let mut request = self
            .client
            .get(self.table_url(table))
            .query(&[("id", format!("eq.{id}")), ("select", "*".to_string())]);
        if let Some(key) = &self.api_key {
            request = request.header("apikey", key).bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))?;

        if let Some(err) = status_error(response.status(), id) {
            return Err(err);
        }

        let rows: Vec<serde_json::Value> = response
            .json()
            .await
            .map_err(|e| StoreError::Malformed(e.to_string()))?;

        rows.into_iter()
            .next()
            .ok_or_else(|| StoreError::NotFound(id.clone()))
            .and_then(ReportRecord::from_row)
    }
}
