//! Storage collaborator boundary.
//!
//! The sync pipeline consumes exactly three storage operations: fetch one
//! connection record, mirror a catalog into it, and bulk-insert extracted
//! rows. `ConnectionStore` is the seam; `SupabaseStore` implements it over
//! the Supabase REST API. Tests substitute their own mocks.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// Table receiving extracted rows.
pub const RAW_DATA_TABLE: &str = "raw_connection_data";

/// Connection row as stored in the `connections` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionRecord {
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// Connection type, e.g. "woocommerce"; selects the tap binary.
    #[serde(rename = "type")]
    pub connection_type: String,
    pub owner_id: String,
    pub project_id: String,
    /// Source config document written to disk before validation.
    pub config: Value,
}

/// One extracted row, handed opaquely to persistence.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExtractedRecord {
    pub owner_id: String,
    pub project_id: String,
    pub connection_id: String,
    pub stream: String,
    pub record: Value,
}

#[async_trait]
pub trait ConnectionStore: Send + Sync {
    /// Fetch one connection record; Ok(None) when the id is unknown.
    async fn fetch_connection(&self, id: &str) -> Result<Option<ConnectionRecord>>;
    /// Mirror the catalog document into the connection record.
    async fn update_catalog(&self, id: &str, catalog: &Value) -> Result<()>;
    /// Bulk-insert rows into `table`.
    async fn insert_rows(&self, table: &str, rows: &[ExtractedRecord]) -> Result<()>;
}

/// Supabase REST (PostgREST) implementation.
#[derive(Clone)]
pub struct SupabaseStore {
    base_url: String,
    api_key: String,
    client: Client,
    timeout: Duration,
}

impl SupabaseStore {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client: Client::new(),
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{table}", self.base_url)
    }

    fn authed(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        req.header("apikey", &self.api_key)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .timeout(self.timeout)
    }
}

#[async_trait]
impl ConnectionStore for SupabaseStore {
    async fn fetch_connection(&self, id: &str) -> Result<Option<ConnectionRecord>> {
        let resp = self
            .authed(self.client.get(self.table_url("connections")))
            .query(&[("id", format!("eq.{id}")), ("select", "*".to_string())])
            .send()
            .await
            .context("connections fetch request")?;
        let resp = resp
            .error_for_status()
            .context("connections fetch status")?;

        let mut rows: Vec<ConnectionRecord> =
            resp.json().await.context("connections fetch body")?;
        Ok(if rows.is_empty() {
            None
        } else {
            Some(rows.swap_remove(0))
        })
    }

    async fn update_catalog(&self, id: &str, catalog: &Value) -> Result<()> {
        let resp = self
            .authed(self.client.patch(self.table_url("connections")))
            .query(&[("id", format!("eq.{id}"))])
            .json(&serde_json::json!({ "catalog": catalog }))
            .send()
            .await
            .context("catalog update request")?;
        resp.error_for_status()
            .map(|_| ())
            .map_err(|e| anyhow!("catalog update failed: {e}"))
    }

    async fn insert_rows(&self, table: &str, rows: &[ExtractedRecord]) -> Result<()> {
        let resp = self
            .authed(self.client.post(self.table_url(table)))
            .header("Prefer", "return=minimal")
            .json(rows)
            .send()
            .await
            .with_context(|| format!("insert into {table}"))?;
        resp.error_for_status()
            .map(|_| ())
            .map_err(|e| anyhow!("insert into {table} failed: {e}"))
    }
}
