//! Read-only adapters for the places sensor payloads live.
//!
//! - [`HttpSensorStore`]: the primary time-series store, a JSON tree served
//!   over REST (`GET {base}/{path}.json`).
//! - [`PgDocumentStore`]: the secondary document store, one JSONB document
//!   per sensor in PostgreSQL.

use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;
use sqlx::PgPool;

/// Something that can return the raw payload stored under a key.
#[async_trait]
pub trait SensorStore: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Fetch the payload at `key`. `Ok(None)` means nothing is stored there.
    async fn fetch(&self, key: &str) -> Result<Option<Value>>;
}

/// Path conventions tried against the primary store, in order.
pub fn primary_paths(sensor_id: &str) -> Vec<String> {
    // ---
    vec![
        format!("sensors/{sensor_id}/latest"),
        format!("sensors/{sensor_id}/readings/latest"),
        format!("sensors/{sensor_id}"),
        sensor_id.to_string(),
    ]
}

// ---

pub struct HttpSensorStore {
    client: reqwest::Client,
    base_url: String,
}

impl HttpSensorStore {
    /// Build a store whose every request is bounded by `timeout`.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        // ---
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl SensorStore for HttpSensorStore {
    fn name(&self) -> &'static str {
        "time_series"
    }

    async fn fetch(&self, key: &str) -> Result<Option<Value>> {
        // ---
        let url = format!("{}/{}.json", self.base_url, key);
        tracing::debug!("Fetching sensor payload from: {}", url);

        let response = self.client.get(&url).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let body: Value = response.error_for_status()?.json().await?;
        Ok((!body.is_null()).then_some(body))
    }
}

// ---

pub struct PgDocumentStore {
    pool: PgPool,
    timeout: Duration,
}

impl PgDocumentStore {
    pub fn new(pool: PgPool, timeout: Duration) -> Self {
        Self { pool, timeout }
    }
}

#[async_trait]
impl SensorStore for PgDocumentStore {
    fn name(&self) -> &'static str {
        "document"
    }

    async fn fetch(&self, key: &str) -> Result<Option<Value>> {
        // ---
        let query = sqlx::query_scalar::<_, Value>(
            "SELECT payload FROM sensor_documents WHERE sensor_id = $1",
        )
        .bind(key)
        .fetch_optional(&self.pool);

        let payload = tokio::time::timeout(self.timeout, query)
            .await
            .map_err(|_| anyhow!("document store read timed out after {:?}", self.timeout))??;
        Ok(payload.filter(|v| !v.is_null()))
    }
}
