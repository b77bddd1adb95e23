//! Metrics backend access -- query trait, anomaly batches, Prometheus client.

pub mod prometheus;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

pub use self::prometheus::PrometheusClient;

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("metrics backend unreachable: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("metrics backend returned HTTP {0}")]
    Status(u16),
    #[error("metrics backend rejected query ({kind}): {message}")]
    Backend { kind: String, message: String },
    #[error("malformed metrics response: {0}")]
    Malformed(String),
    #[error("metrics query timed out after {0:?}")]
    Timeout(std::time::Duration),
}

/// Trait for anything that can evaluate an anomaly expression.
///
/// Returns the raw result rows; an empty vector means "no anomalies".
#[async_trait]
pub trait MetricsQueryClient: Send + Sync {
    async fn query(&self, expr: &str) -> Result<Vec<serde_json::Value>, QueryError>;
}

/// The rows returned for one anomaly query at one point in time.
///
/// Lives only for the duration of a detection cycle.
#[derive(Debug, Clone, Serialize)]
pub struct AnomalyBatch {
    pub query_id: String,
    pub category: String,
    pub rows: Vec<serde_json::Value>,
    pub fetched_at: DateTime<Utc>,
}

impl AnomalyBatch {
    pub fn new(query_id: &str, category: &str, rows: Vec<serde_json::Value>) -> Self {
        Self {
            query_id: query_id.to_string(),
            category: category.to_string(),
            rows,
            fetched_at: Utc::now(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }
}
