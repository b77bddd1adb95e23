//! Prometheus instant-query client.
//!
//! Issues `GET {base}/api/v1/query?query=<expr>` and extracts the rows under
//! `data.result`. A missing key or an empty list both mean "no anomalies".

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use super::{MetricsQueryClient, QueryError};

pub struct PrometheusClient {
    client: Client,
    base_url: String,
}

impl PrometheusClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, QueryError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/api/v1/query", self.base_url)
    }
}

#[async_trait]
impl MetricsQueryClient for PrometheusClient {
    async fn query(&self, expr: &str) -> Result<Vec<Value>, QueryError> {
        debug!(%expr, "querying metrics backend");

        let resp = self
            .client
            .get(self.endpoint())
            .query(&[("query", expr)])
            .send()
            .await?;
        let status = resp.status();
        let body = resp.text().await?;

        // Prometheus reports query errors as JSON even on 4xx.
        let parsed: Option<Value> = serde_json::from_str(&body).ok();
        if let Some(root) = &parsed {
            if root.get("status").and_then(Value::as_str) == Some("error") {
                return Err(QueryError::Backend {
                    kind: root
                        .get("errorType")
                        .and_then(Value::as_str)
                        .unwrap_or("unknown")
                        .to_string(),
                    message: root
                        .get("error")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                });
            }
        }

        if !status.is_success() {
            return Err(QueryError::Status(status.as_u16()));
        }

        let root = parsed.ok_or_else(|| QueryError::Malformed("body is not JSON".to_string()))?;
        extract_rows(&root)
    }
}

/// Pull `data.result` out of a query response.
pub fn extract_rows(root: &Value) -> Result<Vec<Value>, QueryError> {
    match root.pointer("/data/result") {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(rows)) => Ok(rows.clone()),
        Some(other) => Err(QueryError::Malformed(format!(
            "data.result is not a list: {}",
            other
        ))),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
