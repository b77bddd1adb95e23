//! Report delivery channels.
//!
//! A delivery gets exactly one attempt per reporting cycle. Failures are
//! returned to the caller for logging; nothing is retried or requeued.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::info;

use super::{Report, REPORT_TITLE};
use crate::config::DeliveryConfig;

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("delivery endpoint unreachable: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("delivery endpoint returned HTTP {0}")]
    Status(u16),
    #[error("failed to write report: {0}")]
    Io(#[from] std::io::Error),
    #[error("report delivery timed out after {0:?}")]
    Timeout(Duration),
}

#[async_trait]
pub trait ReportDelivery: Send + Sync {
    /// Short name used in log fields.
    fn name(&self) -> &'static str;

    async fn deliver(&self, report: &Report, body: &str) -> Result<(), DeliveryError>;
}

/// Build the delivery channel named by the config.
pub fn from_config(
    cfg: &DeliveryConfig,
    timeout: Duration,
) -> Result<Box<dyn ReportDelivery>, DeliveryError> {
    Ok(match cfg {
        DeliveryConfig::Log => Box::new(LogDelivery),
        DeliveryConfig::Webhook { url } => Box::new(WebhookDelivery::new(url, timeout)?),
        DeliveryConfig::File { path } => Box::new(FileDelivery::new(path.clone())),
    })
}

// ---------------------------------------------------------------------------
// Log
// ---------------------------------------------------------------------------

pub struct LogDelivery;

#[async_trait]
impl ReportDelivery for LogDelivery {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn deliver(&self, report: &Report, body: &str) -> Result<(), DeliveryError> {
        info!(insights = report.insights.len(), "\n{}", body);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Webhook
// ---------------------------------------------------------------------------

pub struct WebhookDelivery {
    client: Client,
    url: String,
}

impl WebhookDelivery {
    pub fn new(url: &str, timeout: Duration) -> Result<Self, DeliveryError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.to_string(),
        })
    }
}

#[async_trait]
impl ReportDelivery for WebhookDelivery {
    fn name(&self) -> &'static str {
        "webhook"
    }

    async fn deliver(&self, report: &Report, body: &str) -> Result<(), DeliveryError> {
        let payload = json!({
            "subject": REPORT_TITLE,
            "text": body,
            "generated_at": report.generated_at.to_rfc3339(),
            "insight_count": report.insights.len(),
        });
        let resp = self.client.post(&self.url).json(&payload).send().await?;
        if !resp.status().is_success() {
            return Err(DeliveryError::Status(resp.status().as_u16()));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// File
// ---------------------------------------------------------------------------

/// Appends each report to a file, separated by a blank line and a marker.
pub struct FileDelivery {
    path: PathBuf,
}

impl FileDelivery {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

#[async_trait]
impl ReportDelivery for FileDelivery {
    fn name(&self) -> &'static str {
        "file"
    }

    async fn deliver(&self, _report: &Report, body: &str) -> Result<(), DeliveryError> {
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(body.as_bytes()).await?;
        file.write_all(b"\n\n--- end of report ---\n\n").await?;
        file.flush().await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
