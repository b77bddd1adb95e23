//! Insights -- the generated remediation text tied to one anomaly batch.

pub mod chat;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::metrics::AnomalyBatch;

pub use self::chat::ChatInsightGenerator;

/// A generated recommendation, tagged with the category of the query that
/// produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insight {
    pub id: Uuid,
    pub category: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

impl Insight {
    pub fn new(category: &str, text: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            category: category.to_string(),
            text: text.trim().to_string(),
            created_at: Utc::now(),
        }
    }
}

/// Successful outcome of a generation attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Generation {
    Insight(String),
    /// The batch held nothing actionable. Not an error.
    NoInsight,
}

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("completion backend unreachable: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("completion backend rejected credentials (HTTP {0})")]
    Unauthorized(u16),
    #[error("completion backend rate limited the request")]
    RateLimited,
    #[error("completion backend returned HTTP {0}")]
    Status(u16),
    #[error("malformed completion response: {0}")]
    Malformed(String),
    #[error("completion contained no content")]
    EmptyContent,
    #[error("insight generation timed out after {0:?}")]
    Timeout(std::time::Duration),
}

/// Turns an anomaly batch into a short textual insight.
#[async_trait]
pub trait InsightGenerator: Send + Sync {
    async fn generate(&self, batch: &AnomalyBatch) -> Result<Generation, GenerationError>;
}
