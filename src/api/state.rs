use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::config::AnalyzerConfig;
use crate::stats::PipelineStats;

#[derive(Clone)]
pub struct AppState {
    pub stats: Arc<PipelineStats>,
    pub config: Arc<AnalyzerConfig>,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(stats: Arc<PipelineStats>, config: Arc<AnalyzerConfig>) -> Self {
        Self {
            stats,
            config,
            started_at: Utc::now(),
        }
    }
}
