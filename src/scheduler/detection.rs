//! Detection cycle: fan out anomaly queries, turn non-empty batches into
//! insights, deposit them in the aggregator.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::ticker::PeriodicJob;
use crate::aggregator::InsightSink;
use crate::config::AnomalyQuery;
use crate::insight::{Generation, GenerationError, Insight, InsightGenerator};
use crate::metrics::{AnomalyBatch, MetricsQueryClient, QueryError};
use crate::stats::PipelineStats;

/// What happened to one query within one cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryOutcome {
    QueryFailed,
    Empty,
    NoInsight,
    GenerationFailed,
    Recorded,
    /// The per-query task panicked or was aborted.
    Aborted,
}

/// Per-call upper bounds for the two external round trips.
#[derive(Debug, Clone, Copy)]
pub struct DetectionTimeouts {
    pub query: Duration,
    pub generation: Duration,
}

impl Default for DetectionTimeouts {
    fn default() -> Self {
        Self {
            query: Duration::from_secs(10),
            generation: Duration::from_secs(30),
        }
    }
}

#[derive(Clone)]
pub struct DetectionScheduler {
    queries: Arc<Vec<AnomalyQuery>>,
    metrics: Arc<dyn MetricsQueryClient>,
    generator: Arc<dyn InsightGenerator>,
    sink: Arc<dyn InsightSink>,
    stats: Arc<PipelineStats>,
    timeouts: DetectionTimeouts,
}

/// In-flight per-query tasks for one cycle.
///
/// Dropping the handle detaches the tasks; they still land their insights.
pub struct CycleHandle {
    tasks: Vec<(String, JoinHandle<QueryOutcome>)>,
}

impl CycleHandle {
    /// Wait for every query task, returning outcomes in query order.
    pub async fn wait(self) -> Vec<(String, QueryOutcome)> {
        let mut outcomes = Vec::with_capacity(self.tasks.len());
        for (id, handle) in self.tasks {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(query = %id, error = %e, "query task failed to complete");
                    QueryOutcome::Aborted
                }
            };
            outcomes.push((id, outcome));
        }
        outcomes
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

impl DetectionScheduler {
    pub fn new(
        queries: Vec<AnomalyQuery>,
        metrics: Arc<dyn MetricsQueryClient>,
        generator: Arc<dyn InsightGenerator>,
        sink: Arc<dyn InsightSink>,
        stats: Arc<PipelineStats>,
    ) -> Self {
        Self {
            queries: Arc::new(queries),
            metrics,
            generator,
            sink,
            stats,
            timeouts: DetectionTimeouts::default(),
        }
    }

    pub fn with_timeouts(mut self, timeouts: DetectionTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn queries(&self) -> &[AnomalyQuery] {
        &self.queries
    }

    /// Start one detection cycle: one task per query, all concurrent.
    ///
    /// Returns as soon as the tasks are spawned.
    pub fn run_cycle(&self) -> CycleHandle {
        PipelineStats::incr(&self.stats.detection_cycles);
        info!(queries = self.queries.len(), "--- Starting performance analysis ---");

        let tasks = self
            .queries
            .iter()
            .cloned()
            .map(|query| {
                let this = self.clone();
                let id = query.id.clone();
                (id, tokio::spawn(async move { this.process_query(&query).await }))
            })
            .collect();

        CycleHandle { tasks }
    }

    async fn process_query(&self, query: &AnomalyQuery) -> QueryOutcome {
        let expr = query.render();

        let rows = match tokio::time::timeout(self.timeouts.query, self.metrics.query(&expr)).await {
            Ok(Ok(rows)) => rows,
            Ok(Err(e)) => return self.query_failed(query, e),
            Err(_) => return self.query_failed(query, QueryError::Timeout(self.timeouts.query)),
        };

        if rows.is_empty() {
            debug!(query = %query.id, "no anomalies");
            PipelineStats::incr(&self.stats.empty_results);
            return QueryOutcome::Empty;
        }

        let batch = AnomalyBatch::new(&query.id, &query.category, rows);
        warn!(
            query = %query.id,
            category = %query.category,
            rows = batch.len(),
            data = %serde_json::Value::Array(batch.rows.clone()),
            "anomalous endpoints detected"
        );

        let generated =
            match tokio::time::timeout(self.timeouts.generation, self.generator.generate(&batch)).await {
                Ok(result) => result,
                Err(_) => Err(GenerationError::Timeout(self.timeouts.generation)),
            };

        match generated {
            Ok(Generation::Insight(text)) => {
                let insight = Insight::new(&query.category, &text);
                info!(query = %query.id, category = %insight.category, insight = %insight.text, "insight recorded");
                self.sink.add(insight);
                PipelineStats::incr(&self.stats.insights_added);
                QueryOutcome::Recorded
            }
            Ok(Generation::NoInsight) => {
                info!(query = %query.id, "no actionable data in batch");
                PipelineStats::incr(&self.stats.no_insight);
                QueryOutcome::NoInsight
            }
            Err(e) => {
                error!(query = %query.id, error = %e, "insight generation failed, dropping batch");
                PipelineStats::incr(&self.stats.generation_failures);
                QueryOutcome::GenerationFailed
            }
        }
    }

    fn query_failed(&self, query: &AnomalyQuery, e: QueryError) -> QueryOutcome {
        error!(query = %query.id, error = %e, "failed to query metrics backend");
        PipelineStats::incr(&self.stats.query_failures);
        QueryOutcome::QueryFailed
    }
}

#[async_trait]
impl PeriodicJob for DetectionScheduler {
    fn name(&self) -> &'static str {
        "detection"
    }

    async fn run(&self) {
        // Generation may outlive this tick; the aggregator absorbs late results.
        drop(self.run_cycle());
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
