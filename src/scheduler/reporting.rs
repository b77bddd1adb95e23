//! Reporting cycle: drain the aggregator, render, deliver once.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tracing::{error, info};

use super::ticker::PeriodicJob;
use crate::aggregator::InsightDrain;
use crate::report::{DeliveryError, Report, ReportDelivery};
use crate::stats::PipelineStats;

#[derive(Clone)]
pub struct ReportScheduler {
    drain: Arc<dyn InsightDrain>,
    delivery: Arc<dyn ReportDelivery>,
    stats: Arc<PipelineStats>,
    timeout: Duration,
}

impl ReportScheduler {
    pub fn new(
        drain: Arc<dyn InsightDrain>,
        delivery: Arc<dyn ReportDelivery>,
        stats: Arc<PipelineStats>,
        timeout: Duration,
    ) -> Self {
        Self {
            drain,
            delivery,
            stats,
            timeout,
        }
    }

    /// Drain everything pending into a fresh report.
    pub fn build_report(&self) -> Report {
        Report::new(self.drain.drain_all())
    }

    /// Drain now, then deliver on a spawned task.
    ///
    /// The drain is destructive: if delivery fails, the insights are gone.
    pub fn run_cycle(&self) -> JoinHandle<Result<(), DeliveryError>> {
        PipelineStats::incr(&self.stats.report_cycles);
        let report = self.build_report();
        info!(
            insights = report.insights.len(),
            "--- Generating scheduled performance report ---"
        );
        let body = report.render();

        let delivery = self.delivery.clone();
        let stats = self.stats.clone();
        let timeout = self.timeout;
        tokio::spawn(async move {
            let result = match tokio::time::timeout(timeout, delivery.deliver(&report, &body)).await {
                Ok(result) => result,
                Err(_) => Err(DeliveryError::Timeout(timeout)),
            };
            match &result {
                Ok(()) => {
                    PipelineStats::incr(&stats.reports_delivered);
                    info!(channel = delivery.name(), insights = report.insights.len(), "report delivered");
                }
                Err(e) => {
                    PipelineStats::incr(&stats.delivery_failures);
                    error!(
                        channel = delivery.name(),
                        lost = report.insights.len(),
                        error = %e,
                        "report delivery failed"
                    );
                }
            }
            result
        })
    }
}

#[async_trait]
impl PeriodicJob for ReportScheduler {
    fn name(&self) -> &'static str {
        "report"
    }

    async fn run(&self) {
        drop(self.run_cycle());
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
