//! Lock-free pipeline counters surfaced by the status API.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

#[derive(Debug, Default)]
pub struct PipelineStats {
    pub detection_cycles: AtomicU64,
    pub query_failures: AtomicU64,
    pub empty_results: AtomicU64,
    pub generation_failures: AtomicU64,
    pub no_insight: AtomicU64,
    pub insights_added: AtomicU64,
    pub report_cycles: AtomicU64,
    pub reports_delivered: AtomicU64,
    pub delivery_failures: AtomicU64,
}

/// Point-in-time copy of [`PipelineStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub detection_cycles: u64,
    pub query_failures: u64,
    pub empty_results: u64,
    pub generation_failures: u64,
    pub no_insight: u64,
    pub insights_added: u64,
    pub report_cycles: u64,
    pub reports_delivered: u64,
    pub delivery_failures: u64,
}

impl PipelineStats {
    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let get = |c: &AtomicU64| c.load(Ordering::Relaxed);
        StatsSnapshot {
            detection_cycles: get(&self.detection_cycles),
            query_failures: get(&self.query_failures),
            empty_results: get(&self.empty_results),
            generation_failures: get(&self.generation_failures),
            no_insight: get(&self.no_insight),
            insights_added: get(&self.insights_added),
            report_cycles: get(&self.report_cycles),
            reports_delivered: get(&self.reports_delivered),
            delivery_failures: get(&self.delivery_failures),
        }
    }
}
