//! Report construction and plain-text rendering.

pub mod delivery;

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::insight::Insight;

pub use self::delivery::{DeliveryError, FileDelivery, LogDelivery, ReportDelivery, WebhookDelivery};

/// Body sent when a reporting window closed with nothing pending.
pub const NOTHING_TO_REPORT: &str = "No significant performance issues detected in the past period.";

pub const REPORT_TITLE: &str = "API Performance Insights Report";

const RULE: &str = "===================================";

/// Insights captured by one drain plus the time the report was built.
///
/// Built fresh every reporting cycle and dropped after delivery.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub insights: Vec<Insight>,
    pub generated_at: DateTime<Utc>,
}

impl Report {
    pub fn new(insights: Vec<Insight>) -> Self {
        Self::at(insights, Utc::now())
    }

    pub fn at(insights: Vec<Insight>, generated_at: DateTime<Utc>) -> Self {
        Self {
            insights,
            generated_at,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.insights.is_empty()
    }

    /// Number of insights per category, sorted by category.
    pub fn category_counts(&self) -> BTreeMap<&str, usize> {
        let mut counts = BTreeMap::new();
        for i in &self.insights {
            *counts.entry(i.category.as_str()).or_insert(0) += 1;
        }
        counts
    }

    /// Render the plain-text body handed to delivery.
    pub fn render(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str(NOTHING_TO_REPORT);
        }

        writeln!(f, "{}:", REPORT_TITLE)?;
        writeln!(f, "{}\n", RULE)?;
        for (n, insight) in self.insights.iter().enumerate() {
            writeln!(f, "{}. [{}] {}\n", n + 1, insight.category, insight.text)?;
        }

        let summary: Vec<String> = self
            .category_counts()
            .into_iter()
            .map(|(cat, count)| format!("{}: {}", cat, count))
            .collect();

        writeln!(f, "{}", RULE)?;
        writeln!(f, "By category: {}", summary.join(", "))?;
        write!(
            f,
            "Report generated on: {}",
            self.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
        )
    }
}
