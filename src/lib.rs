//! perfanalyzer -- periodic HTTP performance anomaly detection with generated
//! remediation insights.
//!
//! A fast detection cycle queries the metrics backend for slow and erroring
//! endpoints and turns each anomaly batch into a short insight. A slower
//! reporting cycle drains the accumulated insights into one report.

pub mod aggregator;
pub mod api;
pub mod config;
pub mod demo;
pub mod insight;
pub mod metrics;
pub mod report;
pub mod scheduler;
pub mod stats;

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::aggregator::InsightAggregator;
use crate::config::AnalyzerConfig;
use crate::insight::{ChatInsightGenerator, InsightGenerator};
use crate::metrics::{MetricsQueryClient, PrometheusClient};
use crate::report::ReportDelivery;
use crate::scheduler::{Cadence, DetectionScheduler, DetectionTimeouts, ReportScheduler, Ticker};
use crate::stats::PipelineStats;

/// The wired-up detection and reporting schedulers around one aggregator.
pub struct Pipeline {
    pub stats: Arc<PipelineStats>,
    pub detection: Arc<DetectionScheduler>,
    pub report: Arc<ReportScheduler>,
    detection_cadence: Cadence,
    report_cadence: Cadence,
}

/// Tickers of a started [`Pipeline`].
pub struct RunningPipeline {
    detection: Ticker,
    report: Ticker,
    final_report: Arc<ReportScheduler>,
}

impl Pipeline {
    /// Build the pipeline with the HTTP collaborators named in `cfg`.
    pub fn from_config(cfg: &AnalyzerConfig) -> Result<Self> {
        let metrics = PrometheusClient::new(&cfg.metrics.base_url, cfg.metrics.timeout())
            .context("Failed to build metrics client")?;
        let generator =
            ChatInsightGenerator::new(&cfg.ai).context("Failed to build completion client")?;
        let delivery = report::delivery::from_config(&cfg.report.delivery, cfg.report.timeout())
            .context("Failed to build report delivery")?;

        if cfg.ai.api_key.is_empty() {
            warn!("no completion API key configured, insight generation will likely fail");
        }

        Self::new(cfg, Arc::new(metrics), Arc::new(generator), Arc::from(delivery))
    }

    /// Build the pipeline around caller-supplied collaborators.
    pub fn new(
        cfg: &AnalyzerConfig,
        metrics: Arc<dyn MetricsQueryClient>,
        generator: Arc<dyn InsightGenerator>,
        delivery: Arc<dyn ReportDelivery>,
    ) -> Result<Self> {
        let aggregator = InsightAggregator::shared();
        let stats = Arc::new(PipelineStats::default());

        let detection = DetectionScheduler::new(
            cfg.detection.queries.clone(),
            metrics,
            generator,
            aggregator.clone(),
            stats.clone(),
        )
        .with_timeouts(DetectionTimeouts {
            query: cfg.metrics.timeout(),
            generation: cfg.ai.timeout(),
        });

        let report = ReportScheduler::new(aggregator, delivery, stats.clone(), cfg.report.timeout());

        let report_cadence = match &cfg.report.cron {
            Some(expr) => Cadence::cron(expr)?,
            None => Cadence::every(cfg.report.interval()),
        };

        Ok(Self {
            stats,
            detection: Arc::new(detection),
            report: Arc::new(report),
            detection_cadence: Cadence::every_immediately(cfg.detection.interval()),
            report_cadence,
        })
    }

    /// Start both tickers. Cancelling `cancel` stops them.
    pub fn start(&self, cancel: &CancellationToken) -> RunningPipeline {
        RunningPipeline {
            detection: Ticker::start(self.detection.clone(), self.detection_cadence.clone(), cancel),
            report: Ticker::start(self.report.clone(), self.report_cadence.clone(), cancel),
            final_report: self.report.clone(),
        }
    }
}

impl RunningPipeline {
    /// Stop both tickers, then flush whatever is pending in one last report.
    pub async fn shutdown(self) {
        self.detection.stop().await;
        self.report.stop().await;
        info!("flushing pending insights before exit");
        if let Err(e) = self.final_report.run_cycle().await {
            warn!(error = %e, "final report task failed");
        }
    }
}

/// Run one detection cycle to completion and return the rendered report.
pub async fn detect_once(cfg: &AnalyzerConfig) -> Result<String> {
    let pipeline = Pipeline::from_config(cfg)?;
    let outcomes = pipeline.detection.run_cycle().wait().await;
    for (query, outcome) in &outcomes {
        info!(%query, ?outcome, "query finished");
    }
    Ok(pipeline.report.build_report().render())
}

/// Start the analyzer: both schedulers plus the status API, until Ctrl-C.
pub async fn serve(cfg: AnalyzerConfig) -> Result<()> {
    let cfg = Arc::new(cfg);
    let pipeline = Pipeline::from_config(&cfg)?;

    let cancel = CancellationToken::new();
    let running = pipeline.start(&cancel);

    let addr: std::net::SocketAddr = cfg
        .api
        .bind
        .parse()
        .with_context(|| format!("Invalid api.bind address '{}'", cfg.api.bind))?;
    let app = api::router(api::state::AppState::new(pipeline.stats.clone(), cfg.clone()));

    info!(%addr, "perfanalyzer status API listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let shutdown = cancel.clone();
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => info!("shutdown requested"),
                _ = shutdown.cancelled() => {}
            }
        })
        .await;

    cancel.cancel();
    running.shutdown().await;
    served?;
    Ok(())
}
