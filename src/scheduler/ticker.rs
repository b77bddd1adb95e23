//! Periodic triggers with explicit start/stop.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use cron::Schedule as CronSchedule;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// When a [`Ticker`] fires.
#[derive(Debug, Clone)]
pub enum Cadence {
    /// Fixed period. With `immediate` the first tick fires on start,
    /// otherwise one period after start.
    Every { period: Duration, immediate: bool },
    /// Cron expression, evaluated in UTC.
    Cron(Box<CronSchedule>),
}

impl Cadence {
    pub fn every(period: Duration) -> Self {
        Cadence::Every {
            period,
            immediate: false,
        }
    }

    pub fn every_immediately(period: Duration) -> Self {
        Cadence::Every {
            period,
            immediate: true,
        }
    }

    pub fn cron(expr: &str) -> Result<Self> {
        let schedule = CronSchedule::from_str(expr)
            .map_err(|e| anyhow::anyhow!("Invalid cron expression '{}': {}", expr, e))?;
        Ok(Cadence::Cron(Box::new(schedule)))
    }

    /// Delay until the next cron firing, `None` if the schedule is exhausted.
    fn next_cron_delay(schedule: &CronSchedule) -> Option<Duration> {
        let now = Utc::now();
        let next = schedule.after(&now).next()?;
        Some((next - now).to_std().unwrap_or(Duration::ZERO))
    }
}

/// A unit of work driven by a [`Ticker`].
#[async_trait]
pub trait PeriodicJob: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    /// One tick. Should hand long I/O off to spawned tasks so the timer
    /// is not held up.
    async fn run(&self);
}

/// Owns the background loop for one periodic job.
pub struct Ticker {
    name: &'static str,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl Ticker {
    /// Spawn the loop. Cancelling `parent` stops this ticker too.
    pub fn start(job: Arc<dyn PeriodicJob>, cadence: Cadence, parent: &CancellationToken) -> Self {
        let name = job.name();
        let cancel = parent.child_token();
        let handle = tokio::spawn(run_loop(job, cadence, cancel.clone()));
        info!(ticker = name, "ticker started");
        Self {
            name,
            cancel,
            handle,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Cancel the loop and wait for it to exit.
    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.handle.await {
            warn!(ticker = self.name, error = %e, "ticker task ended abnormally");
        }
        info!(ticker = self.name, "ticker stopped");
    }
}

async fn run_loop(job: Arc<dyn PeriodicJob>, cadence: Cadence, cancel: CancellationToken) {
    match cadence {
        Cadence::Every { period, immediate } => {
            let first = if immediate {
                Instant::now()
            } else {
                Instant::now() + period
            };
            let mut interval = tokio::time::interval_at(first, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = interval.tick() => {
                        debug!(ticker = job.name(), "tick");
                        job.run().await;
                    }
                }
            }
        }
        Cadence::Cron(schedule) => loop {
            let Some(delay) = Cadence::next_cron_delay(&schedule) else {
                warn!(ticker = job.name(), "cron schedule has no upcoming runs");
                break;
            };
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {
                    debug!(ticker = job.name(), "tick");
                    job.run().await;
                }
            }
        },
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
