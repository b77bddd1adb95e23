//! Periodic drivers for the detection and reporting cycles.
//!
//! Both run independently on the tokio worker pool and share nothing but the
//! insight aggregator (detection writes, reporting drains).

pub mod detection;
pub mod reporting;
pub mod ticker;

pub use self::detection::{CycleHandle, DetectionScheduler, DetectionTimeouts, QueryOutcome};
pub use self::reporting::ReportScheduler;
pub use self::ticker::{Cadence, PeriodicJob, Ticker};
