//! Half-hourly reconciliation core.
//!
//! Everything in here is synchronous and free of I/O; the async
//! [`pipeline`](crate::pipeline) drains sources into it.

pub mod bucket;
pub mod cost;
pub mod epoch;
pub mod interval;
pub mod orchestrator;
pub mod register;
pub mod store;
pub mod tariff;

pub use bucket::{bucket_of, Window, ZoneMode, BUCKET_WIDTH};
pub use epoch::{EpochAccumulator, IntervalEpochAggregator};
pub use interval::IntervalConsumptionReconciler;
pub use orchestrator::{Orchestrator, RunInputs};
pub use register::{CumulativeRegisterReconciler, RegisterAccumulator};
pub use store::UsageRowStore;

/// Why a single raw record was left out of a run.
///
/// Never fatal: callers log, count and move on.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SampleError {
    #[error("sample at {at} outside window [{start}, {end})")]
    OutOfRange { at: String, start: String, end: String },
    #[error("malformed record: {0}")]
    Malformed(String),
}

impl SampleError {
    /// Short label used for metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            SampleError::OutOfRange { .. } => "out_of_range",
            SampleError::Malformed(_) => "malformed",
        }
    }
}

/// Logs and counts a skipped record for `feed`.
pub(crate) fn record_rejection(feed: &'static str, err: &SampleError) {
    tracing::warn!(feed, error = %err, "skipping sample");
    metrics::counter!("reconcile_samples_rejected_total", "feed" => feed, "reason" => err.reason()).increment(1);
}
