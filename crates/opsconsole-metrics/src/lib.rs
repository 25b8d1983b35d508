//! Aggregate metrics for opsconsole
//!
//! Pulls counters and latency percentiles from the aggregate endpoint on a
//! fixed interval, keeping the last good snapshot and a short history for
//! sparklines.

mod history;
mod poller;
mod source;

pub use history::{DEFAULT_HISTORY_CAP, MetricsHistory};
pub use poller::{FetchOutcome, MetricsPoller, MetricsState};
pub use source::{HttpMetricsSource, MetricsQuery, MetricsResponse, MetricsSource, RateLimit};

#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    #[error("metrics request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("metrics endpoint returned HTTP {0}")]
    Status(u16),

    #[error("invalid metrics response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("metrics response carried no metrics")]
    MissingMetrics,
}
