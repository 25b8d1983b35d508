use chrono::{DateTime, Utc};
use ratatui::style::Color;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Latency percentiles in milliseconds, computed upstream
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LatencyStats {
    pub average: f64,
    pub p50: f64,
    pub p95: f64,
    pub p99: f64,
}

/// Aggregate counters as delivered by the metrics source (`metrics` object)
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MetricsPayload {
    pub window_minutes: u32,
    pub total: u64,
    pub errors: u64,
    pub invocations_per_minute: f64,
    /// Upstream value; ignored in favour of `errors / total`
    pub error_rate: f64,
    pub latency: LatencyStats,
    pub functions: BTreeMap<String, MetricsPayload>,
}

/// Per-function breakdown inside a snapshot
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionMetrics {
    pub total: u64,
    pub errors: u64,
    pub invocations_per_minute: f64,
    pub error_rate: f64,
    pub latency: LatencyStats,
}

/// Immutable metrics observation; a newer snapshot supersedes it wholesale
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub window_minutes: u32,
    pub total: u64,
    pub errors: u64,
    pub invocations_per_minute: f64,
    /// `errors / total`, 0 when total is 0
    pub error_rate: f64,
    pub latency: LatencyStats,
    pub functions: BTreeMap<String, FunctionMetrics>,
    pub observed_at: DateTime<Utc>,
}

impl MetricsSnapshot {
    /// Build a snapshot, deriving error rates from the raw counters
    pub fn from_payload(payload: MetricsPayload, observed_at: DateTime<Utc>) -> Self {
        let functions = payload
            .functions
            .into_iter()
            .map(|(name, f)| {
                let metrics = FunctionMetrics {
                    total: f.total,
                    errors: f.errors,
                    invocations_per_minute: f.invocations_per_minute,
                    error_rate: error_rate(f.errors, f.total),
                    latency: f.latency,
                };
                (name, metrics)
            })
            .collect();

        Self {
            window_minutes: payload.window_minutes,
            total: payload.total,
            errors: payload.errors,
            invocations_per_minute: payload.invocations_per_minute,
            error_rate: error_rate(payload.errors, payload.total),
            latency: payload.latency,
            functions,
            observed_at,
        }
    }

    pub fn severity(&self) -> Severity {
        Severity::from_error_rate(self.error_rate)
    }

    /// Reduce to a sparkline point
    pub fn point(&self) -> MetricsPoint {
        MetricsPoint {
            observed_at: self.observed_at,
            invocations_per_minute: self.invocations_per_minute,
            error_rate: self.error_rate,
            p95: self.latency.p95,
        }
    }
}

/// `errors / total`, defined as 0 when there were no invocations
pub fn error_rate(errors: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        errors as f64 / total as f64
    }
}

/// Error-rate banding shared by every metrics consumer
///
/// Warning from 5% inclusive; critical only above 10%, so exactly 10% is
/// still a warning.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Severity {
    Healthy,
    Warning,
    Critical,
}

impl Severity {
    pub const WARNING_THRESHOLD: f64 = 0.05;
    pub const CRITICAL_THRESHOLD: f64 = 0.10;

    pub fn from_error_rate(rate: f64) -> Self {
        if rate > Self::CRITICAL_THRESHOLD {
            Self::Critical
        } else if rate >= Self::WARNING_THRESHOLD {
            Self::Warning
        } else {
            Self::Healthy
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Warning => "warning",
            Self::Critical => "critical",
        }
    }

    pub fn color(&self) -> Color {
        match self {
            Self::Healthy => Color::Green,
            Self::Warning => Color::Yellow,
            Self::Critical => Color::Red,
        }
    }
}

/// One derived point of the rolling metrics history
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MetricsPoint {
    pub observed_at: DateTime<Utc>,
    pub invocations_per_minute: f64,
    pub error_rate: f64,
    pub p95: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(total: u64, errors: u64) -> MetricsPayload {
        MetricsPayload {
            total,
            errors,
            ..Default::default()
        }
    }

    #[test]
    fn test_ten_percent_error_rate_is_warning() {
        let snapshot = MetricsSnapshot::from_payload(payload(100, 10), Utc::now());
        assert_eq!(snapshot.error_rate, 0.10);
        assert_eq!(snapshot.severity(), Severity::Warning);
    }

    #[test]
    fn test_severity_bands() {
        assert_eq!(Severity::from_error_rate(0.0), Severity::Healthy);
        assert_eq!(Severity::from_error_rate(0.049), Severity::Healthy);
        assert_eq!(Severity::from_error_rate(error_rate(5, 100)), Severity::Warning);
        assert_eq!(Severity::from_error_rate(0.099), Severity::Warning);
        assert_eq!(Severity::from_error_rate(error_rate(10, 100)), Severity::Warning);
        assert_eq!(Severity::from_error_rate(error_rate(11, 100)), Severity::Critical);
        assert_eq!(Severity::from_error_rate(error_rate(4, 100)), Severity::Healthy);
    }

    #[test]
    fn test_zero_total_has_zero_error_rate() {
        let snapshot = MetricsSnapshot::from_payload(payload(0, 3), Utc::now());
        assert_eq!(snapshot.error_rate, 0.0);
        assert_eq!(snapshot.severity(), Severity::Healthy);
    }

    #[test]
    fn test_upstream_error_rate_is_recomputed() {
        let json = r#"{
            "windowMinutes": 60, "total": 200, "errors": 4, "errorRate": 0.9,
            "invocationsPerMinute": 3.3,
            "latency": {"average": 12.5, "p50": 10, "p95": 40, "p99": 80},
            "functions": {"checkout": {"total": 10, "errors": 1}}
        }"#;
        let payload: MetricsPayload = serde_json::from_str(json).unwrap();
        let snapshot = MetricsSnapshot::from_payload(payload, Utc::now());
        assert_eq!(snapshot.error_rate, 0.02);
        assert_eq!(snapshot.latency.p95, 40.0);
        assert_eq!(snapshot.functions["checkout"].error_rate, 0.1);
    }
}
