use std::collections::VecDeque;

use opsconsole_types::MetricsPoint;

pub const DEFAULT_HISTORY_CAP: usize = 60;

/// Bounded FIFO of metrics points for sparklines
#[derive(Clone, Debug)]
pub struct MetricsHistory {
    points: VecDeque<MetricsPoint>,
    cap: usize,
}

impl Default for MetricsHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAP)
    }
}

impl MetricsHistory {
    pub fn new(cap: usize) -> Self {
        let cap = cap.max(1);
        Self {
            points: VecDeque::with_capacity(cap),
            cap,
        }
    }

    pub fn push(&mut self, point: MetricsPoint) {
        while self.points.len() >= self.cap {
            self.points.pop_front();
        }
        self.points.push_back(point);
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    pub fn latest(&self) -> Option<&MetricsPoint> {
        self.points.back()
    }

    pub fn points(&self) -> impl Iterator<Item = &MetricsPoint> {
        self.points.iter()
    }

    /// Error rate per point in basis points (1/100 of a percent)
    pub fn error_rate_series(&self) -> Vec<u64> {
        self.series(|p| p.error_rate * 10_000.0)
    }

    pub fn invocation_series(&self) -> Vec<u64> {
        self.series(|p| p.invocations_per_minute)
    }

    pub fn p95_series(&self) -> Vec<u64> {
        self.series(|p| p.p95)
    }

    // Sparklines take u64; negative and NaN values floor to zero
    fn series(&self, f: impl Fn(&MetricsPoint) -> f64) -> Vec<u64> {
        self.points
            .iter()
            .map(|p| {
                let v = f(p);
                if v.is_finite() && v > 0.0 { v.round() as u64 } else { 0 }
            })
            .collect()
    }
}
