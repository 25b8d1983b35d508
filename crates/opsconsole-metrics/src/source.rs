use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use futures::future::BoxFuture;
use serde::Deserialize;

use opsconsole_types::{MetricsPayload, MetricsSnapshot, RawLogRecord};

use crate::MetricsError;

/// Upper bound on a single aggregate request
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Parameters of one aggregate request
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MetricsQuery {
    pub limit: usize,
    pub minutes: u32,
    pub metrics_only: bool,
    pub logs_only: bool,
}

impl MetricsQuery {
    /// Counters only, no log records
    pub fn metrics(limit: usize, minutes: u32) -> Self {
        Self {
            limit,
            minutes,
            metrics_only: true,
            logs_only: false,
        }
    }

    /// Recent log records only, used to preload the buffer
    pub fn logs(limit: usize, minutes: u32) -> Self {
        Self {
            limit,
            minutes,
            metrics_only: false,
            logs_only: true,
        }
    }

    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![
            ("limit", self.limit.to_string()),
            ("minutes", self.minutes.to_string()),
        ];
        if self.metrics_only {
            pairs.push(("metricsOnly", "true".to_string()));
        }
        if self.logs_only {
            pairs.push(("logsOnly", "true".to_string()));
        }
        pairs
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RateLimit {
    pub remaining: Option<u64>,
}

/// Body of the aggregate endpoint
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MetricsResponse {
    pub logs: Option<Vec<RawLogRecord>>,
    pub metrics: Option<MetricsPayload>,
    pub observed_at: Option<String>,
    pub rate_limit: Option<RateLimit>,
}

impl MetricsResponse {
    /// Server observation time, or `fallback` when absent or unparsable
    pub fn observed_at(&self, fallback: DateTime<Utc>) -> DateTime<Utc> {
        self.observed_at
            .as_deref()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or(fallback)
    }

    pub fn rate_limit_remaining(&self) -> Option<u64> {
        self.rate_limit.and_then(|r| r.remaining)
    }

    /// Take the metrics payload as a snapshot
    pub fn take_snapshot(&mut self, received_at: DateTime<Utc>) -> Option<MetricsSnapshot> {
        let observed_at = self.observed_at(received_at);
        self.metrics
            .take()
            .map(|payload| MetricsSnapshot::from_payload(payload, observed_at))
    }
}

/// Fetches aggregate metrics
///
/// Dropping the returned future abandons the request.
pub trait MetricsSource: Send + Sync + 'static {
    fn fetch(&self, query: MetricsQuery) -> BoxFuture<'static, Result<MetricsResponse, MetricsError>>;
}

/// Aggregate metrics over plain HTTP GET
pub struct HttpMetricsSource {
    client: reqwest::Client,
    url: String,
}

impl HttpMetricsSource {
    pub fn new(url: impl Into<String>) -> Result<Self, MetricsError> {
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self::with_client(client, url))
    }

    pub fn with_client(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

impl MetricsSource for HttpMetricsSource {
    fn fetch(&self, query: MetricsQuery) -> BoxFuture<'static, Result<MetricsResponse, MetricsError>> {
        let request = self.client.get(&self.url).query(&query.query_pairs());

        async move {
            let response = request.send().await?;
            let status = response.status();
            if !status.is_success() {
                return Err(MetricsError::Status(status.as_u16()));
            }
            let body = response.bytes().await?;
            Ok(serde_json::from_slice(&body)?)
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_pairs_flags() {
        let pairs = MetricsQuery::metrics(500, 60).query_pairs();
        assert!(pairs.contains(&("metricsOnly", "true".to_string())));
        assert!(!pairs.iter().any(|(k, _)| *k == "logsOnly"));

        let pairs = MetricsQuery::logs(200, 15).query_pairs();
        assert!(pairs.contains(&("limit", "200".to_string())));
        assert!(pairs.contains(&("minutes", "15".to_string())));
        assert!(pairs.contains(&("logsOnly", "true".to_string())));
    }

    #[test]
    fn test_response_shape() {
        let json = r#"{
            "logs": [{"id": "a", "message": "boot", "level": "warning"}],
            "metrics": {"windowMinutes": 60, "total": 40, "errors": 2},
            "observedAt": "2024-01-15T10:30:00Z",
            "rateLimit": {"remaining": 17}
        }"#;
        let mut response: MetricsResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.rate_limit_remaining(), Some(17));
        assert_eq!(response.logs.as_ref().map(Vec::len), Some(1));

        let snapshot = response.take_snapshot(Utc::now()).unwrap();
        assert_eq!(snapshot.error_rate, 0.05);
        assert_eq!(snapshot.observed_at.to_rfc3339(), "2024-01-15T10:30:00+00:00");
        assert!(response.metrics.is_none());
    }

    #[test]
    fn test_bad_observed_at_falls_back() {
        let response = MetricsResponse {
            observed_at: Some("yesterday".into()),
            ..Default::default()
        };
        let now = Utc::now();
        assert_eq!(response.observed_at(now), now);
    }
}
