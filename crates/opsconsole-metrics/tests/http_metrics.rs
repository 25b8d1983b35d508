use std::sync::Arc;

use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use opsconsole_metrics::{FetchOutcome, HttpMetricsSource, MetricsPoller};
use opsconsole_types::{LogLevel, Severity};

fn metrics_body(total: u64, errors: u64) -> serde_json::Value {
    json!({
        "metrics": {
            "windowMinutes": 60,
            "total": total,
            "errors": errors,
            "invocationsPerMinute": 12.5,
            "latency": {"average": 40.0, "p50": 30.0, "p95": 120.0, "p99": 300.0},
            "functions": {
                "checkout": {"total": 20, "errors": 3}
            }
        },
        "observedAt": "2024-01-15T10:30:00Z",
        "rateLimit": {"remaining": 42}
    })
}

async fn poller_for(server: &MockServer) -> MetricsPoller {
    let source = HttpMetricsSource::new(format!("{}/console/metrics", server.uri())).unwrap();
    MetricsPoller::new(Arc::new(source), 500, 60)
}

#[tokio::test]
async fn http_500_keeps_prior_snapshot() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/console/metrics"))
        .and(query_param("metricsOnly", "true"))
        .and(query_param("limit", "500"))
        .and(query_param("minutes", "60"))
        .respond_with(ResponseTemplate::new(200).set_body_json(metrics_body(100, 10)))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let poller = poller_for(&server).await;
    assert_eq!(poller.fetch_metrics().await, FetchOutcome::Applied);

    let state = poller.state();
    let snapshot = state.snapshot.clone().unwrap();
    assert_eq!(snapshot.error_rate, 0.10);
    assert_eq!(snapshot.severity(), Severity::Warning);
    assert_eq!(snapshot.latency.p95, 120.0);
    assert_eq!(snapshot.functions["checkout"].error_rate, 0.15);
    assert_eq!(state.rate_limit_remaining, Some(42));

    assert_eq!(poller.fetch_metrics().await, FetchOutcome::Failed);
    let state = poller.state();
    assert_eq!(state.snapshot.unwrap().total, 100);
    assert!(state.error.is_some_and(|e| !e.is_empty()));
    assert_eq!(state.history.len(), 1);
}

#[tokio::test]
async fn malformed_body_is_a_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;

    let poller = poller_for(&server).await;
    assert_eq!(poller.fetch_metrics().await, FetchOutcome::Failed);
    assert!(poller.snapshot().is_none());
}

#[tokio::test]
async fn preload_normalizes_log_records() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(query_param("logsOnly", "true"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "logs": [
                {"id": "a", "ts": 1705314600000i64, "source": "ai", "level": "fatal", "message": "model down"},
                {"message": "no id or level"}
            ]
        })))
        .mount(&server)
        .await;

    let poller = poller_for(&server).await;
    let events = poller.preload_logs().await.unwrap();

    assert_eq!(events.len(), 2);
    assert_eq!(events[0].id, "a");
    assert_eq!(events[0].level, LogLevel::Error);
    assert_eq!(events[0].timestamp, 1705314600000);
    assert_eq!(events[1].level, LogLevel::Info);
    assert!(!events[1].id.is_empty());
}
