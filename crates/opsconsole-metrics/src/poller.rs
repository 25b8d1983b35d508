use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use opsconsole_types::{LogEvent, MetricsSnapshot};

use crate::MetricsError;
use crate::history::MetricsHistory;
use crate::source::{MetricsQuery, MetricsSource};

/// What the presentation reads
#[derive(Clone, Debug, Default)]
pub struct MetricsState {
    /// Last good snapshot; kept across failed fetches
    pub snapshot: Option<Arc<MetricsSnapshot>>,
    pub error: Option<String>,
    pub loading: bool,
    pub rate_limit_remaining: Option<u64>,
    pub last_success: Option<DateTime<Utc>>,
    pub history: MetricsHistory,
}

/// Result of one `fetch_metrics` call
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FetchOutcome {
    /// New snapshot applied
    Applied,
    /// Fetch failed; the previous snapshot stays and `error` is set
    Failed,
    /// Cancelled by a newer fetch or by `cancel_inflight`
    Aborted,
    /// Response older than the snapshot already shown
    Stale,
}

struct Inflight {
    id: u64,
    cancel: CancellationToken,
}

/// Single-flight poller over a `MetricsSource`
///
/// Starting a fetch cancels the one in flight. A response is applied only if
/// its request is still the current one, so a slow request can never
/// overwrite a newer snapshot.
#[derive(Clone)]
pub struct MetricsPoller {
    source: Arc<dyn MetricsSource>,
    query: MetricsQuery,
    state: Arc<RwLock<MetricsState>>,
    inflight: Arc<Mutex<Option<Inflight>>>,
    next_id: Arc<AtomicU64>,
}

impl MetricsPoller {
    pub fn new(source: Arc<dyn MetricsSource>, limit: usize, window_minutes: u32) -> Self {
        Self::with_history(source, limit, window_minutes, MetricsHistory::default())
    }

    pub fn with_history(
        source: Arc<dyn MetricsSource>,
        limit: usize,
        window_minutes: u32,
        history: MetricsHistory,
    ) -> Self {
        Self {
            source,
            query: MetricsQuery::metrics(limit, window_minutes),
            state: Arc::new(RwLock::new(MetricsState {
                history,
                ..Default::default()
            })),
            inflight: Arc::new(Mutex::new(None)),
            next_id: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Copy of the current state
    pub fn state(&self) -> MetricsState {
        self.state.read().clone()
    }

    pub fn snapshot(&self) -> Option<Arc<MetricsSnapshot>> {
        self.state.read().snapshot.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.state.read().loading
    }

    /// Fetch one snapshot, cancelling any fetch still in flight
    pub async fn fetch_metrics(&self) -> FetchOutcome {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let cancel = CancellationToken::new();
        {
            let mut inflight = self.inflight.lock();
            if let Some(previous) = inflight.replace(Inflight {
                id,
                cancel: cancel.clone(),
            }) {
                tracing::debug!(superseded = previous.id, by = id, "Cancelling in-flight metrics fetch");
                previous.cancel.cancel();
            }
            self.state.write().loading = true;
        }

        let request = self.source.fetch(self.query);
        let result = tokio::select! {
            _ = cancel.cancelled() => return FetchOutcome::Aborted,
            result = request => result,
        };

        let mut inflight = self.inflight.lock();
        if inflight.as_ref().map(|i| i.id) != Some(id) {
            return FetchOutcome::Aborted;
        }
        *inflight = None;

        let mut state = self.state.write();
        state.loading = false;
        match result.and_then(|mut response| {
            let remaining = response.rate_limit_remaining();
            response
                .take_snapshot(Utc::now())
                .map(|snapshot| (snapshot, remaining))
                .ok_or(MetricsError::MissingMetrics)
        }) {
            Ok((snapshot, remaining)) => {
                if remaining.is_some() {
                    state.rate_limit_remaining = remaining;
                }
                if state
                    .snapshot
                    .as_ref()
                    .is_some_and(|current| current.observed_at > snapshot.observed_at)
                {
                    tracing::debug!("Discarding metrics older than the current snapshot");
                    return FetchOutcome::Stale;
                }
                apply(&mut state, snapshot);
                FetchOutcome::Applied
            }
            Err(e) => {
                tracing::warn!(error = %e, "Metrics fetch failed, keeping last snapshot");
                state.error = Some(e.to_string());
                FetchOutcome::Failed
            }
        }
    }

    /// Apply a snapshot delivered on the push channel
    pub fn apply_pushed(&self, snapshot: MetricsSnapshot) {
        let mut state = self.state.write();
        apply(&mut state, snapshot);
    }

    /// Abort the fetch in flight, if any; not recorded as a failure
    pub fn cancel_inflight(&self) {
        let mut inflight = self.inflight.lock();
        if let Some(current) = inflight.take() {
            current.cancel.cancel();
            self.state.write().loading = false;
        }
    }

    /// Fetch recent log records for the buffer
    pub async fn preload_logs(&self) -> Result<Vec<LogEvent>, MetricsError> {
        let query = MetricsQuery::logs(self.query.limit, self.query.minutes);
        let response = self.source.fetch(query).await?;

        if let Some(remaining) = response.rate_limit_remaining() {
            self.state.write().rate_limit_remaining = Some(remaining);
        }

        let received_at = Utc::now().timestamp_millis();
        let events: Vec<LogEvent> = response
            .logs
            .unwrap_or_default()
            .into_iter()
            .map(|record| record.into_event(received_at))
            .collect();
        tracing::debug!(count = events.len(), "Preloaded recent logs");
        Ok(events)
    }

    /// Poll every `interval` until `cancel` fires; the first poll is immediate
    pub fn spawn_polling(
        &self,
        interval: Duration,
        cancel: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        let poller = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    outcome = poller.fetch_metrics() => {
                        tracing::trace!(?outcome, "Metrics poll finished");
                    }
                }
            }

            poller.cancel_inflight();
            tracing::debug!("Metrics polling stopped");
        })
    }
}

fn apply(state: &mut MetricsState, snapshot: MetricsSnapshot) {
    state.history.push(snapshot.point());
    state.last_success = Some(Utc::now());
    state.error = None;
    state.snapshot = Some(Arc::new(snapshot));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MetricsResponse;
    use futures::FutureExt;
    use futures::future::BoxFuture;
    use opsconsole_types::MetricsPayload;
    use std::collections::VecDeque;
    use tokio::sync::oneshot;

    type Reply = Result<MetricsResponse, MetricsError>;

    /// Each fetch waits for the next reply the test sends
    #[derive(Default)]
    struct GatedSource {
        gates: Mutex<VecDeque<oneshot::Receiver<Reply>>>,
        calls: AtomicU64,
    }

    impl GatedSource {
        fn gate(&self) -> oneshot::Sender<Reply> {
            let (tx, rx) = oneshot::channel();
            self.gates.lock().push_back(rx);
            tx
        }

        fn calls(&self) -> u64 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl MetricsSource for GatedSource {
        fn fetch(&self, _query: MetricsQuery) -> BoxFuture<'static, Reply> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let gate = self.gates.lock().pop_front();
            async move {
                match gate {
                    Some(rx) => match rx.await {
                        Ok(reply) => reply,
                        Err(_) => futures::future::pending().await,
                    },
                    None => futures::future::pending().await,
                }
            }
            .boxed()
        }
    }

    fn response(total: u64, errors: u64, observed_at: &str) -> Reply {
        Ok(MetricsResponse {
            metrics: Some(MetricsPayload {
                total,
                errors,
                ..Default::default()
            }),
            observed_at: Some(observed_at.to_string()),
            ..Default::default()
        })
    }

    async fn wait_for_calls(source: &GatedSource, n: u64) {
        while source.calls() < n {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_second_fetch_cancels_first() {
        let source = Arc::new(GatedSource::default());
        let first_gate = source.gate();
        let second_gate = source.gate();
        let poller = MetricsPoller::new(source.clone(), 500, 60);

        let first = tokio::spawn({
            let poller = poller.clone();
            async move { poller.fetch_metrics().await }
        });
        wait_for_calls(&source, 1).await;

        let second = tokio::spawn({
            let poller = poller.clone();
            async move { poller.fetch_metrics().await }
        });
        wait_for_calls(&source, 2).await;

        // The stale reply arrives after the newer request started
        let _ = first_gate.send(response(100, 50, "2024-01-15T10:00:00Z"));
        let _ = second_gate.send(response(100, 1, "2024-01-15T10:00:30Z"));

        assert_eq!(first.await.unwrap(), FetchOutcome::Aborted);
        assert_eq!(second.await.unwrap(), FetchOutcome::Applied);

        let state = poller.state();
        assert_eq!(state.snapshot.unwrap().errors, 1);
        assert_eq!(state.history.len(), 1);
        assert!(!state.loading);
    }

    #[tokio::test]
    async fn test_failure_keeps_last_snapshot() {
        let source = Arc::new(GatedSource::default());
        source.gate().send(response(100, 5, "2024-01-15T10:00:00Z")).unwrap();
        source.gate().send(Err(MetricsError::Status(500))).unwrap();
        let poller = MetricsPoller::new(source, 500, 60);

        assert_eq!(poller.fetch_metrics().await, FetchOutcome::Applied);
        assert_eq!(poller.fetch_metrics().await, FetchOutcome::Failed);

        let state = poller.state();
        assert_eq!(state.snapshot.unwrap().total, 100);
        assert!(state.error.is_some_and(|e| e.contains("500")));
        assert_eq!(state.history.len(), 1);
    }

    #[tokio::test]
    async fn test_success_clears_error() {
        let source = Arc::new(GatedSource::default());
        source.gate().send(Err(MetricsError::Status(503))).unwrap();
        source.gate().send(response(10, 0, "2024-01-15T10:00:00Z")).unwrap();
        let poller = MetricsPoller::new(source, 500, 60);

        poller.fetch_metrics().await;
        assert!(poller.state().error.is_some());
        assert!(poller.snapshot().is_none());

        poller.fetch_metrics().await;
        assert!(poller.state().error.is_none());
        assert!(poller.snapshot().is_some());
    }

    #[tokio::test]
    async fn test_missing_metrics_is_a_failure() {
        let source = Arc::new(GatedSource::default());
        source.gate().send(Ok(MetricsResponse::default())).unwrap();
        let poller = MetricsPoller::new(source, 500, 60);

        assert_eq!(poller.fetch_metrics().await, FetchOutcome::Failed);
    }

    #[tokio::test]
    async fn test_cancel_inflight_is_not_a_failure() {
        let source = Arc::new(GatedSource::default());
        let _gate = source.gate();
        let poller = MetricsPoller::new(source.clone(), 500, 60);

        let fetch = tokio::spawn({
            let poller = poller.clone();
            async move { poller.fetch_metrics().await }
        });
        wait_for_calls(&source, 1).await;
        assert!(poller.is_loading());

        poller.cancel_inflight();
        assert_eq!(fetch.await.unwrap(), FetchOutcome::Aborted);

        let state = poller.state();
        assert!(state.error.is_none());
        assert!(!state.loading);
    }

    #[tokio::test]
    async fn test_older_poll_does_not_replace_pushed_snapshot() {
        let source = Arc::new(GatedSource::default());
        source.gate().send(response(100, 20, "2024-01-15T10:00:00Z")).unwrap();
        let poller = MetricsPoller::new(source, 500, 60);

        let pushed = MetricsSnapshot::from_payload(
            MetricsPayload {
                total: 100,
                errors: 1,
                ..Default::default()
            },
            "2024-01-15T10:05:00Z".parse().unwrap(),
        );
        poller.apply_pushed(pushed);

        assert_eq!(poller.fetch_metrics().await, FetchOutcome::Stale);
        assert_eq!(poller.snapshot().unwrap().errors, 1);
        assert_eq!(poller.state().history.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_polling_runs_on_interval_until_cancelled() {
        let source = Arc::new(GatedSource::default());
        for n in 0..3 {
            source
                .gate()
                .send(response(10, n, &format!("2024-01-15T10:0{n}:00Z")))
                .unwrap();
        }
        let poller = MetricsPoller::new(source.clone(), 500, 60);
        let cancel = CancellationToken::new();
        let task = poller.spawn_polling(Duration::from_secs(30), cancel.clone());

        wait_for_calls(&source, 1).await;
        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(source.calls(), 3);

        cancel.cancel();
        task.await.unwrap();
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(source.calls(), 3);
        assert_eq!(poller.state().history.len(), 3);
    }
}
