use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use futures::channel::mpsc as fmpsc;
use futures::future::BoxFuture;
use futures::{FutureExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;

use opsconsole_logs::{
    BackoffPolicy, ConnectionState, ConnectionStatus, EventSource, FilterCriteria, FrameStream,
    LogBuffer, LogLevel, StreamConnectionManager, StreamError,
};

type FrameSender = fmpsc::UnboundedSender<Result<String, StreamError>>;

/// Scripted push channel: each `open` pops the next scripted result
#[derive(Default)]
struct FakeSource {
    script: Mutex<VecDeque<Result<FrameStream, StreamError>>>,
    opens: Mutex<Vec<(Instant, FilterCriteria)>>,
}

impl FakeSource {
    fn fail(&self, status: u16) {
        self.script.lock().push_back(Err(StreamError::Status(status)));
    }

    fn channel(&self) -> FrameSender {
        let (tx, rx) = fmpsc::unbounded();
        self.script.lock().push_back(Ok(rx.boxed()));
        tx
    }

    fn open_count(&self) -> usize {
        self.opens.lock().len()
    }
}

impl EventSource for FakeSource {
    fn open(&self, filters: &FilterCriteria) -> BoxFuture<'static, Result<FrameStream, StreamError>> {
        self.opens.lock().push((Instant::now(), filters.clone()));
        let next = self
            .script
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(futures::stream::pending().boxed()));
        async move { next }.boxed()
    }
}

fn policy() -> BackoffPolicy {
    BackoffPolicy {
        base: Duration::from_millis(500),
        max: Duration::from_secs(10),
        jitter: false,
    }
}

async fn wait_for_state(rx: &mut watch::Receiver<ConnectionStatus>, state: ConnectionState) {
    tokio::time::timeout(Duration::from_secs(60), rx.wait_for(|s| s.state == state))
        .await
        .expect("state reached in time")
        .expect("status sender alive");
}

async fn wait_until<F: Fn() -> bool>(check: F) {
    for _ in 0..1000 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    panic!("condition not reached");
}

#[tokio::test(start_paused = true)]
async fn frames_are_routed_and_malformed_ones_skipped() {
    let source = Arc::new(FakeSource::default());
    let frames = source.channel();
    let buffer = LogBuffer::new(100);
    let (metrics_tx, mut metrics_rx) = mpsc::unbounded_channel();
    let mut manager = StreamConnectionManager::new(source.clone(), buffer.clone(), policy())
        .with_metrics_sender(metrics_tx);
    let mut status = manager.subscribe_status();

    assert!(manager.connect(FilterCriteria::default()));
    wait_for_state(&mut status, ConnectionState::Connected).await;

    for frame in [
        r#"{"type":"heartbeat"}"#,
        "{not json",
        r#"[{"id":"a","message":"one"},{"id":"b","message":"two","level":"error"}]"#,
        r#"{"type":"metrics","metrics":{"total":100,"errors":10}}"#,
        r#"{"id":"c","message":"three"}"#,
        r#"[{"id":"d","message":"four"},{"id":"e","level":5}]"#,
    ] {
        frames.unbounded_send(Ok(frame.to_string())).unwrap();
    }

    wait_until(|| buffer.len() == 4).await;
    let snapshot = metrics_rx.recv().await.unwrap();
    assert_eq!(snapshot.error_rate, 0.10);

    let events = buffer.all();
    assert_eq!(events[1].level, LogLevel::Error);
    assert_eq!(events[2].id, "c");

    let stats = manager.stats();
    assert_eq!(stats.frames_received, 6);
    assert_eq!(stats.frames_skipped, 1);
    // The sibling of an unreadable entry still landed
    assert_eq!(events[3].id, "d");
    assert_eq!(stats.entries_rejected, 1);
    assert_eq!(stats.heartbeats, 1);
    // The malformed frame did not end the channel
    assert_eq!(manager.status().state, ConnectionState::Connected);
    assert_eq!(source.open_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn duplicate_connect_is_a_no_op() {
    let source = Arc::new(FakeSource::default());
    let _frames = source.channel();
    let mut manager = StreamConnectionManager::new(source.clone(), LogBuffer::new(10), policy());
    let mut status = manager.subscribe_status();

    assert!(manager.connect(FilterCriteria::default()));
    assert!(!manager.connect(FilterCriteria::default()));
    wait_for_state(&mut status, ConnectionState::Connected).await;
    assert!(!manager.connect(FilterCriteria::default()));

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(source.open_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn transport_errors_back_off_then_reset_after_success() {
    let source = Arc::new(FakeSource::default());
    source.fail(500);
    source.fail(502);
    source.fail(503);
    let frames = source.channel();
    source.fail(500);
    let _second = source.channel();

    let mut manager = StreamConnectionManager::new(source.clone(), LogBuffer::new(10), policy());
    let mut status = manager.subscribe_status();
    manager.connect(FilterCriteria::default());

    wait_for_state(&mut status, ConnectionState::Connected).await;
    assert_eq!(manager.status().failures, 0);
    assert_eq!(manager.status().last_error, None);

    // Server drops the healthy channel, then one more failure before recovery
    drop(frames);
    wait_until(|| source.open_count() == 6).await;
    wait_for_state(&mut status, ConnectionState::Connected).await;

    let opens: Vec<Instant> = source.opens.lock().iter().map(|(at, _)| *at).collect();
    let gaps: Vec<u128> = opens.windows(2).map(|w| (w[1] - w[0]).as_millis()).collect();
    // A success resets the schedule, so the drop waits the base delay again
    let expected = [500u128, 1000, 2000, 500, 1000];
    assert_eq!(gaps.len(), expected.len());
    for (gap, want) in gaps.iter().zip(expected) {
        assert!(gap.abs_diff(want) <= 2, "gap {gap}ms, expected {want}ms");
    }
}

#[tokio::test(start_paused = true)]
async fn failure_surfaces_as_disconnected_status() {
    let source = Arc::new(FakeSource::default());
    source.fail(503);
    let mut manager = StreamConnectionManager::new(source.clone(), LogBuffer::new(10), policy());
    let mut status = manager.subscribe_status();
    manager.connect(FilterCriteria::default());

    wait_for_state(&mut status, ConnectionState::Disconnected).await;
    let current = manager.status();
    assert_eq!(current.failures, 1);
    assert!(current.last_error.unwrap().contains("503"));
    assert!(manager.is_running(), "retry is scheduled, not abandoned");
}

#[tokio::test(start_paused = true)]
async fn filter_change_rebuilds_the_channel() {
    let source = Arc::new(FakeSource::default());
    let first = source.channel();
    let _second = source.channel();
    let mut manager = StreamConnectionManager::new(source.clone(), LogBuffer::new(10), policy());
    let mut status = manager.subscribe_status();

    manager.connect(FilterCriteria::default());
    wait_for_state(&mut status, ConnectionState::Connected).await;

    let errors_only = FilterCriteria::default().with_level(LogLevel::Error);
    assert!(manager.set_filters(errors_only.clone()));
    assert!(!manager.set_filters(errors_only.clone()));
    wait_until(|| source.open_count() == 2).await;
    wait_for_state(&mut status, ConnectionState::Connected).await;

    assert_eq!(source.opens.lock()[1].1, errors_only);
    wait_until(|| first.is_closed()).await;
}

#[tokio::test(start_paused = true)]
async fn disconnect_aborts_channel_and_pending_retry() {
    let source = Arc::new(FakeSource::default());
    let frames = source.channel();
    let mut manager = StreamConnectionManager::new(source.clone(), LogBuffer::new(10), policy());
    let mut status = manager.subscribe_status();

    manager.connect(FilterCriteria::default());
    wait_for_state(&mut status, ConnectionState::Connected).await;

    manager.disconnect();
    assert_eq!(manager.status().state, ConnectionState::Disconnected);
    wait_until(|| frames.is_closed()).await;
    assert!(!manager.is_running());

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(source.open_count(), 1, "no retry after explicit disconnect");
}

#[tokio::test(start_paused = true)]
async fn reconnect_replaces_the_channel() {
    let source = Arc::new(FakeSource::default());
    let first = source.channel();
    let _second = source.channel();
    let mut manager = StreamConnectionManager::new(source.clone(), LogBuffer::new(10), policy());
    let mut status = manager.subscribe_status();

    manager.connect(FilterCriteria::default());
    wait_for_state(&mut status, ConnectionState::Connected).await;

    manager.reconnect();
    wait_until(|| first.is_closed()).await;
    wait_for_state(&mut status, ConnectionState::Connected).await;
    assert_eq!(source.open_count(), 2);
}
