use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use eventsource_stream::Eventsource;
use futures::future::BoxFuture;
use futures::stream::BoxStream;
use futures::{FutureExt, StreamExt};
use reqwest::header::ACCEPT;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use opsconsole_types::{ConnectionState, ConnectionStatus, MetricsSnapshot};

use crate::backoff::{Backoff, BackoffPolicy};
use crate::buffer::LogBuffer;
use crate::filter::FilterCriteria;
use crate::frame::{Frame, classify};

#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("push channel request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("push channel returned HTTP {0}")]
    Status(u16),

    #[error("push channel protocol error: {0}")]
    Protocol(String),
}

/// Raw frame payloads in arrival order
pub type FrameStream = BoxStream<'static, Result<String, StreamError>>;

/// Opens the push channel
///
/// One call opens one channel; the manager owns retrying.
pub trait EventSource: Send + Sync + 'static {
    fn open(&self, filters: &FilterCriteria) -> BoxFuture<'static, Result<FrameStream, StreamError>>;
}

/// Server-sent events over HTTP
pub struct HttpEventSource {
    client: reqwest::Client,
    url: String,
}

impl HttpEventSource {
    pub fn new(url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), url)
    }

    pub fn with_client(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

impl EventSource for HttpEventSource {
    fn open(&self, filters: &FilterCriteria) -> BoxFuture<'static, Result<FrameStream, StreamError>> {
        // Filtering happens server-side; the payload is not filtered again here
        let request = self
            .client
            .get(&self.url)
            .query(&filters.query_pairs())
            .header(ACCEPT, "text/event-stream");

        async move {
            let response = request.send().await?;
            let status = response.status();
            if !status.is_success() {
                return Err(StreamError::Status(status.as_u16()));
            }

            let frames = response
                .bytes_stream()
                .eventsource()
                .map(|event| match event {
                    Ok(event) => Ok(event.data),
                    Err(e) => Err(StreamError::Protocol(e.to_string())),
                });
            Ok(frames.boxed())
        }
        .boxed()
    }
}

/// Frame counters since the manager was created
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StreamStats {
    pub frames_received: u64,
    pub frames_skipped: u64,
    /// Unreadable entries dropped from otherwise valid batches
    pub entries_rejected: u64,
    pub heartbeats: u64,
    pub connections: u64,
}

#[derive(Default)]
struct StreamCounters {
    frames_received: AtomicU64,
    frames_skipped: AtomicU64,
    entries_rejected: AtomicU64,
    heartbeats: AtomicU64,
    connections: AtomicU64,
}

/// Routes classified frames to the buffer or the metrics channel
#[derive(Clone)]
struct FrameRouter {
    buffer: LogBuffer,
    metrics_tx: Option<mpsc::UnboundedSender<MetricsSnapshot>>,
    counters: Arc<StreamCounters>,
}

impl FrameRouter {
    fn dispatch(&self, text: &str) {
        self.counters.frames_received.fetch_add(1, Ordering::Relaxed);

        match classify(text, Utc::now()) {
            Ok(Frame::Heartbeat) => {
                self.counters.heartbeats.fetch_add(1, Ordering::Relaxed);
                tracing::trace!("Heartbeat");
            }
            Ok(Frame::Metrics(snapshot)) => {
                if let Some(tx) = &self.metrics_tx {
                    // Receiver gone means nobody shows metrics; not an error
                    let _ = tx.send(snapshot);
                }
            }
            Ok(Frame::Logs { events, rejected }) => {
                if rejected > 0 {
                    self.counters
                        .entries_rejected
                        .fetch_add(rejected as u64, Ordering::Relaxed);
                    tracing::warn!(rejected, "Dropped unreadable entries from a log batch");
                }
                self.buffer.append(events);
            }
            Err(e) => {
                self.counters.frames_skipped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(error = %e, "Skipping malformed frame");
            }
        }
    }
}

/// Connection status plus the generation allowed to write it
///
/// Each teardown bumps the generation, so a channel task that is being
/// aborted can no longer overwrite the status set by its successor.
struct StatusCell {
    tx: watch::Sender<ConnectionStatus>,
    generation: AtomicU64,
}

impl StatusCell {
    fn new() -> Self {
        let (tx, _) = watch::channel(ConnectionStatus::default());
        Self {
            tx,
            generation: AtomicU64::new(0),
        }
    }

    fn current(&self) -> ConnectionStatus {
        self.tx.borrow().clone()
    }

    fn bump(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn update<F>(&self, generation: u64, f: F)
    where
        F: FnOnce(&ConnectionStatus) -> ConnectionStatus,
    {
        self.tx.send_if_modified(|status| {
            if self.generation.load(Ordering::SeqCst) != generation {
                return false;
            }
            *status = f(status);
            true
        });
    }

    fn set(&self, generation: u64, state: ConnectionState) {
        self.update(generation, |s| s.transition(state));
    }

    fn connected(&self, generation: u64) {
        self.update(generation, |s| ConnectionStatus {
            failures: 0,
            last_error: None,
            ..s.transition(ConnectionState::Connected)
        });
    }

    fn failed(&self, generation: u64, error: String) {
        self.update(generation, |s| ConnectionStatus {
            failures: s.failures.saturating_add(1),
            last_error: Some(error),
            ..s.transition(ConnectionState::Disconnected)
        });
    }
}

/// Owns the single push-channel connection
///
/// At most one channel task exists at a time. Frames are handled in arrival
/// order; transport failures move the status to `Disconnected` and schedule
/// a retry on the backoff schedule.
pub struct StreamConnectionManager {
    source: Arc<dyn EventSource>,
    router: FrameRouter,
    policy: BackoffPolicy,
    filters: FilterCriteria,
    status: Arc<StatusCell>,

    /// Cancellation token for the active channel task
    cancel: CancellationToken,

    /// Active channel task handle
    task: Option<tokio::task::JoinHandle<()>>,
}

impl StreamConnectionManager {
    pub fn new(source: Arc<dyn EventSource>, buffer: LogBuffer, policy: BackoffPolicy) -> Self {
        Self {
            source,
            router: FrameRouter {
                buffer,
                metrics_tx: None,
                counters: Arc::new(StreamCounters::default()),
            },
            policy,
            filters: FilterCriteria::default(),
            status: Arc::new(StatusCell::new()),
            cancel: CancellationToken::new(),
            task: None,
        }
    }

    /// Forward pushed metrics frames to `tx`
    pub fn with_metrics_sender(mut self, tx: mpsc::UnboundedSender<MetricsSnapshot>) -> Self {
        self.router.metrics_tx = Some(tx);
        self
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status.current()
    }

    /// Watch connection status transitions
    pub fn subscribe_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.tx.subscribe()
    }

    pub fn filters(&self) -> &FilterCriteria {
        &self.filters
    }

    pub fn buffer(&self) -> &LogBuffer {
        &self.router.buffer
    }

    pub fn stats(&self) -> StreamStats {
        let counters = &self.router.counters;
        StreamStats {
            frames_received: counters.frames_received.load(Ordering::Relaxed),
            frames_skipped: counters.frames_skipped.load(Ordering::Relaxed),
            entries_rejected: counters.entries_rejected.load(Ordering::Relaxed),
            heartbeats: counters.heartbeats.load(Ordering::Relaxed),
            connections: counters.connections.load(Ordering::Relaxed),
        }
    }

    /// Open the channel with `filters`
    ///
    /// A no-op returning false unless the state is `Idle` or `Disconnected`.
    /// A pending backoff retry is cancelled and replaced by an immediate
    /// attempt.
    pub fn connect(&mut self, filters: FilterCriteria) -> bool {
        let state = self.status.current().state;
        if !state.accepts_connect() {
            tracing::debug!(state = state.label(), "Connect ignored, channel already active");
            return false;
        }

        let generation = self.teardown();
        self.filters = filters;
        self.status.set(generation, ConnectionState::Connecting);

        let ctx = ChannelContext {
            source: Arc::clone(&self.source),
            router: self.router.clone(),
            filters: self.filters.clone(),
            policy: self.policy.clone(),
            status: Arc::clone(&self.status),
            generation,
            cancel: self.cancel.clone(),
        };
        self.task = Some(tokio::spawn(run_channel(ctx)));
        true
    }

    /// Abort the channel and any pending retry
    pub fn disconnect(&mut self) {
        let was_idle = self.status.current().state == ConnectionState::Idle;
        let generation = self.teardown();
        if !was_idle {
            self.status.update(generation, |s| ConnectionStatus {
                last_error: None,
                ..s.transition(ConnectionState::Disconnected)
            });
        }
    }

    /// Fully tear down the current channel, then open a new one
    pub fn reconnect(&mut self) {
        let generation = self.teardown();
        self.status.set(generation, ConnectionState::Disconnected);
        self.connect(self.filters.clone());
    }

    /// Change server-side filters, rebuilding the channel if one is active
    ///
    /// Returns false when the filters are unchanged.
    pub fn set_filters(&mut self, filters: FilterCriteria) -> bool {
        if filters == self.filters {
            return false;
        }
        self.filters = filters;
        if self.task.is_some() {
            self.reconnect();
        }
        true
    }

    /// Check if the channel task (connected or retrying) is alive
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    fn teardown(&mut self) -> u64 {
        let generation = self.status.bump();
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            task.abort();
        }
        // Create a fresh cancellation token for future channels
        self.cancel = CancellationToken::new();
        generation
    }
}

impl Drop for StreamConnectionManager {
    fn drop(&mut self) {
        self.teardown();
    }
}

struct ChannelContext {
    source: Arc<dyn EventSource>,
    router: FrameRouter,
    filters: FilterCriteria,
    policy: BackoffPolicy,
    status: Arc<StatusCell>,
    generation: u64,
    cancel: CancellationToken,
}

async fn run_channel(ctx: ChannelContext) {
    let ChannelContext {
        source,
        router,
        filters,
        policy,
        status,
        generation,
        cancel,
    } = ctx;
    let mut backoff = Backoff::new(policy);

    loop {
        status.set(generation, ConnectionState::Connecting);

        let opened = tokio::select! {
            _ = cancel.cancelled() => return,
            opened = source.open(&filters) => opened,
        };

        let failure = match opened {
            Ok(mut frames) => {
                backoff.reset();
                router.counters.connections.fetch_add(1, Ordering::Relaxed);
                status.connected(generation);
                tracing::info!(filters = ?filters, "Push channel connected");

                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => return,

                        next = frames.next() => match next {
                            Some(Ok(text)) => router.dispatch(&text),
                            Some(Err(e)) => break e.to_string(),
                            None => break "stream closed by server".to_string(),
                        },
                    }
                }
            }
            Err(e) => e.to_string(),
        };

        let delay = backoff.next_delay();
        tracing::warn!(
            error = %failure,
            attempt = backoff.attempt(),
            delay_ms = delay.as_millis() as u64,
            "Push channel down, scheduling reconnect"
        );
        status.failed(generation, failure);

        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(delay) => {}
        }
    }
}
