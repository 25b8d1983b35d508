use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use parking_lot::RwLock;

use opsconsole_types::{ArcLogEvent, LogEvent, LogLevel, LogSource};

use crate::snapshot::{BufferSnapshot, PendingSnapshot, SnapshotSink, SnapshotUpdate};

/// Everything that must change together on a mutation
#[derive(Default)]
struct BufferState {
    /// Oldest first
    entries: VecDeque<ArcLogEvent>,

    /// Ids currently held, for dedup
    ids: HashSet<String>,

    /// Entries accepted since the last clear
    total_received: u64,

    /// Entries evicted since the last clear
    total_dropped: u64,

    /// Bumped on every mutation so views can memoize
    revision: u64,
}

/// Thread-safe bounded buffer with drop-oldest eviction
///
/// Entries and counters sit behind a single lock, so readers never observe
/// a length that disagrees with the drop counters.
#[derive(Clone)]
pub struct LogBuffer {
    state: Arc<RwLock<BufferState>>,

    /// Maximum number of entries held
    capacity: usize,

    /// Newest entries written to the warm-start snapshot
    snapshot_limit: usize,

    /// Receives the warm-start snapshot after each mutation
    sink: Option<Arc<dyn SnapshotSink>>,
}

/// What a single `append` did
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AppendOutcome {
    pub accepted: usize,
    pub duplicates: usize,
    pub evicted: usize,
}

/// Consistent view of the buffer counters
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct BufferStats {
    pub len: usize,
    pub capacity: usize,
    pub total_received: u64,
    pub total_dropped: u64,
    /// `total_dropped / total_received * 100`, 0 when nothing was received
    pub dropped_percentage: f64,
    pub revision: u64,
}

impl LogBuffer {
    /// Create a new buffer holding at most `capacity` entries
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Arc::new(RwLock::new(BufferState::default())),
            capacity: capacity.max(1),
            snapshot_limit: 0,
            sink: None,
        }
    }

    /// Hand the newest `limit` entries to `sink` after every append
    pub fn with_snapshot_sink(mut self, sink: Arc<dyn SnapshotSink>, limit: usize) -> Self {
        self.sink = Some(sink);
        self.snapshot_limit = limit;
        self
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Merge `entries` into the buffer
    ///
    /// Entries whose id is already present (or repeated within the batch)
    /// are skipped. If the result exceeds capacity, exactly the excess
    /// oldest entries are evicted and counted as dropped.
    pub fn append<I>(&self, entries: I) -> AppendOutcome
    where
        I: IntoIterator<Item = LogEvent>,
    {
        let mut state = self.state.write();
        let mut outcome = AppendOutcome::default();

        for entry in entries {
            if state.ids.contains(&entry.id) {
                outcome.duplicates += 1;
                continue;
            }
            state.ids.insert(entry.id.clone());
            state.entries.push_back(Arc::new(entry));
            outcome.accepted += 1;
        }

        if outcome.accepted == 0 {
            return outcome;
        }

        let excess = state.entries.len().saturating_sub(self.capacity);
        for _ in 0..excess {
            if let Some(evicted) = state.entries.pop_front() {
                state.ids.remove(&evicted.id);
            }
        }
        outcome.evicted = excess;

        state.total_received += outcome.accepted as u64;
        state.total_dropped += excess as u64;
        state.revision += 1;

        if excess > 0 {
            tracing::debug!(
                evicted = excess,
                total_dropped = state.total_dropped,
                "Buffer at capacity, evicted oldest entries"
            );
        }

        // Submitted under the write lock so updates reach the sink in order
        if let Some(sink) = &self.sink {
            sink.submit(SnapshotUpdate::Write(self.snapshot_locked(&state)));
        }

        outcome
    }

    fn snapshot_locked(&self, state: &BufferState) -> PendingSnapshot {
        let skip = state.entries.len().saturating_sub(self.snapshot_limit);
        PendingSnapshot {
            events: state.entries.iter().skip(skip).cloned().collect(),
            total_received: state.total_received,
            total_dropped: state.total_dropped,
        }
    }

    /// Load a warm-start snapshot into an empty buffer
    ///
    /// Returns false (and changes nothing) if the buffer already holds
    /// entries. Restored counters continue from the persisted values.
    pub fn restore(&self, snapshot: BufferSnapshot) -> bool {
        let mut state = self.state.write();
        if !state.entries.is_empty() {
            return false;
        }

        for event in snapshot.events {
            if state.ids.insert(event.id.clone()) {
                state.entries.push_back(Arc::new(event));
            }
        }
        let excess = state.entries.len().saturating_sub(self.capacity);
        for _ in 0..excess {
            if let Some(evicted) = state.entries.pop_front() {
                state.ids.remove(&evicted.id);
            }
        }

        state.total_received = snapshot.total_received.max(state.entries.len() as u64);
        state.total_dropped = snapshot
            .total_dropped
            .min(state.total_received)
            .max(excess as u64);
        state.revision += 1;
        true
    }

    /// Reset entries, counters and the persisted snapshot in one step
    pub fn clear(&self) {
        let mut state = self.state.write();
        let revision = state.revision + 1;
        *state = BufferState {
            revision,
            ..BufferState::default()
        };
        if let Some(sink) = &self.sink {
            sink.submit(SnapshotUpdate::Clear);
        }
    }

    /// Counters read under a single lock
    pub fn stats(&self) -> BufferStats {
        let state = self.state.read();
        BufferStats {
            len: state.entries.len(),
            capacity: self.capacity,
            total_received: state.total_received,
            total_dropped: state.total_dropped,
            dropped_percentage: dropped_percentage(state.total_dropped, state.total_received),
            revision: state.revision,
        }
    }

    pub fn revision(&self) -> u64 {
        self.state.read().revision
    }

    /// Get all entries (Arc clones are cheap - just reference count increment)
    pub fn all(&self) -> Vec<ArcLogEvent> {
        self.state.read().entries.iter().cloned().collect()
    }

    /// All entries together with the revision they belong to
    pub fn versioned(&self) -> (u64, Vec<ArcLogEvent>) {
        let state = self.state.read();
        (state.revision, state.entries.iter().cloned().collect())
    }

    pub fn len(&self) -> usize {
        self.state.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().entries.is_empty()
    }

    /// Get the last N entries
    pub fn tail(&self, n: usize) -> Vec<ArcLogEvent> {
        let state = self.state.read();
        let start = state.entries.len().saturating_sub(n);
        state.entries.iter().skip(start).cloned().collect()
    }

    /// Get entry count per log level and per source
    pub fn counts(&self) -> EventCounts {
        let state = self.state.read();
        let mut counts = EventCounts::default();

        for entry in state.entries.iter() {
            match entry.level {
                LogLevel::Debug => counts.debug += 1,
                LogLevel::Info => counts.info += 1,
                LogLevel::Warn => counts.warn += 1,
                LogLevel::Error => counts.error += 1,
            }
            match entry.source {
                LogSource::Frontend => counts.frontend += 1,
                LogSource::Backend => counts.backend += 1,
                LogSource::Ai => counts.ai += 1,
                LogSource::Functions => counts.functions += 1,
            }
        }

        counts
    }
}

impl std::fmt::Debug for LogBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogBuffer")
            .field("capacity", &self.capacity)
            .field("stats", &self.stats())
            .finish()
    }
}

fn dropped_percentage(dropped: u64, received: u64) -> f64 {
    if received == 0 {
        0.0
    } else {
        dropped as f64 / received as f64 * 100.0
    }
}

/// Counts per log level and per source
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EventCounts {
    pub debug: usize,
    pub info: usize,
    pub warn: usize,
    pub error: usize,
    pub frontend: usize,
    pub backend: usize,
    pub ai: usize,
    pub functions: usize,
}

impl EventCounts {
    pub fn total(&self) -> usize {
        self.debug + self.info + self.warn + self.error
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    fn event(id: &str) -> LogEvent {
        LogEvent::new(id, 0, format!("message {id}"))
    }

    fn ids(buffer: &LogBuffer) -> Vec<String> {
        buffer.all().iter().map(|e| e.id.clone()).collect()
    }

    #[derive(Default)]
    struct RecordingSink {
        writes: Mutex<Vec<PendingSnapshot>>,
        clears: Mutex<usize>,
    }

    impl SnapshotSink for RecordingSink {
        fn submit(&self, update: SnapshotUpdate) {
            match update {
                SnapshotUpdate::Write(snapshot) => self.writes.lock().push(snapshot),
                SnapshotUpdate::Clear => *self.clears.lock() += 1,
            }
        }
    }

    #[test]
    fn test_capacity_five_scenario() {
        let buffer = LogBuffer::new(5);

        buffer.append(["A", "B", "C"].map(event));
        assert_eq!(ids(&buffer), ["A", "B", "C"]);
        assert_eq!(buffer.stats().total_dropped, 0);

        let outcome = buffer.append(["D", "E", "F"].map(event));
        assert_eq!(outcome.evicted, 1);
        assert_eq!(ids(&buffer), ["B", "C", "D", "E", "F"]);

        let stats = buffer.stats();
        assert_eq!(stats.total_dropped, 1);
        assert_eq!(stats.total_received, 6);
        assert!((stats.dropped_percentage - 100.0 / 6.0).abs() < 1e-9);
    }

    #[test]
    fn test_len_never_exceeds_capacity() {
        let buffer = LogBuffer::new(7);
        let mut next = 0;
        for batch in [1usize, 3, 10, 0, 6, 25, 2] {
            let entries: Vec<_> = (next..next + batch).map(|i| event(&i.to_string())).collect();
            next += batch;
            buffer.append(entries);

            let stats = buffer.stats();
            assert!(stats.len <= 7);
            let expected = stats.total_dropped as f64 / stats.total_received.max(1) as f64 * 100.0;
            assert!((stats.dropped_percentage - expected).abs() < 1e-9);
        }
    }

    #[test]
    fn test_duplicates_never_grow_the_buffer() {
        let buffer = LogBuffer::new(10);
        buffer.append(["a", "b"].map(event));

        let outcome = buffer.append(["a", "b", "b"].map(event));
        assert_eq!(outcome.accepted, 0);
        assert_eq!(outcome.duplicates, 3);
        assert_eq!(buffer.len(), 2);
        assert_eq!(buffer.stats().total_received, 2);
    }

    #[test]
    fn test_duplicates_within_one_batch() {
        let buffer = LogBuffer::new(10);
        let outcome = buffer.append(["x", "x", "y"].map(event));
        assert_eq!(outcome.accepted, 2);
        assert_eq!(ids(&buffer), ["x", "y"]);
    }

    #[test]
    fn test_evicted_id_can_return() {
        let buffer = LogBuffer::new(1);
        buffer.append([event("a")]);
        buffer.append([event("b")]);
        buffer.append([event("a")]);
        assert_eq!(ids(&buffer), ["a"]);
        assert_eq!(buffer.stats().total_dropped, 2);
    }

    #[test]
    fn test_empty_buffer_reports_zero_percentage() {
        let stats = LogBuffer::new(3).stats();
        assert_eq!(stats.total_received, 0);
        assert_eq!(stats.dropped_percentage, 0.0);
    }

    #[test]
    fn test_clear_resets_everything_including_snapshot() {
        let sink = Arc::new(RecordingSink::default());
        let buffer = LogBuffer::new(2).with_snapshot_sink(sink.clone(), 10);
        buffer.append(["a", "b", "c"].map(event));
        let before = buffer.revision();

        buffer.clear();

        let stats = buffer.stats();
        assert_eq!(stats.len, 0);
        assert_eq!(stats.total_received, 0);
        assert_eq!(stats.total_dropped, 0);
        assert_eq!(stats.dropped_percentage, 0.0);
        assert!(stats.revision > before);
        assert_eq!(*sink.clears.lock(), 1);

        // ids are forgotten too
        buffer.append([event("a")]);
        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn test_append_writes_bounded_snapshot() {
        let sink = Arc::new(RecordingSink::default());
        let buffer = LogBuffer::new(10).with_snapshot_sink(sink.clone(), 2);

        buffer.append(["a", "b", "c"].map(event));
        buffer.append([event("a")]);

        let writes = sink.writes.lock();
        assert_eq!(writes.len(), 1, "duplicate-only append must not write");
        let newest: Vec<_> = writes[0].events.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(newest, ["b", "c"]);
        assert_eq!(writes[0].total_received, 3);
    }

    #[test]
    fn test_restore_only_into_empty_buffer() {
        let buffer = LogBuffer::new(2);
        let snapshot = BufferSnapshot {
            events: ["a", "b", "c"].map(event).to_vec(),
            total_received: 40,
            total_dropped: 4,
        };

        assert!(buffer.restore(snapshot.clone()));
        assert_eq!(ids(&buffer), ["b", "c"]);
        assert_eq!(buffer.stats().total_received, 40);
        assert_eq!(buffer.stats().total_dropped, 4);

        assert!(!buffer.restore(snapshot));
    }

    #[test]
    fn test_counts_by_level_and_source() {
        let buffer = LogBuffer::new(10);
        buffer.append([
            event("1").with_level(LogLevel::Error).with_source(LogSource::Ai),
            event("2").with_level(LogLevel::Error),
            event("3").with_level(LogLevel::Debug).with_source(LogSource::Frontend),
        ]);

        let counts = buffer.counts();
        assert_eq!(counts.error, 2);
        assert_eq!(counts.debug, 1);
        assert_eq!(counts.ai, 1);
        assert_eq!(counts.backend, 1);
        assert_eq!(counts.total(), 3);
    }
}
