use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};

use opsconsole_store::PersistentStore;
use opsconsole_types::{ArcLogEvent, LogEvent};

/// Store key of the warm-start snapshot
pub const SNAPSHOT_KEY: &str = "log-buffer";

/// Newest buffer entries plus the counters at the time of writing
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BufferSnapshot {
    pub events: Vec<LogEvent>,
    pub total_received: u64,
    pub total_dropped: u64,
}

/// Buffer state captured under the lock; entries are shared, not copied
#[derive(Clone, Debug)]
pub struct PendingSnapshot {
    pub events: Vec<ArcLogEvent>,
    pub total_received: u64,
    pub total_dropped: u64,
}

impl PendingSnapshot {
    pub fn into_snapshot(self) -> BufferSnapshot {
        BufferSnapshot {
            events: self.events.iter().map(|e| (**e).clone()).collect(),
            total_received: self.total_received,
            total_dropped: self.total_dropped,
        }
    }
}

/// Change to the persisted snapshot, in buffer order
#[derive(Clone, Debug)]
pub enum SnapshotUpdate {
    Write(PendingSnapshot),
    Clear,
}

/// Receives snapshot updates from the buffer
///
/// `submit` runs under the buffer write lock, so it must hand the update off
/// and return without doing I/O or calling back into the buffer.
pub trait SnapshotSink: Send + Sync {
    fn submit(&self, update: SnapshotUpdate);
}

/// Warm-start snapshot kept in the persistent store
#[derive(Clone, Debug)]
pub struct WarmStartStore {
    store: PersistentStore,
    ttl: Duration,
}

impl WarmStartStore {
    pub fn new(store: PersistentStore, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// The persisted snapshot if present and younger than the snapshot TTL
    pub fn load(&self) -> Option<BufferSnapshot> {
        self.store.get_cached_data_within(SNAPSHOT_KEY, self.ttl)
    }

    pub fn save(&self, snapshot: &BufferSnapshot) {
        if let Err(e) = self.store.set_cached_data(SNAPSHOT_KEY, snapshot) {
            tracing::warn!(error = %e, "Failed to persist log snapshot");
        }
    }

    pub fn clear(&self) {
        if let Err(e) = self.store.remove(SNAPSHOT_KEY) {
            tracing::warn!(error = %e, "Failed to remove log snapshot");
        }
    }

    fn apply(&self, update: SnapshotUpdate) {
        match update {
            SnapshotUpdate::Write(pending) => self.save(&pending.into_snapshot()),
            SnapshotUpdate::Clear => self.clear(),
        }
    }
}

#[derive(Default)]
struct Slot {
    /// Latest update not yet picked up; a newer one replaces it
    pending: Option<SnapshotUpdate>,
    busy: bool,
    closed: bool,
}

#[derive(Default)]
struct Shared {
    slot: Mutex<Slot>,
    wake: Condvar,
    idle: Condvar,
}

/// Persists snapshots on a background thread, keeping only the latest
///
/// Updates submitted while a write is in progress collapse into one, so the
/// store sees at most one write behind the current one. Dropping the writer
/// finishes the pending update before the thread exits.
pub struct SnapshotWriter {
    shared: Arc<Shared>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl SnapshotWriter {
    pub fn spawn(store: WarmStartStore) -> std::io::Result<Self> {
        let shared = Arc::new(Shared::default());
        let worker = Arc::clone(&shared);
        let thread = std::thread::Builder::new()
            .name("snapshot-writer".into())
            .spawn(move || write_loop(&worker, &store))?;

        Ok(Self {
            shared,
            thread: Mutex::new(Some(thread)),
        })
    }

    /// Block until every submitted update has reached the store
    pub fn flush(&self) {
        let mut slot = self.shared.slot.lock();
        while slot.pending.is_some() || slot.busy {
            self.shared.idle.wait(&mut slot);
        }
    }
}

impl SnapshotSink for SnapshotWriter {
    fn submit(&self, update: SnapshotUpdate) {
        let mut slot = self.shared.slot.lock();
        if slot.pending.replace(update).is_some() {
            tracing::trace!("Coalesced pending log snapshot");
        }
        self.shared.wake.notify_one();
    }
}

impl Drop for SnapshotWriter {
    fn drop(&mut self) {
        self.shared.slot.lock().closed = true;
        self.shared.wake.notify_one();
        if let Some(thread) = self.thread.lock().take() {
            if thread.join().is_err() {
                tracing::warn!("Snapshot writer thread panicked");
            }
        }
    }
}

impl std::fmt::Debug for SnapshotWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let slot = self.shared.slot.lock();
        f.debug_struct("SnapshotWriter")
            .field("pending", &slot.pending.is_some())
            .field("busy", &slot.busy)
            .finish()
    }
}

fn write_loop(shared: &Shared, store: &WarmStartStore) {
    loop {
        let update = {
            let mut slot = shared.slot.lock();
            loop {
                if let Some(update) = slot.pending.take() {
                    slot.busy = true;
                    break update;
                }
                if slot.closed {
                    shared.idle.notify_all();
                    return;
                }
                shared.wake.wait(&mut slot);
            }
        };

        store.apply(update);

        let mut slot = shared.slot.lock();
        slot.busy = false;
        if slot.pending.is_none() {
            shared.idle.notify_all();
        }
    }
}
