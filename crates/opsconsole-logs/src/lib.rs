//! Log processing for opsconsole
//!
//! This crate provides the bounded log buffer, push-channel streaming,
//! client-side filtering, and export.

mod backoff;
mod buffer;
mod export;
mod filter;
mod frame;
mod hub;
mod snapshot;
mod stream;

pub use backoff::{Backoff, BackoffPolicy, MIN_BACKOFF};
pub use buffer::{AppendOutcome, BufferStats, EventCounts, LogBuffer};
pub use export::{ExportError, export_file_name, export_json, export_to_file};
pub use filter::{CompiledFilter, FilterCriteria, RegexPredicate, filter, sort_by_timestamp};
pub use frame::{Frame, FrameError, classify};
pub use hub::{ConsoleHub, Subscription};
pub use snapshot::{
    BufferSnapshot, PendingSnapshot, SNAPSHOT_KEY, SnapshotSink, SnapshotUpdate, SnapshotWriter, WarmStartStore,
};
pub use stream::{
    EventSource, FrameStream, HttpEventSource, StreamConnectionManager, StreamError, StreamStats,
};

// Re-export types used in our public API
pub use opsconsole_types::{ArcLogEvent, ConnectionState, ConnectionStatus, LogEvent, LogLevel, LogSource};
