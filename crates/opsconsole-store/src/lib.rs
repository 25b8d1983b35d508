//! Persistent local store for opsconsole
//!
//! A namespaced key-value cache with TTL invalidation. Entries are JSON; the
//! backend decides where they live.

mod backend;
mod store;

pub use backend::{FileBackend, MemoryBackend, StoreBackend};
pub use store::{CacheEntry, PersistentStore};

/// Errors raised by store writes; reads degrade to defaults instead
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("store serialization failed: {0}")]
    Serde(#[from] serde_json::Error),
}
