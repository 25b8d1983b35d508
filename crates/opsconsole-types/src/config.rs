//! Console configuration
//!
//! Every tunable constant lives here so the buffer, store, stream and poller
//! agree on one set of values.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration, usually loaded from `config.toml`
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    pub stream: StreamConfig,
    pub buffer: BufferConfig,
    pub metrics: MetricsConfig,
    pub store: StoreConfig,
}

/// Push channel settings
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Full URL of the event stream endpoint
    pub url: String,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    /// Add up to 20% random jitter to each reconnect delay
    pub jitter: bool,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8080/console/events".to_string(),
            backoff_base_ms: 500,
            backoff_max_ms: 10_000,
            jitter: false,
        }
    }
}

impl StreamConfig {
    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    pub fn backoff_max(&self) -> Duration {
        Duration::from_millis(self.backoff_max_ms)
    }
}

/// Log buffer settings
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferConfig {
    pub capacity: usize,
    /// Newest entries kept in the warm-start snapshot
    pub snapshot_limit: usize,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            capacity: 100_000,
            snapshot_limit: 1_000,
        }
    }
}

/// Aggregate metrics source settings
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub url: String,
    pub poll_interval_secs: u64,
    pub window_minutes: u32,
    /// Maximum log records requested by the startup preload
    pub limit: usize,
    pub history_cap: usize,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8080/console/metrics".to_string(),
            poll_interval_secs: 30,
            window_minutes: 60,
            limit: 500,
            history_cap: 60,
        }
    }
}

impl MetricsConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }
}

/// Persistent store settings
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub namespace: String,
    /// Directory for persisted entries; `None` resolves to the user cache dir
    pub dir: Option<String>,
    pub ttl_secs: u64,
    pub snapshot_ttl_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            namespace: "opsconsole".to_string(),
            dir: None,
            ttl_secs: 5 * 60,
            snapshot_ttl_secs: 60 * 60,
        }
    }
}

impl StoreConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn snapshot_ttl(&self) -> Duration {
        Duration::from_secs(self.snapshot_ttl_secs)
    }
}
