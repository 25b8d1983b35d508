//! Shared types for opsconsole
//!
//! This crate contains data structures used across multiple opsconsole crates.

mod config;
mod metrics;
mod record;

pub use config::{BufferConfig, ConsoleConfig, MetricsConfig, StoreConfig, StreamConfig};
pub use metrics::{
    FunctionMetrics, LatencyStats, MetricsPayload, MetricsPoint, MetricsSnapshot, Severity,
};
pub use record::RawLogRecord;

use chrono::{DateTime, TimeZone, Utc};
use ratatui::style::Color;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

// ============================================================================
// Log Types
// ============================================================================

/// Backend service that emitted an event
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogSource {
    Frontend,
    #[default]
    Backend,
    Ai,
    Functions,
}

impl LogSource {
    pub const ALL: [LogSource; 4] = [Self::Frontend, Self::Backend, Self::Ai, Self::Functions];

    /// Parse a source name, returning None for anything unrecognized
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "frontend" | "web" | "client" => Some(Self::Frontend),
            "backend" | "server" | "api" => Some(Self::Backend),
            "ai" => Some(Self::Ai),
            "functions" | "function" | "fn" => Some(Self::Functions),
            _ => None,
        }
    }

    /// Wire name, also used as the query parameter value
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Frontend => "frontend",
            Self::Backend => "backend",
            Self::Ai => "ai",
            Self::Functions => "functions",
        }
    }

    /// Short display string (3 chars)
    pub fn short(&self) -> &'static str {
        match self {
            Self::Frontend => "WEB",
            Self::Backend => "API",
            Self::Ai => "AI ",
            Self::Functions => "FN ",
        }
    }

    /// Cycle through `None -> Frontend -> ... -> Functions -> None`
    pub fn cycle(current: Option<Self>) -> Option<Self> {
        match current {
            None => Some(Self::Frontend),
            Some(Self::Frontend) => Some(Self::Backend),
            Some(Self::Backend) => Some(Self::Ai),
            Some(Self::Ai) => Some(Self::Functions),
            Some(Self::Functions) => None,
        }
    }
}

impl fmt::Display for LogSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Log severity level
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub const ALL: [LogLevel; 4] = [Self::Debug, Self::Info, Self::Warn, Self::Error];

    /// Parse log level from common formats, returning None for anything unrecognized
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "trace" | "debug" | "dbg" | "verbose" => Some(Self::Debug),
            "info" | "inf" | "information" | "log" | "notice" => Some(Self::Info),
            "warn" | "warning" | "wrn" => Some(Self::Warn),
            "error" | "err" | "fatal" | "critical" | "crit" | "panic" => Some(Self::Error),
            _ => None,
        }
    }

    /// Get display color for this level
    pub fn color(&self) -> Color {
        match self {
            Self::Debug => Color::Cyan,
            Self::Info => Color::Green,
            Self::Warn => Color::Yellow,
            Self::Error => Color::Red,
        }
    }

    /// Wire name, also used as the query parameter value
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    /// Short display string (3 chars)
    pub fn short(&self) -> &'static str {
        match self {
            Self::Debug => "DBG",
            Self::Info => "INF",
            Self::Warn => "WRN",
            Self::Error => "ERR",
        }
    }

    /// Cycle through `None -> Debug -> ... -> Error -> None`
    pub fn cycle(current: Option<Self>) -> Option<Self> {
        match current {
            None => Some(Self::Debug),
            Some(Self::Debug) => Some(Self::Info),
            Some(Self::Info) => Some(Self::Warn),
            Some(Self::Warn) => Some(Self::Error),
            Some(Self::Error) => None,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single normalized log event
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LogEvent {
    /// Unique dedup key
    pub id: String,

    /// Epoch milliseconds. Not guaranteed monotonic across events.
    pub timestamp: i64,

    pub source: LogSource,

    pub level: LogLevel,

    pub message: String,

    /// Opaque structured fields carried with the event
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
}

/// Shared handle to an event; clones are a reference count bump
pub type ArcLogEvent = Arc<LogEvent>;

impl LogEvent {
    /// Create a new event with default source/level and no metadata
    pub fn new(id: impl Into<String>, timestamp: i64, message: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            timestamp,
            source: LogSource::default(),
            level: LogLevel::default(),
            message: message.into(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_source(mut self, source: LogSource) -> Self {
        self.source = source;
        self
    }

    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    /// Timestamp as a UTC datetime (falls back to the epoch if out of range)
    pub fn datetime(&self) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(self.timestamp)
            .single()
            .unwrap_or_default()
    }
}

// ============================================================================
// Connection Types
// ============================================================================

/// Lifecycle of the push-channel connection
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// Never connected
    #[default]
    Idle,
    Connecting,
    Connected,
    Disconnected,
}

impl ConnectionState {
    /// Whether a `connect()` call should open a new channel from this state
    pub fn accepts_connect(&self) -> bool {
        matches!(self, Self::Idle | Self::Disconnected)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
        }
    }

    pub fn color(&self) -> Color {
        match self {
            Self::Idle => Color::DarkGray,
            Self::Connecting => Color::Yellow,
            Self::Connected => Color::Green,
            Self::Disconnected => Color::Red,
        }
    }
}

/// Observable connection status with the time of the last transition
#[derive(Clone, Debug, PartialEq)]
pub struct ConnectionStatus {
    pub state: ConnectionState,
    pub since: DateTime<Utc>,
    /// Consecutive failed attempts since the last successful open
    pub failures: u32,
    pub last_error: Option<String>,
}

impl ConnectionStatus {
    pub fn new(state: ConnectionState) -> Self {
        Self {
            state,
            since: Utc::now(),
            failures: 0,
            last_error: None,
        }
    }

    /// Produce the status after a transition to `state`
    pub fn transition(&self, state: ConnectionState) -> Self {
        Self {
            state,
            since: Utc::now(),
            failures: self.failures,
            last_error: self.last_error.clone(),
        }
    }
}

impl Default for ConnectionStatus {
    fn default() -> Self {
        Self::new(ConnectionState::Idle)
    }
}
