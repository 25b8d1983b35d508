use chrono::DateTime;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;

use crate::{LogEvent, LogLevel, LogSource};

/// A log entry as it arrives on the wire, before normalization
///
/// Every field is optional; `into_event` fills the gaps.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct RawLogRecord {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub ts: Option<Value>,
    #[serde(default)]
    pub timestamp: Option<Value>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub level: Option<String>,
    #[serde(default, alias = "msg")]
    pub message: Option<Value>,
    #[serde(default, alias = "metadata")]
    pub meta: Option<HashMap<String, Value>>,
}

impl RawLogRecord {
    /// Normalize into a `LogEvent`
    ///
    /// Missing source becomes `backend`, missing level becomes `info`, a
    /// missing id is generated, and a missing timestamp uses `received_at_ms`.
    pub fn into_event(self, received_at_ms: i64) -> LogEvent {
        let timestamp = self
            .ts
            .as_ref()
            .and_then(parse_timestamp)
            .or_else(|| self.timestamp.as_ref().and_then(parse_timestamp))
            .unwrap_or(received_at_ms);

        let id = match self.id {
            Some(Value::String(s)) if !s.is_empty() => s,
            Some(Value::Number(n)) => n.to_string(),
            _ => uuid::Uuid::new_v4().to_string(),
        };

        let message = match self.message {
            Some(Value::String(s)) => s,
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        };

        LogEvent {
            id,
            timestamp,
            source: self
                .source
                .as_deref()
                .and_then(LogSource::parse)
                .unwrap_or_default(),
            level: self
                .level
                .as_deref()
                .and_then(LogLevel::parse)
                .unwrap_or_default(),
            message,
            metadata: self.meta.unwrap_or_default(),
        }
    }
}

/// Epoch milliseconds from a JSON number or an RFC 3339 / numeric string
fn parse_timestamp(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.timestamp_millis())
            .ok()
            .or_else(|| s.parse::<i64>().ok()),
        _ => None,
    }
}
