//! Push-channel frame classification
//!
//! `classify` turns one UTF-8 JSON message into a tagged `Frame` without
//! side effects; the stream manager routes each variant to its handler.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use opsconsole_types::{LogEvent, MetricsPayload, MetricsSnapshot, RawLogRecord};

/// A classified push-channel message
#[derive(Clone, Debug, PartialEq)]
pub enum Frame {
    /// Liveness only
    Heartbeat,
    Metrics(MetricsSnapshot),
    /// One or more log entries, already normalized
    ///
    /// `rejected` counts batch elements that could not be read; their
    /// siblings are kept.
    Logs { events: Vec<LogEvent>, rejected: usize },
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("frame is not valid JSON: {0}")]
    InvalidJson(#[source] serde_json::Error),

    #[error("unsupported frame shape: {0}")]
    UnsupportedShape(&'static str),

    #[error("invalid metrics payload: {0}")]
    Metrics(#[source] serde_json::Error),

    #[error("invalid log entry: {0}")]
    Record(#[source] serde_json::Error),
}

/// Classify a raw frame received at `received_at`
pub fn classify(text: &str, received_at: DateTime<Utc>) -> Result<Frame, FrameError> {
    let text = text.trim();
    if text.is_empty() {
        // Keep-alive with no payload
        return Ok(Frame::Heartbeat);
    }

    let value: Value = serde_json::from_str(text).map_err(FrameError::InvalidJson)?;
    match value {
        Value::Array(items) => logs_frame(items, received_at),
        Value::Object(map) => match map.get("type").and_then(Value::as_str) {
            Some("heartbeat") => Ok(Frame::Heartbeat),
            Some("metrics") => metrics_frame(map, received_at),
            _ => object_logs_frame(map, received_at),
        },
        _ => Err(FrameError::UnsupportedShape("expected a JSON object or array")),
    }
}

fn metrics_frame(mut map: Map<String, Value>, received_at: DateTime<Utc>) -> Result<Frame, FrameError> {
    let observed_at = map
        .get("observedAt")
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(received_at);

    let payload = match map.remove("metrics").or_else(|| map.remove("data")) {
        Some(inner) => inner,
        None => Value::Object(map),
    };
    if !payload.is_object() {
        return Err(FrameError::UnsupportedShape("metrics payload must be an object"));
    }

    let payload: MetricsPayload = serde_json::from_value(payload).map_err(FrameError::Metrics)?;
    Ok(Frame::Metrics(MetricsSnapshot::from_payload(payload, observed_at)))
}

/// Default frames: the object is either an envelope around entries or an entry itself
fn object_logs_frame(mut map: Map<String, Value>, received_at: DateTime<Utc>) -> Result<Frame, FrameError> {
    let inner = ["data", "entries", "logs"]
        .into_iter()
        .find(|key| matches!(map.get(*key), Some(Value::Array(_) | Value::Object(_))))
        .and_then(|key| map.remove(key));

    match inner {
        Some(Value::Array(items)) => logs_frame(items, received_at),
        Some(entry) => logs_frame(vec![entry], received_at),
        None => {
            map.remove("type");
            logs_frame(vec![Value::Object(map)], received_at)
        }
    }
}

fn logs_frame(items: Vec<Value>, received_at: DateTime<Utc>) -> Result<Frame, FrameError> {
    let received_ms = received_at.timestamp_millis();
    let total = items.len();
    let mut events = Vec::with_capacity(total);
    let mut first_error = None;

    for item in items {
        match parse_record(item) {
            Ok(record) => events.push(record.into_event(received_ms)),
            Err(e) => {
                tracing::debug!(error = %e, "Dropping unreadable log entry");
                first_error.get_or_insert(e);
            }
        }
    }

    match first_error {
        // Nothing usable in the whole frame
        Some(e) if events.is_empty() => Err(e),
        _ => Ok(Frame::Logs {
            rejected: total - events.len(),
            events,
        }),
    }
}

fn parse_record(item: Value) -> Result<RawLogRecord, FrameError> {
    if !item.is_object() {
        return Err(FrameError::UnsupportedShape("log entries must be objects"));
    }
    serde_json::from_value(item).map_err(FrameError::Record)
}
