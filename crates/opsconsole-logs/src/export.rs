use std::fs::File;
use std::io::Write;
use std::path::Path;

use chrono::{DateTime, Local};

use opsconsole_types::{ArcLogEvent, LogEvent};

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("failed to write export: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to serialize export: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Serialize events as a pretty-printed JSON array
pub fn export_json(events: &[ArcLogEvent]) -> Result<String, serde_json::Error> {
    let events: Vec<&LogEvent> = events.iter().map(|e| e.as_ref()).collect();
    serde_json::to_string_pretty(&events)
}

/// Write events to `path`, returning how many were written
pub fn export_to_file(path: &Path, events: &[ArcLogEvent]) -> Result<usize, ExportError> {
    let json = export_json(events)?;
    let mut file = File::create(path)?;
    file.write_all(json.as_bytes())?;
    file.write_all(b"\n")?;
    Ok(events.len())
}

/// Default export file name, e.g. `opsconsole_20240115_103000.json`
pub fn export_file_name(now: DateTime<Local>) -> String {
    format!("opsconsole_{}.json", now.format("%Y%m%d_%H%M%S"))
}
