//! Headless mode: matching events go to stdout as JSON lines

use std::io::{self, Write};
use std::time::Duration;

use anyhow::Result;

use opsconsole_logs::{ArcLogEvent, CompiledFilter, ConsoleHub, FilterCriteria, LogBuffer};

const POLL_INTERVAL: Duration = Duration::from_millis(200);

pub async fn run(hub: ConsoleHub, criteria: FilterCriteria) -> Result<()> {
    let filter = CompiledFilter::compile(&criteria);
    if let Some(error) = filter.regex_error() {
        tracing::warn!(%error, "Regex filter ignored");
    }

    hub.set_filters(criteria.server_side());
    let _subscription = hub.subscribe();
    let mut status = hub.subscribe_status();

    let mut cursor = Cursor::default();
    let mut ticker = tokio::time::interval(POLL_INTERVAL);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,

            Ok(()) = status.changed() => {
                let current = status.borrow_and_update().clone();
                tracing::info!(
                    state = current.state.label(),
                    failures = current.failures,
                    error = current.last_error.as_deref().unwrap_or(""),
                    "Connection state changed"
                );
            }

            _ = ticker.tick() => {
                let events = cursor.take_new(hub.buffer());
                match print_matching(&events, &filter) {
                    Ok(()) => {}
                    // Downstream closed, e.g. `| head`
                    Err(e) if e.kind() == io::ErrorKind::BrokenPipe => break,
                    Err(e) => return Err(e.into()),
                }
            }
        }
    }

    Ok(())
}

/// Tracks how many accepted entries have already been printed
#[derive(Debug, Default)]
struct Cursor {
    printed: u64,
}

impl Cursor {
    /// Entries accepted since the previous call, oldest first
    fn take_new(&mut self, buffer: &LogBuffer) -> Vec<ArcLogEvent> {
        let received = buffer.stats().total_received;
        if received < self.printed {
            // Buffer was cleared
            self.printed = 0;
        }
        let new = received - self.printed;
        self.printed = received;
        if new == 0 {
            return Vec::new();
        }
        buffer.tail(usize::try_from(new).unwrap_or(usize::MAX))
    }
}

fn print_matching(events: &[ArcLogEvent], filter: &CompiledFilter) -> io::Result<()> {
    if events.is_empty() {
        return Ok(());
    }
    let mut out = io::stdout().lock();
    for event in events.iter().filter(|e| filter.matches(e)) {
        serde_json::to_writer(&mut out, event.as_ref())?;
        out.write_all(b"\n")?;
    }
    out.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use opsconsole_logs::LogEvent;

    fn event(id: &str) -> LogEvent {
        LogEvent::new(id, 0, format!("message {id}"))
    }

    #[test]
    fn test_cursor_returns_only_new_entries() {
        let buffer = LogBuffer::new(100);
        let mut cursor = Cursor::default();

        buffer.append([event("a"), event("b")]);
        let first: Vec<_> = cursor.take_new(&buffer).iter().map(|e| e.id.clone()).collect();
        assert_eq!(first, ["a", "b"]);

        assert!(cursor.take_new(&buffer).is_empty());

        buffer.append([event("b"), event("c")]);
        let second: Vec<_> = cursor.take_new(&buffer).iter().map(|e| e.id.clone()).collect();
        assert_eq!(second, ["c"]);
    }

    #[test]
    fn test_cursor_restarts_after_clear() {
        let buffer = LogBuffer::new(100);
        let mut cursor = Cursor::default();

        buffer.append([event("a"), event("b"), event("c")]);
        assert_eq!(cursor.take_new(&buffer).len(), 3);

        buffer.clear();
        buffer.append([event("d")]);
        let ids: Vec<_> = cursor.take_new(&buffer).iter().map(|e| e.id.clone()).collect();
        assert_eq!(ids, ["d"]);
    }
}
