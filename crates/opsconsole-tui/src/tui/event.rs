use std::time::Duration;

use crossterm::event::{Event as CrosstermEvent, EventStream, KeyEvent, KeyEventKind};
use futures::{FutureExt, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Terminal events
#[derive(Clone, Debug)]
pub enum Event {
    /// Periodic redraw tick; new log entries show up on ticks
    Tick,
    Key(KeyEvent),
    Resize(u16, u16),
    Error(String),
}

impl Event {
    /// Map a crossterm event, dropping the ones the console ignores
    fn translate(event: CrosstermEvent) -> Option<Self> {
        match event {
            // Release and repeat events arrive on some platforms
            CrosstermEvent::Key(key) if key.kind == KeyEventKind::Press => Some(Self::Key(key)),
            CrosstermEvent::Resize(w, h) => Some(Self::Resize(w, h)),
            _ => None,
        }
    }
}

/// Event handler managing terminal input
pub struct EventHandler {
    receiver: mpsc::UnboundedReceiver<Event>,
    cancel: CancellationToken,
}

impl EventHandler {
    /// Start reading terminal input, ticking every `tick_rate`
    pub fn new(tick_rate: Duration) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        tokio::spawn(pump(sender, tick_rate, cancel.clone()));
        Self { receiver, cancel }
    }

    /// Receive the next event
    pub async fn next(&mut self) -> Option<Event> {
        self.receiver.recv().await
    }

    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

impl Drop for EventHandler {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn pump(sender: mpsc::UnboundedSender<Event>, tick_rate: Duration, cancel: CancellationToken) {
    let mut reader = EventStream::new();
    let mut ticks = tokio::time::interval(tick_rate);

    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticks.tick() => Some(Event::Tick),
            maybe_event = reader.next().fuse() => match maybe_event {
                Some(Ok(event)) => Event::translate(event),
                Some(Err(e)) => Some(Event::Error(e.to_string())),
                None => break,
            },
        };

        if let Some(event) = next {
            if sender.send(event).is_err() {
                break;
            }
        }
    }
}
