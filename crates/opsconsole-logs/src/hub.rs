use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;

use opsconsole_types::ConnectionStatus;

use crate::buffer::LogBuffer;
use crate::filter::FilterCriteria;
use crate::stream::{StreamConnectionManager, StreamStats};

struct HubState {
    manager: StreamConnectionManager,
    subscribers: usize,
}

/// Process-wide console state: one buffer and one channel per instance
///
/// The channel opens when the first subscriber arrives and closes when the
/// last `Subscription` is dropped. Tests create as many isolated hubs as
/// they need.
#[derive(Clone)]
pub struct ConsoleHub {
    state: Arc<Mutex<HubState>>,
    buffer: LogBuffer,
}

impl ConsoleHub {
    pub fn new(manager: StreamConnectionManager) -> Self {
        let buffer = manager.buffer().clone();
        Self {
            state: Arc::new(Mutex::new(HubState {
                manager,
                subscribers: 0,
            })),
            buffer,
        }
    }

    /// Register interest in the stream, connecting on the first subscriber
    pub fn subscribe(&self) -> Subscription {
        let mut state = self.state.lock();
        state.subscribers += 1;
        if state.subscribers == 1 {
            let filters = state.manager.filters().clone();
            state.manager.connect(filters);
        }
        Subscription { hub: self.clone() }
    }

    fn release(&self) {
        let mut state = self.state.lock();
        state.subscribers = state.subscribers.saturating_sub(1);
        if state.subscribers == 0 {
            tracing::debug!("Last subscriber gone, closing push channel");
            state.manager.disconnect();
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.state.lock().subscribers
    }

    pub fn buffer(&self) -> &LogBuffer {
        &self.buffer
    }

    pub fn status(&self) -> ConnectionStatus {
        self.state.lock().manager.status()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.state.lock().manager.subscribe_status()
    }

    pub fn filters(&self) -> FilterCriteria {
        self.state.lock().manager.filters().clone()
    }

    /// Change server-side filters; an open channel is rebuilt
    pub fn set_filters(&self, filters: FilterCriteria) -> bool {
        self.state.lock().manager.set_filters(filters)
    }

    /// Manual reconnect; ignored while nobody is subscribed
    pub fn reconnect(&self) {
        let mut state = self.state.lock();
        if state.subscribers > 0 {
            state.manager.reconnect();
        }
    }

    pub fn stream_stats(&self) -> StreamStats {
        self.state.lock().manager.stats()
    }
}

/// Keeps the channel open while alive
pub struct Subscription {
    hub: ConsoleHub,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.hub.release();
    }
}
