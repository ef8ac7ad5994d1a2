//! Event Bus
//!
//! Topic-addressed event distribution over a tokio broadcast channel.
//!
//! # Architecture
//!
//! One channel carries every [`Event`]; receivers filter by topic prefix:
//! - `eTick.` for canonical ticks (`eTick.au2504.SHFE`)
//! - `eLog` for lifecycle log lines
//!
//! Emitting never blocks the push thread. A slow receiver lags and skips
//! events instead of back-pressuring the feed.

use tokio::sync::broadcast;

use crate::application::ports::EventEmitter;
use crate::domain::event::{Event, EventPayload};

/// Default channel capacity.
pub const DEFAULT_EVENT_CAPACITY: usize = 4096;

// =============================================================================
// Event Bus
// =============================================================================

/// Fan-out event bus.
///
/// # Example
///
/// ```rust
/// use md_recorder::application::ports::EventEmitter;
/// use md_recorder::domain::event::{EVENT_LOG, EventPayload, LogRecord};
/// use md_recorder::infrastructure::broadcast::EventBus;
///
/// let bus = EventBus::new(16);
/// let mut rx = bus.subscribe(EVENT_LOG);
///
/// bus.emit(EVENT_LOG, EventPayload::Log(LogRecord::new("doc", "hello")));
/// assert!(rx.try_recv().is_some());
/// ```
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<Event>,
}

impl EventBus {
    /// Create a bus with the given channel capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            tx: broadcast::channel(capacity.max(1)).0,
        }
    }

    /// Create a bus with [`DEFAULT_EVENT_CAPACITY`].
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }

    /// Send an event to all receivers.
    ///
    /// Returns the number of receivers that got it, or `None` if there are
    /// no active receivers.
    pub fn send(&self, event: Event) -> Option<usize> {
        self.tx.send(event).ok()
    }

    /// Receive every event whose topic starts with `prefix`. An empty prefix
    /// matches everything.
    #[must_use]
    pub fn subscribe(&self, prefix: impl Into<String>) -> TopicReceiver {
        TopicReceiver {
            rx: self.tx.subscribe(),
            prefix: prefix.into(),
            lagged: 0,
        }
    }

    /// Number of active receivers.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl EventEmitter for EventBus {
    fn emit(&self, topic: &str, payload: EventPayload) {
        let _ = self.send(Event {
            topic: topic.to_string(),
            payload,
        });
    }
}

// =============================================================================
// Topic Receiver
// =============================================================================

/// Receiver filtered by topic prefix.
#[derive(Debug)]
pub struct TopicReceiver {
    rx: broadcast::Receiver<Event>,
    prefix: String,
    lagged: u64,
}

impl TopicReceiver {
    /// Wait for the next matching event. Returns `None` once every sender
    /// has been dropped.
    pub async fn recv(&mut self) -> Option<Event> {
        loop {
            match self.rx.recv().await {
                Ok(event) if event.matches(&self.prefix) => return Some(event),
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => self.on_lag(skipped),
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Next matching event if one is already queued.
    pub fn try_recv(&mut self) -> Option<Event> {
        loop {
            match self.rx.try_recv() {
                Ok(event) if event.matches(&self.prefix) => return Some(event),
                Ok(_) => {}
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => self.on_lag(skipped),
                Err(_) => return None,
            }
        }
    }

    /// Total events skipped because this receiver fell behind.
    #[must_use]
    pub const fn lagged(&self) -> u64 {
        self.lagged
    }

    fn on_lag(&mut self, skipped: u64) {
        self.lagged += skipped;
        tracing::warn!(prefix = %self.prefix, skipped, "Event receiver lagged");
    }
}

// =============================================================================
// Tests
// =============================================================================
