//! Gateway Events
//!
//! Topic-addressed payloads published by the worker: canonical ticks and
//! process lifecycle log lines.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::tick::CanonicalTick;

/// Topic prefix for tick events; the full topic appends the vt-symbol.
pub const EVENT_TICK: &str = "eTick.";

/// Topic for lifecycle log lines.
pub const EVENT_LOG: &str = "eLog";

/// Full tick topic for one instrument (`eTick.au2504.SHFE`).
#[must_use]
pub fn tick_topic(vt_symbol: &str) -> String {
    format!("{EVENT_TICK}{vt_symbol}")
}

/// Event payloads.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum EventPayload {
    /// A normalized tick.
    Tick(Box<CanonicalTick>),
    /// A lifecycle log line.
    Log(LogRecord),
}

/// A published event.
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    /// Topic the event was emitted on.
    pub topic: String,
    /// Event payload.
    pub payload: EventPayload,
}

impl Event {
    /// Whether the event topic starts with `prefix`.
    #[must_use]
    pub fn matches(&self, prefix: &str) -> bool {
        self.topic.starts_with(prefix)
    }
}

/// A lifecycle log line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogRecord {
    /// When the line was written.
    pub time: DateTime<Utc>,
    /// Component that wrote it (`RecorderWorker.start`).
    pub source: String,
    /// Message text.
    pub msg: String,
}

impl LogRecord {
    /// Create a log record stamped with the current time.
    #[must_use]
    pub fn new(source: impl Into<String>, msg: impl Into<String>) -> Self {
        Self {
            time: Utc::now(),
            source: source.into(),
            msg: msg.into(),
        }
    }
}
