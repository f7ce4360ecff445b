//! Bounded in-memory log of engine events for polling clients.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;
use wayfinder_core::{EngineEvent, EventSink};

/// Events kept before the oldest are dropped.
pub const DEFAULT_CAPACITY: usize = 512;

/// One engine event with its position in the log.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct LoggedEvent {
    /// Sequence number, starting at 1 and strictly increasing.
    #[schema(example = 42)]
    pub seq: u64,

    /// When the event was recorded.
    pub recorded_at: DateTime<Utc>,

    /// The event.
    pub event: EngineEvent,
}

#[derive(Debug)]
struct Inner {
    capacity: usize,
    last_seq: u64,
    entries: VecDeque<LoggedEvent>,
}

/// Ring buffer of engine events, shared between the engine and the API.
#[derive(Debug, Clone)]
pub struct EventLog {
    inner: Arc<Mutex<Inner>>,
}

impl Default for EventLog {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl EventLog {
    /// Creates a log holding at most `capacity` events.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Arc::new(Mutex::new(Inner {
                capacity,
                last_seq: 0,
                entries: VecDeque::with_capacity(capacity),
            })),
        }
    }

    /// Events with a sequence number greater than `seq`, oldest first.
    #[must_use]
    pub fn since(&self, seq: u64) -> Vec<LoggedEvent> {
        self.inner.lock().map_or_else(
            |_| Vec::new(),
            |inner| inner.entries.iter().filter(|e| e.seq > seq).cloned().collect(),
        )
    }

    /// Sequence number of the newest event, 0 if none was ever recorded.
    #[must_use]
    pub fn last_seq(&self) -> u64 {
        self.inner.lock().map_or(0, |inner| inner.last_seq)
    }
}

impl EventSink for EventLog {
    fn emit(&self, event: EngineEvent) {
        let Ok(mut inner) = self.inner.lock() else {
            tracing::error!("Event log lock poisoned, dropping event");
            return;
        };
        inner.last_seq += 1;
        let seq = inner.last_seq;
        if inner.entries.len() == inner.capacity {
            inner.entries.pop_front();
        }
        inner.entries.push_back(LoggedEvent {
            seq,
            recorded_at: Utc::now(),
            event,
        });
    }
}
