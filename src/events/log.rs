//! Append-only, chronologically ordered event history.

use crate::events::CapTableEvent;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Events ordered by `event_date`. Same-date events keep insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<CapTableEvent>", into = "Vec<CapTableEvent>")]
pub struct EventLog {
    events: Vec<CapTableEvent>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert after every event dated on or before the new one.
    pub fn insert(&mut self, event: CapTableEvent) {
        let at = self
            .events
            .partition_point(|existing| existing.event_date <= event.event_date);
        self.events.insert(at, event);
    }

    /// Events dated on or before `as_of`, in replay order.
    pub fn up_to(&self, as_of: NaiveDate) -> &[CapTableEvent] {
        let end = self
            .events
            .partition_point(|event| event.event_date <= as_of);
        &self.events[..end]
    }

    pub fn iter(&self) -> impl Iterator<Item = &CapTableEvent> {
        self.events.iter()
    }

    pub fn as_slice(&self) -> &[CapTableEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.events.last().map(|event| event.event_date)
    }
}

impl From<Vec<CapTableEvent>> for EventLog {
    fn from(mut events: Vec<CapTableEvent>) -> Self {
        // Stable: preserves document order for same-date events.
        events.sort_by_key(|event| event.event_date);
        Self { events }
    }
}

impl From<EventLog> for Vec<CapTableEvent> {
    fn from(log: EventLog) -> Self {
        log.events
    }
}
