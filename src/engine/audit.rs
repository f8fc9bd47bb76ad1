use std::sync::Arc;

use dashmap::DashMap;
use ulid::Ulid;

use crate::model::ReservationEvent;

/// Append-only store of reservation audit trails. There is no way to edit or
/// remove an entry once appended.
pub struct AuditLog {
    trails: DashMap<Ulid, Vec<ReservationEvent>>,
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::new()
    }
}

impl AuditLog {
    pub fn new() -> Self {
        Self {
            trails: DashMap::new(),
        }
    }

    /// Append one event to its reservation's trail. Caller holds the
    /// reservation's resource lock, so appends per trail are serialized.
    pub fn append(&self, event: ReservationEvent) {
        self.trails.entry(event.reservation_id).or_default().push(event);
    }

    pub fn last_timestamp(&self, reservation_id: &Ulid) -> Option<chrono::DateTime<chrono::Utc>> {
        self.trails
            .get(reservation_id)
            .and_then(|t| t.last().map(|e| e.created_at))
    }

    pub fn history(&self, reservation_id: &Ulid) -> History {
        let events = self
            .trails
            .get(reservation_id)
            .map(|t| Arc::from(t.value().as_slice()))
            .unwrap_or_else(|| Arc::from(Vec::new()));
        History { events }
    }
}

/// A snapshot of one reservation's trail. Iterating is lazy and can be
/// repeated; entries are in the order they were committed.
#[derive(Debug, Clone)]
pub struct History {
    events: Arc<[ReservationEvent]>,
}

impl History {
    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Oldest first, for replay.
    pub fn iter(&self) -> std::slice::Iter<'_, ReservationEvent> {
        self.events.iter()
    }

    /// Newest first, for display.
    pub fn newest_first(&self) -> std::iter::Rev<std::slice::Iter<'_, ReservationEvent>> {
        self.events.iter().rev()
    }
}

impl<'a> IntoIterator for &'a History {
    type Item = &'a ReservationEvent;
    type IntoIter = std::slice::Iter<'a, ReservationEvent>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.iter()
    }
}
