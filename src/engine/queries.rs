use std::collections::HashSet;

use chrono::{NaiveDate, NaiveDateTime};
use ulid::Ulid;

use crate::model::*;

use super::availability::free_slots;
use super::{Engine, EngineError, History, SharedBook};

fn visible_to(actor: &Actor, r: &Reservation) -> bool {
    actor.is_admin() || r.requester == actor.id
}

impl Engine {
    fn books_for(&self, resource_id: Option<Ulid>) -> Vec<SharedBook> {
        match resource_id {
            Some(id) => self.get_book(&id).into_iter().collect(),
            None => self.all_books(),
        }
    }

    /// Reservations matching `filter`, newest first. Non-admins only ever see
    /// their own.
    pub async fn list_reservations(&self, actor: &Actor, filter: &ReservationFilter) -> Vec<Reservation> {
        let mut out = Vec::new();
        for book in self.books_for(filter.resource_id) {
            let guard = book.read().await;
            out.extend(
                guard
                    .iter()
                    .filter(|r| visible_to(actor, r) && filter.matches(r))
                    .cloned(),
            );
        }
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        out
    }

    /// A reservation hidden from this actor is reported as missing.
    pub async fn get_reservation(&self, actor: &Actor, id: Ulid) -> Result<Reservation, EngineError> {
        let guard = self.resolve_reservation_read(&id).await?;
        guard
            .get(&id)
            .filter(|r| visible_to(actor, r))
            .cloned()
            .ok_or(EngineError::NotFound(id))
    }

    /// Audit trail of one reservation, visible under the same rule as the
    /// reservation itself.
    pub async fn history(&self, actor: &Actor, id: Ulid) -> Result<History, EngineError> {
        let guard = self.resolve_reservation_read(&id).await?;
        if !guard.get(&id).is_some_and(|r| visible_to(actor, r)) {
            return Err(EngineError::NotFound(id));
        }
        Ok(self.audit.history(&id))
    }

    pub async fn available_slots(&self, resource_id: Ulid, date: NaiveDate) -> Result<Vec<Slot>, EngineError> {
        self.catalog
            .resource(&resource_id)
            .filter(|r| r.active)
            .ok_or(EngineError::NotFound(resource_id))?;
        let occupied = match self.get_book(&resource_id) {
            Some(book) => book.read().await.occupied_slots(date),
            None => HashSet::new(),
        };
        Ok(free_slots(&self.catalog.slots(), &occupied))
    }

    pub async fn status_counts(&self, actor: &Actor) -> StatusCounts {
        let mut counts = StatusCounts::default();
        for book in self.all_books() {
            let guard = book.read().await;
            for r in guard.iter().filter(|r| visible_to(actor, r)) {
                counts.record(r.status);
            }
        }
        counts
    }

    /// Confirmed reservations whose slot has ended by `now`, oldest date first.
    /// Used by the completion sweeper.
    pub async fn collect_elapsed(&self, now: NaiveDateTime) -> Vec<Ulid> {
        let mut elapsed = Vec::new();
        for book in self.all_books() {
            let guard = book.read().await;
            for r in guard.iter() {
                if r.status != ReservationStatus::Confirmed {
                    continue;
                }
                let Some(slot) = self.catalog.slot(&r.slot_id) else {
                    continue;
                };
                if slot.ends_on(r.date) <= now {
                    elapsed.push((r.date, r.id));
                }
            }
        }
        elapsed.sort();
        elapsed.into_iter().map(|(_, id)| id).collect()
    }
}
