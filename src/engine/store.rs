use std::collections::{HashMap, HashSet};

use chrono::{DateTime, NaiveDate, Utc};
use ulid::Ulid;

use crate::model::*;

/// All reservations for one resource, plus the partial unique index over the
/// active ones. Callers hold the resource's write lock while mutating.
#[derive(Debug, Clone)]
pub struct ResourceBook {
    pub resource_id: Ulid,
    reservations: HashMap<Ulid, Reservation>,
    /// (slot, date) → the single Pending/Confirmed reservation holding it.
    active: HashMap<(Ulid, NaiveDate), Ulid>,
}

impl ResourceBook {
    pub fn new(resource_id: Ulid) -> Self {
        Self {
            resource_id,
            reservations: HashMap::new(),
            active: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.reservations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reservations.is_empty()
    }

    pub fn get(&self, id: &Ulid) -> Option<&Reservation> {
        self.reservations.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Reservation> {
        self.reservations.values()
    }

    /// The active reservation occupying `(slot, date)`, if any.
    pub fn occupant(&self, slot_id: Ulid, date: NaiveDate) -> Option<Ulid> {
        self.active.get(&(slot_id, date)).copied()
    }

    /// Slots taken on `date` by an active reservation.
    pub fn occupied_slots(&self, date: NaiveDate) -> HashSet<Ulid> {
        self.active
            .keys()
            .filter(|(_, d)| *d == date)
            .map(|(slot_id, _)| *slot_id)
            .collect()
    }

    /// Insert a new reservation. Fails with the occupant's id if an active
    /// reservation already holds the same slot and date.
    pub fn insert(&mut self, reservation: Reservation) -> Result<(), Ulid> {
        if reservation.is_active() {
            let key = (reservation.slot_id, reservation.date);
            if let Some(existing) = self.active.get(&key) {
                return Err(*existing);
            }
            self.active.insert(key, reservation.id);
        }
        self.reservations.insert(reservation.id, reservation);
        Ok(())
    }

    /// Move a reservation to `status`, keeping the active index in step.
    /// Returns false if the reservation is unknown.
    pub fn set_status(&mut self, id: Ulid, status: ReservationStatus, at: DateTime<Utc>) -> bool {
        let Some(r) = self.reservations.get_mut(&id) else {
            return false;
        };
        let key = (r.slot_id, r.date);
        if r.status.is_active() && !status.is_active() && self.active.get(&key) == Some(&id) {
            self.active.remove(&key);
        }
        r.status = status;
        r.updated_at = at;
        true
    }

    /// Number of active reservations on `(slot, date)`; never more than one.
    #[cfg(test)]
    pub fn active_count(&self, slot_id: Ulid, date: NaiveDate) -> usize {
        self.reservations
            .values()
            .filter(|r| r.is_active() && r.slot_id == slot_id && r.date == date)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(book: &ResourceBook, slot_id: Ulid, date: NaiveDate) -> Reservation {
        let now = Utc::now();
        Reservation {
            id: Ulid::new(),
            requester: "alice".into(),
            resource_id: book.resource_id,
            slot_id,
            date,
            purpose: String::new(),
            participants: 1,
            status: ReservationStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2030, 5, 1).unwrap()
    }

    #[test]
    fn second_active_insert_conflicts() {
        let mut book = ResourceBook::new(Ulid::new());
        let slot = Ulid::new();
        let first = draft(&book, slot, date());
        let first_id = first.id;
        book.insert(first).unwrap();

        let second = draft(&book, slot, date());
        assert_eq!(book.insert(second), Err(first_id));
        assert_eq!(book.len(), 1);
        assert_eq!(book.active_count(slot, date()), 1);
    }

    #[test]
    fn different_slot_or_date_do_not_conflict() {
        let mut book = ResourceBook::new(Ulid::new());
        let slot = Ulid::new();
        book.insert(draft(&book, slot, date())).unwrap();
        book.insert(draft(&book, Ulid::new(), date())).unwrap();
        book.insert(draft(&book, slot, date().succ_opt().unwrap())).unwrap();
        assert_eq!(book.len(), 3);
    }

    #[test]
    fn leaving_active_status_frees_the_triple() {
        let mut book = ResourceBook::new(Ulid::new());
        let slot = Ulid::new();
        let first = draft(&book, slot, date());
        let first_id = first.id;
        book.insert(first).unwrap();

        assert!(book.set_status(first_id, ReservationStatus::Cancelled, Utc::now()));
        assert_eq!(book.occupant(slot, date()), None);

        let second = draft(&book, slot, date());
        let second_id = second.id;
        book.insert(second).unwrap();
        assert_eq!(book.occupant(slot, date()), Some(second_id));
        // The cancelled row is still there.
        assert_eq!(book.get(&first_id).unwrap().status, ReservationStatus::Cancelled);
        assert_eq!(book.len(), 2);
    }

    #[test]
    fn confirming_keeps_the_slot_held() {
        let mut book = ResourceBook::new(Ulid::new());
        let slot = Ulid::new();
        let r = draft(&book, slot, date());
        let id = r.id;
        book.insert(r).unwrap();
        book.set_status(id, ReservationStatus::Confirmed, Utc::now());
        assert_eq!(book.occupant(slot, date()), Some(id));
        assert!(book.occupied_slots(date()).contains(&slot));
    }

    #[test]
    fn set_status_on_unknown_is_false() {
        let mut book = ResourceBook::new(Ulid::new());
        assert!(!book.set_status(Ulid::new(), ReservationStatus::Cancelled, Utc::now()));
    }

    #[test]
    fn occupied_slots_scoped_to_date() {
        let mut book = ResourceBook::new(Ulid::new());
        let (a, b) = (Ulid::new(), Ulid::new());
        book.insert(draft(&book, a, date())).unwrap();
        book.insert(draft(&book, b, date().succ_opt().unwrap())).unwrap();
        let occupied = book.occupied_slots(date());
        assert_eq!(occupied.len(), 1);
        assert!(occupied.contains(&a));
    }
}
