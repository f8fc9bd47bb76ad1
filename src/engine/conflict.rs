use chrono::{DateTime, NaiveDate, Utc};
use ulid::Ulid;

use super::store::ResourceBook;
use super::EngineError;

/// Audit timestamps never run backwards within one reservation's trail.
pub(crate) fn monotonic_now(last: Option<DateTime<Utc>>) -> DateTime<Utc> {
    let now = Utc::now();
    match last {
        Some(prev) if prev > now => prev,
        _ => now,
    }
}

/// Fails if an active reservation already holds `(slot, date)` on this book.
/// Only meaningful while the caller holds the book's write lock.
pub(crate) fn check_no_conflict(book: &ResourceBook, slot_id: Ulid, date: NaiveDate) -> Result<(), EngineError> {
    match book.occupant(slot_id, date) {
        Some(existing) => Err(EngineError::Conflict(existing)),
        None => Ok(()),
    }
}
