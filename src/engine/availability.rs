use std::collections::HashSet;

use ulid::Ulid;

use crate::model::Slot;

/// Active catalog slots minus the ones already taken, ordered by start time.
pub fn free_slots(catalog_slots: &[Slot], occupied: &HashSet<Ulid>) -> Vec<Slot> {
    let mut free: Vec<Slot> = catalog_slots
        .iter()
        .filter(|s| s.active && !occupied.contains(&s.id))
        .cloned()
        .collect();
    free.sort_by_key(|s| (s.start, s.end));
    free
}
