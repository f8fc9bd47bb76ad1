/// Maximum length of a reservation's purpose text, in bytes.
pub const MAX_PURPOSE_LEN: usize = 2_000;

/// Maximum length of approval/rejection notes, in bytes.
pub const MAX_NOTES_LEN: usize = 2_000;

/// Maximum length of an actor login name.
pub const MAX_ACTOR_ID_LEN: usize = 150;

/// Maximum reservations a single resource book may hold (all statuses).
pub const MAX_RESERVATIONS_PER_RESOURCE: usize = 1_000_000;
