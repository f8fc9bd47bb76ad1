use chrono::{NaiveDate, NaiveDateTime};
use thiserror::Error;
use ulid::Ulid;

use crate::model::{ActorId, ReservationStatus};

use super::lifecycle::Transition;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("cannot reserve a past date: {date} is before {today}")]
    PastDate { date: NaiveDate, today: NaiveDate },
    #[error("slot {0} ends at or before it starts")]
    InvalidRange(Ulid),
    #[error("{requested} participants exceed room capacity {capacity}")]
    CapacityExceeded { requested: u32, capacity: u32 },
    #[error("participant count must be at least 1")]
    InvalidParticipants,
    #[error("limit exceeded: {0}")]
    LimitExceeded(&'static str),
    #[error("slot already booked by reservation {0}")]
    Conflict(Ulid),
    #[error("reservation already exists: {0}")]
    AlreadyExists(Ulid),
    #[error("not found: {0}")]
    NotFound(Ulid),
    #[error("{actor} may not {transition} this reservation")]
    PermissionDenied {
        actor: ActorId,
        transition: Transition,
    },
    #[error("cannot {transition} reservation {id} while it is {status}")]
    InvalidTransition {
        id: Ulid,
        status: ReservationStatus,
        transition: Transition,
    },
    #[error("reservation {id} runs until {ends_at}")]
    NotYetElapsed { id: Ulid, ends_at: NaiveDateTime },
    #[error("WAL error: {0}")]
    Persistence(String),
}

/// Stable error categories callers can branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    PastDate,
    InvalidRange,
    CapacityExceeded,
    InvalidParticipants,
    LimitExceeded,
    Conflict,
    AlreadyExists,
    NotFound,
    PermissionDenied,
    InvalidTransition,
    Persistence,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::PastDate => "past_date",
            ErrorKind::InvalidRange => "invalid_range",
            ErrorKind::CapacityExceeded => "capacity_exceeded",
            ErrorKind::InvalidParticipants => "invalid_participants",
            ErrorKind::LimitExceeded => "limit_exceeded",
            ErrorKind::Conflict => "conflict",
            ErrorKind::AlreadyExists => "already_exists",
            ErrorKind::NotFound => "not_found",
            ErrorKind::PermissionDenied => "permission_denied",
            ErrorKind::InvalidTransition => "invalid_transition",
            ErrorKind::Persistence => "persistence",
        }
    }

    /// Caller-correctable failures reported before any write.
    pub fn is_validation(self) -> bool {
        matches!(
            self,
            ErrorKind::PastDate
                | ErrorKind::InvalidRange
                | ErrorKind::CapacityExceeded
                | ErrorKind::InvalidParticipants
                | ErrorKind::LimitExceeded
        )
    }
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::PastDate { .. } => ErrorKind::PastDate,
            EngineError::InvalidRange(_) => ErrorKind::InvalidRange,
            EngineError::CapacityExceeded { .. } => ErrorKind::CapacityExceeded,
            EngineError::InvalidParticipants => ErrorKind::InvalidParticipants,
            EngineError::LimitExceeded(_) => ErrorKind::LimitExceeded,
            EngineError::Conflict(_) => ErrorKind::Conflict,
            EngineError::AlreadyExists(_) => ErrorKind::AlreadyExists,
            EngineError::NotFound(_) => ErrorKind::NotFound,
            EngineError::PermissionDenied { .. } => ErrorKind::PermissionDenied,
            EngineError::InvalidTransition { .. } | EngineError::NotYetElapsed { .. } => {
                ErrorKind::InvalidTransition
            }
            EngineError::Persistence(_) => ErrorKind::Persistence,
        }
    }
}
