use std::fmt;

use crate::model::{Actor, AuditAction, Reservation, ReservationStatus};

use super::EngineError;

use ReservationStatus::*;

/// A lifecycle step applied to an existing reservation. Creation is the only
/// entry point and is not a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transition {
    Approve,
    Reject,
    Cancel,
    Complete,
}

impl Transition {
    pub fn as_str(self) -> &'static str {
        match self {
            Transition::Approve => "approve",
            Transition::Reject => "reject",
            Transition::Cancel => "cancel",
            Transition::Complete => "complete",
        }
    }

    pub fn audit_action(self) -> AuditAction {
        match self {
            Transition::Approve => AuditAction::Approved,
            Transition::Reject => AuditAction::Rejected,
            Transition::Cancel => AuditAction::Cancelled,
            Transition::Complete => AuditAction::Completed,
        }
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Every legal (source, transition) → target. Anything absent is rejected.
const TRANSITIONS: &[(ReservationStatus, Transition, ReservationStatus)] = &[
    (Pending, Transition::Approve, Confirmed),
    (Pending, Transition::Reject, Cancelled),
    (Pending, Transition::Cancel, Cancelled),
    (Confirmed, Transition::Cancel, Cancelled),
    (Confirmed, Transition::Complete, Completed),
];

pub fn next_status(from: ReservationStatus, transition: Transition) -> Option<ReservationStatus> {
    TRANSITIONS
        .iter()
        .find(|(src, t, _)| *src == from && *t == transition)
        .map(|(_, _, target)| *target)
}

/// Apply the table to a reservation, failing without side effects.
pub(crate) fn step(reservation: &Reservation, transition: Transition) -> Result<ReservationStatus, EngineError> {
    next_status(reservation.status, transition).ok_or(EngineError::InvalidTransition {
        id: reservation.id,
        status: reservation.status,
        transition,
    })
}

pub(crate) fn require_admin(actor: &Actor, transition: Transition) -> Result<(), EngineError> {
    if actor.is_admin() {
        Ok(())
    } else {
        Err(EngineError::PermissionDenied {
            actor: actor.id.clone(),
            transition,
        })
    }
}

pub(crate) fn require_owner(
    actor: &Actor,
    reservation: &Reservation,
    transition: Transition,
) -> Result<(), EngineError> {
    if reservation.requester == actor.id {
        Ok(())
    } else {
        Err(EngineError::PermissionDenied {
            actor: actor.id.clone(),
            transition,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_STATUSES: [ReservationStatus; 4] = [Pending, Confirmed, Cancelled, Completed];
    const ALL_TRANSITIONS: [Transition; 4] = [
        Transition::Approve,
        Transition::Reject,
        Transition::Cancel,
        Transition::Complete,
    ];

    #[test]
    fn table_targets() {
        assert_eq!(next_status(Pending, Transition::Approve), Some(Confirmed));
        assert_eq!(next_status(Pending, Transition::Reject), Some(Cancelled));
        assert_eq!(next_status(Pending, Transition::Cancel), Some(Cancelled));
        assert_eq!(next_status(Confirmed, Transition::Cancel), Some(Cancelled));
        assert_eq!(next_status(Confirmed, Transition::Complete), Some(Completed));
    }

    #[test]
    fn terminal_states_have_no_exits() {
        for s in ALL_STATUSES.into_iter().filter(|s| s.is_terminal()) {
            for t in ALL_TRANSITIONS {
                assert_eq!(next_status(s, t), None, "{t} out of {s}");
            }
        }
    }

    #[test]
    fn no_transition_returns_to_pending() {
        for s in ALL_STATUSES {
            for t in ALL_TRANSITIONS {
                assert_ne!(next_status(s, t), Some(Pending));
            }
        }
    }

    #[test]
    fn pending_cannot_complete_and_confirmed_cannot_be_reviewed() {
        assert_eq!(next_status(Pending, Transition::Complete), None);
        assert_eq!(next_status(Confirmed, Transition::Approve), None);
        assert_eq!(next_status(Confirmed, Transition::Reject), None);
    }

    #[test]
    fn audit_actions_match() {
        assert_eq!(Transition::Approve.audit_action(), AuditAction::Approved);
        assert_eq!(Transition::Reject.audit_action(), AuditAction::Rejected);
        assert_eq!(Transition::Cancel.audit_action(), AuditAction::Cancelled);
        assert_eq!(Transition::Complete.audit_action(), AuditAction::Completed);
    }

    #[test]
    fn admin_check() {
        use crate::model::Role;
        assert!(require_admin(&Actor::new("root", Role::Admin), Transition::Approve).is_ok());
        let err = require_admin(&Actor::new("bob", Role::Teacher), Transition::Reject).unwrap_err();
        assert!(matches!(err, EngineError::PermissionDenied { transition: Transition::Reject, .. }));
    }
}
