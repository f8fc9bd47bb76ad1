use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Login name of an actor, as resolved by the identity directory.
pub type ActorId = String;

/// Audit author recorded for transitions driven by the scheduler.
pub const SYSTEM_ACTOR: &str = "system";

// ── Collaborator types (identity + catalog) ──────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Teacher,
    Admin,
}

/// An authenticated identity. Students and teachers carry no elevated privilege.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: ActorId,
    pub role: Role,
    #[serde(default)]
    pub superuser: bool,
}

impl Actor {
    pub fn new(id: impl Into<ActorId>, role: Role) -> Self {
        Self {
            id: id.into(),
            role,
            superuser: false,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin || self.superuser
    }
}

fn default_active() -> bool {
    true
}

/// A bookable room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub id: Ulid,
    pub name: String,
    pub capacity: u32,
    #[serde(default = "default_active")]
    pub active: bool,
}

/// A fixed time-of-day interval, shared by all resources.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    pub id: Ulid,
    pub name: String,
    pub start: NaiveTime,
    pub end: NaiveTime,
    #[serde(default = "default_active")]
    pub active: bool,
}

impl Slot {
    pub fn is_well_formed(&self) -> bool {
        self.start < self.end
    }

    /// The instant this slot is over on `date`.
    pub fn ends_on(&self, date: NaiveDate) -> NaiveDateTime {
        date.and_time(self.end)
    }
}

// ── Reservation ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReservationStatus {
    Pending,
    Confirmed,
    Cancelled,
    Completed,
}

impl ReservationStatus {
    /// Pending and Confirmed reservations hold their (resource, slot, date).
    pub fn is_active(self) -> bool {
        matches!(self, ReservationStatus::Pending | ReservationStatus::Confirmed)
    }

    pub fn is_terminal(self) -> bool {
        !self.is_active()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ReservationStatus::Pending => "pending",
            ReservationStatus::Confirmed => "confirmed",
            ReservationStatus::Cancelled => "cancelled",
            ReservationStatus::Completed => "completed",
        }
    }
}

impl fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReservationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Ok(ReservationStatus::Pending),
            "confirmed" => Ok(ReservationStatus::Confirmed),
            "cancelled" => Ok(ReservationStatus::Cancelled),
            "completed" => Ok(ReservationStatus::Completed),
            other => Err(format!("unknown status: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: Ulid,
    pub requester: ActorId,
    pub resource_id: Ulid,
    pub slot_id: Ulid,
    pub date: NaiveDate,
    pub purpose: String,
    pub participants: u32,
    pub status: ReservationStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Reservation {
    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }
}

/// What a caller asks for when creating a reservation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservationRequest {
    pub id: Ulid,
    pub resource_id: Ulid,
    pub slot_id: Ulid,
    pub date: NaiveDate,
    pub purpose: String,
    pub participants: u32,
}

// ── Audit trail ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuditAction {
    Created,
    Approved,
    Rejected,
    Cancelled,
    Completed,
}

impl AuditAction {
    pub fn as_str(self) -> &'static str {
        match self {
            AuditAction::Created => "created",
            AuditAction::Approved => "approved",
            AuditAction::Rejected => "rejected",
            AuditAction::Cancelled => "cancelled",
            AuditAction::Completed => "completed",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One immutable entry in a reservation's audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationEvent {
    pub id: Ulid,
    pub reservation_id: Ulid,
    pub action: AuditAction,
    pub actor: ActorId,
    pub notes: String,
    pub created_at: DateTime<Utc>,
}

// ── WAL records ──────────────────────────────────────────────────

/// The WAL record format. Each record carries the state change together with
/// its audit entry so both commit or neither does.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    ReservationCreated {
        reservation: Reservation,
        audit: ReservationEvent,
    },
    StatusChanged {
        id: Ulid,
        resource_id: Ulid,
        status: ReservationStatus,
        at: DateTime<Utc>,
        audit: ReservationEvent,
    },
}

impl Event {
    pub fn resource_id(&self) -> Ulid {
        match self {
            Event::ReservationCreated { reservation, .. } => reservation.resource_id,
            Event::StatusChanged { resource_id, .. } => *resource_id,
        }
    }

    pub fn audit(&self) -> &ReservationEvent {
        match self {
            Event::ReservationCreated { audit, .. } | Event::StatusChanged { audit, .. } => audit,
        }
    }
}

// ── Query types ──────────────────────────────────────────────────

/// Listing filter. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReservationFilter {
    pub id: Option<Ulid>,
    pub status: Option<ReservationStatus>,
    pub resource_id: Option<Ulid>,
    pub date: Option<NaiveDate>,
}

impl ReservationFilter {
    pub fn matches(&self, r: &Reservation) -> bool {
        self.id.is_none_or(|id| r.id == id)
            && self.status.is_none_or(|s| r.status == s)
            && self.resource_id.is_none_or(|rid| r.resource_id == rid)
            && self.date.is_none_or(|d| r.date == d)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusCounts {
    pub total: u64,
    pub pending: u64,
    pub confirmed: u64,
    pub cancelled: u64,
    pub completed: u64,
}

impl StatusCounts {
    pub fn record(&mut self, status: ReservationStatus) {
        self.total += 1;
        match status {
            ReservationStatus::Pending => self.pending += 1,
            ReservationStatus::Confirmed => self.confirmed += 1,
            ReservationStatus::Cancelled => self.cancelled += 1,
            ReservationStatus::Completed => self.completed += 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reservation(status: ReservationStatus) -> Reservation {
        let now = Utc::now();
        Reservation {
            id: Ulid::new(),
            requester: "alice".into(),
            resource_id: Ulid::new(),
            slot_id: Ulid::new(),
            date: NaiveDate::from_ymd_opt(2030, 1, 15).unwrap(),
            purpose: "study".into(),
            participants: 1,
            status,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn active_statuses() {
        assert!(ReservationStatus::Pending.is_active());
        assert!(ReservationStatus::Confirmed.is_active());
        assert!(ReservationStatus::Cancelled.is_terminal());
        assert!(ReservationStatus::Completed.is_terminal());
    }

    #[test]
    fn status_parses_case_insensitively() {
        assert_eq!("Confirmed".parse::<ReservationStatus>(), Ok(ReservationStatus::Confirmed));
        assert_eq!("pending".parse::<ReservationStatus>(), Ok(ReservationStatus::Pending));
        assert!("approved".parse::<ReservationStatus>().is_err());
    }

    #[test]
    fn admin_or_superuser() {
        assert!(Actor::new("root", Role::Admin).is_admin());
        assert!(!Actor::new("t", Role::Teacher).is_admin());
        let mut su = Actor::new("s", Role::Student);
        su.superuser = true;
        assert!(su.is_admin());
    }

    #[test]
    fn slot_shape() {
        let slot = Slot {
            id: Ulid::new(),
            name: "morning".into(),
            start: NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
            end: NaiveTime::from_hms_opt(12, 0, 0).unwrap(),
            active: true,
        };
        assert!(slot.is_well_formed());
        let date = NaiveDate::from_ymd_opt(2030, 1, 15).unwrap();
        assert_eq!(slot.ends_on(date), date.and_hms_opt(12, 0, 0).unwrap());

        let inverted = Slot {
            start: slot.end,
            end: slot.start,
            ..slot.clone()
        };
        assert!(!inverted.is_well_formed());
        let empty = Slot {
            end: slot.start,
            ..slot
        };
        assert!(!empty.is_well_formed());
    }

    #[test]
    fn filter_matching() {
        let r = reservation(ReservationStatus::Pending);
        assert!(ReservationFilter::default().matches(&r));
        assert!(ReservationFilter {
            status: Some(ReservationStatus::Pending),
            resource_id: Some(r.resource_id),
            ..Default::default()
        }
        .matches(&r));
        assert!(!ReservationFilter {
            status: Some(ReservationStatus::Confirmed),
            ..Default::default()
        }
        .matches(&r));
        assert!(!ReservationFilter {
            date: Some(r.date.succ_opt().unwrap()),
            ..Default::default()
        }
        .matches(&r));
    }

    #[test]
    fn counts_by_status() {
        let mut counts = StatusCounts::default();
        for s in [
            ReservationStatus::Pending,
            ReservationStatus::Pending,
            ReservationStatus::Cancelled,
            ReservationStatus::Completed,
        ] {
            counts.record(s);
        }
        assert_eq!(counts.total, 4);
        assert_eq!(counts.pending, 2);
        assert_eq!(counts.confirmed, 0);
        assert_eq!(counts.cancelled, 1);
        assert_eq!(counts.completed, 1);
    }

    #[test]
    fn event_serialization_roundtrip() {
        let r = reservation(ReservationStatus::Pending);
        let event = Event::ReservationCreated {
            audit: ReservationEvent {
                id: Ulid::new(),
                reservation_id: r.id,
                action: AuditAction::Created,
                actor: r.requester.clone(),
                notes: String::new(),
                created_at: r.created_at,
            },
            reservation: r,
        };
        let bytes = bincode::serialize(&event).unwrap();
        let decoded: Event = bincode::deserialize(&bytes).unwrap();
        assert_eq!(event, decoded);
    }
}
