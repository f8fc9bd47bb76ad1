use chrono::{NaiveDateTime, Utc};
use tokio::sync::OwnedRwLockWriteGuard;
use tracing::{debug, info};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::conflict::{check_no_conflict, monotonic_now};
use super::lifecycle::{require_admin, require_owner, step};
use super::validate::{
    today, validate_capacity, validate_date, validate_notes, validate_purpose, validate_slot_range,
};
use super::{Engine, EngineError, ResourceBook, Transition};

fn default_notes(actor: &str, action: AuditAction) -> String {
    format!("{actor} {action} the reservation")
}

impl Engine {
    /// Validate and persist a new Pending reservation for `actor`.
    ///
    /// Validation runs in a fixed order before anything is locked: the date
    /// first, then purpose, catalog lookups, slot range and participants
    /// against capacity. The
    /// conflict check then runs under the resource's write lock, so two
    /// requests for the same (resource, slot, date) cannot both succeed.
    pub async fn create_reservation(
        &self,
        actor: &Actor,
        request: ReservationRequest,
    ) -> Result<Reservation, EngineError> {
        validate_date(request.date, today())?;
        validate_purpose(&request.purpose)?;
        let resource = self
            .catalog
            .resource(&request.resource_id)
            .filter(|r| r.active)
            .ok_or(EngineError::NotFound(request.resource_id))?;
        let slot = self
            .catalog
            .slot(&request.slot_id)
            .filter(|s| s.active)
            .ok_or(EngineError::NotFound(request.slot_id))?;
        validate_slot_range(&slot)?;
        validate_capacity(request.participants, resource.capacity)?;

        let book = self.book_for(resource.id);
        let mut guard = book.write().await;
        if self.reservation_to_resource.contains_key(&request.id) {
            return Err(EngineError::AlreadyExists(request.id));
        }
        if guard.len() >= MAX_RESERVATIONS_PER_RESOURCE {
            return Err(EngineError::LimitExceeded("too many reservations on resource"));
        }
        if let Err(e) = check_no_conflict(&guard, slot.id, request.date) {
            metrics::counter!(crate::observability::RESERVATION_CONFLICTS_TOTAL).increment(1);
            debug!(
                "conflict on resource {} slot {} date {}: {e}",
                resource.id, slot.id, request.date
            );
            return Err(e);
        }

        let now = Utc::now();
        let reservation = Reservation {
            id: request.id,
            requester: actor.id.clone(),
            resource_id: resource.id,
            slot_id: slot.id,
            date: request.date,
            purpose: request.purpose,
            participants: request.participants,
            status: ReservationStatus::Pending,
            created_at: now,
            updated_at: now,
        };
        let audit = ReservationEvent {
            id: Ulid::new(),
            reservation_id: reservation.id,
            action: AuditAction::Created,
            actor: actor.id.clone(),
            notes: default_notes(&actor.id, AuditAction::Created),
            created_at: now,
        };
        let event = Event::ReservationCreated {
            reservation: reservation.clone(),
            audit,
        };
        self.persist_and_apply(&mut guard, &event).await?;

        metrics::counter!(crate::observability::RESERVATIONS_CREATED_TOTAL).increment(1);
        info!(
            "reservation {} created by {} for {} on {}",
            reservation.id, actor.id, resource.name, reservation.date
        );
        Ok(reservation)
    }

    /// Pending → Confirmed. Admins only.
    pub async fn approve_reservation(
        &self,
        admin: &Actor,
        id: Ulid,
        notes: Option<String>,
    ) -> Result<Reservation, EngineError> {
        require_admin(admin, Transition::Approve)?;
        if let Some(n) = &notes {
            validate_notes(n)?;
        }
        let mut guard = self.resolve_reservation_write(&id).await?;
        let current = lookup(&guard, id)?;
        let target = step(&current, Transition::Approve)?;
        self.commit_transition(&mut guard, &current, Transition::Approve, target, &admin.id, notes)
            .await
    }

    /// Pending → Cancelled by an admin's decision.
    pub async fn reject_reservation(
        &self,
        admin: &Actor,
        id: Ulid,
        notes: Option<String>,
    ) -> Result<Reservation, EngineError> {
        require_admin(admin, Transition::Reject)?;
        if let Some(n) = &notes {
            validate_notes(n)?;
        }
        let mut guard = self.resolve_reservation_write(&id).await?;
        let current = lookup(&guard, id)?;
        let target = step(&current, Transition::Reject)?;
        self.commit_transition(&mut guard, &current, Transition::Reject, target, &admin.id, notes)
            .await
    }

    /// Requester withdraws a Pending or Confirmed reservation.
    pub async fn cancel_reservation(&self, actor: &Actor, id: Ulid) -> Result<Reservation, EngineError> {
        let mut guard = self.resolve_reservation_write(&id).await?;
        let current = lookup(&guard, id)?;
        require_owner(actor, &current, Transition::Cancel)?;
        let target = step(&current, Transition::Cancel)?;
        self.commit_transition(&mut guard, &current, Transition::Cancel, target, &actor.id, None)
            .await
    }

    /// Confirmed → Completed once the slot has ended on its date. Performed
    /// by the system, never by a user.
    pub async fn complete_reservation(&self, id: Ulid, now: NaiveDateTime) -> Result<Reservation, EngineError> {
        let mut guard = self.resolve_reservation_write(&id).await?;
        let current = lookup(&guard, id)?;
        let target = step(&current, Transition::Complete)?;
        let slot = self
            .catalog
            .slot(&current.slot_id)
            .ok_or(EngineError::NotFound(current.slot_id))?;
        let ends_at = slot.ends_on(current.date);
        if now < ends_at {
            return Err(EngineError::NotYetElapsed { id, ends_at });
        }
        self.commit_transition(&mut guard, &current, Transition::Complete, target, SYSTEM_ACTOR, None)
            .await
    }

    async fn commit_transition(
        &self,
        guard: &mut OwnedRwLockWriteGuard<ResourceBook>,
        current: &Reservation,
        transition: Transition,
        target: ReservationStatus,
        actor: &str,
        notes: Option<String>,
    ) -> Result<Reservation, EngineError> {
        let action = transition.audit_action();
        let at = monotonic_now(self.audit.last_timestamp(&current.id));
        let audit = ReservationEvent {
            id: Ulid::new(),
            reservation_id: current.id,
            action,
            actor: actor.to_string(),
            notes: notes.unwrap_or_else(|| default_notes(actor, action)),
            created_at: at,
        };
        let event = Event::StatusChanged {
            id: current.id,
            resource_id: current.resource_id,
            status: target,
            at,
            audit,
        };
        self.persist_and_apply(guard, &event).await?;

        metrics::counter!(crate::observability::TRANSITIONS_TOTAL, "transition" => transition.as_str())
            .increment(1);
        info!(
            "reservation {} {} -> {} by {actor}",
            current.id, current.status, target
        );
        lookup(guard, current.id)
    }
}

fn lookup(book: &ResourceBook, id: Ulid) -> Result<Reservation, EngineError> {
    book.get(&id).cloned().ok_or(EngineError::NotFound(id))
}
