use chrono::{Local, NaiveDate};

use crate::limits::*;
use crate::model::Slot;

use super::EngineError;

/// Today's calendar date on the server's clock.
pub(crate) fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// Checked before anything else about a request, so a past date is always
/// reported as such.
pub(crate) fn validate_date(date: NaiveDate, today: NaiveDate) -> Result<(), EngineError> {
    if date < today {
        return Err(EngineError::PastDate { date, today });
    }
    Ok(())
}

pub(crate) fn validate_slot_range(slot: &Slot) -> Result<(), EngineError> {
    if !slot.is_well_formed() {
        return Err(EngineError::InvalidRange(slot.id));
    }
    Ok(())
}

pub(crate) fn validate_capacity(participants: u32, capacity: u32) -> Result<(), EngineError> {
    if participants == 0 {
        return Err(EngineError::InvalidParticipants);
    }
    if participants > capacity {
        return Err(EngineError::CapacityExceeded {
            requested: participants,
            capacity,
        });
    }
    Ok(())
}

pub(crate) fn validate_purpose(purpose: &str) -> Result<(), EngineError> {
    if purpose.len() > MAX_PURPOSE_LEN {
        return Err(EngineError::LimitExceeded("purpose too long"));
    }
    Ok(())
}

pub(crate) fn validate_notes(notes: &str) -> Result<(), EngineError> {
    if notes.len() > MAX_NOTES_LEN {
        return Err(EngineError::LimitExceeded("notes too long"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;
    use ulid::Ulid;

    fn slot(start_h: u32, end_h: u32) -> Slot {
        Slot {
            id: Ulid::new(),
            name: "s".into(),
            start: NaiveTime::from_hms_opt(start_h, 0, 0).unwrap(),
            end: NaiveTime::from_hms_opt(end_h, 0, 0).unwrap(),
            active: true,
        }
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2030, 3, d).unwrap()
    }

    #[test]
    fn today_and_future_dates_pass() {
        assert!(validate_date(day(10), day(10)).is_ok());
        assert!(validate_date(day(11), day(10)).is_ok());
    }

    #[test]
    fn past_date_rejected() {
        let err = validate_date(day(9), day(10)).unwrap_err();
        assert!(matches!(err, EngineError::PastDate { .. }));
    }

    #[test]
    fn inverted_or_empty_slot_rejected() {
        assert!(validate_slot_range(&slot(8, 12)).is_ok());
        assert!(matches!(
            validate_slot_range(&slot(12, 8)),
            Err(EngineError::InvalidRange(_))
        ));
        assert!(matches!(
            validate_slot_range(&slot(9, 9)),
            Err(EngineError::InvalidRange(_))
        ));
    }

    #[test]
    fn capacity_bounds() {
        assert!(validate_capacity(1, 30).is_ok());
        assert!(validate_capacity(30, 30).is_ok());
        assert!(matches!(
            validate_capacity(31, 30),
            Err(EngineError::CapacityExceeded { requested: 31, capacity: 30 })
        ));
        assert!(matches!(validate_capacity(0, 30), Err(EngineError::InvalidParticipants)));
    }

    #[test]
    fn text_limits() {
        assert!(validate_purpose("study group").is_ok());
        assert!(validate_purpose(&"x".repeat(MAX_PURPOSE_LEN + 1)).is_err());
        assert!(validate_notes(&"x".repeat(MAX_NOTES_LEN)).is_ok());
        assert!(validate_notes(&"x".repeat(MAX_NOTES_LEN + 1)).is_err());
    }
}
