//! Slot scheduling rules
//!
//! Pure checks applied before a reservation reaches storage: request shape,
//! operating hours and overlap with the active reservations of the day. The
//! storage constraints remain the final arbiter under concurrency.

use serde::Serialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{
    OperatingHours, Reservation, ReservationStatus, RosterEntry, Slot, MAX_DURATION_HOURS, MAX_HOUR,
};
use crate::AppResult;

/// Availability of one operating hour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HourAvailability {
    pub hour: u32,
    pub available: bool,
}

/// Validate the shape of a booking request
pub fn validate_request(start_hour: u32, duration_hours: u32) -> AppResult<Slot> {
    if start_hour > MAX_HOUR {
        return Err(AppError::Validation(format!(
            "Start hour must be within 0-{}, got {}",
            MAX_HOUR, start_hour
        )));
    }

    if duration_hours == 0 || duration_hours > MAX_DURATION_HOURS {
        return Err(AppError::Validation(format!(
            "Duration must be between 1 and {} hours, got {}",
            MAX_DURATION_HOURS, duration_hours
        )));
    }

    Ok(Slot::new(start_hour, duration_hours))
}

/// New bookings must carry a typed roster
pub fn validate_roster(roster: &[RosterEntry]) -> AppResult<()> {
    if let Some(RosterEntry::Legacy { name }) = roster.iter().find(|e| e.is_legacy()) {
        return Err(AppError::Validation(format!(
            "Roster entry '{}' must be marked as member or guest",
            name
        )));
    }

    if roster
        .iter()
        .any(|e| matches!(e, RosterEntry::Guest { name } if name.trim().is_empty()))
    {
        return Err(AppError::Validation("Guest name must not be empty".to_string()));
    }

    Ok(())
}

/// Reject slots that fall outside the opening window
pub fn ensure_within_hours(hours: &OperatingHours, slot: &Slot) -> AppResult<()> {
    if hours.contains(slot.start, slot.end) {
        Ok(())
    } else {
        Err(AppError::OutOfHours {
            start: slot.start,
            end: slot.end,
            open: hours.start,
            close: hours.end,
        })
    }
}

/// Check that `reservation` may move to `to`
pub fn check_transition(reservation: &Reservation, to: ReservationStatus) -> AppResult<()> {
    if reservation.status.is_terminal() {
        return Err(AppError::AlreadyTerminal {
            id: reservation.id,
            status: reservation.status,
        });
    }

    if !reservation.status.can_transition_to(to) {
        return Err(AppError::InvalidTransition {
            from: reservation.status,
            to,
        });
    }

    Ok(())
}

/// First active reservation overlapping `slot`, ignoring `exclude`
pub fn find_conflict<'a>(
    reservations: &'a [Reservation],
    slot: &Slot,
    exclude: Option<Uuid>,
) -> Option<&'a Reservation> {
    reservations.iter().find(|r| {
        r.status.is_active() && Some(r.id) != exclude && r.slot().overlaps(slot)
    })
}

/// Hour-by-hour availability over the opening window
pub fn availability_grid(
    hours: &OperatingHours,
    reservations: &[Reservation],
) -> Vec<HourAvailability> {
    hours
        .hours()
        .map(|hour| HourAvailability {
            hour,
            available: !reservations
                .iter()
                .any(|r| r.status.is_active() && r.slot().covers(hour)),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn booked(start: u32, duration: u32, status: ReservationStatus) -> Reservation {
        Reservation {
            start_hour: start,
            duration_hours: duration,
            status,
            ..Default::default()
        }
    }

    #[test]
    fn test_validate_request() {
        assert_eq!(validate_request(18, 2).unwrap(), Slot { start: 18, end: 20 });
        assert!(validate_request(18, 0).is_err());
        assert!(validate_request(8, 13).is_err());
        assert!(validate_request(24, 1).is_err());
    }

    #[test]
    fn test_out_of_hours() {
        let hours = OperatingHours { start: 5, end: 22 };

        assert!(ensure_within_hours(&hours, &Slot::new(5, 2)).is_ok());
        assert!(ensure_within_hours(&hours, &Slot::new(20, 2)).is_ok());
        assert!(matches!(
            ensure_within_hours(&hours, &Slot::new(21, 2)),
            Err(AppError::OutOfHours { close: 22, .. })
        ));
        assert!(ensure_within_hours(&hours, &Slot::new(4, 1)).is_err());
    }

    #[test]
    fn test_conflict_ignores_inactive_and_excluded() {
        let active = booked(18, 2, ReservationStatus::Confirmed);
        let cancelled = booked(16, 2, ReservationStatus::Cancelled);
        let day = vec![active.clone(), cancelled];

        assert!(find_conflict(&day, &Slot::new(19, 1), None).is_some());
        assert!(find_conflict(&day, &Slot::new(16, 2), None).is_none());
        assert!(find_conflict(&day, &Slot::new(20, 1), None).is_none());
        assert!(find_conflict(&day, &Slot::new(18, 3), Some(active.id)).is_none());
    }

    #[test]
    fn test_blocked_slot_conflicts() {
        let day = vec![booked(10, 3, ReservationStatus::Blocked)];
        assert!(find_conflict(&day, &Slot::new(12, 1), None).is_some());
    }

    #[test]
    fn test_availability_grid() {
        let hours = OperatingHours { start: 17, end: 22 };
        let day = vec![
            booked(18, 2, ReservationStatus::Pending),
            booked(21, 1, ReservationStatus::NoShow),
        ];

        let grid = availability_grid(&hours, &day);
        let open: Vec<u32> = grid.iter().filter(|h| h.available).map(|h| h.hour).collect();
        assert_eq!(grid.len(), 5);
        assert_eq!(open, vec![17, 20, 21]);
    }

    #[test]
    fn test_check_transition() {
        let pending = booked(9, 1, ReservationStatus::Pending);
        let cancelled = booked(9, 1, ReservationStatus::Cancelled);
        let blocked = booked(9, 1, ReservationStatus::Blocked);

        assert!(check_transition(&pending, ReservationStatus::Confirmed).is_ok());
        assert!(matches!(
            check_transition(&cancelled, ReservationStatus::Cancelled),
            Err(AppError::AlreadyTerminal { .. })
        ));
        assert!(matches!(
            check_transition(&blocked, ReservationStatus::Confirmed),
            Err(AppError::InvalidTransition { .. })
        ));
        assert!(check_transition(&blocked, ReservationStatus::Cancelled).is_ok());
    }

    #[test]
    fn test_roster_must_be_typed() {
        assert!(validate_roster(&[RosterEntry::guest("Ana")]).is_ok());
        assert!(validate_roster(&[RosterEntry::Legacy {
            name: "Pedro".to_string()
        }])
        .is_err());
        assert!(validate_roster(&[RosterEntry::guest("  ")]).is_err());
    }
}
