//! Slot scheduler
//!
//! Answers availability questions from the active reservations of a day and
//! hands accepted bookings to storage, whose exclusivity constraint settles
//! races between concurrent requests.

use chrono::NaiveDate;
use clubcourt_core::{
    models::{BookingOutcome, OperatingHours, PostingRequest, Reservation, Slot},
    scheduling::{self, HourAvailability},
    traits::ReservationRepository,
    AppError, AppResult,
};
use std::sync::Arc;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

/// Availability checks and slot reservation over a reservation store
pub struct SlotScheduler<R: ReservationRepository> {
    repo: Arc<R>,
}

impl<R: ReservationRepository> SlotScheduler<R> {
    pub fn new(repo: Arc<R>) -> Self {
        Self { repo }
    }

    /// Whether `start..end` is free on `date`, ignoring `exclude`
    ///
    /// Fails with `OutOfHours` when the range leaves the opening window.
    #[instrument(skip(self, hours))]
    pub async fn check_availability(
        &self,
        hours: &OperatingHours,
        club_id: Uuid,
        date: NaiveDate,
        start: u32,
        end: u32,
        exclude: Option<Uuid>,
    ) -> AppResult<bool> {
        if end <= start {
            return Err(AppError::Validation(format!(
                "End hour {} must be after start hour {}",
                end, start
            )));
        }

        let slot = Slot { start, end };
        scheduling::ensure_within_hours(hours, &slot)?;

        let day = self.repo.find_active_on(club_id, date).await?;
        match scheduling::find_conflict(&day, &slot, exclude) {
            Some(existing) => {
                debug!(
                    "Slot {}:00-{}:00 on {} overlaps reservation {}",
                    start, end, date, existing.id
                );
                Ok(false)
            }
            None => Ok(true),
        }
    }

    /// Like `check_availability`, but a taken slot is a `SlotConflict`
    pub async fn ensure_bookable(
        &self,
        hours: &OperatingHours,
        club_id: Uuid,
        date: NaiveDate,
        slot: Slot,
        exclude: Option<Uuid>,
    ) -> AppResult<()> {
        if self
            .check_availability(hours, club_id, date, slot.start, slot.end, exclude)
            .await?
        {
            Ok(())
        } else {
            Err(AppError::SlotConflict {
                date,
                start: slot.start,
                end: slot.end,
            })
        }
    }

    /// Persist a reservation with its optional charge
    #[instrument(skip(self, reservation, charge), fields(id = %reservation.id))]
    pub async fn reserve(
        &self,
        reservation: &Reservation,
        charge: Option<&PostingRequest>,
    ) -> AppResult<BookingOutcome> {
        self.repo.insert(reservation, charge).await.map_err(|e| {
            if let AppError::SlotConflict { .. } = e {
                warn!(
                    "Reservation {} lost the race for {} {}:00-{}:00",
                    reservation.id,
                    reservation.date,
                    reservation.start_hour,
                    reservation.end_hour()
                );
            }
            e
        })
    }

    /// Hour-by-hour availability of a day
    #[instrument(skip(self, hours))]
    pub async fn availability(
        &self,
        hours: &OperatingHours,
        club_id: Uuid,
        date: NaiveDate,
    ) -> AppResult<Vec<HourAvailability>> {
        let day = self.repo.find_active_on(club_id, date).await?;
        Ok(scheduling::availability_grid(hours, &day))
    }
}
