//! Reservation lifecycle
//!
//! Orchestrates bookings end to end: request checks, settings, availability,
//! pricing, and the reservation write with its credit posting. Status changes
//! follow the reservation state machine; cancellations of paid bookings refund
//! according to the club's cancellation policy.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;
use clubcourt_core::{
    models::{
        BookingOutcome, CreditTransaction, PaymentStatus, PostingRequest, Reservation,
        ReservationStatus, RosterEntry,
    },
    pricing::{PriceQuote, PricingEngine, RosterCounts},
    scheduling::{self, HourAvailability},
    traits::{
        CacheService, MatchOutcome, PaginatedResponse, Pagination, RankingSink, RescheduleChange,
        ReservationRepository, SettingsRepository,
    },
    AppError, AppResult,
};
use rust_decimal::Decimal;
use serde_json::json;
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::ranking::LoggingRankingSink;
use crate::scheduler::SlotScheduler;
use crate::settings_provider::SettingsProvider;

/// A booking as requested by a member or an admin
#[derive(Debug, Clone)]
pub struct BookingRequest {
    pub club_id: Uuid,
    pub member_id: Uuid,
    pub date: NaiveDate,
    pub start_hour: u32,
    pub duration_hours: u32,
    pub roster: Vec<RosterEntry>,
    pub notes: Option<String>,
    /// Admin-set fee replacing the computed price
    pub fee_override: Option<Decimal>,
    /// Who made the booking, when not the member
    pub actor: Option<Uuid>,
}

/// Instant a reservation starts, in UTC
///
/// Local times skipped by a DST change are read as UTC.
fn start_instant(reservation: &Reservation, tz: Tz) -> DateTime<Utc> {
    let local = reservation.starts_at();
    match tz.from_local_datetime(&local).earliest() {
        Some(start) => start.with_timezone(&Utc),
        None => Utc.from_utc_datetime(&local),
    }
}

/// Reservation workflows
pub struct ReservationLifecycle<R, S, C>
where
    R: ReservationRepository,
    S: SettingsRepository,
    C: CacheService,
{
    reservations: Arc<R>,
    scheduler: SlotScheduler<R>,
    settings: Arc<SettingsProvider<S, C>>,
    ranking: Arc<dyn RankingSink>,
}

impl<R, S, C> ReservationLifecycle<R, S, C>
where
    R: ReservationRepository,
    S: SettingsRepository,
    C: CacheService,
{
    pub fn new(reservations: Arc<R>, settings: Arc<SettingsProvider<S, C>>) -> Self {
        Self {
            scheduler: SlotScheduler::new(reservations.clone()),
            reservations,
            settings,
            ranking: Arc::new(LoggingRankingSink),
        }
    }

    pub fn with_ranking(mut self, ranking: Arc<dyn RankingSink>) -> Self {
        self.ranking = ranking;
        self
    }

    async fn load(&self, id: Uuid) -> AppResult<Reservation> {
        self.reservations
            .find_by_id(id)
            .await?
            .ok_or(AppError::ReservationNotFound(id))
    }

    pub async fn get_reservation(&self, id: Uuid) -> AppResult<Reservation> {
        self.load(id).await
    }

    /// Reservations of a member, newest first
    pub async fn list_member_reservations(
        &self,
        member_id: Uuid,
        club_id: Uuid,
        pagination: &Pagination,
    ) -> AppResult<PaginatedResponse<Reservation>> {
        let (data, total) = self
            .reservations
            .list_for_member(member_id, club_id, pagination.limit(), pagination.offset())
            .await?;
        Ok(PaginatedResponse::new(data, total, pagination))
    }

    /// Price a booking without reserving anything
    pub async fn quote(
        &self,
        club_id: Uuid,
        member_id: Uuid,
        start_hour: u32,
        duration_hours: u32,
        roster: &[RosterEntry],
    ) -> AppResult<PriceQuote> {
        scheduling::validate_request(start_hour, duration_hours)?;
        let settings = self.settings.get(club_id).await?;
        PricingEngine::quote(
            start_hour,
            duration_hours,
            RosterCounts::for_booking(member_id, roster),
            &settings.pricing,
        )
    }

    /// Book a slot and charge the member's credit in one unit of work
    ///
    /// Checks run in order: request shape, operating hours, availability,
    /// pricing, then credit. Storage settles any race on the slot.
    #[instrument(
        skip(self, request),
        fields(club_id = %request.club_id, member_id = %request.member_id, date = %request.date)
    )]
    pub async fn create_reservation(&self, request: BookingRequest) -> AppResult<BookingOutcome> {
        let slot = scheduling::validate_request(request.start_hour, request.duration_hours)?;
        scheduling::validate_roster(&request.roster)?;

        if let Some(fee) = request.fee_override {
            if fee < Decimal::ZERO {
                return Err(AppError::Validation(format!(
                    "Fee override must not be negative, got {}",
                    fee
                )));
            }
        }

        let settings = self.settings.get(request.club_id).await?;
        self.scheduler
            .ensure_bookable(
                &settings.operating_hours,
                request.club_id,
                request.date,
                slot,
                None,
            )
            .await?;

        let counts = RosterCounts::for_booking(request.member_id, &request.roster);
        let quote = PricingEngine::quote(
            request.start_hour,
            request.duration_hours,
            counts,
            &settings.pricing,
        )?;
        let fee = request.fee_override.unwrap_or(quote.fee);
        let actor = request.actor.or(Some(request.member_id));

        let mut reservation = Reservation::new(
            request.club_id,
            request.member_id,
            request.date,
            request.start_hour,
            request.duration_hours,
            request.roster,
        );
        reservation.total_fee = fee;
        reservation.fee_override = request.fee_override;
        reservation.payment_status = if fee > Decimal::ZERO {
            PaymentStatus::Paid
        } else {
            PaymentStatus::Waived
        };
        reservation.notes = request.notes;
        reservation.created_by = actor;

        let charge = (fee > Decimal::ZERO).then(|| {
            PostingRequest::deduction(reservation.member_id, reservation.club_id, fee)
                .for_reservation(&reservation)
                .with_metadata(json!({
                    "pricing_model": quote.model,
                    "quoted_fee": quote.fee,
                    "fee_override": request.fee_override.is_some(),
                }))
                .by(actor)
        });

        let outcome = self.scheduler.reserve(&reservation, charge.as_ref()).await?;

        info!(
            "Booked {} {}:00-{}:00 for member {} (fee {}, {} members, {} guests)",
            outcome.reservation.date,
            slot.start,
            slot.end,
            outcome.reservation.member_id,
            fee,
            counts.members,
            counts.guests
        );

        Ok(outcome)
    }

    /// Cancel a reservation, refunding per the club's policy
    pub async fn cancel_reservation(&self, id: Uuid, actor: Option<Uuid>) -> AppResult<BookingOutcome> {
        self.cancel_reservation_at(id, actor, Utc::now()).await
    }

    /// Cancel as of `now`
    #[instrument(skip(self))]
    pub async fn cancel_reservation_at(
        &self,
        id: Uuid,
        actor: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> AppResult<BookingOutcome> {
        let current = self.load(id).await?;
        scheduling::check_transition(&current, ReservationStatus::Cancelled)?;

        let refund = self.cancellation_refund(&current, actor, now).await?;
        let (reservation, transaction) = self
            .reservations
            .update_status(
                id,
                current.status,
                ReservationStatus::Cancelled,
                actor,
                refund.as_ref(),
            )
            .await?;

        info!(
            "Cancelled reservation {} (refund {})",
            id,
            transaction
                .as_ref()
                .map(|t| t.amount)
                .unwrap_or(Decimal::ZERO)
        );

        Ok(BookingOutcome {
            reservation,
            transaction,
        })
    }

    async fn cancellation_refund(
        &self,
        reservation: &Reservation,
        actor: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> AppResult<Option<PostingRequest>> {
        if reservation.total_fee <= Decimal::ZERO {
            return Ok(None);
        }

        // Refunds already posted through the ledger count against the policy amount
        let window = self.reservations.refund_window(reservation.id).await?;
        if window.remaining() <= Decimal::ZERO {
            debug!("Reservation {} has nothing left to refund", reservation.id);
            return Ok(None);
        }

        let settings = self.settings.get(reservation.club_id).await?;
        let notice = start_instant(reservation, settings.tz()) - now;
        let amount = settings
            .cancellation
            .refund_for(reservation.total_fee, notice)
            .min(window.remaining());

        if amount <= Decimal::ZERO {
            debug!(
                "No refund for reservation {} cancelled {} minutes ahead",
                reservation.id,
                notice.num_minutes()
            );
            return Ok(None);
        }

        Ok(Some(
            PostingRequest::refund(reservation.member_id, reservation.club_id, amount)
                .for_reservation(reservation)
                .with_metadata(json!({
                    "reason": "cancellation",
                    "notice_minutes": notice.num_minutes(),
                }))
                .by(actor),
        ))
    }

    async fn transition(
        &self,
        id: Uuid,
        to: ReservationStatus,
        actor: Option<Uuid>,
    ) -> AppResult<Reservation> {
        let current = self.load(id).await?;
        scheduling::check_transition(&current, to)?;

        let (updated, _) = self
            .reservations
            .update_status(id, current.status, to, actor, None)
            .await?;

        info!("Reservation {} moved from {} to {}", id, current.status, to);
        Ok(updated)
    }

    #[instrument(skip(self))]
    pub async fn confirm(&self, id: Uuid, actor: Option<Uuid>) -> AppResult<Reservation> {
        self.transition(id, ReservationStatus::Confirmed, actor).await
    }

    /// Mark a reservation as not shown up; the fee is kept
    #[instrument(skip(self))]
    pub async fn mark_no_show(&self, id: Uuid, actor: Option<Uuid>) -> AppResult<Reservation> {
        self.transition(id, ReservationStatus::NoShow, actor).await
    }

    /// Complete a played reservation and pass its result on for rankings
    #[instrument(skip(self, outcome))]
    pub async fn complete(
        &self,
        id: Uuid,
        outcome: Option<MatchOutcome>,
        actor: Option<Uuid>,
    ) -> AppResult<Reservation> {
        let completed = self
            .transition(id, ReservationStatus::Completed, actor)
            .await?;

        if let Some(result) = outcome {
            if let Err(e) = self.ranking.record_result(&completed, &result).await {
                warn!("Failed to record match result for {}: {}", id, e);
            }
        }

        Ok(completed)
    }

    /// Take a slot out of play without a member or a fee
    #[instrument(skip(self, reason))]
    pub async fn block_slot(
        &self,
        club_id: Uuid,
        date: NaiveDate,
        start_hour: u32,
        duration_hours: u32,
        admin: Uuid,
        reason: Option<String>,
    ) -> AppResult<Reservation> {
        let slot = scheduling::validate_request(start_hour, duration_hours)?;
        let settings = self.settings.get(club_id).await?;
        self.scheduler
            .ensure_bookable(&settings.operating_hours, club_id, date, slot, None)
            .await?;

        let mut block = Reservation::new(club_id, admin, date, start_hour, duration_hours, Vec::new());
        block.status = ReservationStatus::Blocked;
        block.notes = reason;

        let outcome = self.scheduler.reserve(&block, None).await?;
        info!(
            "Blocked {} {}:00-{}:00 in club {}",
            date, slot.start, slot.end, club_id
        );
        Ok(outcome.reservation)
    }

    /// Move a reservation to another slot, settling the fee difference
    ///
    /// Bookings with an admin fee keep it and waived bookings stay waived.
    /// Other bookings are repriced; a higher fee is deducted and a lower one
    /// refunded together with the move.
    #[instrument(skip(self))]
    pub async fn reschedule(
        &self,
        id: Uuid,
        date: NaiveDate,
        start_hour: u32,
        duration_hours: u32,
        actor: Option<Uuid>,
    ) -> AppResult<BookingOutcome> {
        let current = self.load(id).await?;

        if current.status.is_terminal() {
            return Err(AppError::AlreadyTerminal {
                id,
                status: current.status,
            });
        }
        if !matches!(
            current.status,
            ReservationStatus::Pending | ReservationStatus::Confirmed
        ) {
            return Err(AppError::Validation(format!(
                "Only pending or confirmed reservations can be rescheduled, {} is {}",
                id, current.status
            )));
        }
        if !matches!(
            current.payment_status,
            PaymentStatus::Paid | PaymentStatus::Waived
        ) {
            return Err(AppError::Validation(format!(
                "Reservation {} has refunds recorded and cannot be rescheduled",
                id
            )));
        }

        let slot = scheduling::validate_request(start_hour, duration_hours)?;
        let settings = self.settings.get(current.club_id).await?;
        self.scheduler
            .ensure_bookable(
                &settings.operating_hours,
                current.club_id,
                date,
                slot,
                Some(id),
            )
            .await?;

        let new_fee = if let Some(fee) = current.fee_override {
            fee
        } else if current.payment_status == PaymentStatus::Waived {
            Decimal::ZERO
        } else {
            PricingEngine::fee(
                start_hour,
                duration_hours,
                RosterCounts::for_booking(current.member_id, &current.roster),
                &settings.pricing,
            )?
        };
        let delta = new_fee - current.total_fee;

        let metadata = json!({
            "reason": "reschedule",
            "previous_fee": current.total_fee,
            "new_fee": new_fee,
        });
        let posting = match delta.cmp(&Decimal::ZERO) {
            Ordering::Greater => Some(PostingRequest::deduction(
                current.member_id,
                current.club_id,
                delta,
            )),
            Ordering::Less => Some(PostingRequest::refund(
                current.member_id,
                current.club_id,
                -delta,
            )),
            Ordering::Equal => None,
        };
        let posting = posting.map(|p| p.for_reservation(&current).with_metadata(metadata).by(actor));

        let payment_status = if new_fee > Decimal::ZERO {
            PaymentStatus::Paid
        } else if current.total_fee > Decimal::ZERO {
            PaymentStatus::Refunded
        } else {
            PaymentStatus::Waived
        };

        let change = RescheduleChange {
            id,
            expected_status: current.status,
            date,
            start_hour,
            duration_hours,
            total_fee: new_fee,
            payment_status,
            actor,
        };

        let (reservation, transaction) = self
            .reservations
            .reschedule(&change, posting.as_ref())
            .await?;

        info!(
            "Rescheduled {} to {} {}:00-{}:00 (fee {} -> {})",
            id, date, slot.start, slot.end, current.total_fee, new_fee
        );

        Ok(BookingOutcome {
            reservation,
            transaction,
        })
    }

    /// Refund part of a reservation's fee outside of a cancellation
    #[instrument(skip(self, reason))]
    pub async fn refund_credit(
        &self,
        reservation_id: Uuid,
        amount: Decimal,
        reason: &str,
        admin: Uuid,
    ) -> AppResult<CreditTransaction> {
        if reason.trim().is_empty() {
            return Err(AppError::Validation("Refunds require a reason".to_string()));
        }

        let reservation = self.load(reservation_id).await?;
        let request =
            PostingRequest::refund(reservation.member_id, reservation.club_id, amount)
                .for_reservation(&reservation)
                .with_metadata(json!({ "reason": reason }))
                .by(Some(admin));

        let (updated, tx) = self
            .reservations
            .apply_refund(reservation_id, &request)
            .await?;

        info!(
            "Refunded {} on reservation {} (payment {})",
            amount, reservation_id, updated.payment_status
        );
        Ok(tx)
    }

    /// Hour-by-hour availability of a club on a date
    pub async fn get_availability(
        &self,
        club_id: Uuid,
        date: NaiveDate,
    ) -> AppResult<Vec<HourAvailability>> {
        let settings = self.settings.get(club_id).await?;
        self.scheduler
            .availability(&settings.operating_hours, club_id, date)
            .await
    }
}
