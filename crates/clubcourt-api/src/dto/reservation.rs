//! Reservation DTOs
//!
//! Request and response types for booking endpoints.

use chrono::{DateTime, NaiveDate, Utc};
use clubcourt_core::models::{
    BookingOutcome, PaymentStatus, Reservation, ReservationStatus, RosterEntry,
};
use clubcourt_core::traits::MatchOutcome;
use clubcourt_services::BookingRequest;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::credit::TransactionResponse;

/// Booking request
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateReservationRequest {
    /// Member making (and paying for) the booking
    pub member_id: Uuid,

    /// Day of play
    pub date: NaiveDate,

    /// First hour (0-23)
    #[validate(range(max = 23, message = "Start hour must be between 0 and 23"))]
    pub start_hour: u32,

    /// Length in whole hours
    #[validate(range(min = 1, max = 12))]
    pub duration_hours: u32,

    /// Other players; the reserver is always counted
    #[serde(default)]
    pub roster: Vec<RosterEntry>,

    #[validate(length(max = 500))]
    pub notes: Option<String>,

    /// Admin-set fee replacing the computed price
    pub fee_override: Option<Decimal>,

    /// Who is booking, when not the member
    pub actor_id: Option<Uuid>,
}

impl CreateReservationRequest {
    /// Convert to the service booking request
    pub fn into_booking(self, club_id: Uuid) -> BookingRequest {
        BookingRequest {
            club_id,
            member_id: self.member_id,
            date: self.date,
            start_hour: self.start_hour,
            duration_hours: self.duration_hours,
            roster: self.roster,
            notes: self.notes,
            fee_override: self.fee_override,
            actor: self.actor_id,
        }
    }
}

/// Price preview request
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct QuoteRequest {
    pub member_id: Uuid,

    #[validate(range(max = 23))]
    pub start_hour: u32,

    #[validate(range(min = 1, max = 12))]
    pub duration_hours: u32,

    #[serde(default)]
    pub roster: Vec<RosterEntry>,
}

/// Availability query
#[derive(Debug, Clone, Deserialize)]
pub struct AvailabilityQuery {
    pub date: NaiveDate,
}

/// Move a reservation to another slot
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RescheduleRequest {
    pub date: NaiveDate,

    #[validate(range(max = 23))]
    pub start_hour: u32,

    #[validate(range(min = 1, max = 12))]
    pub duration_hours: u32,

    pub actor_id: Option<Uuid>,
}

/// Block a slot for maintenance or events
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct BlockSlotRequest {
    pub date: NaiveDate,

    #[validate(range(max = 23))]
    pub start_hour: u32,

    #[validate(range(min = 1, max = 12))]
    pub duration_hours: u32,

    pub admin_id: Uuid,

    #[validate(length(max = 500))]
    pub reason: Option<String>,
}

/// Complete a reservation, optionally with the match result
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CompleteRequest {
    pub actor_id: Option<Uuid>,
    pub result: Option<MatchOutcome>,
}

/// Refund part of a reservation fee
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RefundRequest {
    /// Amount to refund (must be positive, validated by the ledger)
    pub amount: Decimal,

    #[validate(length(min = 1, max = 500, message = "Reason is required"))]
    pub reason: String,

    pub admin_id: Uuid,
}

/// Reservation response
#[derive(Debug, Clone, Serialize)]
pub struct ReservationResponse {
    pub id: Uuid,
    pub club_id: Uuid,
    pub member_id: Uuid,
    pub date: NaiveDate,
    pub start_hour: u32,
    pub end_hour: u32,
    pub duration_hours: u32,
    pub roster: Vec<RosterEntry>,
    pub status: ReservationStatus,
    pub total_fee: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fee_override: Option<Decimal>,
    pub payment_status: PaymentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancelled_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancelled_by: Option<Uuid>,
}

impl From<Reservation> for ReservationResponse {
    fn from(r: Reservation) -> Self {
        Self {
            id: r.id,
            club_id: r.club_id,
            member_id: r.member_id,
            date: r.date,
            start_hour: r.start_hour,
            end_hour: r.end_hour(),
            duration_hours: r.duration_hours,
            roster: r.roster,
            status: r.status,
            total_fee: r.total_fee,
            fee_override: r.fee_override,
            payment_status: r.payment_status,
            notes: r.notes,
            created_by: r.created_by,
            created_at: r.created_at,
            updated_at: r.updated_at,
            cancelled_at: r.cancelled_at,
            cancelled_by: r.cancelled_by,
        }
    }
}

/// Reservation together with the credit posting it caused
#[derive(Debug, Clone, Serialize)]
pub struct BookingResponse {
    pub reservation: ReservationResponse,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction: Option<TransactionResponse>,
}

impl From<BookingOutcome> for BookingResponse {
    fn from(outcome: BookingOutcome) -> Self {
        Self {
            reservation: outcome.reservation.into(),
            transaction: outcome.transaction.map(Into::into),
        }
    }
}
