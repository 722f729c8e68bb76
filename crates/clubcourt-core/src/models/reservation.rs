//! Court reservation model
//!
//! A reservation occupies a club's court for a whole-hour slot on one date.
//! Reservations are never deleted; cancellation is a status change.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Longest bookable slot in hours
pub const MAX_DURATION_HOURS: u32 = 12;

/// Reservation status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReservationStatus {
    /// Booked, awaiting confirmation
    #[default]
    Pending,
    /// Confirmed by the club
    Confirmed,
    /// Cancelled by the member or an admin
    Cancelled,
    /// Played
    Completed,
    /// The member did not show up
    NoShow,
    /// Admin hold for maintenance or a private event
    Blocked,
}

impl fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ReservationStatus {
    /// Statuses that occupy their slot
    pub const ACTIVE: [ReservationStatus; 3] = [
        ReservationStatus::Pending,
        ReservationStatus::Confirmed,
        ReservationStatus::Blocked,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::Pending => "pending",
            ReservationStatus::Confirmed => "confirmed",
            ReservationStatus::Cancelled => "cancelled",
            ReservationStatus::Completed => "completed",
            ReservationStatus::NoShow => "no_show",
            ReservationStatus::Blocked => "blocked",
        }
    }

    /// Parse from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(ReservationStatus::Pending),
            "confirmed" => Some(ReservationStatus::Confirmed),
            "cancelled" => Some(ReservationStatus::Cancelled),
            "completed" => Some(ReservationStatus::Completed),
            "no_show" | "no-show" => Some(ReservationStatus::NoShow),
            "blocked" => Some(ReservationStatus::Blocked),
            _ => None,
        }
    }

    /// Check if the reservation still occupies its slot
    #[inline]
    pub fn is_active(&self) -> bool {
        Self::ACTIVE.contains(self)
    }

    /// Check if no further transition is possible
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ReservationStatus::Cancelled | ReservationStatus::Completed | ReservationStatus::NoShow
        )
    }

    /// Allowed transitions of the reservation state machine
    pub fn can_transition_to(&self, next: ReservationStatus) -> bool {
        use ReservationStatus::*;

        matches!(
            (self, next),
            (Pending, Confirmed)
                | (Confirmed, Completed)
                | (Pending | Confirmed, Cancelled)
                | (Pending | Confirmed, NoShow)
                | (Blocked, Cancelled)
        )
    }
}

/// Payment state of a reservation's fee
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    /// Fee deducted from the reserver's credit
    Paid,
    /// Part of the fee has been refunded
    PartiallyRefunded,
    /// The whole fee has been refunded
    Refunded,
    /// Nothing to pay (zero fee or admin block)
    #[default]
    Waived,
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PaymentStatus::Paid => write!(f, "paid"),
            PaymentStatus::PartiallyRefunded => write!(f, "partially_refunded"),
            PaymentStatus::Refunded => write!(f, "refunded"),
            PaymentStatus::Waived => write!(f, "waived"),
        }
    }
}

impl PaymentStatus {
    /// Parse from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "paid" => Some(PaymentStatus::Paid),
            "partially_refunded" => Some(PaymentStatus::PartiallyRefunded),
            "refunded" => Some(PaymentStatus::Refunded),
            "waived" => Some(PaymentStatus::Waived),
            _ => None,
        }
    }

    /// Payment status of a reservation costing `total_fee` given what its
    /// reserver has been charged and refunded against it
    pub fn from_ledger(total_fee: Decimal, charged: Decimal, refunded: Decimal) -> Self {
        let kept = charged - refunded;
        if charged <= Decimal::ZERO {
            PaymentStatus::Waived
        } else if kept <= Decimal::ZERO {
            PaymentStatus::Refunded
        } else if kept < total_fee {
            PaymentStatus::PartiallyRefunded
        } else {
            PaymentStatus::Paid
        }
    }
}

/// One player on a reservation roster
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RosterEntry {
    /// A club member
    Member {
        member_id: Uuid,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },
    /// A non-member guest; the reserver pays their fee
    Guest { name: String },
    /// Freeform name from rosters recorded before entries were typed
    Legacy { name: String },
}

impl RosterEntry {
    pub fn member(member_id: Uuid) -> Self {
        RosterEntry::Member {
            member_id,
            name: None,
        }
    }

    pub fn guest(name: impl Into<String>) -> Self {
        RosterEntry::Guest { name: name.into() }
    }

    #[inline]
    pub fn is_legacy(&self) -> bool {
        matches!(self, RosterEntry::Legacy { .. })
    }
}

/// A whole-hour time range `[start, end)` on a single day
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    pub start: u32,
    pub end: u32,
}

impl Slot {
    pub fn new(start: u32, duration_hours: u32) -> Self {
        Self {
            start,
            end: start + duration_hours,
        }
    }

    #[inline]
    pub fn duration(&self) -> u32 {
        self.end - self.start
    }

    /// Two half-open ranges `[a,b)` and `[c,d)` overlap iff `a < d && c < b`
    #[inline]
    pub fn overlaps(&self, other: &Slot) -> bool {
        self.start < other.end && other.start < self.end
    }

    #[inline]
    pub fn covers(&self, hour: u32) -> bool {
        hour >= self.start && hour < self.end
    }
}

/// Court reservation entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reservation {
    /// Unique identifier
    pub id: Uuid,

    /// Club owning the court
    pub club_id: Uuid,

    /// Reserver (the admin for blocked slots)
    pub member_id: Uuid,

    /// Club-local date of play
    pub date: NaiveDate,

    /// First booked hour
    pub start_hour: u32,

    /// Number of booked hours (1..=12)
    pub duration_hours: u32,

    /// Players, in the order given by the reserver
    pub roster: Vec<RosterEntry>,

    /// Current status
    pub status: ReservationStatus,

    /// Fee charged at creation (or the admin override)
    pub total_fee: Decimal,

    /// Admin-set fee, kept when the reservation moves
    #[serde(default)]
    pub fee_override: Option<Decimal>,

    /// Payment state of `total_fee`
    pub payment_status: PaymentStatus,

    /// Free text (block reason, admin remarks)
    pub notes: Option<String>,

    /// Who created the reservation
    pub created_by: Option<Uuid>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,

    /// When the reservation was cancelled
    pub cancelled_at: Option<DateTime<Utc>>,

    /// Who cancelled it
    pub cancelled_by: Option<Uuid>,
}

impl Reservation {
    /// Create a new pending reservation
    pub fn new(
        club_id: Uuid,
        member_id: Uuid,
        date: NaiveDate,
        start_hour: u32,
        duration_hours: u32,
        roster: Vec<RosterEntry>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            club_id,
            member_id,
            date,
            start_hour,
            duration_hours,
            roster,
            status: ReservationStatus::Pending,
            total_fee: Decimal::ZERO,
            fee_override: None,
            payment_status: PaymentStatus::Waived,
            notes: None,
            created_by: Some(member_id),
            created_at: now,
            updated_at: now,
            cancelled_at: None,
            cancelled_by: None,
        }
    }

    /// Exclusive end hour
    #[inline]
    pub fn end_hour(&self) -> u32 {
        self.start_hour + self.duration_hours
    }

    #[inline]
    pub fn slot(&self) -> Slot {
        Slot::new(self.start_hour, self.duration_hours)
    }

    /// Club-local start of play
    pub fn starts_at(&self) -> NaiveDateTime {
        let time = NaiveTime::from_hms_opt(self.start_hour, 0, 0).unwrap_or(NaiveTime::MIN);
        self.date.and_time(time)
    }
}

impl Default for Reservation {
    fn default() -> Self {
        Reservation::new(
            Uuid::nil(),
            Uuid::nil(),
            NaiveDate::default(),
            0,
            1,
            Vec::new(),
        )
    }
}
