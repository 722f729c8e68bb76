//! Domain models for ClubCourt
//!
//! Club settings, court reservations and the credit ledger.

pub mod credit;
pub mod reservation;
pub mod settings;

pub use credit::{
    BookingOutcome, CreditTransaction, DepositMethod, Direction, Membership, PostingRequest,
    Reconciliation, ReferenceType, TransactionStatus, TransactionType,
};
pub use reservation::{
    PaymentStatus, Reservation, ReservationStatus, RosterEntry, Slot, MAX_DURATION_HOURS,
};
pub use settings::{
    CancellationPolicy, ClubSettings, OperatingHours, PricingConfig, PricingModel, MAX_HOUR,
};
