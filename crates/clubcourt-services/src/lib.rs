//! Business logic services for ClubCourt
//!
//! This crate orchestrates court bookings and member credit on top of the
//! storage and cache traits defined in clubcourt-core.
//!
//! # Architecture
//!
//! Services are designed to be composable and testable:
//! - Each service is generic over the repositories it drives
//! - Services are wrapped in Arc for safe sharing across async tasks
//! - All operations are instrumented with tracing
//! - Every failure is reported as an `AppError`
//!
//! # Services
//!
//! - `SettingsProvider` - Cached per-club settings with store fallback
//! - `SlotScheduler` - Availability checks and slot reservation
//! - `CreditLedger` - Deposits, adjustments, memberships and reconciliation
//! - `ReservationLifecycle` - Booking, cancellation, rescheduling and refunds

pub mod credit_ledger;
pub mod lifecycle;
pub mod ranking;
pub mod scheduler;
pub mod settings_provider;

#[cfg(test)]
pub(crate) mod testing;

pub use credit_ledger::CreditLedger;
pub use lifecycle::{BookingRequest, ReservationLifecycle};
pub use ranking::LoggingRankingSink;
pub use scheduler::SlotScheduler;
pub use settings_provider::SettingsProvider;

/// Business logic constants
pub mod constants {
    /// Settings cache TTL in seconds (5 minutes)
    pub const SETTINGS_CACHE_TTL: u64 = clubcourt_cache::keys::SETTINGS_TTL_SECS;

    /// Default page size for member histories
    pub const DEFAULT_PAGE_SIZE: i64 = 50;
}
