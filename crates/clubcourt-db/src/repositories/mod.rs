//! Repository implementations
//!
//! Concrete implementations of the repository traits defined in
//! clubcourt-core, using sqlx for PostgreSQL access.

pub mod ledger_repo;
pub mod reservation_repo;
pub mod settings_repo;

pub use ledger_repo::PgCreditLedgerRepository;
pub use reservation_repo::PgReservationRepository;
pub use settings_repo::PgSettingsRepository;

use clubcourt_core::AppError;
use tracing::error;

/// Map a sqlx error with context
pub(crate) fn db_error(context: &str, e: sqlx::Error) -> AppError {
    error!("Database error {}: {}", context, e);
    AppError::Database(format!("Failed to {}: {}", context, e))
}
