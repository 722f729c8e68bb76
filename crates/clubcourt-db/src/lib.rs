//! ClubCourt Database Layer
//!
//! This crate provides PostgreSQL access and repository implementations for
//! the ClubCourt system. It includes:
//!
//! - Connection pool management and embedded migrations
//! - Club settings storage (JSONB snapshots)
//! - Court reservations guarded by a unique index and an exclusion constraint
//! - The credit ledger, applied under a row lock on the membership

pub mod pool;
pub mod repositories;

pub use pool::{create_pool, run_migrations};
pub use repositories::*;

// Re-export commonly used types
pub use clubcourt_core::{AppError, AppResult};
pub use sqlx::{PgPool, Postgres, Transaction};
