//! ClubCourt Core Library
//!
//! This crate provides the foundational types, pure algorithms, traits, and
//! error handling for the ClubCourt court reservation system. It includes:
//!
//! - Domain models (club settings, reservations, credit transactions)
//! - The pricing engine and slot scheduling rules
//! - The ledger posting planner shared by every store implementation
//! - Repository and collaborator traits
//! - Unified error handling with HTTP response mapping
//! - Application configuration
//!
//! Nothing in here touches a database or a network socket.

pub mod config;
pub mod error;
pub mod ledger;
pub mod models;
pub mod pricing;
pub mod scheduling;
pub mod traits;

pub use config::AppConfig;
pub use error::AppError;

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;
