//! Unified error handling for ClubCourt
//!
//! This module provides a single error type covering every failure the
//! scheduler and ledger can report, with automatic HTTP response mapping.

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use chrono::NaiveDate;
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

use crate::models::ReservationStatus;

/// Main application error type
///
/// All errors in the application should be converted to this type.
/// It implements `ResponseError` for automatic HTTP response generation.
#[derive(Error, Debug)]
pub enum AppError {
    // ==================== Database Errors ====================
    #[error("Database error: {0}")]
    Database(String),

    #[error("Database pool error: {0}")]
    Pool(String),

    #[error("Transaction failed: {0}")]
    Transaction(String),

    // ==================== Cache Errors ====================
    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Cache connection failed: {0}")]
    CacheConnection(String),

    // ==================== Scheduling Errors ====================
    #[error("Requested hours {start}:00-{end}:00 are outside operating hours {open}:00-{close}:00")]
    OutOfHours { start: u32, end: u32, open: u32, close: u32 },

    #[error("Slot {start}:00-{end}:00 on {date} was just taken")]
    SlotConflict { date: NaiveDate, start: u32, end: u32 },

    #[error("Reservation not found: {0}")]
    ReservationNotFound(Uuid),

    #[error("Reservation {id} is already {status}")]
    AlreadyTerminal { id: Uuid, status: ReservationStatus },

    #[error("Cannot move reservation from {from} to {to}")]
    InvalidTransition {
        from: ReservationStatus,
        to: ReservationStatus,
    },

    // ==================== Ledger Errors ====================
    #[error("Insufficient credit: required {required}, available {available}")]
    InsufficientCredit { required: String, available: String },

    #[error("Transaction state error: {0}")]
    TransactionState(String),

    #[error("Credit transaction not found: {0}")]
    TransactionNotFound(Uuid),

    #[error("No membership for member {member_id} in club {club_id}")]
    MembershipNotFound { member_id: Uuid, club_id: Uuid },

    // ==================== Settings Errors ====================
    #[error("Settings unavailable for club {0}")]
    SettingsUnavailable(Uuid),

    // ==================== Validation Errors ====================
    #[error("Validation error: {0}")]
    Validation(String),

    // ==================== Resource Errors ====================
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    // ==================== Internal Errors ====================
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl AppError {
    /// Returns the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 400 Bad Request
            AppError::Validation(_) => StatusCode::BAD_REQUEST,

            // 402 Payment Required
            AppError::InsufficientCredit { .. } => StatusCode::PAYMENT_REQUIRED,

            // 404 Not Found
            AppError::ReservationNotFound(_)
            | AppError::TransactionNotFound(_)
            | AppError::MembershipNotFound { .. } => StatusCode::NOT_FOUND,

            // 409 Conflict
            AppError::SlotConflict { .. }
            | AppError::AlreadyTerminal { .. }
            | AppError::InvalidTransition { .. }
            | AppError::TransactionState(_)
            | AppError::AlreadyExists(_) => StatusCode::CONFLICT,

            // 422 Unprocessable Entity
            AppError::OutOfHours { .. } => StatusCode::UNPROCESSABLE_ENTITY,

            // 503 Service Unavailable
            AppError::SettingsUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,

            // 500 Internal Server Error
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns the error code for API responses
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::Database(_) => "database_error",
            AppError::Pool(_) => "pool_error",
            AppError::Transaction(_) => "transaction_error",
            AppError::Cache(_) => "cache_error",
            AppError::CacheConnection(_) => "cache_connection_error",
            AppError::OutOfHours { .. } => "out_of_hours",
            AppError::SlotConflict { .. } => "slot_conflict",
            AppError::ReservationNotFound(_) => "reservation_not_found",
            AppError::AlreadyTerminal { .. } => "already_terminal",
            AppError::InvalidTransition { .. } => "invalid_transition",
            AppError::InsufficientCredit { .. } => "insufficient_credit",
            AppError::TransactionState(_) => "transaction_state",
            AppError::TransactionNotFound(_) => "transaction_not_found",
            AppError::MembershipNotFound { .. } => "membership_not_found",
            AppError::SettingsUnavailable(_) => "settings_unavailable",
            AppError::Validation(_) => "validation_error",
            AppError::AlreadyExists(_) => "already_exists",
            AppError::Config(_) => "config_error",
            AppError::Serialization(_) => "serialization_error",
        }
    }

    /// Whether the caller may retry the same request and reasonably expect a
    /// different outcome. Only a lost slot race qualifies.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::SlotConflict { .. })
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        AppError::status_code(self)
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        let body = json!({
            "error": self.error_code(),
            "message": self.to_string(),
            "status": status.as_u16(),
            "retryable": self.is_retryable(),
        });

        HttpResponse::build(status).json(body)
    }
}

// ==================== From implementations ====================

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::Validation(err.to_string())
    }
}
