//! API layer for ClubCourt
//!
//! HTTP handlers for court bookings, member credit and club settings.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod dto;
pub mod handlers;
pub mod state;

// Re-export DTOs (common types)
pub use dto::{ApiResponse, PaginationParams};

pub use handlers::{configure_credit, configure_reservations, configure_settings};
pub use state::AppState;

use actix_web::web;

/// Mount every ClubCourt route on a service config
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.configure(configure_settings)
        .configure(configure_reservations)
        .configure(configure_credit);
}
