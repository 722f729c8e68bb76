//! HTTP request handlers

pub mod credit;
pub mod reservation;
pub mod settings;

pub use credit::configure as configure_credit;
pub use reservation::configure as configure_reservations;
pub use settings::configure as configure_settings;
