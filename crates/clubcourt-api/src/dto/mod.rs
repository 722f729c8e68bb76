//! Data Transfer Objects (DTOs) for API requests and responses

pub mod common;
pub mod credit;
pub mod reservation;
pub mod settings;

pub use common::*;
pub use credit::*;
pub use reservation::*;
pub use settings::*;
