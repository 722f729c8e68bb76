//! Cache key builders for ClubCourt
//!
//! # Key Patterns
//!
//! - `club_settings:{club_id}` - Settings snapshot of a club
//!
//! # Example
//!
//! ```
//! use clubcourt_cache::keys;
//! use uuid::Uuid;
//!
//! let key = keys::club_settings_key(Uuid::nil());
//! assert_eq!(key, "club_settings:00000000-0000-0000-0000-000000000000");
//! ```

use std::fmt::Display;

/// Prefix for cached club settings
///
/// Format: `club_settings:{club_id}`
pub const CLUB_SETTINGS_PREFIX: &str = "club_settings";

/// Default TTL for club settings (5 minutes)
pub const SETTINGS_TTL_SECS: u64 = 300;

/// Build the cache key of a club's settings
pub fn club_settings_key(club_id: impl Display) -> String {
    format!("{}:{}", CLUB_SETTINGS_PREFIX, club_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_club_settings_key() {
        assert_eq!(club_settings_key("abc"), "club_settings:abc");
        assert_eq!(SETTINGS_TTL_SECS, 300);
    }
}
