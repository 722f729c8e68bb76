//! Club settings DTOs

use clubcourt_core::models::ClubSettings;
use serde::Deserialize;
use uuid::Uuid;

/// Replace the settings of a club
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateSettingsRequest {
    #[serde(flatten)]
    pub settings: ClubSettings,

    pub actor_id: Option<Uuid>,
}
