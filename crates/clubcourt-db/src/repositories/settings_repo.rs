//! Club settings repository implementation
//!
//! Settings are stored as one JSONB snapshot per club and replaced wholesale.

use async_trait::async_trait;
use clubcourt_core::{models::ClubSettings, traits::SettingsRepository, AppResult};
use sqlx::types::Json;
use sqlx::PgPool;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use super::db_error;

/// PostgreSQL implementation of SettingsRepository
pub struct PgSettingsRepository {
    pool: PgPool,
}

impl PgSettingsRepository {
    /// Create a new settings repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SettingsRepository for PgSettingsRepository {
    #[instrument(skip(self))]
    async fn find_by_club(&self, club_id: Uuid) -> AppResult<Option<ClubSettings>> {
        debug!("Loading settings for club {}", club_id);

        let row: Option<(Json<ClubSettings>,)> =
            sqlx::query_as("SELECT settings FROM club_settings WHERE club_id = $1")
                .bind(club_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| db_error("load club settings", e))?;

        Ok(row.map(|(Json(settings),)| settings))
    }

    #[instrument(skip(self, settings))]
    async fn upsert(
        &self,
        club_id: Uuid,
        settings: &ClubSettings,
        actor: Option<Uuid>,
    ) -> AppResult<ClubSettings> {
        let (Json(stored),): (Json<ClubSettings>,) = sqlx::query_as(
            r#"
            INSERT INTO club_settings (club_id, settings, updated_by)
            VALUES ($1, $2, $3)
            ON CONFLICT (club_id) DO UPDATE
            SET settings = EXCLUDED.settings,
                updated_by = EXCLUDED.updated_by,
                updated_at = NOW()
            RETURNING settings
            "#,
        )
        .bind(club_id)
        .bind(Json(settings))
        .bind(actor)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_error("store club settings", e))?;

        info!("Settings updated for club {}", club_id);
        Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clubcourt_core::models::PricingModel;

    #[tokio::test]
    #[ignore] // Requires database
    async fn test_upsert_and_load() {
        let url = std::env::var("DATABASE_URL").unwrap();
        let pool = PgPool::connect(&url).await.unwrap();
        crate::run_migrations(&pool).await.unwrap();
        let repo = PgSettingsRepository::new(pool);
        let club = Uuid::new_v4();

        assert!(repo.find_by_club(club).await.unwrap().is_none());

        let mut settings = ClubSettings::default();
        settings.pricing.model = PricingModel::FixedHourly;
        repo.upsert(club, &settings, None).await.unwrap();

        let loaded = repo.find_by_club(club).await.unwrap().unwrap();
        assert_eq!(loaded, settings);
    }
}
