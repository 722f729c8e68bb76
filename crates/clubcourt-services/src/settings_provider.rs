//! Club settings provider
//!
//! Read path: cache, then store, then the last value seen for the club, then
//! the built-in defaults. The provider's `update` is the only way settings
//! change, and it always invalidates the cached snapshot before returning.

use clubcourt_cache::keys::club_settings_key;
use clubcourt_core::{
    models::ClubSettings,
    traits::{CacheService, SettingsRepository},
    AppError, AppResult,
};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::constants::SETTINGS_CACHE_TTL;

/// Cached access to per-club settings
pub struct SettingsProvider<R: SettingsRepository, C: CacheService> {
    repo: Arc<R>,
    cache: Arc<C>,
    ttl_secs: u64,
    fallback_to_default: bool,
    last_known: RwLock<HashMap<Uuid, ClubSettings>>,
}

impl<R: SettingsRepository, C: CacheService> SettingsProvider<R, C> {
    /// Create a provider with the default cache TTL and default fallback
    pub fn new(repo: Arc<R>, cache: Arc<C>) -> Self {
        Self {
            repo,
            cache,
            ttl_secs: SETTINGS_CACHE_TTL,
            fallback_to_default: true,
            last_known: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_ttl(mut self, ttl_secs: u64) -> Self {
        self.ttl_secs = ttl_secs;
        self
    }

    /// Whether to serve defaults when the store fails and nothing is known
    pub fn with_fallback_to_default(mut self, enabled: bool) -> Self {
        self.fallback_to_default = enabled;
        self
    }

    async fn from_cache(&self, key: &str) -> Option<ClubSettings> {
        match self.cache.get::<ClubSettings>(key).await {
            Ok(found) => found,
            Err(e) => {
                warn!("Settings cache read failed for {}: {}", key, e);
                None
            }
        }
    }

    async fn store_in_cache(&self, key: &str, settings: &ClubSettings) {
        if let Err(e) = self.cache.set(key, settings, self.ttl_secs).await {
            warn!("Failed to cache settings under {}: {}", key, e);
        }
    }

    /// Settings snapshot for a club
    #[instrument(skip(self))]
    pub async fn get(&self, club_id: Uuid) -> AppResult<ClubSettings> {
        let key = club_settings_key(club_id);

        if let Some(settings) = self.from_cache(&key).await {
            debug!("Settings cache HIT for club {}", club_id);
            return Ok(settings);
        }

        debug!("Settings cache MISS for club {}", club_id);

        match self.repo.find_by_club(club_id).await {
            Ok(stored) => {
                let settings = stored.unwrap_or_else(|| {
                    debug!("Club {} has no stored settings, using defaults", club_id);
                    ClubSettings::default()
                });

                self.store_in_cache(&key, &settings).await;
                self.last_known.write().insert(club_id, settings.clone());
                Ok(settings)
            }
            Err(e) => {
                warn!("Settings store unavailable for club {}: {}", club_id, e);

                if let Some(settings) = self.last_known.read().get(&club_id).cloned() {
                    warn!("Serving last known settings for club {}", club_id);
                    return Ok(settings);
                }

                if self.fallback_to_default {
                    warn!("Serving default settings for club {}", club_id);
                    Ok(ClubSettings::default())
                } else {
                    Err(AppError::SettingsUnavailable(club_id))
                }
            }
        }
    }

    /// Drop the cached snapshot of a club
    #[instrument(skip(self))]
    pub async fn invalidate(&self, club_id: Uuid) -> AppResult<bool> {
        let removed = self.cache.delete(&club_settings_key(club_id)).await?;
        debug!("Invalidated settings cache for club {} ({})", club_id, removed);
        Ok(removed)
    }

    /// Validate, persist and invalidate
    ///
    /// An invalidation failure is returned to the caller even though the new
    /// settings are already stored.
    #[instrument(skip(self, settings))]
    pub async fn update(
        &self,
        club_id: Uuid,
        settings: ClubSettings,
        actor: Option<Uuid>,
    ) -> AppResult<ClubSettings> {
        settings.validate()?;

        let stored = self.repo.upsert(club_id, &settings, actor).await?;
        self.last_known.write().insert(club_id, stored.clone());

        self.invalidate(club_id).await.map_err(|e| {
            error!(
                "Settings for club {} stored but cache invalidation failed: {}",
                club_id, e
            );
            e
        })?;

        info!("Settings updated for club {}", club_id);
        Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryStore;
    use clubcourt_cache::LocalCache;
    use clubcourt_core::models::{OperatingHours, PricingModel};
    use rust_decimal_macros::dec;

    fn provider(store: &Arc<MemoryStore>) -> SettingsProvider<MemoryStore, LocalCache> {
        SettingsProvider::new(store.clone(), Arc::new(LocalCache::new()))
    }

    #[tokio::test]
    async fn test_unconfigured_club_gets_defaults() {
        let store = Arc::new(MemoryStore::new());
        let settings = provider(&store).get(Uuid::new_v4()).await.unwrap();

        assert_eq!(settings, ClubSettings::default());
        assert_eq!(settings.operating_hours, OperatingHours { start: 6, end: 22 });
        assert_eq!(settings.pricing.peak_hour_fee, dec!(400));
    }

    #[tokio::test]
    async fn test_update_invalidates_cache() {
        let store = Arc::new(MemoryStore::new());
        let provider = provider(&store);
        let club = Uuid::new_v4();

        // Prime the cache with the defaults
        provider.get(club).await.unwrap();

        let mut settings = ClubSettings::default();
        settings.pricing.model = PricingModel::FixedDaily;
        provider.update(club, settings.clone(), None).await.unwrap();

        assert_eq!(provider.get(club).await.unwrap(), settings);
    }

    #[tokio::test]
    async fn test_update_rejects_invalid_settings() {
        let store = Arc::new(MemoryStore::new());
        let provider = provider(&store);
        let club = Uuid::new_v4();

        let mut settings = ClubSettings::default();
        settings.operating_hours = OperatingHours { start: 20, end: 8 };

        assert!(matches!(
            provider.update(club, settings, None).await,
            Err(AppError::Validation(_))
        ));
        assert!(store.stored_settings(club).is_none());
    }

    #[tokio::test]
    async fn test_store_failure_serves_last_known() {
        let store = Arc::new(MemoryStore::new());
        let club = Uuid::new_v4();
        let mut settings = ClubSettings::default();
        settings.pricing.guest_fee = dec!(99);
        store.put_settings(club, settings.clone());

        // Zero TTL so every read goes to the store
        let provider = provider(&store).with_ttl(0);
        assert_eq!(provider.get(club).await.unwrap(), settings);

        store.fail_settings_reads(true);
        assert_eq!(provider.get(club).await.unwrap(), settings);
    }

    #[tokio::test]
    async fn test_store_failure_without_history() {
        let store = Arc::new(MemoryStore::new());
        store.fail_settings_reads(true);

        let lenient = provider(&store);
        assert_eq!(
            lenient.get(Uuid::new_v4()).await.unwrap(),
            ClubSettings::default()
        );

        let strict = provider(&store).with_fallback_to_default(false);
        assert!(matches!(
            strict.get(Uuid::new_v4()).await,
            Err(AppError::SettingsUnavailable(_))
        ));
    }
}
