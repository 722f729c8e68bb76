//! Shared application state

use clubcourt_cache::CacheBackend;
use clubcourt_core::AppConfig;
use clubcourt_db::{PgCreditLedgerRepository, PgPool, PgReservationRepository, PgSettingsRepository};
use clubcourt_services::{CreditLedger, ReservationLifecycle, SettingsProvider};
use std::sync::Arc;

pub type Settings = SettingsProvider<PgSettingsRepository, CacheBackend>;
pub type Lifecycle = ReservationLifecycle<PgReservationRepository, PgSettingsRepository, CacheBackend>;
pub type Ledger = CreditLedger<PgCreditLedgerRepository>;

/// Services shared by every worker
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub lifecycle: Arc<Lifecycle>,
    pub ledger: Arc<Ledger>,
}

impl AppState {
    /// Wire the Postgres repositories and the cache into the services
    pub fn new(pool: PgPool, cache: CacheBackend, config: &AppConfig) -> Self {
        let settings = Arc::new(
            SettingsProvider::new(
                Arc::new(PgSettingsRepository::new(pool.clone())),
                Arc::new(cache),
            )
            .with_ttl(config.settings.cache_ttl_secs)
            .with_fallback_to_default(config.settings.fallback_to_default),
        );

        let lifecycle = Arc::new(ReservationLifecycle::new(
            Arc::new(PgReservationRepository::new(pool.clone())),
            settings.clone(),
        ));

        let ledger = Arc::new(
            CreditLedger::new(Arc::new(PgCreditLedgerRepository::new(pool)))
                .with_admin_overdraft(config.ledger.allow_admin_overdraft),
        );

        Self {
            settings,
            lifecycle,
            ledger,
        }
    }
}
