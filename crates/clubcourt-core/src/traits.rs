//! Common traits for repositories and collaborators
//!
//! Defines the storage seams of the scheduler and the ledger. Implementations
//! must apply every multi-row write atomically.

use crate::error::AppError;
use crate::ledger::RefundWindow;
use crate::models::{
    BookingOutcome, ClubSettings, CreditTransaction, Membership, PaymentStatus, PostingRequest,
    Reconciliation, Reservation, ReservationStatus, TransactionStatus,
};
use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use uuid::Uuid;

/// Club settings storage
#[async_trait]
pub trait SettingsRepository: Send + Sync {
    /// Load the stored settings of a club, `None` if never configured
    async fn find_by_club(&self, club_id: Uuid) -> Result<Option<ClubSettings>, AppError>;

    /// Insert or replace the settings of a club
    async fn upsert(
        &self,
        club_id: Uuid,
        settings: &ClubSettings,
        actor: Option<Uuid>,
    ) -> Result<ClubSettings, AppError>;
}

/// Move of a reservation to a new slot, applied with its fee delta
#[derive(Debug, Clone)]
pub struct RescheduleChange {
    pub id: Uuid,
    /// Status the reservation must still have
    pub expected_status: ReservationStatus,
    pub date: NaiveDate,
    pub start_hour: u32,
    pub duration_hours: u32,
    pub total_fee: Decimal,
    pub payment_status: PaymentStatus,
    pub actor: Option<Uuid>,
}

/// Reservation storage
///
/// Inserts and moves are guarded by storage-level exclusivity: an active
/// reservation overlapping another active one of the same club and date is
/// rejected with `AppError::SlotConflict`.
#[async_trait]
pub trait ReservationRepository: Send + Sync {
    /// Find reservation by ID
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Reservation>, AppError>;

    /// Active (pending, confirmed, blocked) reservations of a club on a date
    async fn find_active_on(
        &self,
        club_id: Uuid,
        date: NaiveDate,
    ) -> Result<Vec<Reservation>, AppError>;

    /// Reservations made by a member, newest date first
    async fn list_for_member(
        &self,
        member_id: Uuid,
        club_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Reservation>, i64), AppError>;

    /// Insert a reservation together with its deduction
    async fn insert(
        &self,
        reservation: &Reservation,
        charge: Option<&PostingRequest>,
    ) -> Result<BookingOutcome, AppError>;

    /// Compare-and-set the status, posting `refund` in the same unit of work
    ///
    /// Fails with `AlreadyTerminal` or `InvalidTransition` when the current
    /// status is no longer `expected`.
    async fn update_status(
        &self,
        id: Uuid,
        expected: ReservationStatus,
        to: ReservationStatus,
        actor: Option<Uuid>,
        refund: Option<&PostingRequest>,
    ) -> Result<(Reservation, Option<CreditTransaction>), AppError>;

    /// Move a reservation and post its fee delta atomically
    async fn reschedule(
        &self,
        change: &RescheduleChange,
        posting: Option<&PostingRequest>,
    ) -> Result<(Reservation, Option<CreditTransaction>), AppError>;

    /// Post a refund against a reservation and update its payment status
    async fn apply_refund(
        &self,
        id: Uuid,
        refund: &PostingRequest,
    ) -> Result<(Reservation, CreditTransaction), AppError>;

    /// What the reserver has been charged and refunded against a reservation
    async fn refund_window(&self, id: Uuid) -> Result<RefundWindow, AppError>;
}

/// Credit ledger storage
///
/// Every balance-changing call locks the membership, plans the posting with
/// `crate::ledger` and writes the transaction and the new balance together.
#[async_trait]
pub trait CreditLedgerRepository: Send + Sync {
    /// Open a membership, posting the initial credit as an opening deposit
    async fn open_membership(
        &self,
        member_id: Uuid,
        club_id: Uuid,
        initial_credit: Decimal,
        actor: Option<Uuid>,
    ) -> Result<(Membership, Option<CreditTransaction>), AppError>;

    /// Find a membership
    async fn find_membership(
        &self,
        member_id: Uuid,
        club_id: Uuid,
    ) -> Result<Option<Membership>, AppError>;

    /// Apply a posting immediately
    async fn post(&self, request: &PostingRequest) -> Result<CreditTransaction, AppError>;

    /// Create a pending deposit without touching the balance
    async fn create_pending(&self, request: &PostingRequest)
        -> Result<CreditTransaction, AppError>;

    /// Settle a pending transaction as recorded or failed
    async fn settle_pending(
        &self,
        transaction_id: Uuid,
        to: TransactionStatus,
        actor: Option<Uuid>,
    ) -> Result<CreditTransaction, AppError>;

    /// Find transaction by ID
    async fn find_transaction(&self, id: Uuid) -> Result<Option<CreditTransaction>, AppError>;

    /// Transactions of a member, newest first
    async fn list_for_member(
        &self,
        member_id: Uuid,
        club_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<CreditTransaction>, i64), AppError>;

    /// Compare the cached balance with the ledger sum
    async fn reconcile(&self, member_id: Uuid, club_id: Uuid)
        -> Result<Reconciliation, AppError>;
}

/// Result of a played match
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MatchOutcome {
    #[serde(default)]
    pub winners: Vec<Uuid>,
    #[serde(default)]
    pub losers: Vec<Uuid>,
    pub score: Option<String>,
}

/// Receiver of match results for club rankings
#[async_trait]
pub trait RankingSink: Send + Sync {
    async fn record_result(
        &self,
        reservation: &Reservation,
        outcome: &MatchOutcome,
    ) -> Result<(), AppError>;
}

/// Cache service trait
#[async_trait]
pub trait CacheService: Send + Sync {
    /// Get value from cache
    async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, AppError>;

    /// Set value in cache with TTL
    async fn set<T: Serialize + Send + Sync>(
        &self,
        key: &str,
        value: &T,
        ttl_secs: u64,
    ) -> Result<(), AppError>;

    /// Delete value from cache
    async fn delete(&self, key: &str) -> Result<bool, AppError>;

    /// Check if key exists
    async fn exists(&self, key: &str) -> Result<bool, AppError>;
}

/// Pagination parameters
#[derive(Debug, Clone, Default)]
pub struct Pagination {
    pub page: i64,
    pub per_page: i64,
}

impl Pagination {
    pub fn new(page: i64, per_page: i64) -> Self {
        Self {
            page: page.max(1),
            per_page: per_page.clamp(1, 500),
        }
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.per_page
    }

    pub fn limit(&self) -> i64 {
        self.per_page
    }
}

/// Paginated response wrapper
#[derive(Debug, Clone, Serialize)]
pub struct PaginatedResponse<T> {
    pub data: Vec<T>,
    pub pagination: PaginationMeta,
}

impl<T> PaginatedResponse<T> {
    pub fn new(data: Vec<T>, total: i64, pagination: &Pagination) -> Self {
        Self {
            data,
            pagination: PaginationMeta::new(total, pagination.page, pagination.per_page),
        }
    }
}

/// Pagination metadata
#[derive(Debug, Clone, Serialize)]
pub struct PaginationMeta {
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
    pub total_pages: i64,
}

impl PaginationMeta {
    pub fn new(total: i64, page: i64, per_page: i64) -> Self {
        let total_pages = if per_page > 0 {
            (total + per_page - 1) / per_page
        } else {
            0
        };

        Self {
            total,
            page,
            per_page,
            total_pages,
        }
    }
}
