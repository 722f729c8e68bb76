//! Court reservation repository implementation
//!
//! Slot exclusivity is enforced by the schema: a partial unique index on the
//! start hour and a GiST exclusion constraint on the hour range of active
//! reservations. Violations of either surface as `AppError::SlotConflict`.
//! Ledger side effects are posted through the same database transaction as
//! the reservation write.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use clubcourt_core::{
    ledger::RefundWindow,
    models::{
        BookingOutcome, CreditTransaction, PaymentStatus, PostingRequest, Reservation,
        ReservationStatus, RosterEntry,
    },
    scheduling,
    traits::{ReservationRepository, RescheduleChange},
    AppError, AppResult,
};
use rust_decimal::Decimal;
use sqlx::types::Json;
use sqlx::{PgConnection, PgPool};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use super::db_error;
use super::ledger_repo::{post_in_tx, reservation_refund_window};

const RESERVATION_COLUMNS: &str = r#"
    id, club_id, member_id, reservation_date, start_hour, duration_hours, roster,
    status, total_fee, fee_override, payment_status, notes, created_by, created_at,
    updated_at, cancelled_at, cancelled_by
"#;

/// Prefix shared by the slot constraints of `court_reservations`
const SLOT_CONSTRAINT_PREFIX: &str = "court_reservations_";

/// PostgreSQL implementation of ReservationRepository
pub struct PgReservationRepository {
    pool: PgPool,
}

impl PgReservationRepository {
    /// Create a new reservation repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Parse reservation status from string
    fn parse_status(s: &str) -> ReservationStatus {
        ReservationStatus::from_str(s).unwrap_or(ReservationStatus::Cancelled)
    }

    /// Parse payment status from string
    fn parse_payment_status(s: &str) -> PaymentStatus {
        PaymentStatus::from_str(s).unwrap_or(PaymentStatus::Waived)
    }
}

/// Whether a database error is a slot-constraint violation
fn is_slot_violation(e: &sqlx::Error) -> bool {
    match e {
        sqlx::Error::Database(db) => {
            matches!(db.code().as_deref(), Some("23505" | "23P01"))
                && db
                    .constraint()
                    .map(|c| c.starts_with(SLOT_CONSTRAINT_PREFIX))
                    .unwrap_or(false)
        }
        _ => false,
    }
}

/// Translate slot-constraint violations into `SlotConflict`
fn map_slot_error(e: sqlx::Error, context: &str, date: NaiveDate, start: u32, end: u32) -> AppError {
    if is_slot_violation(&e) {
        warn!(
            "Storage rejected overlapping reservation {} {}:00-{}:00: {}",
            date, start, end, e
        );
        AppError::SlotConflict { date, start, end }
    } else {
        db_error(context, e)
    }
}

async fn fetch_reservation(conn: &mut PgConnection, id: Uuid) -> AppResult<Option<Reservation>> {
    let query = format!(
        "SELECT {} FROM court_reservations WHERE id = $1",
        RESERVATION_COLUMNS
    );
    let row = sqlx::query_as::<sqlx::Postgres, ReservationRow>(&query)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| db_error("find reservation", e))?;

    Ok(row.map(Into::into))
}

/// Explain why a compare-and-set on the status matched no row
async fn status_mismatch(conn: &mut PgConnection, id: Uuid, to: ReservationStatus) -> AppError {
    match fetch_reservation(conn, id).await {
        Ok(None) => AppError::ReservationNotFound(id),
        Ok(Some(current)) => {
            warn!(
                "Reservation {} is {} and cannot move to {}",
                id, current.status, to
            );
            match scheduling::check_transition(&current, to) {
                Err(e) => e,
                Ok(()) => AppError::InvalidTransition {
                    from: current.status,
                    to,
                },
            }
        }
        Err(e) => e,
    }
}

/// Re-read a reservation after a posting synced its payment status
async fn reload(conn: &mut PgConnection, id: Uuid) -> AppResult<Reservation> {
    fetch_reservation(conn, id)
        .await?
        .ok_or(AppError::ReservationNotFound(id))
}

#[async_trait]
impl ReservationRepository for PgReservationRepository {
    #[instrument(skip(self))]
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<Reservation>> {
        debug!("Finding reservation by id: {}", id);

        let query = format!(
            "SELECT {} FROM court_reservations WHERE id = $1",
            RESERVATION_COLUMNS
        );
        let row = sqlx::query_as::<sqlx::Postgres, ReservationRow>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("find reservation", e))?;

        Ok(row.map(Into::into))
    }

    #[instrument(skip(self))]
    async fn find_active_on(&self, club_id: Uuid, date: NaiveDate) -> AppResult<Vec<Reservation>> {
        let query = format!(
            r#"
            SELECT {}
            FROM court_reservations
            WHERE club_id = $1
              AND reservation_date = $2
              AND status IN ('pending', 'confirmed', 'blocked')
            ORDER BY start_hour
            "#,
            RESERVATION_COLUMNS
        );
        let rows = sqlx::query_as::<sqlx::Postgres, ReservationRow>(&query)
            .bind(club_id)
            .bind(date)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_error("list active reservations", e))?;

        debug!(
            "Found {} active reservations for club {} on {}",
            rows.len(),
            club_id,
            date
        );

        Ok(rows.into_iter().map(Into::into).collect())
    }

    #[instrument(skip(self))]
    async fn list_for_member(
        &self,
        member_id: Uuid,
        club_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> AppResult<(Vec<Reservation>, i64)> {
        let total: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM court_reservations WHERE member_id = $1 AND club_id = $2",
        )
        .bind(member_id)
        .bind(club_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_error("count member reservations", e))?;

        let query = format!(
            r#"
            SELECT {}
            FROM court_reservations
            WHERE member_id = $1 AND club_id = $2
            ORDER BY reservation_date DESC, start_hour DESC
            LIMIT $3 OFFSET $4
            "#,
            RESERVATION_COLUMNS
        );
        let rows = sqlx::query_as::<sqlx::Postgres, ReservationRow>(&query)
            .bind(member_id)
            .bind(club_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_error("list member reservations", e))?;

        Ok((rows.into_iter().map(Into::into).collect(), total.0))
    }

    #[instrument(skip(self, reservation, charge), fields(id = %reservation.id))]
    async fn insert(
        &self,
        reservation: &Reservation,
        charge: Option<&PostingRequest>,
    ) -> AppResult<BookingOutcome> {
        let (date, start, end) = (reservation.date, reservation.start_hour, reservation.end_hour());

        let mut tx = self.pool.begin().await.map_err(|e| {
            error!("Failed to start transaction: {}", e);
            AppError::Transaction(format!("Failed to start transaction: {}", e))
        })?;

        let query = format!(
            r#"
            INSERT INTO court_reservations (
                id, club_id, member_id, reservation_date, start_hour, duration_hours, roster,
                status, total_fee, fee_override, payment_status, notes, created_by,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            RETURNING {}
            "#,
            RESERVATION_COLUMNS
        );
        let stored: Reservation = sqlx::query_as::<sqlx::Postgres, ReservationRow>(&query)
            .bind(reservation.id)
            .bind(reservation.club_id)
            .bind(reservation.member_id)
            .bind(reservation.date)
            .bind(reservation.start_hour as i32)
            .bind(reservation.duration_hours as i32)
            .bind(Json(&reservation.roster))
            .bind(reservation.status.as_str())
            .bind(reservation.total_fee)
            .bind(reservation.fee_override)
            .bind(reservation.payment_status.to_string())
            .bind(&reservation.notes)
            .bind(reservation.created_by)
            .bind(reservation.created_at)
            .bind(reservation.updated_at)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| map_slot_error(e, "create reservation", date, start, end))?
            .into();

        let transaction = match charge {
            Some(posting) => Some(post_in_tx(&mut tx, posting).await?),
            None => None,
        };

        tx.commit().await.map_err(|e| {
            error!("Failed to commit transaction: {}", e);
            if is_slot_violation(&e) {
                AppError::SlotConflict { date, start, end }
            } else {
                AppError::Transaction(format!("Failed to commit transaction: {}", e))
            }
        })?;

        info!(
            "Created reservation {} for club {} on {} {}:00-{}:00 (fee {})",
            stored.id, stored.club_id, date, start, end, stored.total_fee
        );

        Ok(BookingOutcome {
            reservation: stored,
            transaction,
        })
    }

    #[instrument(skip(self, refund))]
    async fn update_status(
        &self,
        id: Uuid,
        expected: ReservationStatus,
        to: ReservationStatus,
        actor: Option<Uuid>,
        refund: Option<&PostingRequest>,
    ) -> AppResult<(Reservation, Option<CreditTransaction>)> {
        let mut tx = self.pool.begin().await.map_err(|e| {
            error!("Failed to start transaction: {}", e);
            AppError::Transaction(format!("Failed to start transaction: {}", e))
        })?;

        let query = format!(
            r#"
            UPDATE court_reservations
            SET status = $3,
                updated_at = NOW(),
                cancelled_at = CASE WHEN $3 = 'cancelled' THEN NOW() ELSE cancelled_at END,
                cancelled_by = CASE WHEN $3 = 'cancelled' THEN $4 ELSE cancelled_by END
            WHERE id = $1 AND status = $2
            RETURNING {}
            "#,
            RESERVATION_COLUMNS
        );
        let updated = sqlx::query_as::<sqlx::Postgres, ReservationRow>(&query)
            .bind(id)
            .bind(expected.as_str())
            .bind(to.as_str())
            .bind(actor)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| db_error("update reservation status", e))?;

        let mut reservation: Reservation = match updated {
            Some(row) => row.into(),
            None => return Err(status_mismatch(&mut tx, id, to).await),
        };

        let transaction = match refund {
            Some(posting) => {
                let posted = post_in_tx(&mut tx, posting).await?;
                reservation = reload(&mut tx, id).await?;
                Some(posted)
            }
            None => None,
        };

        tx.commit().await.map_err(|e| {
            error!("Failed to commit transaction: {}", e);
            AppError::Transaction(format!("Failed to commit transaction: {}", e))
        })?;

        info!("Reservation {} moved from {} to {}", id, expected, to);
        Ok((reservation, transaction))
    }

    #[instrument(skip(self, change, posting), fields(id = %change.id))]
    async fn reschedule(
        &self,
        change: &RescheduleChange,
        posting: Option<&PostingRequest>,
    ) -> AppResult<(Reservation, Option<CreditTransaction>)> {
        let (date, start) = (change.date, change.start_hour);
        let end = start + change.duration_hours;

        let mut tx = self.pool.begin().await.map_err(|e| {
            error!("Failed to start transaction: {}", e);
            AppError::Transaction(format!("Failed to start transaction: {}", e))
        })?;

        let query = format!(
            r#"
            UPDATE court_reservations
            SET reservation_date = $3,
                start_hour = $4,
                duration_hours = $5,
                total_fee = $6,
                payment_status = $7,
                updated_at = NOW()
            WHERE id = $1 AND status = $2
            RETURNING {}
            "#,
            RESERVATION_COLUMNS
        );
        let updated = sqlx::query_as::<sqlx::Postgres, ReservationRow>(&query)
            .bind(change.id)
            .bind(change.expected_status.as_str())
            .bind(date)
            .bind(start as i32)
            .bind(change.duration_hours as i32)
            .bind(change.total_fee)
            .bind(change.payment_status.to_string())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_slot_error(e, "reschedule reservation", date, start, end))?;

        let mut reservation: Reservation = match updated {
            Some(row) => row.into(),
            None => {
                return Err(status_mismatch(&mut tx, change.id, change.expected_status).await)
            }
        };

        let transaction = match posting {
            Some(posting) => {
                let posted = post_in_tx(&mut tx, posting).await?;
                reservation = reload(&mut tx, change.id).await?;
                Some(posted)
            }
            None => None,
        };

        tx.commit().await.map_err(|e| {
            error!("Failed to commit transaction: {}", e);
            AppError::Transaction(format!("Failed to commit transaction: {}", e))
        })?;

        info!(
            "Reservation {} moved to {} {}:00-{}:00 (fee {})",
            change.id, date, start, end, change.total_fee
        );

        Ok((reservation, transaction))
    }

    #[instrument(skip(self, refund))]
    async fn apply_refund(
        &self,
        id: Uuid,
        refund: &PostingRequest,
    ) -> AppResult<(Reservation, CreditTransaction)> {
        let mut tx = self.pool.begin().await.map_err(|e| {
            error!("Failed to start transaction: {}", e);
            AppError::Transaction(format!("Failed to start transaction: {}", e))
        })?;

        let locked: Option<(Uuid,)> =
            sqlx::query_as("SELECT id FROM court_reservations WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(|e| db_error("lock reservation", e))?;
        if locked.is_none() {
            return Err(AppError::ReservationNotFound(id));
        }

        let posted = post_in_tx(&mut tx, refund).await?;
        let reservation = reload(&mut tx, id).await?;

        tx.commit().await.map_err(|e| {
            error!("Failed to commit transaction: {}", e);
            AppError::Transaction(format!("Failed to commit transaction: {}", e))
        })?;

        info!(
            "Refunded {} on reservation {} (payment {})",
            posted.amount, id, reservation.payment_status
        );

        Ok((reservation, posted))
    }

    #[instrument(skip(self))]
    async fn refund_window(&self, id: Uuid) -> AppResult<RefundWindow> {
        let mut conn = self.pool.acquire().await.map_err(|e| {
            error!("Failed to acquire connection: {}", e);
            AppError::Database(format!("Failed to acquire connection: {}", e))
        })?;

        reservation_refund_window(&mut *conn, id).await
    }
}

/// Helper struct for mapping database rows
#[derive(Debug, sqlx::FromRow)]
struct ReservationRow {
    id: Uuid,
    club_id: Uuid,
    member_id: Uuid,
    reservation_date: NaiveDate,
    start_hour: i32,
    duration_hours: i32,
    roster: Json<Vec<RosterEntry>>,
    status: String,
    total_fee: Decimal,
    fee_override: Option<Decimal>,
    payment_status: String,
    notes: Option<String>,
    created_by: Option<Uuid>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    cancelled_at: Option<DateTime<Utc>>,
    cancelled_by: Option<Uuid>,
}

impl From<ReservationRow> for Reservation {
    fn from(row: ReservationRow) -> Self {
        Self {
            id: row.id,
            club_id: row.club_id,
            member_id: row.member_id,
            date: row.reservation_date,
            // Range enforced by CHECK constraints
            start_hour: row.start_hour.max(0) as u32,
            duration_hours: row.duration_hours.max(0) as u32,
            roster: row.roster.0,
            status: PgReservationRepository::parse_status(&row.status),
            total_fee: row.total_fee,
            fee_override: row.fee_override,
            payment_status: PgReservationRepository::parse_payment_status(&row.payment_status),
            notes: row.notes,
            created_by: row.created_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
            cancelled_at: row.cancelled_at,
            cancelled_by: row.cancelled_by,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::PgCreditLedgerRepository;
    use clubcourt_core::traits::CreditLedgerRepository;
    use rust_decimal_macros::dec;

    #[test]
    fn test_parse_status() {
        assert_eq!(
            PgReservationRepository::parse_status("no_show"),
            ReservationStatus::NoShow
        );
        assert_eq!(
            PgReservationRepository::parse_status("blocked"),
            ReservationStatus::Blocked
        );
        assert_eq!(
            PgReservationRepository::parse_payment_status("partially_refunded"),
            PaymentStatus::PartiallyRefunded
        );
    }

    #[test]
    fn test_non_database_errors_are_not_slot_conflicts() {
        assert!(!is_slot_violation(&sqlx::Error::RowNotFound));

        let date = NaiveDate::from_ymd_opt(2026, 5, 1).unwrap();
        let err = map_slot_error(sqlx::Error::PoolTimedOut, "create reservation", date, 18, 19);
        assert!(matches!(err, AppError::Database(_)));
    }

    async fn pool() -> PgPool {
        let url = std::env::var("DATABASE_URL").unwrap();
        let pool = PgPool::connect(&url).await.unwrap();
        crate::run_migrations(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    #[ignore] // Requires database
    async fn test_concurrent_inserts_one_wins() {
        let pool = pool().await;
        let repo = std::sync::Arc::new(PgReservationRepository::new(pool));
        let club = Uuid::new_v4();
        let date = NaiveDate::from_ymd_opt(2026, 5, 1).unwrap();

        let mut handles = Vec::new();
        for start in [18, 17] {
            let repo = repo.clone();
            handles.push(tokio::spawn(async move {
                let reservation = Reservation::new(club, Uuid::new_v4(), date, start, 2, vec![]);
                repo.insert(&reservation, None).await
            }));
        }

        let mut won = 0;
        let mut conflicts = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => won += 1,
                Err(AppError::SlotConflict { .. }) => conflicts += 1,
                Err(e) => panic!("unexpected error: {}", e),
            }
        }
        assert_eq!((won, conflicts), (1, 1));
    }

    #[tokio::test]
    #[ignore] // Requires database
    async fn test_booking_rolls_back_on_insufficient_credit() {
        let pool = pool().await;
        let ledger = PgCreditLedgerRepository::new(pool.clone());
        let repo = PgReservationRepository::new(pool);
        let (club, member) = (Uuid::new_v4(), Uuid::new_v4());
        ledger.open_membership(member, club, dec!(100), None).await.unwrap();

        let date = NaiveDate::from_ymd_opt(2026, 5, 2).unwrap();
        let mut reservation = Reservation::new(club, member, date, 9, 1, vec![]);
        reservation.total_fee = dec!(300);
        let charge = PostingRequest::deduction(member, club, dec!(300)).for_reservation(&reservation);

        let err = repo.insert(&reservation, Some(&charge)).await.unwrap_err();
        assert!(matches!(err, AppError::InsufficientCredit { .. }));
        assert!(repo.find_by_id(reservation.id).await.unwrap().is_none());
    }

    #[tokio::test]
    #[ignore] // Requires database
    async fn test_ledger_refund_tracks_reservation_payment() {
        use clubcourt_core::models::ReferenceType;

        let pool = pool().await;
        let ledger = PgCreditLedgerRepository::new(pool.clone());
        let repo = PgReservationRepository::new(pool);
        let (club, member, stranger) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        ledger.open_membership(member, club, dec!(1000), None).await.unwrap();
        ledger.open_membership(stranger, club, Decimal::ZERO, None).await.unwrap();

        let date = NaiveDate::from_ymd_opt(2026, 5, 3).unwrap();
        let mut reservation = Reservation::new(club, member, date, 18, 1, vec![]);
        reservation.total_fee = dec!(450);
        reservation.payment_status = PaymentStatus::Paid;
        let charge = PostingRequest::deduction(member, club, dec!(450)).for_reservation(&reservation);
        repo.insert(&reservation, Some(&charge)).await.unwrap();

        let foreign = PostingRequest::refund(stranger, club, dec!(450))
            .with_reference(ReferenceType::Reservation, Some(reservation.id));
        let err = ledger.post(&foreign).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let partial = PostingRequest::refund(member, club, dec!(150)).for_reservation(&reservation);
        ledger.post(&partial).await.unwrap();

        let stored = repo.find_by_id(reservation.id).await.unwrap().unwrap();
        assert_eq!(stored.payment_status, PaymentStatus::PartiallyRefunded);
        let window = repo.refund_window(reservation.id).await.unwrap();
        assert_eq!(window.remaining(), dec!(300));
        assert_eq!(ledger.reconcile(stranger, club).await.unwrap().ledger_balance, Decimal::ZERO);
    }
}
