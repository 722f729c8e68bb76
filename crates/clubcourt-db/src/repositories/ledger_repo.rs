//! Credit ledger repository implementation
//!
//! Every balance change runs in one database transaction: the membership row
//! is locked with `FOR UPDATE`, the posting is planned against the locked
//! balance, and the transaction row and the new balance are written before
//! commit. The reservation repository reuses [`post_in_tx`] so a booking and
//! its deduction commit together. Postings that reference a reservation must
//! come from its reserver and keep its payment status in step.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use clubcourt_core::{
    ledger::{self, RefundWindow},
    models::{
        CreditTransaction, Direction, Membership, PaymentStatus, PostingRequest, Reconciliation,
        ReferenceType, TransactionStatus, TransactionType,
    },
    traits::CreditLedgerRepository,
    AppError, AppResult,
};
use rust_decimal::Decimal;
use serde_json::Value as JsonValue;
use sqlx::{PgConnection, PgPool};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use super::db_error;

const TRANSACTION_COLUMNS: &str = r#"
    id, member_id, club_id, transaction_type, direction, amount, status,
    balance_before, balance_after, reference_type, reference_id, metadata,
    created_by, recorded_by, created_at, recorded_at
"#;

/// PostgreSQL implementation of CreditLedgerRepository
pub struct PgCreditLedgerRepository {
    pool: PgPool,
}

impl PgCreditLedgerRepository {
    /// Create a new ledger repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Lock the membership row and return its balance
pub(crate) async fn lock_balance(
    conn: &mut PgConnection,
    member_id: Uuid,
    club_id: Uuid,
) -> AppResult<Decimal> {
    let row: Option<(Decimal,)> = sqlx::query_as(
        r#"
        SELECT credit_balance
        FROM memberships
        WHERE member_id = $1 AND club_id = $2
        FOR UPDATE
        "#,
    )
    .bind(member_id)
    .bind(club_id)
    .fetch_optional(&mut *conn)
    .await
    .map_err(|e| db_error("lock membership", e))?;

    row.map(|(balance,)| balance)
        .ok_or(AppError::MembershipNotFound { member_id, club_id })
}

/// Deductions and refunds a member has applied against one reference
async fn refund_window(
    conn: &mut PgConnection,
    reference_type: ReferenceType,
    reference_id: Uuid,
    member_id: Uuid,
    club_id: Uuid,
) -> AppResult<RefundWindow> {
    let (charged, refunded): (Decimal, Decimal) = sqlx::query_as(
        r#"
        SELECT
            COALESCE(SUM(amount) FILTER (WHERE transaction_type = 'deduction'), 0),
            COALESCE(SUM(amount) FILTER (WHERE transaction_type = 'refund'), 0)
        FROM credit_transactions
        WHERE reference_type = $1
          AND reference_id = $2
          AND member_id = $3
          AND club_id = $4
          AND status IN ('completed', 'recorded')
        "#,
    )
    .bind(reference_type.as_str())
    .bind(reference_id)
    .bind(member_id)
    .bind(club_id)
    .fetch_one(&mut *conn)
    .await
    .map_err(|e| db_error("sum reference postings", e))?;

    Ok(RefundWindow { charged, refunded })
}

/// Refund window of a reservation for its own reserver
pub(crate) async fn reservation_refund_window(
    conn: &mut PgConnection,
    reservation_id: Uuid,
) -> AppResult<RefundWindow> {
    let row: Option<(Decimal, Decimal)> = sqlx::query_as(
        r#"
        SELECT
            COALESCE(SUM(t.amount) FILTER (WHERE t.transaction_type = 'deduction'), 0),
            COALESCE(SUM(t.amount) FILTER (WHERE t.transaction_type = 'refund'), 0)
        FROM court_reservations r
        LEFT JOIN credit_transactions t
          ON t.reference_type = 'reservation'
         AND t.reference_id = r.id
         AND t.member_id = r.member_id
         AND t.club_id = r.club_id
         AND t.status IN ('completed', 'recorded')
        WHERE r.id = $1
        GROUP BY r.id
        "#,
    )
    .bind(reservation_id)
    .fetch_optional(&mut *conn)
    .await
    .map_err(|e| db_error("sum reservation postings", e))?;

    row.map(|(charged, refunded)| RefundWindow { charged, refunded })
        .ok_or(AppError::ReservationNotFound(reservation_id))
}

/// Lock the referenced reservation and return its fee
///
/// Only the reserver may post against a reservation.
async fn lock_reservation_payer(
    conn: &mut PgConnection,
    reservation_id: Uuid,
    request: &PostingRequest,
) -> AppResult<Decimal> {
    let row: Option<(Uuid, Uuid, Decimal)> = sqlx::query_as(
        r#"
        SELECT member_id, club_id, total_fee
        FROM court_reservations
        WHERE id = $1
        FOR UPDATE
        "#,
    )
    .bind(reservation_id)
    .fetch_optional(&mut *conn)
    .await
    .map_err(|e| db_error("lock reservation", e))?;

    let (member_id, club_id, total_fee) =
        row.ok_or(AppError::ReservationNotFound(reservation_id))?;
    if member_id != request.member_id || club_id != request.club_id {
        warn!(
            "Rejected {} by member {} against reservation {} of member {}",
            request.transaction_type, request.member_id, reservation_id, member_id
        );
        return Err(AppError::Validation(format!(
            "Reservation {} was not booked by member {}",
            reservation_id, request.member_id
        )));
    }

    Ok(total_fee)
}

/// Bring the payment status of a reservation in line with its postings
async fn sync_payment_status(
    conn: &mut PgConnection,
    reservation_id: Uuid,
    total_fee: Decimal,
    request: &PostingRequest,
) -> AppResult<()> {
    let window = refund_window(
        conn,
        ReferenceType::Reservation,
        reservation_id,
        request.member_id,
        request.club_id,
    )
    .await?;
    let status = PaymentStatus::from_ledger(total_fee, window.charged, window.refunded);

    sqlx::query(
        r#"
        UPDATE court_reservations
        SET payment_status = $2,
            updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(reservation_id)
    .bind(status.to_string())
    .execute(&mut *conn)
    .await
    .map_err(|e| db_error("update payment status", e))?;

    debug!("Reservation {} payment is now {}", reservation_id, status);
    Ok(())
}

async fn insert_transaction(
    conn: &mut PgConnection,
    tx: &CreditTransaction,
) -> AppResult<CreditTransaction> {
    let query = format!(
        r#"
        INSERT INTO credit_transactions (
            id, member_id, club_id, transaction_type, direction, amount, status,
            balance_before, balance_after, reference_type, reference_id, metadata,
            created_by, recorded_by, created_at, recorded_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
        RETURNING {}
        "#,
        TRANSACTION_COLUMNS
    );

    let row = sqlx::query_as::<sqlx::Postgres, TransactionRow>(&query)
        .bind(tx.id)
        .bind(tx.member_id)
        .bind(tx.club_id)
        .bind(tx.transaction_type.as_str())
        .bind(tx.direction.as_str())
        .bind(tx.amount)
        .bind(tx.status.as_str())
        .bind(tx.balance_before)
        .bind(tx.balance_after)
        .bind(tx.reference_type.map(|r| r.as_str()))
        .bind(tx.reference_id)
        .bind(&tx.metadata)
        .bind(tx.created_by)
        .bind(tx.recorded_by)
        .bind(tx.created_at)
        .bind(tx.recorded_at)
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| db_error("insert credit transaction", e))?;

    Ok(row.into())
}

async fn set_balance(
    conn: &mut PgConnection,
    member_id: Uuid,
    club_id: Uuid,
    balance: Decimal,
) -> AppResult<()> {
    sqlx::query(
        r#"
        UPDATE memberships
        SET credit_balance = $3,
            updated_at = NOW()
        WHERE member_id = $1 AND club_id = $2
        "#,
    )
    .bind(member_id)
    .bind(club_id)
    .bind(balance)
    .execute(&mut *conn)
    .await
    .map_err(|e| db_error("update credit balance", e))?;

    Ok(())
}

/// Apply a posting inside an open transaction
///
/// The caller owns the transaction and decides when to commit.
pub(crate) async fn post_in_tx(
    conn: &mut PgConnection,
    request: &PostingRequest,
) -> AppResult<CreditTransaction> {
    let reservation = match (request.reference_type, request.reference_id) {
        (Some(ReferenceType::Reservation), Some(id)) => {
            Some((id, lock_reservation_payer(conn, id, request).await?))
        }
        _ => None,
    };

    let balance = lock_balance(conn, request.member_id, request.club_id).await?;

    let window = match (request.transaction_type, request.reference_type, request.reference_id) {
        (TransactionType::Refund, Some(reference_type), Some(reference_id)) => Some(
            refund_window(
                conn,
                reference_type,
                reference_id,
                request.member_id,
                request.club_id,
            )
            .await?,
        ),
        _ => None,
    };

    let planned = ledger::plan_posting(balance, request, window).map_err(|e| {
        warn!(
            "Rejected {} of {} for member {}: {}",
            request.transaction_type, request.amount, request.member_id, e
        );
        e
    })?;

    let stored = insert_transaction(conn, &planned).await?;
    if let Some(after) = planned.balance_after {
        set_balance(conn, request.member_id, request.club_id, after).await?;
    }
    if let Some((reservation_id, total_fee)) = reservation {
        sync_payment_status(conn, reservation_id, total_fee, request).await?;
    }

    debug!(
        "Posted {} {} for member {}: {:?} -> {:?}",
        stored.transaction_type, stored.amount, stored.member_id, stored.balance_before,
        stored.balance_after
    );

    Ok(stored)
}

#[async_trait]
impl CreditLedgerRepository for PgCreditLedgerRepository {
    #[instrument(skip(self))]
    async fn open_membership(
        &self,
        member_id: Uuid,
        club_id: Uuid,
        initial_credit: Decimal,
        actor: Option<Uuid>,
    ) -> AppResult<(Membership, Option<CreditTransaction>)> {
        let mut tx = self.pool.begin().await.map_err(|e| {
            error!("Failed to start transaction: {}", e);
            AppError::Transaction(format!("Failed to start transaction: {}", e))
        })?;

        let created = sqlx::query(
            r#"
            INSERT INTO memberships (member_id, club_id)
            VALUES ($1, $2)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(member_id)
        .bind(club_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| db_error("create membership", e))?;

        if created.rows_affected() == 0 {
            return Err(AppError::AlreadyExists(format!(
                "Member {} already belongs to club {}",
                member_id, club_id
            )));
        }

        let opening = if initial_credit > Decimal::ZERO {
            let request = PostingRequest::deposit(member_id, club_id, initial_credit)
                .with_reference(ReferenceType::Opening, None)
                .by(actor);
            Some(post_in_tx(&mut tx, &request).await?)
        } else {
            None
        };

        let membership = sqlx::query_as::<sqlx::Postgres, MembershipRow>(
            r#"
            SELECT member_id, club_id, credit_balance, created_at, updated_at
            FROM memberships
            WHERE member_id = $1 AND club_id = $2
            "#,
        )
        .bind(member_id)
        .bind(club_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| db_error("load membership", e))?;

        tx.commit().await.map_err(|e| {
            error!("Failed to commit transaction: {}", e);
            AppError::Transaction(format!("Failed to commit transaction: {}", e))
        })?;

        info!(
            "Opened membership for member {} in club {} with {}",
            member_id, club_id, initial_credit
        );

        Ok((membership.into(), opening))
    }

    #[instrument(skip(self))]
    async fn find_membership(&self, member_id: Uuid, club_id: Uuid) -> AppResult<Option<Membership>> {
        let row = sqlx::query_as::<sqlx::Postgres, MembershipRow>(
            r#"
            SELECT member_id, club_id, credit_balance, created_at, updated_at
            FROM memberships
            WHERE member_id = $1 AND club_id = $2
            "#,
        )
        .bind(member_id)
        .bind(club_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("find membership", e))?;

        Ok(row.map(Into::into))
    }

    #[instrument(skip(self, request), fields(member = %request.member_id, kind = %request.transaction_type))]
    async fn post(&self, request: &PostingRequest) -> AppResult<CreditTransaction> {
        let mut tx = self.pool.begin().await.map_err(|e| {
            error!("Failed to start transaction: {}", e);
            AppError::Transaction(format!("Failed to start transaction: {}", e))
        })?;

        let posted = post_in_tx(&mut tx, request).await?;

        tx.commit().await.map_err(|e| {
            error!("Failed to commit transaction: {}", e);
            AppError::Transaction(format!("Failed to commit transaction: {}", e))
        })?;

        info!(
            "Committed {} {} for member {} (balance {:?})",
            posted.transaction_type, posted.amount, posted.member_id, posted.balance_after
        );

        Ok(posted)
    }

    #[instrument(skip(self, request), fields(member = %request.member_id))]
    async fn create_pending(&self, request: &PostingRequest) -> AppResult<CreditTransaction> {
        let planned = ledger::plan_pending_deposit(request)?;

        let mut tx = self.pool.begin().await.map_err(|e| {
            error!("Failed to start transaction: {}", e);
            AppError::Transaction(format!("Failed to start transaction: {}", e))
        })?;

        // Existence check only; a pending deposit does not move the balance
        lock_balance(&mut tx, request.member_id, request.club_id).await?;
        let stored = insert_transaction(&mut tx, &planned).await?;

        tx.commit().await.map_err(|e| {
            error!("Failed to commit transaction: {}", e);
            AppError::Transaction(format!("Failed to commit transaction: {}", e))
        })?;

        info!(
            "Pending deposit {} of {} for member {}",
            stored.id, stored.amount, stored.member_id
        );

        Ok(stored)
    }

    #[instrument(skip(self))]
    async fn settle_pending(
        &self,
        transaction_id: Uuid,
        to: TransactionStatus,
        actor: Option<Uuid>,
    ) -> AppResult<CreditTransaction> {
        let mut tx = self.pool.begin().await.map_err(|e| {
            error!("Failed to start transaction: {}", e);
            AppError::Transaction(format!("Failed to start transaction: {}", e))
        })?;

        let query = format!(
            "SELECT {} FROM credit_transactions WHERE id = $1 FOR UPDATE",
            TRANSACTION_COLUMNS
        );
        let current: CreditTransaction = sqlx::query_as::<sqlx::Postgres, TransactionRow>(&query)
            .bind(transaction_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| db_error("lock credit transaction", e))?
            .ok_or(AppError::TransactionNotFound(transaction_id))?
            .into();

        let balance = lock_balance(&mut tx, current.member_id, current.club_id).await?;
        let settled = ledger::settle_pending(&current, balance, to, actor).map_err(|e| {
            warn!("Cannot settle transaction {}: {}", transaction_id, e);
            e
        })?;

        let query = format!(
            r#"
            UPDATE credit_transactions
            SET status = $2,
                balance_before = $3,
                balance_after = $4,
                recorded_by = $5,
                recorded_at = $6
            WHERE id = $1 AND status = 'pending'
            RETURNING {}
            "#,
            TRANSACTION_COLUMNS
        );
        let stored: CreditTransaction = sqlx::query_as::<sqlx::Postgres, TransactionRow>(&query)
            .bind(settled.id)
            .bind(settled.status.as_str())
            .bind(settled.balance_before)
            .bind(settled.balance_after)
            .bind(settled.recorded_by)
            .bind(settled.recorded_at)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| db_error("settle credit transaction", e))?
            .into();

        if let Some(after) = stored.balance_after {
            set_balance(&mut tx, stored.member_id, stored.club_id, after).await?;
        }

        tx.commit().await.map_err(|e| {
            error!("Failed to commit transaction: {}", e);
            AppError::Transaction(format!("Failed to commit transaction: {}", e))
        })?;

        info!("Transaction {} settled as {}", stored.id, stored.status);
        Ok(stored)
    }

    #[instrument(skip(self))]
    async fn find_transaction(&self, id: Uuid) -> AppResult<Option<CreditTransaction>> {
        let query = format!(
            "SELECT {} FROM credit_transactions WHERE id = $1",
            TRANSACTION_COLUMNS
        );
        let row = sqlx::query_as::<sqlx::Postgres, TransactionRow>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("find credit transaction", e))?;

        Ok(row.map(Into::into))
    }

    #[instrument(skip(self))]
    async fn list_for_member(
        &self,
        member_id: Uuid,
        club_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> AppResult<(Vec<CreditTransaction>, i64)> {
        let total: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM credit_transactions WHERE member_id = $1 AND club_id = $2",
        )
        .bind(member_id)
        .bind(club_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_error("count credit transactions", e))?;

        let query = format!(
            r#"
            SELECT {}
            FROM credit_transactions
            WHERE member_id = $1 AND club_id = $2
            ORDER BY created_at DESC, id
            LIMIT $3 OFFSET $4
            "#,
            TRANSACTION_COLUMNS
        );
        let rows = sqlx::query_as::<sqlx::Postgres, TransactionRow>(&query)
            .bind(member_id)
            .bind(club_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_error("list credit transactions", e))?;

        Ok((rows.into_iter().map(Into::into).collect(), total.0))
    }

    #[instrument(skip(self))]
    async fn reconcile(&self, member_id: Uuid, club_id: Uuid) -> AppResult<Reconciliation> {
        let mut tx = self.pool.begin().await.map_err(|e| {
            error!("Failed to start transaction: {}", e);
            AppError::Transaction(format!("Failed to start transaction: {}", e))
        })?;

        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ")
            .execute(&mut *tx)
            .await
            .map_err(|e| db_error("set isolation level", e))?;

        let cached: Option<(Decimal,)> = sqlx::query_as(
            "SELECT credit_balance FROM memberships WHERE member_id = $1 AND club_id = $2",
        )
        .bind(member_id)
        .bind(club_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| db_error("read credit balance", e))?;
        let (cached,) = cached.ok_or(AppError::MembershipNotFound { member_id, club_id })?;

        let (ledger_balance, count): (Decimal, i64) = sqlx::query_as(
            r#"
            SELECT
                COALESCE(SUM(CASE direction WHEN 'credit' THEN amount ELSE -amount END), 0),
                COUNT(*)
            FROM credit_transactions
            WHERE member_id = $1 AND club_id = $2
              AND status IN ('completed', 'recorded')
            "#,
        )
        .bind(member_id)
        .bind(club_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| db_error("sum ledger", e))?;

        tx.commit().await.map_err(|e| {
            error!("Failed to commit transaction: {}", e);
            AppError::Transaction(format!("Failed to commit transaction: {}", e))
        })?;

        let report = Reconciliation::new(member_id, club_id, cached, ledger_balance, count);
        if !report.is_consistent() {
            warn!(
                "Balance discrepancy for member {} in club {}: cached {}, ledger {}",
                member_id, club_id, cached, ledger_balance
            );
        }

        Ok(report)
    }
}

/// Helper struct for mapping database rows
#[derive(Debug, sqlx::FromRow)]
struct TransactionRow {
    id: Uuid,
    member_id: Uuid,
    club_id: Uuid,
    transaction_type: String,
    direction: String,
    amount: Decimal,
    status: String,
    balance_before: Option<Decimal>,
    balance_after: Option<Decimal>,
    reference_type: Option<String>,
    reference_id: Option<Uuid>,
    metadata: JsonValue,
    created_by: Option<Uuid>,
    recorded_by: Option<Uuid>,
    created_at: DateTime<Utc>,
    recorded_at: Option<DateTime<Utc>>,
}

impl From<TransactionRow> for CreditTransaction {
    fn from(row: TransactionRow) -> Self {
        let transaction_type =
            TransactionType::from_str(&row.transaction_type).unwrap_or(TransactionType::Adjustment);
        Self {
            id: row.id,
            member_id: row.member_id,
            club_id: row.club_id,
            transaction_type,
            direction: Direction::from_str(&row.direction).unwrap_or(Direction::Debit),
            amount: row.amount,
            status: TransactionStatus::from_str(&row.status).unwrap_or(TransactionStatus::Failed),
            balance_before: row.balance_before,
            balance_after: row.balance_after,
            reference_type: row.reference_type.as_deref().and_then(ReferenceType::from_str),
            reference_id: row.reference_id,
            metadata: row.metadata,
            created_by: row.created_by,
            recorded_by: row.recorded_by,
            created_at: row.created_at,
            recorded_at: row.recorded_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct MembershipRow {
    member_id: Uuid,
    club_id: Uuid,
    credit_balance: Decimal,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<MembershipRow> for Membership {
    fn from(row: MembershipRow) -> Self {
        Self {
            member_id: row.member_id,
            club_id: row.club_id,
            credit_balance: row.credit_balance,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}
