//! Ledger posting planner
//!
//! Pure arithmetic shared by every ledger store. A store locks the member's
//! balance, calls into this module to plan the entry, and then writes the
//! planned transaction and its `balance_after` in the same unit of work.

use chrono::Utc;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{
    CreditTransaction, Direction, PostingRequest, TransactionStatus, TransactionType,
};
use crate::AppResult;

/// Completed deductions and refunds already posted against one reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RefundWindow {
    pub charged: Decimal,
    pub refunded: Decimal,
}

impl RefundWindow {
    /// Amount still refundable for the reference
    #[inline]
    pub fn remaining(&self) -> Decimal {
        (self.charged - self.refunded).max(Decimal::ZERO)
    }
}

fn validate_shape(request: &PostingRequest) -> AppResult<()> {
    if request.amount <= Decimal::ZERO {
        return Err(AppError::Validation(format!(
            "Transaction amount must be positive, got {}",
            request.amount
        )));
    }

    if let Some(direction) = request.transaction_type.fixed_direction() {
        if direction != request.direction {
            return Err(AppError::Validation(format!(
                "A {} must be a {}",
                request.transaction_type, direction
            )));
        }
    }

    Ok(())
}

fn new_transaction(request: &PostingRequest, status: TransactionStatus) -> CreditTransaction {
    let now = Utc::now();
    CreditTransaction {
        id: Uuid::new_v4(),
        member_id: request.member_id,
        club_id: request.club_id,
        transaction_type: request.transaction_type,
        direction: request.direction,
        amount: request.amount,
        status,
        balance_before: None,
        balance_after: None,
        reference_type: request.reference_type,
        reference_id: request.reference_id,
        metadata: request.metadata.clone(),
        created_by: request.actor,
        recorded_by: None,
        created_at: now,
        recorded_at: None,
    }
}

/// Plan an immediately applied posting against `balance_before`
///
/// `refund_window` must be supplied for refunds; it holds what has already
/// been charged and refunded for the refund's reference.
pub fn plan_posting(
    balance_before: Decimal,
    request: &PostingRequest,
    refund_window: Option<RefundWindow>,
) -> AppResult<CreditTransaction> {
    validate_shape(request)?;

    if request.direction == Direction::Debit {
        let overdraft_allowed =
            request.transaction_type == TransactionType::Adjustment && request.allow_overdraft;
        if !overdraft_allowed && balance_before < request.amount {
            return Err(AppError::InsufficientCredit {
                required: request.amount.to_string(),
                available: balance_before.to_string(),
            });
        }
    }

    if request.transaction_type == TransactionType::Refund {
        let refundable = request
            .reference_type
            .map(|t| t.is_refundable())
            .unwrap_or(false);
        if !refundable || request.reference_id.is_none() {
            return Err(AppError::Validation(
                "Refunds must reference a reservation or an event".to_string(),
            ));
        }

        let window = refund_window.unwrap_or_default();
        if request.amount > window.remaining() {
            return Err(AppError::TransactionState(format!(
                "Refund of {} exceeds refundable amount {} (charged {}, refunded {})",
                request.amount,
                window.remaining(),
                window.charged,
                window.refunded
            )));
        }
    }

    let status = if request.transaction_type == TransactionType::Deposit {
        TransactionStatus::Recorded
    } else {
        TransactionStatus::Completed
    };

    let mut tx = new_transaction(request, status);
    tx.balance_before = Some(balance_before);
    tx.balance_after = Some(balance_before + request.signed_amount());
    if status == TransactionStatus::Recorded {
        tx.recorded_by = request.actor;
        tx.recorded_at = Some(tx.created_at);
    }

    Ok(tx)
}

/// Plan a pending deposit awaiting admin confirmation
pub fn plan_pending_deposit(request: &PostingRequest) -> AppResult<CreditTransaction> {
    validate_shape(request)?;

    if request.transaction_type != TransactionType::Deposit {
        return Err(AppError::Validation(format!(
            "Only deposits can be created pending, got {}",
            request.transaction_type
        )));
    }

    Ok(new_transaction(request, TransactionStatus::Pending))
}

/// Settle a pending transaction as recorded (applied) or failed (discarded)
pub fn settle_pending(
    tx: &CreditTransaction,
    balance_before: Decimal,
    to: TransactionStatus,
    actor: Option<Uuid>,
) -> AppResult<CreditTransaction> {
    if tx.status != TransactionStatus::Pending {
        return Err(AppError::TransactionState(format!(
            "Transaction {} is already {}",
            tx.id, tx.status
        )));
    }

    let mut settled = tx.clone();
    settled.recorded_by = actor;
    settled.recorded_at = Some(Utc::now());

    match to {
        TransactionStatus::Recorded => {
            settled.status = TransactionStatus::Recorded;
            settled.balance_before = Some(balance_before);
            settled.balance_after = Some(balance_before + tx.signed_amount());
        }
        TransactionStatus::Failed => {
            settled.status = TransactionStatus::Failed;
        }
        other => {
            return Err(AppError::Validation(format!(
                "Pending transactions settle as recorded or failed, not {}",
                other
            )));
        }
    }

    Ok(settled)
}

/// Sum of the signed deltas of every applied transaction
pub fn ledger_balance<'a>(transactions: impl IntoIterator<Item = &'a CreditTransaction>) -> Decimal {
    transactions
        .into_iter()
        .filter(|t| t.status.is_applied())
        .map(|t| t.signed_amount())
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ReferenceType;
    use rust_decimal_macros::dec;

    fn ids() -> (Uuid, Uuid) {
        (Uuid::new_v4(), Uuid::new_v4())
    }

    #[test]
    fn test_deduction_moves_balance() {
        let (member, club) = ids();
        let request = PostingRequest::deduction(member, club, dec!(150));
        let tx = plan_posting(dec!(200), &request, None).unwrap();

        assert_eq!(tx.status, TransactionStatus::Completed);
        assert_eq!(tx.balance_before, Some(dec!(200)));
        assert_eq!(tx.balance_after, Some(dec!(50)));
        assert_eq!(tx.balance_after.unwrap() - tx.balance_before.unwrap(), tx.signed_amount());
    }

    #[test]
    fn test_insufficient_credit() {
        let (member, club) = ids();
        let request = PostingRequest::deduction(member, club, dec!(150));
        let err = plan_posting(dec!(100), &request, None).unwrap_err();

        assert!(matches!(err, AppError::InsufficientCredit { .. }));
    }

    #[test]
    fn test_overdraft_only_for_admin_adjustments() {
        let (member, club) = ids();

        let deduction = PostingRequest::deduction(member, club, dec!(150)).allow_overdraft(true);
        assert!(plan_posting(dec!(100), &deduction, None).is_err());

        let adjustment =
            PostingRequest::adjustment(member, club, dec!(150), Direction::Debit).allow_overdraft(true);
        let tx = plan_posting(dec!(100), &adjustment, None).unwrap();
        assert_eq!(tx.balance_after, Some(dec!(-50)));
    }

    #[test]
    fn test_rejects_non_positive_amount() {
        let (member, club) = ids();
        let request = PostingRequest::deposit(member, club, Decimal::ZERO);
        assert!(matches!(
            plan_posting(dec!(10), &request, None),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn test_refund_cap() {
        let (member, club) = ids();
        let request = PostingRequest::refund(member, club, dec!(80))
            .with_reference(ReferenceType::Reservation, Some(Uuid::new_v4()));

        let window = RefundWindow {
            charged: dec!(100),
            refunded: dec!(30),
        };
        assert!(matches!(
            plan_posting(dec!(0), &request, Some(window)),
            Err(AppError::TransactionState(_))
        ));

        let window = RefundWindow {
            charged: dec!(100),
            refunded: dec!(20),
        };
        let tx = plan_posting(dec!(0), &request, Some(window)).unwrap();
        assert_eq!(tx.balance_after, Some(dec!(80)));
    }

    #[test]
    fn test_refund_requires_reference() {
        let (member, club) = ids();
        let request = PostingRequest::refund(member, club, dec!(10));
        assert!(matches!(
            plan_posting(dec!(0), &request, Some(RefundWindow::default())),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn test_pending_deposit_settlement() {
        let (member, club) = ids();
        let admin = Uuid::new_v4();
        let pending = plan_pending_deposit(&PostingRequest::deposit(member, club, dec!(500))).unwrap();
        assert_eq!(pending.status, TransactionStatus::Pending);
        assert!(pending.balance_after.is_none());

        let recorded =
            settle_pending(&pending, dec!(100), TransactionStatus::Recorded, Some(admin)).unwrap();
        assert_eq!(recorded.status, TransactionStatus::Recorded);
        assert_eq!(recorded.balance_after, Some(dec!(600)));
        assert_eq!(recorded.recorded_by, Some(admin));

        let again = settle_pending(&recorded, dec!(600), TransactionStatus::Recorded, Some(admin));
        assert!(matches!(again, Err(AppError::TransactionState(_))));
    }

    #[test]
    fn test_failed_deposit_has_no_balances() {
        let (member, club) = ids();
        let pending = plan_pending_deposit(&PostingRequest::deposit(member, club, dec!(500))).unwrap();
        let failed = settle_pending(&pending, dec!(100), TransactionStatus::Failed, None).unwrap();

        assert_eq!(failed.status, TransactionStatus::Failed);
        assert!(failed.balance_before.is_none());
        assert_eq!(ledger_balance([&failed]), Decimal::ZERO);
    }

    #[test]
    fn test_ledger_balance_sums_applied() {
        let (member, club) = ids();
        let deposit = plan_posting(dec!(0), &PostingRequest::deposit(member, club, dec!(500)), None).unwrap();
        let deduction =
            plan_posting(dec!(500), &PostingRequest::deduction(member, club, dec!(120)), None).unwrap();
        let pending = plan_pending_deposit(&PostingRequest::deposit(member, club, dec!(70))).unwrap();

        assert_eq!(ledger_balance([&deposit, &deduction, &pending]), dec!(380));
    }
}
