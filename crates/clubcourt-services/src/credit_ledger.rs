//! Credit ledger service
//!
//! Entry point for every credit movement that is not part of a reservation
//! write: deposits, admin adjustments, memberships and reconciliation.

use clubcourt_core::{
    models::{
        CreditTransaction, DepositMethod, Direction, Membership, PostingRequest, Reconciliation,
        ReferenceType, TransactionStatus, TransactionType,
    },
    traits::{CreditLedgerRepository, PaginatedResponse, Pagination},
    AppError, AppResult,
};
use rust_decimal::Decimal;
use serde_json::{json, Value as JsonValue};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Ledger operations over a credit ledger store
pub struct CreditLedger<L: CreditLedgerRepository> {
    repo: Arc<L>,
    allow_admin_overdraft: bool,
}

impl<L: CreditLedgerRepository> CreditLedger<L> {
    pub fn new(repo: Arc<L>) -> Self {
        Self {
            repo,
            allow_admin_overdraft: false,
        }
    }

    /// Let admin debit adjustments take a balance below zero
    pub fn with_admin_overdraft(mut self, allow: bool) -> Self {
        self.allow_admin_overdraft = allow;
        self
    }

    /// Apply a posting of a fixed-direction type immediately
    ///
    /// Adjustments carry their own direction and go through `adjust_credit`.
    #[instrument(skip(self, metadata))]
    pub async fn apply_transaction(
        &self,
        member_id: Uuid,
        club_id: Uuid,
        transaction_type: TransactionType,
        amount: Decimal,
        reference: Option<(ReferenceType, Uuid)>,
        metadata: JsonValue,
        actor: Option<Uuid>,
    ) -> AppResult<CreditTransaction> {
        let request = match transaction_type {
            TransactionType::Deposit => PostingRequest::deposit(member_id, club_id, amount),
            TransactionType::Deduction => PostingRequest::deduction(member_id, club_id, amount),
            TransactionType::Refund => PostingRequest::refund(member_id, club_id, amount),
            TransactionType::Adjustment => {
                return Err(AppError::Validation(
                    "Adjustments need a direction and a reason".to_string(),
                ))
            }
        };

        let request = match reference {
            Some((reference_type, reference_id)) => {
                request.with_reference(reference_type, Some(reference_id))
            }
            None => request,
        };

        self.post(&request.with_metadata(metadata).by(actor)).await
    }

    /// Apply a prepared posting
    pub async fn post(&self, request: &PostingRequest) -> AppResult<CreditTransaction> {
        let tx = self.repo.post(request).await?;
        info!(
            "Posted {} {} {} for member {} (balance {:?} -> {:?})",
            tx.transaction_type,
            tx.direction,
            tx.amount,
            tx.member_id,
            tx.balance_before,
            tx.balance_after
        );
        Ok(tx)
    }

    /// Register a deposit awaiting admin confirmation
    #[instrument(skip(self))]
    pub async fn deposit_credit(
        &self,
        member_id: Uuid,
        club_id: Uuid,
        amount: Decimal,
        method: DepositMethod,
        actor: Option<Uuid>,
    ) -> AppResult<CreditTransaction> {
        let request = PostingRequest::deposit(member_id, club_id, amount)
            .with_reference(ReferenceType::Deposit, None)
            .with_metadata(json!({ "method": method }))
            .by(actor);

        let tx = self.repo.create_pending(&request).await?;
        info!(
            "Pending deposit {} of {} for member {} ({})",
            tx.id, amount, member_id, method
        );
        Ok(tx)
    }

    /// Confirm a pending deposit and credit the balance
    #[instrument(skip(self))]
    pub async fn record_deposit(&self, transaction_id: Uuid, admin: Uuid) -> AppResult<CreditTransaction> {
        self.settle(transaction_id, TransactionStatus::Recorded, admin)
            .await
    }

    /// Reject a pending deposit; the balance is untouched
    #[instrument(skip(self))]
    pub async fn reject_deposit(&self, transaction_id: Uuid, admin: Uuid) -> AppResult<CreditTransaction> {
        self.settle(transaction_id, TransactionStatus::Failed, admin)
            .await
    }

    async fn settle(
        &self,
        transaction_id: Uuid,
        to: TransactionStatus,
        admin: Uuid,
    ) -> AppResult<CreditTransaction> {
        let pending = self
            .repo
            .find_transaction(transaction_id)
            .await?
            .ok_or(AppError::TransactionNotFound(transaction_id))?;

        if pending.transaction_type != TransactionType::Deposit {
            return Err(AppError::TransactionState(format!(
                "Transaction {} is a {}, not a deposit",
                transaction_id, pending.transaction_type
            )));
        }

        let settled = self
            .repo
            .settle_pending(transaction_id, to, Some(admin))
            .await?;
        info!("Deposit {} marked {} by {}", transaction_id, settled.status, admin);
        Ok(settled)
    }

    /// Admin correction in either direction
    #[instrument(skip(self))]
    pub async fn adjust_credit(
        &self,
        member_id: Uuid,
        club_id: Uuid,
        amount: Decimal,
        direction: Direction,
        reason: &str,
        admin: Uuid,
    ) -> AppResult<CreditTransaction> {
        if reason.trim().is_empty() {
            return Err(AppError::Validation(
                "Adjustments require a reason".to_string(),
            ));
        }

        let request = PostingRequest::adjustment(member_id, club_id, amount, direction)
            .with_metadata(json!({ "reason": reason }))
            .by(Some(admin))
            .allow_overdraft(self.allow_admin_overdraft);

        self.post(&request).await
    }

    /// Open a membership with its starting credit
    #[instrument(skip(self))]
    pub async fn open_membership(
        &self,
        member_id: Uuid,
        club_id: Uuid,
        initial_credit: Decimal,
        actor: Option<Uuid>,
    ) -> AppResult<(Membership, Option<CreditTransaction>)> {
        if initial_credit < Decimal::ZERO {
            return Err(AppError::Validation(format!(
                "Initial credit must not be negative, got {}",
                initial_credit
            )));
        }

        let opened = self
            .repo
            .open_membership(member_id, club_id, initial_credit, actor)
            .await?;
        info!(
            "Opened membership of {} in club {} with {}",
            member_id, club_id, initial_credit
        );
        Ok(opened)
    }

    /// Cached balance of a membership
    pub async fn balance(&self, member_id: Uuid, club_id: Uuid) -> AppResult<Decimal> {
        self.repo
            .find_membership(member_id, club_id)
            .await?
            .map(|m| m.credit_balance)
            .ok_or(AppError::MembershipNotFound { member_id, club_id })
    }

    /// Transaction history, newest first
    pub async fn history(
        &self,
        member_id: Uuid,
        club_id: Uuid,
        pagination: &Pagination,
    ) -> AppResult<PaginatedResponse<CreditTransaction>> {
        let (data, total) = self
            .repo
            .list_for_member(member_id, club_id, pagination.limit(), pagination.offset())
            .await?;
        Ok(PaginatedResponse::new(data, total, pagination))
    }

    /// Compare the cached balance against the ledger
    #[instrument(skip(self))]
    pub async fn reconcile(&self, member_id: Uuid, club_id: Uuid) -> AppResult<Reconciliation> {
        let report = self.repo.reconcile(member_id, club_id).await?;
        if !report.is_consistent() {
            warn!(
                "Balance drift for member {} in club {}: cached {} vs ledger {}",
                member_id, club_id, report.cached_balance, report.ledger_balance
            );
        }
        Ok(report)
    }
}
