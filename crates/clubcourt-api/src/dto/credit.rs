//! Credit DTOs
//!
//! Request and response types for membership and ledger endpoints.

use chrono::{DateTime, Utc};
use clubcourt_core::models::{
    CreditTransaction, DepositMethod, Direction, Membership, ReferenceType, TransactionStatus,
    TransactionType,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;
use validator::Validate;

/// Open a membership in a club
#[derive(Debug, Clone, Deserialize)]
pub struct OpenMembershipRequest {
    pub member_id: Uuid,

    /// Starting credit; the club's configured initial balance when absent
    pub initial_credit: Option<Decimal>,

    pub actor_id: Option<Uuid>,
}

/// Member-initiated deposit, pending until an admin records it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepositRequest {
    /// Amount to deposit (must be positive, validated by the ledger)
    pub amount: Decimal,

    #[serde(default)]
    pub method: DepositMethod,

    pub actor_id: Option<Uuid>,
}

/// Admin balance correction
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct AdjustmentRequest {
    /// Amount to move (must be positive, validated by the ledger)
    pub amount: Decimal,

    pub direction: Direction,

    #[validate(length(min = 1, max = 500, message = "Reason is required"))]
    pub reason: String,

    pub admin_id: Uuid,
}

/// Membership response
#[derive(Debug, Clone, Serialize)]
pub struct MembershipResponse {
    pub member_id: Uuid,
    pub club_id: Uuid,
    pub credit_balance: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Membership> for MembershipResponse {
    fn from(m: Membership) -> Self {
        Self {
            member_id: m.member_id,
            club_id: m.club_id,
            credit_balance: m.credit_balance,
            created_at: m.created_at,
            updated_at: m.updated_at,
        }
    }
}

/// Balance response
#[derive(Debug, Clone, Serialize)]
pub struct BalanceResponse {
    pub member_id: Uuid,
    pub club_id: Uuid,
    pub credit_balance: Decimal,
}

/// Credit transaction response
#[derive(Debug, Clone, Serialize)]
pub struct TransactionResponse {
    pub id: Uuid,
    pub member_id: Uuid,
    pub club_id: Uuid,
    pub transaction_type: TransactionType,
    pub direction: Direction,
    pub amount: Decimal,
    /// Amount with the sign of its direction
    pub signed_amount: Decimal,
    pub status: TransactionStatus,
    pub balance_before: Option<Decimal>,
    pub balance_after: Option<Decimal>,
    pub reference_type: Option<ReferenceType>,
    pub reference_id: Option<Uuid>,
    pub metadata: JsonValue,
    pub created_by: Option<Uuid>,
    pub recorded_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub recorded_at: Option<DateTime<Utc>>,
}

impl From<CreditTransaction> for TransactionResponse {
    fn from(tx: CreditTransaction) -> Self {
        Self {
            signed_amount: tx.signed_amount(),
            id: tx.id,
            member_id: tx.member_id,
            club_id: tx.club_id,
            transaction_type: tx.transaction_type,
            direction: tx.direction,
            amount: tx.amount,
            status: tx.status,
            balance_before: tx.balance_before,
            balance_after: tx.balance_after,
            reference_type: tx.reference_type,
            reference_id: tx.reference_id,
            metadata: tx.metadata,
            created_by: tx.created_by,
            recorded_by: tx.recorded_by,
            created_at: tx.created_at,
            recorded_at: tx.recorded_at,
        }
    }
}
