//! Credit ledger models
//!
//! Members hold a per-club credit balance. Every balance change is backed by
//! an append-only `CreditTransaction`; the balance on `Membership` is a cached
//! projection of the completed and recorded transactions.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;
use uuid::Uuid;

use super::reservation::Reservation;

/// Transaction type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    /// Credit added by the member (cash, transfer, card)
    Deposit,
    /// Credit spent on a reservation or event
    Deduction,
    /// Credit returned for a reservation or event
    Refund,
    /// Manual admin correction in either direction
    Adjustment,
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Deposit => "deposit",
            TransactionType::Deduction => "deduction",
            TransactionType::Refund => "refund",
            TransactionType::Adjustment => "adjustment",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "deposit" => Some(TransactionType::Deposit),
            "deduction" => Some(TransactionType::Deduction),
            "refund" => Some(TransactionType::Refund),
            "adjustment" => Some(TransactionType::Adjustment),
            _ => None,
        }
    }

    /// Direction implied by the type; `None` for adjustments
    pub fn fixed_direction(&self) -> Option<Direction> {
        match self {
            TransactionType::Deposit | TransactionType::Refund => Some(Direction::Credit),
            TransactionType::Deduction => Some(Direction::Debit),
            TransactionType::Adjustment => None,
        }
    }
}

/// Direction of a balance change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Credit,
    Debit,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Credit => "credit",
            Direction::Debit => "debit",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "credit" => Some(Direction::Credit),
            "debit" => Some(Direction::Debit),
            _ => None,
        }
    }

    /// Apply the direction's sign to a non-negative amount
    #[inline]
    pub fn signed(&self, amount: Decimal) -> Decimal {
        match self {
            Direction::Credit => amount,
            Direction::Debit => -amount,
        }
    }
}

/// Transaction status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    /// Awaiting admin confirmation, no balance effect yet
    Pending,
    /// Applied to the balance
    Completed,
    /// Deposit confirmed by an admin and applied to the balance
    Recorded,
    /// Rejected, never applied
    Failed,
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Completed => "completed",
            TransactionStatus::Recorded => "recorded",
            TransactionStatus::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(TransactionStatus::Pending),
            "completed" => Some(TransactionStatus::Completed),
            "recorded" => Some(TransactionStatus::Recorded),
            "failed" => Some(TransactionStatus::Failed),
            _ => None,
        }
    }

    /// Whether the transaction counts towards the balance
    #[inline]
    pub fn is_applied(&self) -> bool {
        matches!(self, TransactionStatus::Completed | TransactionStatus::Recorded)
    }
}

/// What a transaction refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceType {
    Reservation,
    Event,
    Deposit,
    Adjustment,
    /// Initial credit granted when the membership was opened
    Opening,
}

impl fmt::Display for ReferenceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ReferenceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReferenceType::Reservation => "reservation",
            ReferenceType::Event => "event",
            ReferenceType::Deposit => "deposit",
            ReferenceType::Adjustment => "adjustment",
            ReferenceType::Opening => "opening",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "reservation" => Some(ReferenceType::Reservation),
            "event" => Some(ReferenceType::Event),
            "deposit" => Some(ReferenceType::Deposit),
            "adjustment" => Some(ReferenceType::Adjustment),
            "opening" => Some(ReferenceType::Opening),
            _ => None,
        }
    }

    /// References that refunds may be posted against
    #[inline]
    pub fn is_refundable(&self) -> bool {
        matches!(self, ReferenceType::Reservation | ReferenceType::Event)
    }
}

/// How a deposit was paid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DepositMethod {
    #[default]
    Cash,
    BankTransfer,
    Card,
    Other,
}

impl fmt::Display for DepositMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DepositMethod::Cash => write!(f, "cash"),
            DepositMethod::BankTransfer => write!(f, "bank_transfer"),
            DepositMethod::Card => write!(f, "card"),
            DepositMethod::Other => write!(f, "other"),
        }
    }
}

/// Ledger entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditTransaction {
    pub id: Uuid,
    pub member_id: Uuid,
    pub club_id: Uuid,
    pub transaction_type: TransactionType,
    pub direction: Direction,
    /// Always non-negative; the sign comes from `direction`
    pub amount: Decimal,
    pub status: TransactionStatus,
    /// Absent while pending or failed
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

impl CreditTransaction {
    /// Balance delta this transaction represents
    #[inline]
    pub fn signed_amount(&self) -> Decimal {
        self.direction.signed(self.amount)
    }
}

/// Per-club membership holding the cached credit balance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Membership {
    pub member_id: Uuid,
    pub club_id: Uuid,
    pub credit_balance: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A balance-changing posting to be applied by the ledger
#[derive(Debug, Clone)]
pub struct PostingRequest {
    pub member_id: Uuid,
    pub club_id: Uuid,
    pub transaction_type: TransactionType,
    pub direction: Direction,
    pub amount: Decimal,
    pub reference_type: Option<ReferenceType>,
    pub reference_id: Option<Uuid>,
    pub metadata: JsonValue,
    pub actor: Option<Uuid>,
    /// Skip the sufficient-balance check on debits
    pub allow_overdraft: bool,
}

impl PostingRequest {
    fn new(
        member_id: Uuid,
        club_id: Uuid,
        transaction_type: TransactionType,
        direction: Direction,
        amount: Decimal,
    ) -> Self {
        Self {
            member_id,
            club_id,
            transaction_type,
            direction,
            amount,
            reference_type: None,
            reference_id: None,
            metadata: JsonValue::Object(Default::default()),
            actor: None,
            allow_overdraft: false,
        }
    }

    pub fn deposit(member_id: Uuid, club_id: Uuid, amount: Decimal) -> Self {
        Self::new(member_id, club_id, TransactionType::Deposit, Direction::Credit, amount)
    }

    pub fn deduction(member_id: Uuid, club_id: Uuid, amount: Decimal) -> Self {
        Self::new(member_id, club_id, TransactionType::Deduction, Direction::Debit, amount)
    }

    pub fn refund(member_id: Uuid, club_id: Uuid, amount: Decimal) -> Self {
        Self::new(member_id, club_id, TransactionType::Refund, Direction::Credit, amount)
    }

    pub fn adjustment(member_id: Uuid, club_id: Uuid, amount: Decimal, direction: Direction) -> Self {
        Self::new(member_id, club_id, TransactionType::Adjustment, direction, amount)
            .with_reference(ReferenceType::Adjustment, None)
    }

    pub fn with_reference(mut self, reference_type: ReferenceType, reference_id: Option<Uuid>) -> Self {
        self.reference_type = Some(reference_type);
        self.reference_id = reference_id;
        self
    }

    /// Deduction or refund tied to a reservation
    pub fn for_reservation(self, reservation: &Reservation) -> Self {
        self.with_reference(ReferenceType::Reservation, Some(reservation.id))
    }

    pub fn with_metadata(mut self, metadata: JsonValue) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn by(mut self, actor: Option<Uuid>) -> Self {
        self.actor = actor;
        self
    }

    pub fn allow_overdraft(mut self, allow: bool) -> Self {
        self.allow_overdraft = allow;
        self
    }

    /// Balance delta the posting will apply
    #[inline]
    pub fn signed_amount(&self) -> Decimal {
        self.direction.signed(self.amount)
    }
}

/// Result of creating a reservation: the row and its deduction, if any
#[derive(Debug, Clone, Serialize)]
pub struct BookingOutcome {
    pub reservation: Reservation,
    pub transaction: Option<CreditTransaction>,
}

/// Cached balance compared with the ledger
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reconciliation {
    pub member_id: Uuid,
    pub club_id: Uuid,
    pub cached_balance: Decimal,
    pub ledger_balance: Decimal,
    /// `cached_balance - ledger_balance`
    pub discrepancy: Decimal,
    pub transaction_count: i64,
}

impl Reconciliation {
    pub fn new(
        member_id: Uuid,
        club_id: Uuid,
        cached_balance: Decimal,
        ledger_balance: Decimal,
        transaction_count: i64,
    ) -> Self {
        Self {
            member_id,
            club_id,
            cached_balance,
            ledger_balance,
            discrepancy: cached_balance - ledger_balance,
            transaction_count,
        }
    }

    #[inline]
    pub fn is_consistent(&self) -> bool {
        self.discrepancy.is_zero()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_fixed_directions() {
        assert_eq!(TransactionType::Deposit.fixed_direction(), Some(Direction::Credit));
        assert_eq!(TransactionType::Refund.fixed_direction(), Some(Direction::Credit));
        assert_eq!(TransactionType::Deduction.fixed_direction(), Some(Direction::Debit));
        assert_eq!(TransactionType::Adjustment.fixed_direction(), None);
    }

    #[test]
    fn test_posting_builders() {
        let member = Uuid::new_v4();
        let club = Uuid::new_v4();
        let posting = PostingRequest::adjustment(member, club, dec!(25), Direction::Debit)
            .by(Some(club))
            .allow_overdraft(true);

        assert_eq!(posting.signed_amount(), dec!(-25));
        assert_eq!(posting.reference_type, Some(ReferenceType::Adjustment));
        assert!(posting.allow_overdraft);
        assert_eq!(posting.actor, Some(club));
    }

    #[test]
    fn test_reconciliation_discrepancy() {
        let report = Reconciliation::new(Uuid::nil(), Uuid::nil(), dec!(120), dec!(100), 3);
        assert_eq!(report.discrepancy, dec!(20));
        assert!(!report.is_consistent());

        let report = Reconciliation::new(Uuid::nil(), Uuid::nil(), dec!(100), dec!(100), 3);
        assert!(report.is_consistent());
    }

    #[test]
    fn test_status_round_trip_names() {
        assert_eq!(TransactionStatus::from_str("recorded"), Some(TransactionStatus::Recorded));
        assert!(TransactionStatus::Completed.is_applied());
        assert!(!TransactionStatus::Pending.is_applied());
        assert_eq!(ReferenceType::Opening.as_str(), "opening");
    }
}
