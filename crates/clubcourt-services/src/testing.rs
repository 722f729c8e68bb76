//! In-memory repositories for service tests
//!
//! Every call runs under one mutex so multi-row writes are atomic, and the
//! active-slot exclusivity of the database is checked on each write.

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use clubcourt_core::{
    ledger::{self, RefundWindow},
    models::{
        BookingOutcome, ClubSettings, CreditTransaction, Membership, PaymentStatus,
        PostingRequest, Reconciliation, ReferenceType, Reservation, ReservationStatus,
        TransactionStatus, TransactionType,
    },
    scheduling::find_conflict,
    traits::{CreditLedgerRepository, RescheduleChange, ReservationRepository, SettingsRepository},
    AppError, AppResult,
};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Default)]
struct State {
    settings: HashMap<Uuid, ClubSettings>,
    reservations: HashMap<Uuid, Reservation>,
    memberships: HashMap<(Uuid, Uuid), Membership>,
    transactions: Vec<CreditTransaction>,
    fail_settings: bool,
}

impl State {
    fn balance(&self, member_id: Uuid, club_id: Uuid) -> AppResult<Decimal> {
        self.memberships
            .get(&(member_id, club_id))
            .map(|m| m.credit_balance)
            .ok_or(AppError::MembershipNotFound { member_id, club_id })
    }

    fn refund_window(
        &self,
        reference_type: ReferenceType,
        reference_id: Uuid,
        member_id: Uuid,
        club_id: Uuid,
    ) -> RefundWindow {
        let mut window = RefundWindow::default();
        for tx in self.transactions.iter().filter(|t| {
            t.reference_type == Some(reference_type)
                && t.reference_id == Some(reference_id)
                && t.member_id == member_id
                && t.club_id == club_id
                && t.status.is_applied()
        }) {
            match tx.transaction_type {
                TransactionType::Deduction => window.charged += tx.amount,
                TransactionType::Refund => window.refunded += tx.amount,
                _ => {}
            }
        }
        window
    }

    fn apply(&mut self, tx: CreditTransaction) -> CreditTransaction {
        if let (Some(after), Some(membership)) = (
            tx.balance_after,
            self.memberships.get_mut(&(tx.member_id, tx.club_id)),
        ) {
            membership.credit_balance = after;
            membership.updated_at = Utc::now();
        }
        self.transactions.push(tx.clone());
        tx
    }

    fn reservation_window(&self, id: Uuid) -> AppResult<(RefundWindow, Decimal)> {
        let reservation = self
            .reservations
            .get(&id)
            .ok_or(AppError::ReservationNotFound(id))?;
        let window = self.refund_window(
            ReferenceType::Reservation,
            id,
            reservation.member_id,
            reservation.club_id,
        );
        Ok((window, reservation.total_fee))
    }

    fn check_payer(&self, id: Uuid, request: &PostingRequest) -> AppResult<()> {
        let reservation = self
            .reservations
            .get(&id)
            .ok_or(AppError::ReservationNotFound(id))?;
        if reservation.member_id != request.member_id || reservation.club_id != request.club_id {
            return Err(AppError::Validation(format!(
                "Reservation {} was not booked by member {}",
                id, request.member_id
            )));
        }
        Ok(())
    }

    fn post(&mut self, request: &PostingRequest) -> AppResult<CreditTransaction> {
        let reservation = match (request.reference_type, request.reference_id) {
            (Some(ReferenceType::Reservation), Some(id)) => {
                self.check_payer(id, request)?;
                Some(id)
            }
            _ => None,
        };

        let balance = self.balance(request.member_id, request.club_id)?;
        let window = match (request.transaction_type, request.reference_type, request.reference_id) {
            (TransactionType::Refund, Some(reference_type), Some(reference_id)) => Some(
                self.refund_window(reference_type, reference_id, request.member_id, request.club_id),
            ),
            _ => None,
        };
        let tx = ledger::plan_posting(balance, request, window)?;
        let tx = self.apply(tx);

        if let Some(id) = reservation {
            let (window, total_fee) = self.reservation_window(id)?;
            if let Some(reservation) = self.reservations.get_mut(&id) {
                reservation.payment_status =
                    PaymentStatus::from_ledger(total_fee, window.charged, window.refunded);
                reservation.updated_at = Utc::now();
            }
        }
        Ok(tx)
    }

    /// Post against a reservation already written, putting back `previous`
    /// when the posting is rejected
    fn post_or_restore(
        &mut self,
        request: &PostingRequest,
        id: Uuid,
        previous: Option<Reservation>,
    ) -> AppResult<CreditTransaction> {
        self.post(request).map_err(|e| {
            match previous {
                Some(reservation) => {
                    self.reservations.insert(id, reservation);
                }
                None => {
                    self.reservations.remove(&id);
                }
            }
            e
        })
    }

    fn ensure_free(&self, reservation: &Reservation) -> AppResult<()> {
        if !reservation.status.is_active() {
            return Ok(());
        }

        let day: Vec<Reservation> = self
            .reservations
            .values()
            .filter(|r| r.club_id == reservation.club_id && r.date == reservation.date)
            .cloned()
            .collect();

        match find_conflict(&day, &reservation.slot(), Some(reservation.id)) {
            Some(_) => Err(AppError::SlotConflict {
                date: reservation.date,
                start: reservation.start_hour,
                end: reservation.end_hour(),
            }),
            None => Ok(()),
        }
    }

    fn expect_status(
        &self,
        id: Uuid,
        expected: ReservationStatus,
        to: ReservationStatus,
    ) -> AppResult<Reservation> {
        let current = self
            .reservations
            .get(&id)
            .cloned()
            .ok_or(AppError::ReservationNotFound(id))?;

        if current.status == expected {
            Ok(current)
        } else if current.status.is_terminal() {
            Err(AppError::AlreadyTerminal {
                id,
                status: current.status,
            })
        } else {
            Err(AppError::InvalidTransition {
                from: current.status,
                to,
            })
        }
    }
}

/// Shared in-memory backing store for all repository traits
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_settings(&self, club_id: Uuid, settings: ClubSettings) {
        self.state.lock().settings.insert(club_id, settings);
    }

    pub fn stored_settings(&self, club_id: Uuid) -> Option<ClubSettings> {
        self.state.lock().settings.get(&club_id).cloned()
    }

    /// Make settings reads fail as if the store were down
    pub fn fail_settings_reads(&self, fail: bool) {
        self.state.lock().fail_settings = fail;
    }

    /// Open a membership with `balance` as an opening deposit
    pub fn open(&self, member_id: Uuid, club_id: Uuid, balance: Decimal) {
        let mut state = self.state.lock();
        let now = Utc::now();
        state.memberships.insert(
            (member_id, club_id),
            Membership {
                member_id,
                club_id,
                credit_balance: Decimal::ZERO,
                created_at: now,
                updated_at: now,
            },
        );
        if balance > Decimal::ZERO {
            let opening = PostingRequest::deposit(member_id, club_id, balance)
                .with_reference(ReferenceType::Opening, None);
            state.post(&opening).expect("opening deposit");
        }
    }

    pub fn balance(&self, member_id: Uuid, club_id: Uuid) -> Decimal {
        self.state
            .lock()
            .balance(member_id, club_id)
            .expect("membership opened")
    }

    /// Overwrite the cached balance without a transaction
    pub fn corrupt_balance(&self, member_id: Uuid, club_id: Uuid, balance: Decimal) {
        if let Some(m) = self.state.lock().memberships.get_mut(&(member_id, club_id)) {
            m.credit_balance = balance;
        }
    }

    pub fn transactions_for(&self, reference_id: Uuid) -> Vec<CreditTransaction> {
        self.state
            .lock()
            .transactions
            .iter()
            .filter(|t| t.reference_id == Some(reference_id))
            .cloned()
            .collect()
    }

    pub fn reservation(&self, id: Uuid) -> Option<Reservation> {
        self.state.lock().reservations.get(&id).cloned()
    }
}

#[async_trait]
impl SettingsRepository for MemoryStore {
    async fn find_by_club(&self, club_id: Uuid) -> AppResult<Option<ClubSettings>> {
        let state = self.state.lock();
        if state.fail_settings {
            return Err(AppError::Database("settings store offline".to_string()));
        }
        Ok(state.settings.get(&club_id).cloned())
    }

    async fn upsert(
        &self,
        club_id: Uuid,
        settings: &ClubSettings,
        _actor: Option<Uuid>,
    ) -> AppResult<ClubSettings> {
        self.state.lock().settings.insert(club_id, settings.clone());
        Ok(settings.clone())
    }
}

#[async_trait]
impl ReservationRepository for MemoryStore {
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<Reservation>> {
        Ok(self.reservation(id))
    }

    async fn find_active_on(&self, club_id: Uuid, date: NaiveDate) -> AppResult<Vec<Reservation>> {
        let mut day: Vec<Reservation> = self
            .state
            .lock()
            .reservations
            .values()
            .filter(|r| r.club_id == club_id && r.date == date && r.status.is_active())
            .cloned()
            .collect();
        day.sort_by_key(|r| r.start_hour);
        Ok(day)
    }

    async fn list_for_member(
        &self,
        member_id: Uuid,
        club_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> AppResult<(Vec<Reservation>, i64)> {
        let mut own: Vec<Reservation> = self
            .state
            .lock()
            .reservations
            .values()
            .filter(|r| r.member_id == member_id && r.club_id == club_id)
            .cloned()
            .collect();
        own.sort_by(|a, b| (b.date, b.start_hour).cmp(&(a.date, a.start_hour)));

        let total = own.len() as i64;
        let page = own
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect();
        Ok((page, total))
    }

    async fn insert(
        &self,
        reservation: &Reservation,
        charge: Option<&PostingRequest>,
    ) -> AppResult<BookingOutcome> {
        let mut state = self.state.lock();
        state.ensure_free(reservation)?;
        state
            .reservations
            .insert(reservation.id, reservation.clone());

        let transaction = match charge {
            Some(posting) => Some(state.post_or_restore(posting, reservation.id, None)?),
            None => None,
        };

        Ok(BookingOutcome {
            reservation: state.reservations[&reservation.id].clone(),
            transaction,
        })
    }

    async fn update_status(
        &self,
        id: Uuid,
        expected: ReservationStatus,
        to: ReservationStatus,
        actor: Option<Uuid>,
        refund: Option<&PostingRequest>,
    ) -> AppResult<(Reservation, Option<CreditTransaction>)> {
        let mut state = self.state.lock();
        state.expect_status(id, expected, to)?;

        let transaction = match refund {
            Some(posting) => Some(state.post(posting)?),
            None => None,
        };

        if let Some(reservation) = state.reservations.get_mut(&id) {
            let now = Utc::now();
            reservation.status = to;
            reservation.updated_at = now;
            if to == ReservationStatus::Cancelled {
                reservation.cancelled_at = Some(now);
                reservation.cancelled_by = actor;
            }
        }

        let reservation = state.expect_status(id, to, to)?;
        Ok((reservation, transaction))
    }

    async fn reschedule(
        &self,
        change: &RescheduleChange,
        posting: Option<&PostingRequest>,
    ) -> AppResult<(Reservation, Option<CreditTransaction>)> {
        let mut state = self.state.lock();
        let mut moved =
            state.expect_status(change.id, change.expected_status, change.expected_status)?;

        moved.date = change.date;
        moved.start_hour = change.start_hour;
        moved.duration_hours = change.duration_hours;
        moved.total_fee = change.total_fee;
        moved.payment_status = change.payment_status;
        moved.updated_at = Utc::now();
        state.ensure_free(&moved)?;
        let previous = state.reservations.insert(moved.id, moved.clone());

        let transaction = match posting {
            Some(posting) => Some(state.post_or_restore(posting, moved.id, previous)?),
            None => None,
        };

        Ok((state.reservations[&moved.id].clone(), transaction))
    }

    async fn apply_refund(
        &self,
        id: Uuid,
        refund: &PostingRequest,
    ) -> AppResult<(Reservation, CreditTransaction)> {
        let mut state = self.state.lock();
        if !state.reservations.contains_key(&id) {
            return Err(AppError::ReservationNotFound(id));
        }

        let posted = state.post(refund)?;
        Ok((state.reservations[&id].clone(), posted))
    }

    async fn refund_window(&self, id: Uuid) -> AppResult<RefundWindow> {
        let (window, _) = self.state.lock().reservation_window(id)?;
        Ok(window)
    }
}

#[async_trait]
impl CreditLedgerRepository for MemoryStore {
    async fn open_membership(
        &self,
        member_id: Uuid,
        club_id: Uuid,
        initial_credit: Decimal,
        actor: Option<Uuid>,
    ) -> AppResult<(Membership, Option<CreditTransaction>)> {
        let mut state = self.state.lock();
        if state.memberships.contains_key(&(member_id, club_id)) {
            return Err(AppError::AlreadyExists(format!(
                "Membership of {} in club {}",
                member_id, club_id
            )));
        }

        let now = Utc::now();
        state.memberships.insert(
            (member_id, club_id),
            Membership {
                member_id,
                club_id,
                credit_balance: Decimal::ZERO,
                created_at: now,
                updated_at: now,
            },
        );

        let opening = if initial_credit > Decimal::ZERO {
            let request = PostingRequest::deposit(member_id, club_id, initial_credit)
                .with_reference(ReferenceType::Opening, None)
                .by(actor);
            Some(state.post(&request)?)
        } else {
            None
        };

        let membership = state.memberships[&(member_id, club_id)].clone();
        Ok((membership, opening))
    }

    async fn find_membership(&self, member_id: Uuid, club_id: Uuid) -> AppResult<Option<Membership>> {
        Ok(self.state.lock().memberships.get(&(member_id, club_id)).cloned())
    }

    async fn post(&self, request: &PostingRequest) -> AppResult<CreditTransaction> {
        self.state.lock().post(request)
    }

    async fn create_pending(&self, request: &PostingRequest) -> AppResult<CreditTransaction> {
        let mut state = self.state.lock();
        state.balance(request.member_id, request.club_id)?;
        let tx = ledger::plan_pending_deposit(request)?;
        Ok(state.apply(tx))
    }

    async fn settle_pending(
        &self,
        transaction_id: Uuid,
        to: TransactionStatus,
        actor: Option<Uuid>,
    ) -> AppResult<CreditTransaction> {
        let mut state = self.state.lock();
        let index = state
            .transactions
            .iter()
            .position(|t| t.id == transaction_id)
            .ok_or(AppError::TransactionNotFound(transaction_id))?;

        let pending = state.transactions[index].clone();
        let balance = state.balance(pending.member_id, pending.club_id)?;
        let settled = ledger::settle_pending(&pending, balance, to, actor)?;

        if let (Some(after), Some(membership)) = (
            settled.balance_after,
            state.memberships.get_mut(&(pending.member_id, pending.club_id)),
        ) {
            membership.credit_balance = after;
        }
        state.transactions[index] = settled.clone();
        Ok(settled)
    }

    async fn find_transaction(&self, id: Uuid) -> AppResult<Option<CreditTransaction>> {
        Ok(self
            .state
            .lock()
            .transactions
            .iter()
            .find(|t| t.id == id)
            .cloned())
    }

    async fn list_for_member(
        &self,
        member_id: Uuid,
        club_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> AppResult<(Vec<CreditTransaction>, i64)> {
        let own: Vec<CreditTransaction> = self
            .state
            .lock()
            .transactions
            .iter()
            .rev()
            .filter(|t| t.member_id == member_id && t.club_id == club_id)
            .cloned()
            .collect();

        let total = own.len() as i64;
        let page = own
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect();
        Ok((page, total))
    }

    async fn reconcile(&self, member_id: Uuid, club_id: Uuid) -> AppResult<Reconciliation> {
        let state = self.state.lock();
        let cached = state.balance(member_id, club_id)?;
        let own: Vec<&CreditTransaction> = state
            .transactions
            .iter()
            .filter(|t| t.member_id == member_id && t.club_id == club_id)
            .collect();

        Ok(Reconciliation::new(
            member_id,
            club_id,
            cached,
            ledger::ledger_balance(own.iter().copied()),
            own.len() as i64,
        ))
    }
}

/// Wraps a store and hides existing reservations from availability reads,
/// as a concurrent request holding a stale snapshot would see them
pub struct StaleReads(pub std::sync::Arc<MemoryStore>);

#[async_trait]
impl ReservationRepository for StaleReads {
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<Reservation>> {
        self.0.find_by_id(id).await
    }

    async fn find_active_on(&self, _club_id: Uuid, _date: NaiveDate) -> AppResult<Vec<Reservation>> {
        Ok(Vec::new())
    }

    async fn list_for_member(
        &self,
        member_id: Uuid,
        club_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> AppResult<(Vec<Reservation>, i64)> {
        ReservationRepository::list_for_member(&*self.0, member_id, club_id, limit, offset).await
    }

    async fn insert(
        &self,
        reservation: &Reservation,
        charge: Option<&PostingRequest>,
    ) -> AppResult<BookingOutcome> {
        self.0.insert(reservation, charge).await
    }

    async fn update_status(
        &self,
        id: Uuid,
        expected: ReservationStatus,
        to: ReservationStatus,
        actor: Option<Uuid>,
        refund: Option<&PostingRequest>,
    ) -> AppResult<(Reservation, Option<CreditTransaction>)> {
        self.0.update_status(id, expected, to, actor, refund).await
    }

    async fn reschedule(
        &self,
        change: &RescheduleChange,
        posting: Option<&PostingRequest>,
    ) -> AppResult<(Reservation, Option<CreditTransaction>)> {
        self.0.reschedule(change, posting).await
    }

    async fn apply_refund(
        &self,
        id: Uuid,
        refund: &PostingRequest,
    ) -> AppResult<(Reservation, CreditTransaction)> {
        self.0.apply_refund(id, refund).await
    }

    async fn refund_window(&self, id: Uuid) -> AppResult<RefundWindow> {
        self.0.refund_window(id).await
    }
}
