//! Credit handlers
//!
//! HTTP handlers for memberships, deposits, adjustments and ledger queries.

use crate::dto::{
    AdjustmentRequest, AdminRequest, ApiResponse, BalanceResponse, DepositRequest,
    MembershipResponse, OpenMembershipRequest, PaginationParams, TransactionResponse,
};
use crate::state::AppState;
use actix_web::{web, HttpResponse};
use clubcourt_core::AppError;
use serde_json::json;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

/// Open a membership
///
/// POST /api/v1/clubs/{club_id}/members
#[instrument(skip(state, req))]
pub async fn open_membership(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
    req: web::Json<OpenMembershipRequest>,
) -> Result<HttpResponse, AppError> {
    let club_id = path.into_inner();

    let initial_credit = match req.initial_credit {
        Some(amount) => amount,
        None => state.settings.get(club_id).await?.initial_credit_balance,
    };

    let (membership, opening) = state
        .ledger
        .open_membership(req.member_id, club_id, initial_credit, req.actor_id)
        .await?;

    info!(member_id = %req.member_id, %club_id, "Membership opened");

    Ok(HttpResponse::Created().json(ApiResponse::with_message(
        json!({
            "membership": MembershipResponse::from(membership),
            "opening_transaction": opening.map(TransactionResponse::from),
        }),
        "Membership opened",
    )))
}

/// Current balance
///
/// GET /api/v1/clubs/{club_id}/members/{member_id}/balance
#[instrument(skip(state))]
pub async fn get_balance(
    state: web::Data<AppState>,
    path: web::Path<(Uuid, Uuid)>,
) -> Result<HttpResponse, AppError> {
    let (club_id, member_id) = path.into_inner();
    let credit_balance = state.ledger.balance(member_id, club_id).await?;

    Ok(HttpResponse::Ok().json(ApiResponse::success(BalanceResponse {
        member_id,
        club_id,
        credit_balance,
    })))
}

/// Ledger history, newest first
///
/// GET /api/v1/clubs/{club_id}/members/{member_id}/transactions
#[instrument(skip(state))]
pub async fn list_transactions(
    state: web::Data<AppState>,
    path: web::Path<(Uuid, Uuid)>,
    query: web::Query<PaginationParams>,
) -> Result<HttpResponse, AppError> {
    query.validate().map_err(|e| {
        warn!("Pagination validation failed: {}", e);
        AppError::Validation(e.to_string())
    })?;

    let (club_id, member_id) = path.into_inner();
    debug!(page = query.page, per_page = query.per_page, "Listing transactions");

    let page = state
        .ledger
        .history(member_id, club_id, &query.to_pagination())
        .await?;

    let data: Vec<TransactionResponse> = page.data.into_iter().map(Into::into).collect();
    Ok(HttpResponse::Ok().json(json!({
        "data": data,
        "pagination": page.pagination,
    })))
}

/// Compare the cached balance with the ledger
///
/// GET /api/v1/clubs/{club_id}/members/{member_id}/reconcile
#[instrument(skip(state))]
pub async fn reconcile(
    state: web::Data<AppState>,
    path: web::Path<(Uuid, Uuid)>,
) -> Result<HttpResponse, AppError> {
    let (club_id, member_id) = path.into_inner();
    let report = state.ledger.reconcile(member_id, club_id).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(report)))
}

/// Register a pending deposit
///
/// POST /api/v1/clubs/{club_id}/members/{member_id}/deposits
#[instrument(skip(state, req))]
pub async fn create_deposit(
    state: web::Data<AppState>,
    path: web::Path<(Uuid, Uuid)>,
    req: web::Json<DepositRequest>,
) -> Result<HttpResponse, AppError> {
    let (club_id, member_id) = path.into_inner();

    let tx = state
        .ledger
        .deposit_credit(member_id, club_id, req.amount, req.method, req.actor_id)
        .await?;

    Ok(HttpResponse::Created().json(ApiResponse::with_message(
        TransactionResponse::from(tx),
        "Deposit pending confirmation",
    )))
}

/// Admin adjustment
///
/// POST /api/v1/clubs/{club_id}/members/{member_id}/adjustments
#[instrument(skip(state, req))]
pub async fn create_adjustment(
    state: web::Data<AppState>,
    path: web::Path<(Uuid, Uuid)>,
    req: web::Json<AdjustmentRequest>,
) -> Result<HttpResponse, AppError> {
    req.validate().map_err(|e| {
        warn!("Adjustment validation failed: {}", e);
        AppError::Validation(e.to_string())
    })?;

    let (club_id, member_id) = path.into_inner();
    let tx = state
        .ledger
        .adjust_credit(
            member_id,
            club_id,
            req.amount,
            req.direction,
            &req.reason,
            req.admin_id,
        )
        .await?;

    Ok(HttpResponse::Created().json(ApiResponse::with_message(
        TransactionResponse::from(tx),
        "Adjustment posted",
    )))
}

/// Confirm a pending deposit
///
/// POST /api/v1/transactions/{id}/record
#[instrument(skip(state, req))]
pub async fn record_deposit(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
    req: web::Json<AdminRequest>,
) -> Result<HttpResponse, AppError> {
    let tx = state
        .ledger
        .record_deposit(path.into_inner(), req.admin_id)
        .await?;
    Ok(HttpResponse::Ok().json(ApiResponse::with_message(
        TransactionResponse::from(tx),
        "Deposit recorded",
    )))
}

/// Reject a pending deposit
///
/// POST /api/v1/transactions/{id}/reject
#[instrument(skip(state, req))]
pub async fn reject_deposit(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
    req: web::Json<AdminRequest>,
) -> Result<HttpResponse, AppError> {
    let tx = state
        .ledger
        .reject_deposit(path.into_inner(), req.admin_id)
        .await?;
    Ok(HttpResponse::Ok().json(ApiResponse::with_message(
        TransactionResponse::from(tx),
        "Deposit rejected",
    )))
}

/// Configure membership and ledger routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/clubs/{club_id}/members", web::post().to(open_membership))
        .route(
            "/clubs/{club_id}/members/{member_id}/balance",
            web::get().to(get_balance),
        )
        .route(
            "/clubs/{club_id}/members/{member_id}/transactions",
            web::get().to(list_transactions),
        )
        .route(
            "/clubs/{club_id}/members/{member_id}/reconcile",
            web::get().to(reconcile),
        )
        .route(
            "/clubs/{club_id}/members/{member_id}/deposits",
            web::post().to(create_deposit),
        )
        .route(
            "/clubs/{club_id}/members/{member_id}/adjustments",
            web::post().to(create_adjustment),
        )
        .service(
            web::scope("/transactions")
                .route("/{id}/record", web::post().to(record_deposit))
                .route("/{id}/reject", web::post().to(reject_deposit)),
        );
}
