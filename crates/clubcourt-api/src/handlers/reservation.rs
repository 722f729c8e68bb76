//! Reservation handlers
//!
//! HTTP handlers for booking, availability and reservation lifecycle endpoints.

use crate::dto::{
    ActorRequest, ApiResponse, AvailabilityQuery, BlockSlotRequest, BookingResponse,
    CompleteRequest, CreateReservationRequest, PaginationParams, QuoteRequest, RefundRequest,
    RescheduleRequest, ReservationResponse, TransactionResponse,
};
use crate::state::AppState;
use actix_web::{web, HttpResponse};
use clubcourt_core::AppError;
use tracing::{debug, instrument, warn};
use uuid::Uuid;
use validator::Validate;

/// Book a court
///
/// POST /api/v1/clubs/{club_id}/reservations
#[instrument(skip(state, req))]
pub async fn create_reservation(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
    req: web::Json<CreateReservationRequest>,
) -> Result<HttpResponse, AppError> {
    req.validate().map_err(|e| {
        warn!("Reservation validation failed: {}", e);
        AppError::Validation(e.to_string())
    })?;

    let club_id = path.into_inner();
    let outcome = state
        .lifecycle
        .create_reservation(req.into_inner().into_booking(club_id))
        .await?;

    Ok(HttpResponse::Created().json(ApiResponse::with_message(
        BookingResponse::from(outcome),
        "Reservation created",
    )))
}

/// Price a booking without reserving
///
/// POST /api/v1/clubs/{club_id}/quote
#[instrument(skip(state, req))]
pub async fn quote(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
    req: web::Json<QuoteRequest>,
) -> Result<HttpResponse, AppError> {
    req.validate()?;

    let quote = state
        .lifecycle
        .quote(
            path.into_inner(),
            req.member_id,
            req.start_hour,
            req.duration_hours,
            &req.roster,
        )
        .await?;

    Ok(HttpResponse::Ok().json(ApiResponse::success(quote)))
}

/// Hour-by-hour availability
///
/// GET /api/v1/clubs/{club_id}/availability?date=YYYY-MM-DD
#[instrument(skip(state))]
pub async fn get_availability(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
    query: web::Query<AvailabilityQuery>,
) -> Result<HttpResponse, AppError> {
    let hours = state
        .lifecycle
        .get_availability(path.into_inner(), query.date)
        .await?;

    Ok(HttpResponse::Ok().json(ApiResponse::success(hours)))
}

/// Block a slot
///
/// POST /api/v1/clubs/{club_id}/blocks
#[instrument(skip(state, req))]
pub async fn block_slot(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
    req: web::Json<BlockSlotRequest>,
) -> Result<HttpResponse, AppError> {
    req.validate()?;
    let req = req.into_inner();

    let block = state
        .lifecycle
        .block_slot(
            path.into_inner(),
            req.date,
            req.start_hour,
            req.duration_hours,
            req.admin_id,
            req.reason,
        )
        .await?;

    Ok(HttpResponse::Created().json(ApiResponse::with_message(
        ReservationResponse::from(block),
        "Slot blocked",
    )))
}

/// Reservations of a member
///
/// GET /api/v1/clubs/{club_id}/members/{member_id}/reservations
#[instrument(skip(state))]
pub async fn list_member_reservations(
    state: web::Data<AppState>,
    path: web::Path<(Uuid, Uuid)>,
    query: web::Query<PaginationParams>,
) -> Result<HttpResponse, AppError> {
    query.validate().map_err(|e| {
        warn!("Pagination validation failed: {}", e);
        AppError::Validation(e.to_string())
    })?;

    let (club_id, member_id) = path.into_inner();
    debug!(page = query.page, per_page = query.per_page, "Listing reservations");

    let page = state
        .lifecycle
        .list_member_reservations(member_id, club_id, &query.to_pagination())
        .await?;

    let data: Vec<ReservationResponse> = page.data.into_iter().map(Into::into).collect();
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "data": data,
        "pagination": page.pagination,
    })))
}

/// Get a reservation
///
/// GET /api/v1/reservations/{id}
#[instrument(skip(state))]
pub async fn get_reservation(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let reservation = state.lifecycle.get_reservation(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(ReservationResponse::from(reservation))))
}

/// Cancel a reservation
///
/// POST /api/v1/reservations/{id}/cancel
#[instrument(skip(state, req))]
pub async fn cancel_reservation(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
    req: web::Json<ActorRequest>,
) -> Result<HttpResponse, AppError> {
    let outcome = state
        .lifecycle
        .cancel_reservation(path.into_inner(), req.actor_id)
        .await?;

    Ok(HttpResponse::Ok().json(ApiResponse::with_message(
        BookingResponse::from(outcome),
        "Reservation cancelled",
    )))
}

/// Confirm a pending reservation
///
/// POST /api/v1/reservations/{id}/confirm
#[instrument(skip(state, req))]
pub async fn confirm_reservation(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
    req: web::Json<ActorRequest>,
) -> Result<HttpResponse, AppError> {
    let reservation = state
        .lifecycle
        .confirm(path.into_inner(), req.actor_id)
        .await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(ReservationResponse::from(reservation))))
}

/// Mark a reservation as completed
///
/// POST /api/v1/reservations/{id}/complete
#[instrument(skip(state, req))]
pub async fn complete_reservation(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
    req: web::Json<CompleteRequest>,
) -> Result<HttpResponse, AppError> {
    let req = req.into_inner();
    let reservation = state
        .lifecycle
        .complete(path.into_inner(), req.result, req.actor_id)
        .await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(ReservationResponse::from(reservation))))
}

/// Mark a reservation as no-show
///
/// POST /api/v1/reservations/{id}/no-show
#[instrument(skip(state, req))]
pub async fn mark_no_show(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
    req: web::Json<ActorRequest>,
) -> Result<HttpResponse, AppError> {
    let reservation = state
        .lifecycle
        .mark_no_show(path.into_inner(), req.actor_id)
        .await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(ReservationResponse::from(reservation))))
}

/// Move a reservation
///
/// POST /api/v1/reservations/{id}/reschedule
#[instrument(skip(state, req))]
pub async fn reschedule_reservation(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
    req: web::Json<RescheduleRequest>,
) -> Result<HttpResponse, AppError> {
    req.validate()?;

    let outcome = state
        .lifecycle
        .reschedule(
            path.into_inner(),
            req.date,
            req.start_hour,
            req.duration_hours,
            req.actor_id,
        )
        .await?;

    Ok(HttpResponse::Ok().json(ApiResponse::with_message(
        BookingResponse::from(outcome),
        "Reservation rescheduled",
    )))
}

/// Refund part of a reservation fee
///
/// POST /api/v1/reservations/{id}/refunds
#[instrument(skip(state, req))]
pub async fn refund_reservation(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
    req: web::Json<RefundRequest>,
) -> Result<HttpResponse, AppError> {
    req.validate()?;

    let tx = state
        .lifecycle
        .refund_credit(path.into_inner(), req.amount, &req.reason, req.admin_id)
        .await?;

    Ok(HttpResponse::Created().json(ApiResponse::with_message(
        TransactionResponse::from(tx),
        "Refund posted",
    )))
}

/// Configure reservation routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route(
        "/clubs/{club_id}/reservations",
        web::post().to(create_reservation),
    )
    .route("/clubs/{club_id}/quote", web::post().to(quote))
    .route(
        "/clubs/{club_id}/availability",
        web::get().to(get_availability),
    )
    .route("/clubs/{club_id}/blocks", web::post().to(block_slot))
    .route(
        "/clubs/{club_id}/members/{member_id}/reservations",
        web::get().to(list_member_reservations),
    )
    .service(
        web::scope("/reservations")
            .route("/{id}", web::get().to(get_reservation))
            .route("/{id}/cancel", web::post().to(cancel_reservation))
            .route("/{id}/confirm", web::post().to(confirm_reservation))
            .route("/{id}/complete", web::post().to(complete_reservation))
            .route("/{id}/no-show", web::post().to(mark_no_show))
            .route("/{id}/reschedule", web::post().to(reschedule_reservation))
            .route("/{id}/refunds", web::post().to(refund_reservation)),
    );
}
