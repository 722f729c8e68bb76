//! Club settings handlers

use crate::dto::{ApiResponse, UpdateSettingsRequest};
use crate::state::AppState;
use actix_web::{web, HttpResponse};
use clubcourt_core::AppError;
use tracing::instrument;
use uuid::Uuid;

/// Current settings of a club
///
/// GET /api/v1/clubs/{club_id}/settings
#[instrument(skip(state))]
pub async fn get_settings(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let settings = state.settings.get(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(settings)))
}

/// Replace the settings of a club
///
/// PUT /api/v1/clubs/{club_id}/settings
#[instrument(skip(state, req))]
pub async fn update_settings(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
    req: web::Json<UpdateSettingsRequest>,
) -> Result<HttpResponse, AppError> {
    let req = req.into_inner();
    let settings = state
        .settings
        .update(path.into_inner(), req.settings, req.actor_id)
        .await?;

    Ok(HttpResponse::Ok().json(ApiResponse::with_message(settings, "Settings updated")))
}

/// Configure settings routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/clubs/{club_id}/settings", web::get().to(get_settings))
        .route("/clubs/{club_id}/settings", web::put().to(update_settings));
}
