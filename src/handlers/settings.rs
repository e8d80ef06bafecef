//! Settings handlers
//!
//! HTTP handlers for reading and updating the platform fee
//! configuration.

use actix_web::{web, HttpResponse};
use serde::Serialize;

use crate::error::AppError;
use crate::models::UpdateSettingsRequest;
use crate::services::settings::SettingsError;
use crate::services::SettingsService;
use crate::AppState;

/// Standard API response wrapper
#[derive(Serialize)]
struct ApiResponse<T: Serialize> {
    data: T,
    meta: ResponseMeta,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ResponseMeta {
    request_id: String,
}

impl<T: Serialize> ApiResponse<T> {
    fn new(data: T) -> Self {
        Self {
            data,
            meta: ResponseMeta {
                request_id: uuid::Uuid::new_v4().to_string(),
            },
        }
    }
}

/// GET /settings
pub async fn get_settings(state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let service = SettingsService::new(state.db.clone());

    let settings = service.get().await.map_err(map_settings_error)?;

    Ok(HttpResponse::Ok().json(ApiResponse::new(settings)))
}

/// PUT /settings
///
/// Partial update: absent fields keep their current values. The merged
/// result is validated before it is written.
pub async fn update_settings(
    state: web::Data<AppState>,
    body: web::Json<UpdateSettingsRequest>,
) -> Result<HttpResponse, AppError> {
    let service = SettingsService::new(state.db.clone());

    let settings = service
        .update(body.into_inner())
        .await
        .map_err(map_settings_error)?;

    Ok(HttpResponse::Ok().json(ApiResponse::new(settings)))
}

/// Map settings errors to application errors
fn map_settings_error(e: SettingsError) -> AppError {
    match e {
        SettingsError::InvalidSettings(msg) => AppError::Validation(msg),
        SettingsError::Database(e) => AppError::Database(e),
    }
}

/// Configure settings routes
pub fn configure_settings_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/settings")
            .route(web::get().to(get_settings))
            .route(web::put().to(update_settings)),
    );
}
