//! Customer-facing handlers
//!
//! The public tracking page and rating submission. These endpoints take
//! no agent identity; the delivery id in the tracking link is the only
//! credential, so responses never include OTPs or contact details
//! beyond the agent's first name.

use actix_web::{web, HttpResponse};
use serde::Serialize;

use crate::error::AppError;
use crate::models::SubmitRatingRequest;
use crate::services::rating::RatingError;
use crate::services::{DeliveryService, RatingService};
use crate::AppState;

use super::deliveries::map_delivery_error;

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

/// GET /track/{deliveryId}
///
/// Public tracking view: the status timeline, the agent's first name
/// and vehicle, the last recorded position and whether a rating was
/// already left.
pub async fn track_delivery(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let delivery_id = path.into_inner();
    let service = DeliveryService::new(state.db.clone());

    let response = service
        .track(&delivery_id)
        .await
        .map_err(map_delivery_error)?;

    Ok(HttpResponse::Ok().json(ApiResponse::new(response)))
}

/// POST /track/{deliveryId}/rating
///
/// Submit the customer's rating for a completed delivery. One rating
/// per delivery; the agent's average is updated in the same
/// transaction.
pub async fn submit_rating(
    state: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<SubmitRatingRequest>,
) -> Result<HttpResponse, AppError> {
    let delivery_id = path.into_inner();
    let service = RatingService::new(state.db.clone());

    let response = service
        .submit(&delivery_id, body.rating, body.feedback.as_deref())
        .await
        .map_err(map_rating_error)?;

    Ok(HttpResponse::Created().json(ApiResponse::new(response)))
}

/// Map rating errors to application errors
pub(super) fn map_rating_error(e: RatingError) -> AppError {
    match e {
        RatingError::DeliveryNotFound(id) => {
            AppError::NotFound(format!("Delivery not found: {id}"))
        }
        RatingError::AgentNotFound(id) => AppError::NotFound(format!("Agent not found: {id}")),
        RatingError::NotDelivered(id) => {
            AppError::Conflict(format!("Delivery {id} has not been delivered yet"))
        }
        RatingError::AlreadyRated(id) => {
            AppError::Conflict(format!("Delivery {id} is already rated"))
        }
        RatingError::InvalidRating(_) => AppError::Validation(e.to_string()),
        RatingError::InvalidFeedback(msg) => AppError::Validation(msg),
        RatingError::Database(e) => AppError::Database(e),
    }
}

/// Configure customer routes
pub fn configure_customer_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/track")
            .route("/{deliveryId}", web::get().to(track_delivery))
            .route("/{deliveryId}/rating", web::post().to(submit_rating)),
    );
}
