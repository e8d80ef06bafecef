//! Delivery handlers
//!
//! HTTP handlers for the delivery lifecycle: creation, the agent's list
//! and dashboard, the OTP-verified transitions and the tracking log.

use actix_web::{web, HttpResponse};
use chrono::NaiveDate;
use serde::Serialize;

use crate::error::AppError;
use crate::models::{
    AgentActionRequest, CancelDeliveryRequest, CreateDeliveryRequest, DashboardQuery,
    DeliveryListQuery, PaginationParams, StatusFilter, TrackingHistoryQuery,
    TrackingHistoryResponse, VerifyOtpRequest,
};
use crate::services::delivery::DeliveryError;
use crate::services::settings::SettingsError;
use crate::services::tracking::TrackingError;
use crate::services::{DeliveryService, TrackingService};
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

/// POST /deliveries
///
/// Create a delivery for an order and assign it to an available agent.
pub async fn create_delivery(
    state: web::Data<AppState>,
    body: web::Json<CreateDeliveryRequest>,
) -> Result<HttpResponse, AppError> {
    let service = DeliveryService::new(state.db.clone());

    let response = service
        .create(body.into_inner())
        .await
        .map_err(map_delivery_error)?;

    Ok(HttpResponse::Created().json(ApiResponse::new(response)))
}

/// GET /deliveries?agentId=&status=&dateFrom=&dateTo=&page=&perPage=
///
/// The agent's deliveries, newest first. `status` takes a filter group
/// (active, pending, in_progress, completed, problematic); the group
/// counts in the response always cover all of the agent's deliveries.
pub async fn list_deliveries(
    state: web::Data<AppState>,
    query: web::Query<DeliveryListQuery>,
) -> Result<HttpResponse, AppError> {
    let query = query.into_inner();

    let filter = match &query.status {
        Some(s) => Some(s.parse::<StatusFilter>().map_err(|e| {
            AppError::Validation(format!(
                "Invalid status parameter: {e}. Valid values are: active, pending, \
                 in_progress, completed, problematic"
            ))
        })?),
        None => None,
    };
    let date_from = parse_date_param(query.date_from.as_deref(), "dateFrom")?;
    let date_to = parse_date_param(query.date_to.as_deref(), "dateTo")?;

    let params = PaginationParams {
        page: query.page,
        per_page: query.per_page,
        search: None,
    };

    let service = DeliveryService::new(state.db.clone());
    let response = service
        .list(&query.agent_id, filter, date_from, date_to, &params)
        .await
        .map_err(map_delivery_error)?;

    Ok(HttpResponse::Ok().json(ApiResponse::new(response)))
}

/// GET /deliveries/{deliveryId}
///
/// Full detail: the delivery, its agent, recent tracking, issues and the
/// rating when one exists.
pub async fn get_delivery(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let delivery_id = path.into_inner();
    let service = DeliveryService::new(state.db.clone());

    let response = service
        .get_detail(&delivery_id)
        .await
        .map_err(map_delivery_error)?;

    Ok(HttpResponse::Ok().json(ApiResponse::new(response)))
}

/// POST /deliveries/{deliveryId}/accept
pub async fn accept_delivery(
    state: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<AgentActionRequest>,
) -> Result<HttpResponse, AppError> {
    let delivery_id = path.into_inner();
    let service = DeliveryService::new(state.db.clone());

    let response = service
        .accept(&delivery_id, &body.agent_id)
        .await
        .map_err(map_delivery_error)?;

    Ok(HttpResponse::Ok().json(ApiResponse::new(response)))
}

/// POST /deliveries/{deliveryId}/arrive-at-store
pub async fn arrive_at_store(
    state: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<AgentActionRequest>,
) -> Result<HttpResponse, AppError> {
    let delivery_id = path.into_inner();
    let service = DeliveryService::new(state.db.clone());

    let response = service
        .arrive_at_store(&delivery_id, &body.agent_id)
        .await
        .map_err(map_delivery_error)?;

    Ok(HttpResponse::Ok().json(ApiResponse::new(response)))
}

/// POST /deliveries/{deliveryId}/verify-store-pickup
///
/// Confirms the handoff from the store with the store's OTP.
pub async fn verify_store_pickup(
    state: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<VerifyOtpRequest>,
) -> Result<HttpResponse, AppError> {
    let delivery_id = path.into_inner();
    let service = DeliveryService::new(state.db.clone());

    let response = service
        .verify_store_pickup(&delivery_id, &body.agent_id, &body.otp)
        .await
        .map_err(map_delivery_error)?;

    Ok(HttpResponse::Ok().json(ApiResponse::new(response)))
}

/// POST /deliveries/{deliveryId}/start-transit
pub async fn start_transit(
    state: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<AgentActionRequest>,
) -> Result<HttpResponse, AppError> {
    let delivery_id = path.into_inner();
    let service = DeliveryService::new(state.db.clone());

    let response = service
        .start_transit(&delivery_id, &body.agent_id)
        .await
        .map_err(map_delivery_error)?;

    Ok(HttpResponse::Ok().json(ApiResponse::new(response)))
}

/// POST /deliveries/{deliveryId}/verify-customer-delivery
///
/// Confirms the handoff to the customer with the customer's OTP and
/// completes the delivery.
pub async fn verify_customer_delivery(
    state: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<VerifyOtpRequest>,
) -> Result<HttpResponse, AppError> {
    let delivery_id = path.into_inner();
    let service = DeliveryService::new(state.db.clone());

    let response = service
        .verify_customer_delivery(&delivery_id, &body.agent_id, &body.otp)
        .await
        .map_err(map_delivery_error)?;

    Ok(HttpResponse::Ok().json(ApiResponse::new(response)))
}

/// POST /deliveries/{deliveryId}/cancel
pub async fn cancel_delivery(
    state: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<CancelDeliveryRequest>,
) -> Result<HttpResponse, AppError> {
    let delivery_id = path.into_inner();
    let service = DeliveryService::new(state.db.clone());

    let response = service
        .cancel(&delivery_id, &body.agent_id, &body.reason)
        .await
        .map_err(map_delivery_error)?;

    Ok(HttpResponse::Ok().json(ApiResponse::new(response)))
}

/// GET /deliveries/{deliveryId}/tracking?limit=
///
/// The delivery's tracking history, newest first.
pub async fn get_tracking(
    state: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<TrackingHistoryQuery>,
) -> Result<HttpResponse, AppError> {
    let delivery_id = path.into_inner();
    let service = TrackingService::new(state.db.clone());

    let points = service
        .history(&delivery_id, query.limit)
        .await
        .map_err(map_tracking_error)?;

    Ok(HttpResponse::Ok().json(ApiResponse::new(TrackingHistoryResponse {
        delivery_id,
        points,
    })))
}

/// GET /dashboard?agentId=
///
/// The agent's operational snapshot: availability, in-flight counts,
/// today's and all-time figures.
pub async fn get_dashboard(
    state: web::Data<AppState>,
    query: web::Query<DashboardQuery>,
) -> Result<HttpResponse, AppError> {
    let service = DeliveryService::new(state.db.clone());

    let response = service
        .dashboard(&query.agent_id)
        .await
        .map_err(map_delivery_error)?;

    Ok(HttpResponse::Ok().json(ApiResponse::new(response)))
}

/// Parse a `YYYY-MM-DD` query parameter
pub(super) fn parse_date_param(
    value: Option<&str>,
    name: &str,
) -> Result<Option<NaiveDate>, AppError> {
    match value {
        None => Ok(None),
        Some(raw) => NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .map(Some)
            .map_err(|_| {
                AppError::Validation(format!("Invalid {name}: expected YYYY-MM-DD, got '{raw}'"))
            }),
    }
}

/// Map delivery errors to application errors
pub(super) fn map_delivery_error(e: DeliveryError) -> AppError {
    match e {
        DeliveryError::DeliveryNotFound(id) => AppError::NotFound(format!("Delivery not found: {id}")),
        DeliveryError::AgentNotFound(id) => AppError::NotFound(format!("Agent not found: {id}")),
        DeliveryError::InvalidOrder(msg) => AppError::Validation(msg),
        DeliveryError::DuplicateOrder(id) => {
            AppError::Conflict(format!("Order {id} already has a delivery"))
        }
        DeliveryError::NoAgentAvailable => {
            AppError::Conflict("No agents available to take this order".to_string())
        }
        DeliveryError::NotOwner {
            delivery_id,
            agent_id,
        } => AppError::Forbidden(format!(
            "Delivery {delivery_id} is not assigned to agent {agent_id}"
        )),
        DeliveryError::InvalidTransition {
            delivery_id,
            from,
            to,
        } => AppError::Conflict(format!("Delivery {delivery_id} cannot move from {from} to {to}")),
        DeliveryError::IncorrectOtp(id) => {
            AppError::Validation(format!("Incorrect OTP for delivery {id}"))
        }
        DeliveryError::InvalidReason(msg) => AppError::Validation(msg),
        DeliveryError::InvalidDateRange(msg) => AppError::Validation(msg),
        DeliveryError::Settings(e) => match e {
            SettingsError::InvalidSettings(msg) => AppError::Validation(msg),
            SettingsError::Database(e) => AppError::Database(e),
        },
        DeliveryError::Database(e) => AppError::Database(e),
    }
}

/// Map tracking errors to application errors
fn map_tracking_error(e: TrackingError) -> AppError {
    match e {
        TrackingError::DeliveryNotFound(id) => {
            AppError::NotFound(format!("Delivery not found: {id}"))
        }
        TrackingError::InvalidCoordinates(msg) => AppError::Validation(msg),
        TrackingError::Database(e) => AppError::Database(e),
    }
}

/// Configure delivery routes
pub fn configure_delivery_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/dashboard").route(web::get().to(get_dashboard)));
    cfg.service(
        web::scope("/deliveries")
            .route("", web::post().to(create_delivery))
            .route("", web::get().to(list_deliveries))
            .route("/{deliveryId}", web::get().to(get_delivery))
            .route("/{deliveryId}/accept", web::post().to(accept_delivery))
            .route("/{deliveryId}/arrive-at-store", web::post().to(arrive_at_store))
            .route(
                "/{deliveryId}/verify-store-pickup",
                web::post().to(verify_store_pickup),
            )
            .route("/{deliveryId}/start-transit", web::post().to(start_transit))
            .route(
                "/{deliveryId}/verify-customer-delivery",
                web::post().to(verify_customer_delivery),
            )
            .route("/{deliveryId}/cancel", web::post().to(cancel_delivery))
            .route("/{deliveryId}/tracking", web::get().to(get_tracking))
            .route(
                "/{deliveryId}/issues",
                web::post().to(super::issues::report_issue),
            )
            .route(
                "/{deliveryId}/issues",
                web::get().to(super::issues::list_issues),
            ),
    );
}
