//! Agent handlers
//!
//! HTTP handlers for agent registration, profile, roster, availability,
//! location reports, service areas, earnings and ratings.

use actix_web::{web, HttpResponse};
use serde::Serialize;

use crate::error::AppError;
use crate::models::{
    EarningsQuery, PaginationParams, RegisterAgentRequest, ServiceAreasResponse,
    SetServiceAreasRequest, UpdateLocationRequest,
};
use crate::services::agent::AgentError;
use crate::services::coverage::CoverageError;
use crate::services::tracking::TrackingError;
use crate::services::{AgentService, CoverageService, DeliveryService, RatingService};
use crate::AppState;

use super::customer::map_rating_error;
use super::deliveries::{map_delivery_error, parse_date_param};

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

/// POST /agents/register
pub async fn register_agent(
    state: web::Data<AppState>,
    body: web::Json<RegisterAgentRequest>,
) -> Result<HttpResponse, AppError> {
    let service = AgentService::new(state.db.clone());

    let response = service
        .register(body.into_inner())
        .await
        .map_err(map_agent_error)?;

    Ok(HttpResponse::Created().json(ApiResponse::new(response)))
}

/// GET /agents?page=&perPage=&search=
pub async fn list_agents(
    state: web::Data<AppState>,
    query: web::Query<PaginationParams>,
) -> Result<HttpResponse, AppError> {
    let service = AgentService::new(state.db.clone());

    let response = service
        .list(&query.into_inner())
        .await
        .map_err(map_agent_error)?;

    Ok(HttpResponse::Ok().json(ApiResponse::new(response)))
}

/// GET /agents/{agentId}
///
/// Profile with derived figures: success rate, live order count and
/// whether the agent can take another order right now.
pub async fn get_agent_profile(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let agent_id = path.into_inner();
    let service = AgentService::new(state.db.clone());

    let response = service
        .get_profile(&agent_id)
        .await
        .map_err(map_agent_error)?;

    Ok(HttpResponse::Ok().json(ApiResponse::new(response)))
}

/// POST /agents/{agentId}/toggle-availability
///
/// Flip the agent's availability. Going available requires at least one
/// active service area; the action is rate limited per agent.
pub async fn toggle_availability(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let agent_id = path.into_inner();
    let service = AgentService::new(state.db.clone());

    let response = service
        .toggle_availability(&agent_id, &state.rate_limiter)
        .await
        .map_err(map_agent_error)?;

    Ok(HttpResponse::Ok().json(ApiResponse::new(response)))
}

/// POST /agents/{agentId}/update-location
///
/// Record the agent's current position; optionally appends a tracking
/// point for one of their in-flight deliveries.
pub async fn update_location(
    state: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<UpdateLocationRequest>,
) -> Result<HttpResponse, AppError> {
    let agent_id = path.into_inner();
    let service = AgentService::new(state.db.clone());

    let response = service
        .update_location(&agent_id, body.into_inner(), &state.rate_limiter)
        .await
        .map_err(map_agent_error)?;

    Ok(HttpResponse::Ok().json(ApiResponse::new(response)))
}

/// GET /agents/{agentId}/service-areas
pub async fn get_service_areas(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let agent_id = path.into_inner();
    let service = CoverageService::new(state.db.clone());

    let zip_codes = service
        .list_coverage(&agent_id)
        .await
        .map_err(map_coverage_error)?;

    Ok(HttpResponse::Ok().json(ApiResponse::new(ServiceAreasResponse {
        agent_id,
        zip_codes,
    })))
}

/// PUT /agents/{agentId}/service-areas
///
/// Replace the agent's ZIP coverage with the submitted list.
pub async fn set_service_areas(
    state: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<SetServiceAreasRequest>,
) -> Result<HttpResponse, AppError> {
    let agent_id = path.into_inner();
    let service = CoverageService::new(state.db.clone());

    service
        .set_coverage(&agent_id, &body.zip_codes)
        .await
        .map_err(map_coverage_error)?;

    let zip_codes = service
        .list_coverage(&agent_id)
        .await
        .map_err(map_coverage_error)?;

    Ok(HttpResponse::Ok().json(ApiResponse::new(ServiceAreasResponse {
        agent_id,
        zip_codes,
    })))
}

/// GET /agents/{agentId}/earnings?dateFrom=&dateTo=
///
/// Per-day earnings over the range, defaulting to the current month.
pub async fn get_earnings(
    state: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<EarningsQuery>,
) -> Result<HttpResponse, AppError> {
    let agent_id = path.into_inner();
    let date_from = parse_date_param(query.date_from.as_deref(), "dateFrom")?;
    let date_to = parse_date_param(query.date_to.as_deref(), "dateTo")?;

    let service = DeliveryService::new(state.db.clone());
    let response = service
        .earnings(&agent_id, date_from, date_to)
        .await
        .map_err(map_delivery_error)?;

    Ok(HttpResponse::Ok().json(ApiResponse::new(response)))
}

/// GET /agents/{agentId}/ratings?page=&perPage=
pub async fn get_agent_ratings(
    state: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<PaginationParams>,
) -> Result<HttpResponse, AppError> {
    let agent_id = path.into_inner();
    let service = RatingService::new(state.db.clone());

    let response = service
        .for_agent(&agent_id, &query.into_inner())
        .await
        .map_err(map_rating_error)?;

    Ok(HttpResponse::Ok().json(ApiResponse::new(response)))
}

/// Map agent errors to application errors
fn map_agent_error(e: AgentError) -> AppError {
    match e {
        AgentError::AgentNotFound(id) => AppError::NotFound(format!("Agent not found: {id}")),
        AgentError::InvalidFullName(msg) => AppError::Validation(msg),
        AgentError::InvalidPhoneNumber(msg) => AppError::Validation(msg),
        AgentError::NoActiveCoverage => AppError::Validation(e.to_string()),
        AgentError::IdSpaceExhausted => AppError::Internal(e.to_string()),
        AgentError::Tracking(e) => match e {
            TrackingError::DeliveryNotFound(id) => {
                AppError::NotFound(format!("Delivery not found: {id}"))
            }
            TrackingError::InvalidCoordinates(msg) => AppError::Validation(msg),
            TrackingError::Database(e) => AppError::Database(e),
        },
        AgentError::RateLimited(e) => e.into(),
        AgentError::Database(e) => AppError::Database(e),
    }
}

/// Map coverage errors to application errors
fn map_coverage_error(e: CoverageError) -> AppError {
    match e {
        CoverageError::AgentNotFound(id) => AppError::NotFound(format!("Agent not found: {id}")),
        CoverageError::InvalidZipCode(msg) => AppError::Validation(msg),
        CoverageError::Database(e) => AppError::Database(e),
    }
}

/// Configure agent routes
pub fn configure_agent_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/agents")
            .route("", web::get().to(list_agents))
            .route("/register", web::post().to(register_agent))
            .route("/{agentId}", web::get().to(get_agent_profile))
            .route(
                "/{agentId}/toggle-availability",
                web::post().to(toggle_availability),
            )
            .route("/{agentId}/update-location", web::post().to(update_location))
            .route("/{agentId}/service-areas", web::get().to(get_service_areas))
            .route("/{agentId}/service-areas", web::put().to(set_service_areas))
            .route("/{agentId}/earnings", web::get().to(get_earnings))
            .route("/{agentId}/ratings", web::get().to(get_agent_ratings)),
    );
}
