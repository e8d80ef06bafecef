//! Issue handlers
//!
//! HTTP handlers for reporting, listing and resolving delivery issues.

use actix_web::{web, HttpResponse};
use serde::Serialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{ReportIssueRequest, ResolveIssueRequest};
use crate::services::issue::IssueError;
use crate::services::IssueService;
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

/// POST /deliveries/{deliveryId}/issues
///
/// Report a problem with a delivery. Only the assigned agent may report.
pub async fn report_issue(
    state: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<ReportIssueRequest>,
) -> Result<HttpResponse, AppError> {
    let delivery_id = path.into_inner();
    let service = IssueService::new(state.db.clone());

    let issue = service
        .report(&delivery_id, &body.agent_id, body.issue_type, &body.description)
        .await
        .map_err(map_issue_error)?;

    Ok(HttpResponse::Created().json(ApiResponse::new(issue)))
}

/// GET /deliveries/{deliveryId}/issues
pub async fn list_issues(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let delivery_id = path.into_inner();
    let service = IssueService::new(state.db.clone());

    let issues = service
        .list(&delivery_id)
        .await
        .map_err(map_issue_error)?;

    Ok(HttpResponse::Ok().json(ApiResponse::new(issues)))
}

/// POST /issues/{issueId}/resolve
pub async fn resolve_issue(
    state: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<ResolveIssueRequest>,
) -> Result<HttpResponse, AppError> {
    let raw_id = path.into_inner();
    let issue_id = raw_id
        .parse::<Uuid>()
        .map_err(|_| AppError::Validation(format!("Invalid issue id: {raw_id}")))?;

    let service = IssueService::new(state.db.clone());
    let issue = service
        .resolve(issue_id, &body.resolution)
        .await
        .map_err(map_issue_error)?;

    Ok(HttpResponse::Ok().json(ApiResponse::new(issue)))
}

/// Map issue errors to application errors
fn map_issue_error(e: IssueError) -> AppError {
    match e {
        IssueError::DeliveryNotFound(id) => {
            AppError::NotFound(format!("Delivery not found: {id}"))
        }
        IssueError::IssueNotFound(id) => AppError::NotFound(format!("Issue not found: {id}")),
        IssueError::NotOwner {
            delivery_id,
            agent_id,
        } => AppError::Forbidden(format!(
            "Delivery {delivery_id} is not assigned to agent {agent_id}"
        )),
        IssueError::InvalidDescription(msg) => AppError::Validation(msg),
        IssueError::InvalidResolution(msg) => AppError::Validation(msg),
        IssueError::AlreadyResolved(id) => {
            AppError::Conflict(format!("Issue {id} is already resolved"))
        }
        IssueError::Database(e) => AppError::Database(e),
    }
}

/// Configure issue routes
pub fn configure_issue_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/issues").route("/{issueId}/resolve", web::post().to(resolve_issue)),
    );
}
