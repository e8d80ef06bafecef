//! Agent Service
//!
//! Registration, profile, roster listing, availability and location
//! telemetry for delivery agents. Agent ids follow the legacy `AGTnnnn`
//! format that dispatch staff read out over the phone, so they stay short.

use chrono::Utc;
use rand::Rng;
use sqlx::PgPool;
use thiserror::Error;
use tracing::{info, warn};

use crate::models::{
    AgentListItem, AgentProfile, AgentStatus, DeliveryAgent, DeliveryStatus, PaginatedResponse,
    PaginationParams, RegisterAgentRequest, RegisterAgentResponse, ToggleAvailabilityResponse,
    UpdateLocationRequest, UpdateLocationResponse,
};
use crate::services::rate_limiter::{RateLimitError, RateLimiterService};
use crate::services::tracking::{validate_coordinates, TrackingError, TrackingService};

pub const MAX_FULL_NAME_LENGTH: usize = 128;
pub const MIN_PHONE_LENGTH: usize = 7;
pub const MAX_PHONE_LENGTH: usize = 20;

/// The id space is only 10^4 per prefix; give up after a few collisions
/// rather than spinning.
const MAX_ID_ATTEMPTS: u32 = 10;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Agent not found: {0}")]
    AgentNotFound(String),

    #[error("Invalid full name: {0}")]
    InvalidFullName(String),

    #[error("Invalid phone number: {0}")]
    InvalidPhoneNumber(String),

    #[error("ZIP code required: add at least one active service area before going available")]
    NoActiveCoverage,

    #[error("Could not allocate a unique agent id after {MAX_ID_ATTEMPTS} attempts")]
    IdSpaceExhausted,

    #[error(transparent)]
    Tracking(#[from] TrackingError),

    #[error(transparent)]
    RateLimited(#[from] RateLimitError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Validate an agent's display name: non-empty after trimming, at most 128
/// characters.
pub fn validate_full_name(full_name: &str) -> Result<(), AgentError> {
    let trimmed = full_name.trim();
    if trimmed.is_empty() {
        return Err(AgentError::InvalidFullName(
            "full name must not be empty".to_string(),
        ));
    }
    if trimmed.chars().count() > MAX_FULL_NAME_LENGTH {
        return Err(AgentError::InvalidFullName(format!(
            "full name must be at most {MAX_FULL_NAME_LENGTH} characters"
        )));
    }
    Ok(())
}

/// Validate a phone number: 7..=20 characters, digits plus `+`, space, `-`.
pub fn validate_phone_number(phone: &str) -> Result<(), AgentError> {
    let len = phone.chars().count();
    if !(MIN_PHONE_LENGTH..=MAX_PHONE_LENGTH).contains(&len) {
        return Err(AgentError::InvalidPhoneNumber(format!(
            "phone number must be {MIN_PHONE_LENGTH}-{MAX_PHONE_LENGTH} characters"
        )));
    }
    if !phone
        .chars()
        .all(|c| c.is_ascii_digit() || c == '+' || c == ' ' || c == '-')
    {
        return Err(AgentError::InvalidPhoneNumber(
            "phone number may only contain digits, '+', spaces and '-'".to_string(),
        ));
    }
    Ok(())
}

/// Generate a candidate agent id: `AGT` plus four random digits.
fn generate_agent_id() -> String {
    let mut rng = rand::thread_rng();
    format!("AGT{:04}", rng.gen_range(0..10_000))
}

pub struct AgentService {
    pool: PgPool,
}

impl AgentService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Register a new agent. The agent starts offline and unavailable; it
    /// becomes eligible for deliveries only after setting service areas and
    /// toggling availability.
    pub async fn register(
        &self,
        request: RegisterAgentRequest,
    ) -> Result<RegisterAgentResponse, AgentError> {
        let full_name = request.full_name.trim().to_string();
        validate_full_name(&full_name)?;
        validate_phone_number(&request.phone_number)?;
        if let Some(alt) = &request.alternative_phone {
            validate_phone_number(alt)?;
        }

        let created_at = Utc::now();
        let mut attempts = 0;
        let agent_id = loop {
            let candidate = generate_agent_id();
            let result = sqlx::query(
                r#"
                INSERT INTO delivery_agents
                    (agent_id, full_name, phone_number, alternative_phone, store_id,
                     vehicle_type, vehicle_number, created_at, updated_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8)
                ON CONFLICT (agent_id) DO NOTHING
                "#,
            )
            .bind(&candidate)
            .bind(&full_name)
            .bind(&request.phone_number)
            .bind(&request.alternative_phone)
            .bind(&request.store_id)
            .bind(request.vehicle_type)
            .bind(&request.vehicle_number)
            .bind(created_at)
            .execute(&self.pool)
            .await?;

            if result.rows_affected() == 1 {
                break candidate;
            }

            attempts += 1;
            if attempts >= MAX_ID_ATTEMPTS {
                return Err(AgentError::IdSpaceExhausted);
            }
            warn!(candidate, "Agent id collision, retrying");
        };

        info!(agent_id, vehicle = %request.vehicle_type, "Agent registered");

        Ok(RegisterAgentResponse {
            agent_id,
            full_name,
            status: AgentStatus::Offline,
            vehicle_type: request.vehicle_type,
            created_at,
        })
    }

    /// Fetch the raw agent entity.
    pub async fn get_by_id(&self, agent_id: &str) -> Result<DeliveryAgent, AgentError> {
        let agent = sqlx::query_as::<_, DeliveryAgent>(
            r#"
            SELECT agent_id, full_name, phone_number, alternative_phone, store_id,
                   status, is_available, vehicle_type, vehicle_number,
                   max_concurrent_orders, service_area_radius_km,
                   current_latitude, current_longitude, last_location_update,
                   total_deliveries, successful_deliveries, failed_deliveries,
                   total_earnings, average_rating, created_at, updated_at
            FROM delivery_agents
            WHERE agent_id = $1
            "#,
        )
        .bind(agent_id)
        .fetch_optional(&self.pool)
        .await?;

        agent.ok_or_else(|| AgentError::AgentNotFound(agent_id.to_string()))
    }

    /// Full profile: the entity plus the derived figures the mobile app
    /// renders on the profile screen.
    pub async fn get_profile(&self, agent_id: &str) -> Result<AgentProfile, AgentError> {
        let agent = self.get_by_id(agent_id).await?;

        let active_order_count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM deliveries WHERE agent_id = $1 AND status = ANY($2)",
        )
        .bind(agent_id)
        .bind(&DeliveryStatus::ACTIVE[..])
        .fetch_one(&self.pool)
        .await?;

        let can_accept_orders = agent.is_available
            && agent.status == AgentStatus::Active
            && active_order_count < agent.max_concurrent_orders as i64;
        let success_rate = agent.success_rate();

        Ok(AgentProfile {
            agent_id: agent.agent_id,
            full_name: agent.full_name,
            phone_number: agent.phone_number,
            alternative_phone: agent.alternative_phone,
            store_id: agent.store_id,
            status: agent.status,
            is_available: agent.is_available,
            vehicle_type: agent.vehicle_type,
            vehicle_number: agent.vehicle_number,
            max_concurrent_orders: agent.max_concurrent_orders,
            service_area_radius_km: agent.service_area_radius_km,
            current_latitude: agent.current_latitude,
            current_longitude: agent.current_longitude,
            last_location_update: agent.last_location_update,
            total_deliveries: agent.total_deliveries,
            successful_deliveries: agent.successful_deliveries,
            failed_deliveries: agent.failed_deliveries,
            total_earnings: agent.total_earnings,
            average_rating: agent.average_rating,
            success_rate,
            active_order_count,
            can_accept_orders,
            created_at: agent.created_at,
        })
    }

    /// Paginated roster, newest first. `search` matches name or agent id,
    /// case-insensitively.
    pub async fn list(
        &self,
        params: &PaginationParams,
    ) -> Result<PaginatedResponse<AgentListItem>, AgentError> {
        let per_page = params.per_page();
        let offset = params.offset();

        let search_pattern = params
            .search
            .as_ref()
            .map(|s| format!("%{}%", s.replace('%', "\\%").replace('_', "\\_")));

        let total: i64 = if let Some(ref pattern) = search_pattern {
            sqlx::query_scalar(
                r#"
                SELECT COUNT(*)
                FROM delivery_agents
                WHERE full_name ILIKE $1 OR agent_id ILIKE $1
                "#,
            )
            .bind(pattern)
            .fetch_one(&self.pool)
            .await?
        } else {
            sqlx::query_scalar("SELECT COUNT(*) FROM delivery_agents")
                .fetch_one(&self.pool)
                .await?
        };

        let items = if let Some(ref pattern) = search_pattern {
            sqlx::query_as::<_, AgentListItem>(
                r#"
                SELECT agent_id, full_name, phone_number, status, is_available,
                       vehicle_type, total_deliveries, average_rating, created_at
                FROM delivery_agents
                WHERE full_name ILIKE $1 OR agent_id ILIKE $1
                ORDER BY created_at DESC
                LIMIT $2 OFFSET $3
                "#,
            )
            .bind(pattern)
            .bind(per_page)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?
        } else {
            sqlx::query_as::<_, AgentListItem>(
                r#"
                SELECT agent_id, full_name, phone_number, status, is_available,
                       vehicle_type, total_deliveries, average_rating, created_at
                FROM delivery_agents
                ORDER BY created_at DESC
                LIMIT $1 OFFSET $2
                "#,
            )
            .bind(per_page)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?
        };

        Ok(PaginatedResponse::new(items, total, params))
    }

    /// Flip the agent's availability.
    ///
    /// Going available requires at least one active ZIP coverage row and
    /// moves an offline agent to active; going unavailable moves an active
    /// agent back offline. `on_break`/`busy` are left for the agent to
    /// resolve themselves.
    pub async fn toggle_availability(
        &self,
        agent_id: &str,
        rate_limiter: &RateLimiterService,
    ) -> Result<ToggleAvailabilityResponse, AgentError> {
        rate_limiter
            .check_and_record(agent_id, "toggle_availability")
            .await?;

        let mut tx = self.pool.begin().await?;

        let agent = sqlx::query_as::<_, DeliveryAgent>(
            r#"
            SELECT agent_id, full_name, phone_number, alternative_phone, store_id,
                   status, is_available, vehicle_type, vehicle_number,
                   max_concurrent_orders, service_area_radius_km,
                   current_latitude, current_longitude, last_location_update,
                   total_deliveries, successful_deliveries, failed_deliveries,
                   total_earnings, average_rating, created_at, updated_at
            FROM delivery_agents
            WHERE agent_id = $1
            FOR UPDATE
            "#,
        )
        .bind(agent_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AgentError::AgentNotFound(agent_id.to_string()))?;

        let becoming_available = !agent.is_available;

        if becoming_available {
            let has_coverage = sqlx::query_scalar::<_, bool>(
                "SELECT EXISTS(SELECT 1 FROM agent_zip_coverage WHERE agent_id = $1 AND is_active)",
            )
            .bind(agent_id)
            .fetch_one(&mut *tx)
            .await?;
            if !has_coverage {
                return Err(AgentError::NoActiveCoverage);
            }
        }

        let status = match (becoming_available, agent.status) {
            (true, AgentStatus::Offline) => AgentStatus::Active,
            (false, AgentStatus::Active) => AgentStatus::Offline,
            (_, other) => other,
        };

        sqlx::query(
            r#"
            UPDATE delivery_agents
            SET is_available = $2, status = $3, updated_at = NOW()
            WHERE agent_id = $1
            "#,
        )
        .bind(agent_id)
        .bind(becoming_available)
        .bind(status)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        info!(
            agent_id,
            is_available = becoming_available,
            status = %status,
            "Agent availability toggled"
        );

        Ok(ToggleAvailabilityResponse {
            agent_id: agent_id.to_string(),
            is_available: becoming_available,
            status,
        })
    }

    /// Store a location report from the agent's device.
    ///
    /// When the report names one of the agent's in-flight deliveries, a
    /// tracking point is appended for it in the same transaction. A delivery
    /// id that is unknown, foreign or already terminal is ignored; the
    /// position still updates.
    pub async fn update_location(
        &self,
        agent_id: &str,
        request: UpdateLocationRequest,
        rate_limiter: &RateLimiterService,
    ) -> Result<UpdateLocationResponse, AgentError> {
        rate_limiter
            .check_and_record(agent_id, "update_location")
            .await?;
        validate_coordinates(request.latitude, request.longitude)?;

        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            r#"
            UPDATE delivery_agents
            SET current_latitude = $2, current_longitude = $3,
                last_location_update = $4, updated_at = $4
            WHERE agent_id = $1
            "#,
        )
        .bind(agent_id)
        .bind(request.latitude)
        .bind(request.longitude)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(AgentError::AgentNotFound(agent_id.to_string()));
        }

        let mut tracking_recorded = false;
        if let Some(delivery_id) = &request.delivery_id {
            let status = sqlx::query_scalar::<_, DeliveryStatus>(
                "SELECT status FROM deliveries WHERE delivery_id = $1 AND agent_id = $2",
            )
            .bind(delivery_id)
            .bind(agent_id)
            .fetch_optional(&mut *tx)
            .await?;

            match status {
                Some(status) if !status.is_terminal() => {
                    TrackingService::append_in_tx(
                        &mut tx,
                        delivery_id,
                        request.latitude,
                        request.longitude,
                    )
                    .await?;
                    tracking_recorded = true;
                }
                _ => {
                    warn!(
                        agent_id,
                        delivery_id, "Ignoring tracking for unknown, foreign or finished delivery"
                    );
                }
            }
        }

        tx.commit().await?;

        Ok(UpdateLocationResponse {
            agent_id: agent_id.to_string(),
            latitude: request.latitude,
            longitude: request.longitude,
            last_location_update: now,
            tracking_recorded,
        })
    }
}
