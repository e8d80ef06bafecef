//! Delivery Service
//!
//! Owns the delivery lifecycle: assignment to an eligible agent, the
//! status ladder from `assigned` to `delivered`, OTP-verified handoffs,
//! cancellation, and the agent-facing dashboard and earnings views.
//!
//! Every transition runs in a transaction that also appends a tracking
//! point at the agent's current position (when known) and, for terminal
//! transitions, recomputes the agent's counters from the source tables.

use chrono::{DateTime, Datelike, Days, NaiveDate, NaiveTime, TimeZone, Utc};
use rand::Rng;
use rust_decimal::Decimal;
use sqlx::{FromRow, PgPool};
use thiserror::Error;
use tracing::info;

use crate::models::{
    ActiveStatusCounts, AgentStatus, AgentSummary, AllTimeStats, CreateDeliveryRequest,
    CreateDeliveryResponse, DailyEarnings, DashboardResponse, Delivery, DeliveryDetail,
    DeliveryIssue, DeliveryListResponse, DeliveryStatus, DeliverySummary, EarningsResponse,
    IssueType, PaginationParams, RatingEntry, StatusFilter, StatusGroupCounts, TodayStats,
    TrackDeliveryResponse, TrackingPoint, VehicleType,
};
use crate::services::issue::IssueService;
use crate::services::settings::{quote_fee, quote_payout, SettingsError, SettingsService};
use crate::services::stats::StatsService;
use crate::services::tracking::TrackingService;

/// Tracking points embedded in the delivery detail response.
const DETAIL_TRACKING_LIMIT: i64 = 10;

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("Delivery not found: {0}")]
    DeliveryNotFound(String),

    #[error("Agent not found: {0}")]
    AgentNotFound(String),

    #[error("Invalid order: {0}")]
    InvalidOrder(String),

    #[error("Order {0} already has a delivery")]
    DuplicateOrder(String),

    #[error("No agents available to take this order")]
    NoAgentAvailable,

    #[error("Delivery {delivery_id} is not assigned to agent {agent_id}")]
    NotOwner {
        delivery_id: String,
        agent_id: String,
    },

    #[error("Delivery {delivery_id} cannot move from {from} to {to}")]
    InvalidTransition {
        delivery_id: String,
        from: DeliveryStatus,
        to: DeliveryStatus,
    },

    #[error("Incorrect OTP for delivery {0}")]
    IncorrectOtp(String),

    #[error("Invalid cancellation reason: {0}")]
    InvalidReason(String),

    #[error("Invalid date range: {0}")]
    InvalidDateRange(String),

    #[error(transparent)]
    Settings(#[from] SettingsError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Generate a delivery id: `DEL-{yymmddHHMM}-{4 uppercase alphanumerics}`.
fn generate_delivery_id(now: DateTime<Utc>) -> String {
    const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
    let mut rng = rand::thread_rng();
    let suffix: String = (0..4)
        .map(|_| CHARSET[rng.gen_range(0..CHARSET.len())] as char)
        .collect();
    format!("DEL-{}-{}", now.format("%y%m%d%H%M"), suffix)
}

/// Generate a 6-digit OTP.
fn generate_otp() -> String {
    let mut rng = rand::thread_rng();
    format!("{:06}", rng.gen_range(0..1_000_000))
}

#[derive(FromRow)]
struct EligibleAgent {
    agent_id: String,
    current_latitude: Option<f64>,
    current_longitude: Option<f64>,
}

#[derive(FromRow)]
struct AllTimeRow {
    deliveries: i64,
    completed: i64,
    failed: i64,
    earnings: Decimal,
}

pub struct DeliveryService {
    pool: PgPool,
}

impl DeliveryService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create a delivery for an order and assign it to an eligible agent.
    ///
    /// Eligible means available, active, and under the agent's concurrent
    /// order cap; the pick among eligible agents is arbitrary. The fee is
    /// quoted from the settings row and an initial tracking point is seeded
    /// from the agent's current position (0.0/0.0 when unknown).
    pub async fn create(
        &self,
        request: CreateDeliveryRequest,
    ) -> Result<CreateDeliveryResponse, DeliveryError> {
        let order_id = request.order_id.trim().to_string();
        if order_id.is_empty() {
            return Err(DeliveryError::InvalidOrder(
                "order id must not be empty".to_string(),
            ));
        }

        let settings = SettingsService::new(self.pool.clone()).get().await?;

        let mut tx = self.pool.begin().await?;

        let taken = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM deliveries WHERE order_id = $1)",
        )
        .bind(&order_id)
        .fetch_one(&mut *tx)
        .await?;
        if taken {
            return Err(DeliveryError::DuplicateOrder(order_id));
        }

        let agent = sqlx::query_as::<_, EligibleAgent>(
            r#"
            SELECT a.agent_id, a.current_latitude, a.current_longitude
            FROM delivery_agents a
            WHERE a.is_available
              AND a.status = 'active'
              AND (SELECT COUNT(*) FROM deliveries d
                   WHERE d.agent_id = a.agent_id AND d.status = ANY($1))
                  < a.max_concurrent_orders
            ORDER BY random()
            LIMIT 1
            "#,
        )
        .bind(&DeliveryStatus::ACTIVE[..])
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(DeliveryError::NoAgentAvailable)?;

        let now = Utc::now();
        let delivery_id = generate_delivery_id(now);
        let store_pickup_otp = generate_otp();
        let customer_delivery_otp = generate_otp();

        // Distance is unknown at creation time; the quote falls back to the
        // base fee unless the order value makes it free.
        let delivery_fee = quote_fee(&settings, None, request.order_value);
        let agent_payout = quote_payout(&settings, delivery_fee);

        sqlx::query(
            r#"
            INSERT INTO deliveries
                (delivery_id, order_id, agent_id, status, delivery_fee, agent_payout,
                 pickup_address, dropoff_address, assigned_at,
                 store_pickup_otp, customer_delivery_otp, created_at, updated_at)
            VALUES ($1, $2, $3, 'assigned', $4, $5, $6, $7, $8, $9, $10, $8, $8)
            "#,
        )
        .bind(&delivery_id)
        .bind(&order_id)
        .bind(&agent.agent_id)
        .bind(delivery_fee)
        .bind(agent_payout)
        .bind(&request.pickup_address)
        .bind(&request.dropoff_address)
        .bind(now)
        .bind(&store_pickup_otp)
        .bind(&customer_delivery_otp)
        .execute(&mut *tx)
        .await?;

        TrackingService::append_in_tx(
            &mut tx,
            &delivery_id,
            agent.current_latitude.unwrap_or(0.0),
            agent.current_longitude.unwrap_or(0.0),
        )
        .await?;

        tx.commit().await?;

        info!(
            delivery_id,
            order_id,
            agent_id = agent.agent_id,
            fee = %delivery_fee,
            "Delivery created and assigned"
        );

        Ok(CreateDeliveryResponse {
            delivery_id,
            order_id,
            agent_id: agent.agent_id,
            status: DeliveryStatus::Assigned,
            delivery_fee,
            agent_payout,
            store_pickup_otp,
            customer_delivery_otp,
            assigned_at: now,
        })
    }

    /// Fetch the raw delivery entity.
    pub async fn get_by_id(&self, delivery_id: &str) -> Result<Delivery, DeliveryError> {
        let delivery = sqlx::query_as::<_, Delivery>(
            r#"
            SELECT delivery_id, order_id, agent_id, status, delivery_fee, agent_payout,
                   pickup_address, dropoff_address, assigned_at, accepted_at,
                   arrived_at_store_at, picked_up_at, delivered_at,
                   store_pickup_otp, customer_delivery_otp,
                   store_pickup_verified, customer_delivery_verified,
                   created_at, updated_at
            FROM deliveries
            WHERE delivery_id = $1
            "#,
        )
        .bind(delivery_id)
        .fetch_optional(&self.pool)
        .await?;

        delivery.ok_or_else(|| DeliveryError::DeliveryNotFound(delivery_id.to_string()))
    }

    /// Delivery detail: entity, agent summary, recent tracking, issues and
    /// rating.
    pub async fn get_detail(&self, delivery_id: &str) -> Result<DeliveryDetail, DeliveryError> {
        let delivery = self.get_by_id(delivery_id).await?;

        let agent = sqlx::query_as::<_, AgentSummary>(
            r#"
            SELECT agent_id, full_name, phone_number, vehicle_type, vehicle_number
            FROM delivery_agents
            WHERE agent_id = $1
            "#,
        )
        .bind(&delivery.agent_id)
        .fetch_one(&self.pool)
        .await?;

        let tracking = sqlx::query_as::<_, TrackingPoint>(
            r#"
            SELECT id, delivery_id, latitude, longitude, recorded_at
            FROM delivery_tracking
            WHERE delivery_id = $1
            ORDER BY recorded_at DESC, seq DESC
            LIMIT $2
            "#,
        )
        .bind(delivery_id)
        .bind(DETAIL_TRACKING_LIMIT)
        .fetch_all(&self.pool)
        .await?;

        let issues = sqlx::query_as::<_, DeliveryIssue>(
            r#"
            SELECT issue_id, delivery_id, issue_type, description, resolved, resolution,
                   created_at, updated_at
            FROM delivery_issues
            WHERE delivery_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(delivery_id)
        .fetch_all(&self.pool)
        .await?;

        let rating = sqlx::query_as::<_, RatingEntry>(
            r#"
            SELECT r.delivery_id, r.rating, r.feedback, d.delivered_at, r.created_at
            FROM delivery_ratings r
            JOIN deliveries d ON d.delivery_id = r.delivery_id
            WHERE r.delivery_id = $1
            "#,
        )
        .bind(delivery_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(DeliveryDetail {
            delivery: delivery.into(),
            agent,
            tracking,
            issues,
            rating,
        })
    }

    /// The agent's deliveries, newest first, with per-group counts.
    ///
    /// The group counts always cover all of the agent's deliveries; the
    /// status filter and date bounds narrow only the page items.
    pub async fn list(
        &self,
        agent_id: &str,
        filter: Option<StatusFilter>,
        date_from: Option<NaiveDate>,
        date_to: Option<NaiveDate>,
        params: &PaginationParams,
    ) -> Result<DeliveryListResponse, DeliveryError> {
        self.ensure_agent_exists(agent_id).await?;

        if let (Some(from), Some(to)) = (date_from, date_to) {
            if from > to {
                return Err(DeliveryError::InvalidDateRange(format!(
                    "dateFrom {from} is after dateTo {to}"
                )));
            }
        }

        let statuses: Option<Vec<DeliveryStatus>> = filter.map(|f| f.statuses().to_vec());
        let from_ts = date_from.map(day_start);
        let to_ts = date_to.map(next_day_start);

        let total = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*)
            FROM deliveries
            WHERE agent_id = $1
              AND ($2::delivery_status[] IS NULL OR status = ANY($2))
              AND ($3::timestamptz IS NULL OR created_at >= $3)
              AND ($4::timestamptz IS NULL OR created_at < $4)
            "#,
        )
        .bind(agent_id)
        .bind(&statuses)
        .bind(from_ts)
        .bind(to_ts)
        .fetch_one(&self.pool)
        .await?;

        let rows = sqlx::query_as::<_, Delivery>(
            r#"
            SELECT delivery_id, order_id, agent_id, status, delivery_fee, agent_payout,
                   pickup_address, dropoff_address, assigned_at, accepted_at,
                   arrived_at_store_at, picked_up_at, delivered_at,
                   store_pickup_otp, customer_delivery_otp,
                   store_pickup_verified, customer_delivery_verified,
                   created_at, updated_at
            FROM deliveries
            WHERE agent_id = $1
              AND ($2::delivery_status[] IS NULL OR status = ANY($2))
              AND ($3::timestamptz IS NULL OR created_at >= $3)
              AND ($4::timestamptz IS NULL OR created_at < $4)
            ORDER BY created_at DESC
            LIMIT $5 OFFSET $6
            "#,
        )
        .bind(agent_id)
        .bind(&statuses)
        .bind(from_ts)
        .bind(to_ts)
        .bind(params.per_page())
        .bind(params.offset())
        .fetch_all(&self.pool)
        .await?;

        let counts = sqlx::query_as::<_, StatusGroupCounts>(
            r#"
            SELECT
                COUNT(*) FILTER (WHERE status IN
                    ('assigned', 'accepted', 'at_store', 'picked_up', 'in_transit')) AS active,
                COUNT(*) FILTER (WHERE status = 'assigned') AS pending,
                COUNT(*) FILTER (WHERE status IN
                    ('accepted', 'at_store', 'picked_up', 'in_transit')) AS in_progress,
                COUNT(*) FILTER (WHERE status = 'delivered') AS completed,
                COUNT(*) FILTER (WHERE status IN ('cancelled', 'failed')) AS problematic
            FROM deliveries
            WHERE agent_id = $1
            "#,
        )
        .bind(agent_id)
        .fetch_one(&self.pool)
        .await?;

        let per_page = params.per_page();
        let total_pages = (total + per_page - 1) / per_page;

        Ok(DeliveryListResponse {
            items: rows.into_iter().map(DeliverySummary::from).collect(),
            total,
            page: params.page(),
            per_page,
            total_pages,
            counts,
        })
    }

    /// `assigned -> accepted`; stamps `accepted_at`.
    pub async fn accept(
        &self,
        delivery_id: &str,
        agent_id: &str,
    ) -> Result<DeliverySummary, DeliveryError> {
        let mut tx = self.pool.begin().await?;
        let mut delivery = Self::lock_delivery(&mut tx, delivery_id).await?;
        Self::ensure_owner(&delivery, agent_id)?;
        Self::ensure_status(&delivery, DeliveryStatus::Assigned, DeliveryStatus::Accepted)?;

        let now = Utc::now();
        sqlx::query(
            "UPDATE deliveries SET status = 'accepted', accepted_at = $2, updated_at = $2 \
             WHERE delivery_id = $1",
        )
        .bind(delivery_id)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        Self::track_agent_position(&mut tx, &delivery).await?;
        tx.commit().await?;

        info!(delivery_id, agent_id, "Delivery accepted");

        delivery.status = DeliveryStatus::Accepted;
        delivery.accepted_at = Some(now);
        delivery.updated_at = now;
        Ok(delivery.into())
    }

    /// `accepted -> at_store`; stamps `arrived_at_store_at`.
    pub async fn arrive_at_store(
        &self,
        delivery_id: &str,
        agent_id: &str,
    ) -> Result<DeliverySummary, DeliveryError> {
        let mut tx = self.pool.begin().await?;
        let mut delivery = Self::lock_delivery(&mut tx, delivery_id).await?;
        Self::ensure_owner(&delivery, agent_id)?;
        Self::ensure_status(&delivery, DeliveryStatus::Accepted, DeliveryStatus::AtStore)?;

        let now = Utc::now();
        sqlx::query(
            "UPDATE deliveries SET status = 'at_store', arrived_at_store_at = $2, updated_at = $2 \
             WHERE delivery_id = $1",
        )
        .bind(delivery_id)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        Self::track_agent_position(&mut tx, &delivery).await?;
        tx.commit().await?;

        info!(delivery_id, agent_id, "Agent arrived at store");

        delivery.status = DeliveryStatus::AtStore;
        delivery.arrived_at_store_at = Some(now);
        delivery.updated_at = now;
        Ok(delivery.into())
    }

    /// `at_store -> picked_up` when the store's OTP matches; stamps
    /// `picked_up_at` and marks the pickup verified.
    pub async fn verify_store_pickup(
        &self,
        delivery_id: &str,
        agent_id: &str,
        otp: &str,
    ) -> Result<DeliverySummary, DeliveryError> {
        let mut tx = self.pool.begin().await?;
        let mut delivery = Self::lock_delivery(&mut tx, delivery_id).await?;
        Self::ensure_owner(&delivery, agent_id)?;
        Self::ensure_status(&delivery, DeliveryStatus::AtStore, DeliveryStatus::PickedUp)?;

        if otp != delivery.store_pickup_otp {
            return Err(DeliveryError::IncorrectOtp(delivery_id.to_string()));
        }

        let now = Utc::now();
        sqlx::query(
            "UPDATE deliveries SET status = 'picked_up', picked_up_at = $2, \
             store_pickup_verified = TRUE, updated_at = $2 WHERE delivery_id = $1",
        )
        .bind(delivery_id)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        Self::track_agent_position(&mut tx, &delivery).await?;
        tx.commit().await?;

        info!(delivery_id, agent_id, "Store pickup verified");

        delivery.status = DeliveryStatus::PickedUp;
        delivery.picked_up_at = Some(now);
        delivery.store_pickup_verified = true;
        delivery.updated_at = now;
        Ok(delivery.into())
    }

    /// `picked_up -> in_transit`. No dedicated timestamp; the tracking log
    /// carries the movement.
    pub async fn start_transit(
        &self,
        delivery_id: &str,
        agent_id: &str,
    ) -> Result<DeliverySummary, DeliveryError> {
        let mut tx = self.pool.begin().await?;
        let mut delivery = Self::lock_delivery(&mut tx, delivery_id).await?;
        Self::ensure_owner(&delivery, agent_id)?;
        Self::ensure_status(&delivery, DeliveryStatus::PickedUp, DeliveryStatus::InTransit)?;

        let now = Utc::now();
        sqlx::query(
            "UPDATE deliveries SET status = 'in_transit', updated_at = $2 WHERE delivery_id = $1",
        )
        .bind(delivery_id)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        Self::track_agent_position(&mut tx, &delivery).await?;
        tx.commit().await?;

        info!(delivery_id, agent_id, "Delivery in transit");

        delivery.status = DeliveryStatus::InTransit;
        delivery.updated_at = now;
        Ok(delivery.into())
    }

    /// `picked_up | in_transit -> delivered` when the customer's OTP
    /// matches. Stamps `delivered_at`, marks the handoff verified and
    /// recomputes the agent's stats in the same transaction.
    ///
    /// Accepting `picked_up` directly covers drivers who never pressed
    /// "start transit".
    pub async fn verify_customer_delivery(
        &self,
        delivery_id: &str,
        agent_id: &str,
        otp: &str,
    ) -> Result<DeliverySummary, DeliveryError> {
        let mut tx = self.pool.begin().await?;
        let mut delivery = Self::lock_delivery(&mut tx, delivery_id).await?;
        Self::ensure_owner(&delivery, agent_id)?;

        if !matches!(
            delivery.status,
            DeliveryStatus::PickedUp | DeliveryStatus::InTransit
        ) {
            return Err(DeliveryError::InvalidTransition {
                delivery_id: delivery_id.to_string(),
                from: delivery.status,
                to: DeliveryStatus::Delivered,
            });
        }

        if otp != delivery.customer_delivery_otp {
            return Err(DeliveryError::IncorrectOtp(delivery_id.to_string()));
        }

        let now = Utc::now();
        sqlx::query(
            "UPDATE deliveries SET status = 'delivered', delivered_at = $2, \
             customer_delivery_verified = TRUE, updated_at = $2 WHERE delivery_id = $1",
        )
        .bind(delivery_id)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        Self::track_agent_position(&mut tx, &delivery).await?;
        StatsService::recompute_agent_in_tx(&mut tx, agent_id).await?;
        tx.commit().await?;

        info!(delivery_id, agent_id, "Delivery completed");

        delivery.status = DeliveryStatus::Delivered;
        delivery.delivered_at = Some(now);
        delivery.customer_delivery_verified = true;
        delivery.updated_at = now;
        Ok(delivery.into())
    }

    /// Cancel a delivery before pickup (`assigned | accepted | at_store`).
    ///
    /// Once the goods are in hand a failed handoff is recorded as `failed`,
    /// not cancelled. The reason lands as an issue on the delivery so
    /// support can follow up.
    pub async fn cancel(
        &self,
        delivery_id: &str,
        agent_id: &str,
        reason: &str,
    ) -> Result<DeliverySummary, DeliveryError> {
        let reason = reason.trim();
        if reason.is_empty() || reason.chars().count() > 1000 {
            return Err(DeliveryError::InvalidReason(
                "reason must be 1-1000 characters".to_string(),
            ));
        }

        let mut tx = self.pool.begin().await?;
        let mut delivery = Self::lock_delivery(&mut tx, delivery_id).await?;
        Self::ensure_owner(&delivery, agent_id)?;

        if !matches!(
            delivery.status,
            DeliveryStatus::Assigned | DeliveryStatus::Accepted | DeliveryStatus::AtStore
        ) {
            return Err(DeliveryError::InvalidTransition {
                delivery_id: delivery_id.to_string(),
                from: delivery.status,
                to: DeliveryStatus::Cancelled,
            });
        }

        let now = Utc::now();
        sqlx::query(
            "UPDATE deliveries SET status = 'cancelled', updated_at = $2 WHERE delivery_id = $1",
        )
        .bind(delivery_id)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        IssueService::insert_in_tx(&mut tx, delivery_id, IssueType::Other, reason).await?;
        StatsService::recompute_agent_in_tx(&mut tx, agent_id).await?;
        tx.commit().await?;

        info!(delivery_id, agent_id, reason, "Delivery cancelled");

        delivery.status = DeliveryStatus::Cancelled;
        delivery.updated_at = now;
        Ok(delivery.into())
    }

    /// The agent's operational snapshot for the dashboard screen.
    pub async fn dashboard(&self, agent_id: &str) -> Result<DashboardResponse, DeliveryError> {
        let agent = sqlx::query_as::<_, (bool, AgentStatus, Decimal)>(
            "SELECT is_available, status, average_rating FROM delivery_agents WHERE agent_id = $1",
        )
        .bind(agent_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DeliveryError::AgentNotFound(agent_id.to_string()))?;

        let status_counts = sqlx::query_as::<_, ActiveStatusCounts>(
            r#"
            SELECT
                COUNT(*) FILTER (WHERE status = 'assigned') AS assigned,
                COUNT(*) FILTER (WHERE status = 'accepted') AS accepted,
                COUNT(*) FILTER (WHERE status = 'at_store') AS at_store,
                COUNT(*) FILTER (WHERE status = 'picked_up') AS picked_up,
                COUNT(*) FILTER (WHERE status = 'in_transit') AS in_transit
            FROM deliveries
            WHERE agent_id = $1
            "#,
        )
        .bind(agent_id)
        .fetch_one(&self.pool)
        .await?;

        let today = sqlx::query_as::<_, TodayStats>(
            r#"
            SELECT
                COUNT(*) FILTER (WHERE created_at >= date_trunc('day', NOW())) AS deliveries,
                COUNT(*) FILTER (WHERE status = 'delivered'
                    AND delivered_at >= date_trunc('day', NOW())) AS completed,
                COALESCE(SUM(agent_payout) FILTER (WHERE status = 'delivered'
                    AND delivered_at >= date_trunc('day', NOW())), 0) AS earnings
            FROM deliveries
            WHERE agent_id = $1
            "#,
        )
        .bind(agent_id)
        .fetch_one(&self.pool)
        .await?;

        let all_time = sqlx::query_as::<_, AllTimeRow>(
            r#"
            SELECT
                COUNT(*) AS deliveries,
                COUNT(*) FILTER (WHERE status = 'delivered') AS completed,
                COUNT(*) FILTER (WHERE status IN ('cancelled', 'failed')) AS failed,
                COALESCE(SUM(agent_payout) FILTER (WHERE status = 'delivered'), 0) AS earnings
            FROM deliveries
            WHERE agent_id = $1
            "#,
        )
        .bind(agent_id)
        .fetch_one(&self.pool)
        .await?;

        let completion_rate = if all_time.deliveries == 0 {
            0.0
        } else {
            let rate = all_time.completed as f64 / all_time.deliveries as f64 * 100.0;
            (rate * 100.0).round() / 100.0
        };

        Ok(DashboardResponse {
            agent_id: agent_id.to_string(),
            is_available: agent.0,
            status: agent.1,
            status_counts,
            today,
            all_time: AllTimeStats {
                deliveries: all_time.deliveries,
                completed: all_time.completed,
                failed: all_time.failed,
                completion_rate,
                earnings: all_time.earnings,
                average_rating: agent.2,
            },
        })
    }

    /// Public tracking view, keyed by delivery id alone.
    ///
    /// Exposes no OTPs and no phone numbers: just the ladder, the agent's
    /// first name and vehicle, and the latest reported position.
    pub async fn track(&self, delivery_id: &str) -> Result<TrackDeliveryResponse, DeliveryError> {
        let delivery = self.get_by_id(delivery_id).await?;

        let agent = sqlx::query_as::<_, (String, VehicleType)>(
            "SELECT full_name, vehicle_type FROM delivery_agents WHERE agent_id = $1",
        )
        .bind(&delivery.agent_id)
        .fetch_one(&self.pool)
        .await?;

        let last_position = sqlx::query_as::<_, TrackingPoint>(
            r#"
            SELECT id, delivery_id, latitude, longitude, recorded_at
            FROM delivery_tracking
            WHERE delivery_id = $1
            ORDER BY recorded_at DESC, seq DESC
            LIMIT 1
            "#,
        )
        .bind(delivery_id)
        .fetch_optional(&self.pool)
        .await?;

        let rated = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM delivery_ratings WHERE delivery_id = $1)",
        )
        .bind(delivery_id)
        .fetch_one(&self.pool)
        .await?;

        let first_name = agent
            .0
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_string();

        Ok(TrackDeliveryResponse {
            delivery_id: delivery.delivery_id.clone(),
            status: delivery.status,
            status_label: delivery.status.label(),
            steps: delivery.status_steps(),
            agent_name: first_name,
            vehicle_type: agent.1,
            last_position,
            delivered_at: delivery.delivered_at,
            rated,
        })
    }

    /// Payout earned over a date range (defaults to the current month), with
    /// a per-day breakdown in ascending date order.
    pub async fn earnings(
        &self,
        agent_id: &str,
        date_from: Option<NaiveDate>,
        date_to: Option<NaiveDate>,
    ) -> Result<EarningsResponse, DeliveryError> {
        self.ensure_agent_exists(agent_id).await?;

        let today = Utc::now().date_naive();
        let from = date_from.unwrap_or_else(|| today.with_day(1).unwrap_or(today));
        let to = date_to.unwrap_or(today);

        if from > to {
            return Err(DeliveryError::InvalidDateRange(format!(
                "dateFrom {from} is after dateTo {to}"
            )));
        }

        let daily = sqlx::query_as::<_, DailyEarnings>(
            r#"
            SELECT (delivered_at AT TIME ZONE 'UTC')::date AS date,
                   COUNT(*) AS deliveries,
                   COALESCE(SUM(agent_payout), 0) AS amount
            FROM deliveries
            WHERE agent_id = $1
              AND status = 'delivered'
              AND delivered_at >= $2
              AND delivered_at < $3
            GROUP BY date
            ORDER BY date ASC
            "#,
        )
        .bind(agent_id)
        .bind(day_start(from))
        .bind(next_day_start(to))
        .fetch_all(&self.pool)
        .await?;

        let total_earnings: Decimal = daily.iter().map(|d| d.amount).sum();
        let delivered_count: i64 = daily.iter().map(|d| d.deliveries).sum();

        Ok(EarningsResponse {
            agent_id: agent_id.to_string(),
            date_from: from,
            date_to: to,
            total_earnings,
            delivered_count,
            daily,
        })
    }

    async fn ensure_agent_exists(&self, agent_id: &str) -> Result<(), DeliveryError> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM delivery_agents WHERE agent_id = $1)",
        )
        .bind(agent_id)
        .fetch_one(&self.pool)
        .await?;

        if exists {
            Ok(())
        } else {
            Err(DeliveryError::AgentNotFound(agent_id.to_string()))
        }
    }

    async fn lock_delivery(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        delivery_id: &str,
    ) -> Result<Delivery, DeliveryError> {
        let delivery = sqlx::query_as::<_, Delivery>(
            r#"
            SELECT delivery_id, order_id, agent_id, status, delivery_fee, agent_payout,
                   pickup_address, dropoff_address, assigned_at, accepted_at,
                   arrived_at_store_at, picked_up_at, delivered_at,
                   store_pickup_otp, customer_delivery_otp,
                   store_pickup_verified, customer_delivery_verified,
                   created_at, updated_at
            FROM deliveries
            WHERE delivery_id = $1
            FOR UPDATE
            "#,
        )
        .bind(delivery_id)
        .fetch_optional(&mut **tx)
        .await?;

        delivery.ok_or_else(|| DeliveryError::DeliveryNotFound(delivery_id.to_string()))
    }

    fn ensure_owner(delivery: &Delivery, agent_id: &str) -> Result<(), DeliveryError> {
        if delivery.agent_id == agent_id {
            Ok(())
        } else {
            Err(DeliveryError::NotOwner {
                delivery_id: delivery.delivery_id.clone(),
                agent_id: agent_id.to_string(),
            })
        }
    }

    fn ensure_status(
        delivery: &Delivery,
        expected: DeliveryStatus,
        target: DeliveryStatus,
    ) -> Result<(), DeliveryError> {
        if delivery.status == expected {
            Ok(())
        } else {
            Err(DeliveryError::InvalidTransition {
                delivery_id: delivery.delivery_id.clone(),
                from: delivery.status,
                to: target,
            })
        }
    }

    /// Append a tracking point at the agent's current position, when the
    /// agent has ever reported one.
    async fn track_agent_position(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        delivery: &Delivery,
    ) -> Result<(), sqlx::Error> {
        let position = sqlx::query_as::<_, (Option<f64>, Option<f64>)>(
            "SELECT current_latitude, current_longitude FROM delivery_agents WHERE agent_id = $1",
        )
        .bind(&delivery.agent_id)
        .fetch_one(&mut **tx)
        .await?;

        if let (Some(latitude), Some(longitude)) = position {
            TrackingService::append_in_tx(tx, &delivery.delivery_id, latitude, longitude).await?;
        }
        Ok(())
    }
}

fn day_start(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN))
}

fn next_day_start(date: NaiveDate) -> DateTime<Utc> {
    day_start(date + Days::new(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delivery_id_has_the_expected_shape() {
        let now = Utc::now();
        let id = generate_delivery_id(now);
        let parts: Vec<&str> = id.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "DEL");
        assert_eq!(parts[1], now.format("%y%m%d%H%M").to_string());
        assert_eq!(parts[2].len(), 4);
        assert!(parts[2]
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
    }

    #[test]
    fn otp_is_six_digits() {
        for _ in 0..100 {
            let otp = generate_otp();
            assert_eq!(otp.len(), 6);
            assert!(otp.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn day_bounds_cover_the_whole_day() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 15).unwrap();
        let start = day_start(date);
        let end = next_day_start(date);
        assert_eq!(start.to_rfc3339(), "2025-03-15T00:00:00+00:00");
        assert_eq!(end.to_rfc3339(), "2025-03-16T00:00:00+00:00");
    }
}
