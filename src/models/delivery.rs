use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;

use super::agent::AgentSummary;
use super::issue::DeliveryIssue;
use super::tracking::TrackingPoint;

/// Lifecycle status of a delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "delivery_status", rename_all = "snake_case")]
pub enum DeliveryStatus {
    Assigned,
    Accepted,
    AtStore,
    PickedUp,
    InTransit,
    Delivered,
    Cancelled,
    Failed,
}

impl DeliveryStatus {
    /// Statuses of deliveries still in flight
    pub const ACTIVE: [DeliveryStatus; 5] = [
        Self::Assigned,
        Self::Accepted,
        Self::AtStore,
        Self::PickedUp,
        Self::InTransit,
    ];

    /// Whether the delivery has reached a final state
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Delivered | Self::Cancelled | Self::Failed)
    }

    /// Human-readable label, as shown on tracking pages
    pub fn label(&self) -> &'static str {
        match self {
            Self::Assigned => "Assigned",
            Self::Accepted => "Accepted",
            Self::AtStore => "At Store",
            Self::PickedUp => "Picked Up",
            Self::InTransit => "In Transit",
            Self::Delivered => "Delivered",
            Self::Cancelled => "Cancelled",
            Self::Failed => "Failed",
        }
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Assigned => "assigned",
            Self::Accepted => "accepted",
            Self::AtStore => "at_store",
            Self::PickedUp => "picked_up",
            Self::InTransit => "in_transit",
            Self::Delivered => "delivered",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

impl FromStr for DeliveryStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "assigned" => Ok(Self::Assigned),
            "accepted" => Ok(Self::Accepted),
            "at_store" => Ok(Self::AtStore),
            "picked_up" => Ok(Self::PickedUp),
            "in_transit" => Ok(Self::InTransit),
            "delivered" => Ok(Self::Delivered),
            "cancelled" => Ok(Self::Cancelled),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("invalid delivery status: {s}")),
        }
    }
}

/// Named status groups accepted by the delivery list filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusFilter {
    Active,
    Pending,
    InProgress,
    Completed,
    Problematic,
}

impl StatusFilter {
    /// The concrete statuses covered by this filter group
    pub fn statuses(&self) -> &'static [DeliveryStatus] {
        match self {
            Self::Active => &DeliveryStatus::ACTIVE,
            Self::Pending => &[DeliveryStatus::Assigned],
            Self::InProgress => &[
                DeliveryStatus::Accepted,
                DeliveryStatus::AtStore,
                DeliveryStatus::PickedUp,
                DeliveryStatus::InTransit,
            ],
            Self::Completed => &[DeliveryStatus::Delivered],
            Self::Problematic => &[DeliveryStatus::Cancelled, DeliveryStatus::Failed],
        }
    }
}

impl FromStr for StatusFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "pending" => Ok(Self::Pending),
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "problematic" => Ok(Self::Problematic),
            _ => Err(format!("invalid status filter: {s}")),
        }
    }
}

/// Delivery entity
///
/// OTP columns stay internal; responses expose them only where the
/// consuming side legitimately holds them (the creation response).
#[derive(Debug, Clone, FromRow)]
pub struct Delivery {
    pub delivery_id: String,
    pub order_id: String,
    pub agent_id: String,
    pub status: DeliveryStatus,
    pub delivery_fee: Decimal,
    pub agent_payout: Decimal,
    pub pickup_address: Option<String>,
    pub dropoff_address: Option<String>,
    pub assigned_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub arrived_at_store_at: Option<DateTime<Utc>>,
    pub picked_up_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub store_pickup_otp: String,
    pub customer_delivery_otp: String,
    pub store_pickup_verified: bool,
    pub customer_delivery_verified: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Delivery view without the OTP secrets
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliverySummary {
    pub delivery_id: String,
    pub order_id: String,
    pub agent_id: String,
    pub status: DeliveryStatus,
    pub delivery_fee: Decimal,
    pub agent_payout: Decimal,
    pub pickup_address: Option<String>,
    pub dropoff_address: Option<String>,
    pub assigned_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub arrived_at_store_at: Option<DateTime<Utc>>,
    pub picked_up_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub store_pickup_verified: bool,
    pub customer_delivery_verified: bool,
    pub created_at: DateTime<Utc>,
}

impl From<Delivery> for DeliverySummary {
    fn from(d: Delivery) -> Self {
        Self {
            delivery_id: d.delivery_id,
            order_id: d.order_id,
            agent_id: d.agent_id,
            status: d.status,
            delivery_fee: d.delivery_fee,
            agent_payout: d.agent_payout,
            pickup_address: d.pickup_address,
            dropoff_address: d.dropoff_address,
            assigned_at: d.assigned_at,
            accepted_at: d.accepted_at,
            arrived_at_store_at: d.arrived_at_store_at,
            picked_up_at: d.picked_up_at,
            delivered_at: d.delivered_at,
            store_pickup_verified: d.store_pickup_verified,
            customer_delivery_verified: d.customer_delivery_verified,
            created_at: d.created_at,
        }
    }
}

/// Request payload for creating (assigning) a delivery
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDeliveryRequest {
    pub order_id: String,
    /// Order total, used only for fee quoting
    pub order_value: Option<Decimal>,
    pub pickup_address: Option<String>,
    pub dropoff_address: Option<String>,
}

/// Response payload after creating a delivery
///
/// The OTPs are included here so the caller (the order platform) can hand
/// the pickup code to the store and the delivery code to the customer.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDeliveryResponse {
    pub delivery_id: String,
    pub order_id: String,
    pub agent_id: String,
    pub status: DeliveryStatus,
    pub delivery_fee: Decimal,
    pub agent_payout: Decimal,
    pub store_pickup_otp: String,
    pub customer_delivery_otp: String,
    pub assigned_at: DateTime<Utc>,
}

/// Request payload carrying the acting agent for a transition
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentActionRequest {
    pub agent_id: String,
}

/// Request payload for an OTP-verified transition
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyOtpRequest {
    pub agent_id: String,
    pub otp: String,
}

/// Request payload for cancelling a delivery
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelDeliveryRequest {
    pub agent_id: String,
    pub reason: String,
}

/// Query parameters for the delivery list endpoint
///
/// `status` and the dates arrive as strings and are parsed in the handler
/// so a bad value reports which parameter was wrong.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryListQuery {
    pub agent_id: String,
    pub status: Option<String>,
    pub date_from: Option<String>,
    pub date_to: Option<String>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

/// Query parameters for the dashboard endpoint
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardQuery {
    pub agent_id: String,
}

/// Query parameters for the earnings endpoint
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EarningsQuery {
    pub date_from: Option<String>,
    pub date_to: Option<String>,
}

/// Per-group delivery counts returned alongside list pages
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct StatusGroupCounts {
    pub active: i64,
    pub pending: i64,
    pub in_progress: i64,
    pub completed: i64,
    pub problematic: i64,
}

/// Response payload for the delivery list endpoint
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryListResponse {
    pub items: Vec<DeliverySummary>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
    pub total_pages: i64,
    pub counts: StatusGroupCounts,
}

/// Full delivery detail for the agent-facing detail endpoint
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryDetail {
    pub delivery: DeliverySummary,
    pub agent: AgentSummary,
    /// Most recent tracking points, newest first (capped)
    pub tracking: Vec<TrackingPoint>,
    pub issues: Vec<DeliveryIssue>,
    pub rating: Option<super::rating::RatingEntry>,
}

/// Today's figures for the agent dashboard
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct TodayStats {
    pub deliveries: i64,
    pub completed: i64,
    pub earnings: Decimal,
}

/// All-time figures for the agent dashboard
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AllTimeStats {
    pub deliveries: i64,
    pub completed: i64,
    pub failed: i64,
    pub completion_rate: f64,
    pub earnings: Decimal,
    pub average_rating: Decimal,
}

/// Per-status counts of the agent's in-flight deliveries
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ActiveStatusCounts {
    pub assigned: i64,
    pub accepted: i64,
    pub at_store: i64,
    pub picked_up: i64,
    pub in_transit: i64,
}

/// Agent dashboard response
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardResponse {
    pub agent_id: String,
    pub is_available: bool,
    pub status: super::agent::AgentStatus,
    pub status_counts: ActiveStatusCounts,
    pub today: TodayStats,
    pub all_time: AllTimeStats,
}

/// One day of earnings in the earnings breakdown
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct DailyEarnings {
    pub date: NaiveDate,
    pub deliveries: i64,
    pub amount: Decimal,
}

/// Earnings summary over a date range
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EarningsResponse {
    pub agent_id: String,
    pub date_from: NaiveDate,
    pub date_to: NaiveDate,
    pub total_earnings: Decimal,
    pub delivered_count: i64,
    pub daily: Vec<DailyEarnings>,
}

/// One rung of the customer-facing status ladder
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusStep {
    pub status: DeliveryStatus,
    pub label: &'static str,
    pub completed: bool,
    pub current: bool,
    pub timestamp: Option<DateTime<Utc>>,
}

/// Public tracking view for customers
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackDeliveryResponse {
    pub delivery_id: String,
    pub status: DeliveryStatus,
    pub status_label: &'static str,
    pub steps: Vec<StatusStep>,
    pub agent_name: String,
    pub vehicle_type: super::agent::VehicleType,
    pub last_position: Option<TrackingPoint>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub rated: bool,
}

impl Delivery {
    /// Build the customer-facing status ladder from the stamped timestamps.
    ///
    /// A step counts as completed once its timestamp exists, so a cancelled
    /// delivery only shows the progress it actually made.
    pub fn status_steps(&self) -> Vec<StatusStep> {
        vec![
            StatusStep {
                status: DeliveryStatus::Assigned,
                label: DeliveryStatus::Assigned.label(),
                completed: true,
                current: self.status == DeliveryStatus::Assigned,
                timestamp: Some(self.assigned_at),
            },
            StatusStep {
                status: DeliveryStatus::Accepted,
                label: DeliveryStatus::Accepted.label(),
                completed: self.accepted_at.is_some(),
                current: self.status == DeliveryStatus::Accepted,
                timestamp: self.accepted_at,
            },
            StatusStep {
                status: DeliveryStatus::AtStore,
                label: DeliveryStatus::AtStore.label(),
                completed: self.arrived_at_store_at.is_some(),
                current: self.status == DeliveryStatus::AtStore,
                timestamp: self.arrived_at_store_at,
            },
            StatusStep {
                status: DeliveryStatus::PickedUp,
                label: DeliveryStatus::PickedUp.label(),
                completed: self.picked_up_at.is_some(),
                current: self.status == DeliveryStatus::PickedUp,
                timestamp: self.picked_up_at,
            },
            StatusStep {
                status: DeliveryStatus::InTransit,
                label: DeliveryStatus::InTransit.label(),
                completed: self.delivered_at.is_some(),
                current: self.status == DeliveryStatus::InTransit,
                timestamp: None,
            },
            StatusStep {
                status: DeliveryStatus::Delivered,
                label: DeliveryStatus::Delivered.label(),
                completed: self.status == DeliveryStatus::Delivered,
                current: self.status == DeliveryStatus::Delivered,
                timestamp: self.delivered_at,
            },
        ]
    }
}
