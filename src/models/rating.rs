use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Customer rating for a completed delivery
#[derive(Debug, Clone, FromRow)]
pub struct DeliveryRating {
    pub delivery_id: String,
    pub rating: i16,
    pub feedback: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Request payload for submitting a rating
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRatingRequest {
    pub rating: i16,
    pub feedback: Option<String>,
}

/// One rating in an agent's feedback feed
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct RatingEntry {
    pub delivery_id: String,
    pub rating: i16,
    pub feedback: Option<String>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Count and share of one star value across an agent's ratings
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RatingBucket {
    pub stars: i16,
    pub count: i64,
    pub percentage: f64,
}

/// Response payload for submitting a rating
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRatingResponse {
    pub delivery_id: String,
    pub rating: i16,
    pub agent_average_rating: Decimal,
}

/// An agent's rating feed with the per-star breakdown
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentRatingsResponse {
    pub agent_id: String,
    pub average_rating: Decimal,
    pub total: i64,
    /// Buckets for 5 stars down to 1
    pub breakdown: Vec<RatingBucket>,
    pub items: Vec<RatingEntry>,
    pub page: i64,
    pub per_page: i64,
    pub total_pages: i64,
}
