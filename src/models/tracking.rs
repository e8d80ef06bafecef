use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// One GPS point on a delivery's route
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct TrackingPoint {
    pub id: Uuid,
    pub delivery_id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub recorded_at: DateTime<Utc>,
}

/// Query parameters for the tracking history endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct TrackingHistoryQuery {
    /// Maximum points to return (default 50, cap 200)
    pub limit: Option<i64>,
}

/// Response payload for the tracking history endpoint
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingHistoryResponse {
    pub delivery_id: String,
    /// Points ordered most recent first
    pub points: Vec<TrackingPoint>,
}
