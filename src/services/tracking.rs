//! Delivery Tracking Service
//!
//! Append-only GPS log for deliveries. Points are recorded by the agent's
//! location updates and by lifecycle transitions; nothing ever updates or
//! deletes a recorded point.

use chrono::Utc;
use sqlx::PgPool;
use thiserror::Error;
use uuid::Uuid;

use crate::models::TrackingPoint;

pub const DEFAULT_HISTORY_LIMIT: i64 = 50;
pub const MAX_HISTORY_LIMIT: i64 = 200;

#[derive(Debug, Error)]
pub enum TrackingError {
    #[error("Delivery not found: {0}")]
    DeliveryNotFound(String),

    #[error("Invalid coordinates: {0}")]
    InvalidCoordinates(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Validate a latitude/longitude pair.
pub fn validate_coordinates(latitude: f64, longitude: f64) -> Result<(), TrackingError> {
    if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
        return Err(TrackingError::InvalidCoordinates(format!(
            "latitude {latitude} out of range [-90, 90]"
        )));
    }
    if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
        return Err(TrackingError::InvalidCoordinates(format!(
            "longitude {longitude} out of range [-180, 180]"
        )));
    }
    Ok(())
}

pub struct TrackingService {
    pool: PgPool,
}

impl TrackingService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Record a tracking point for a delivery.
    pub async fn append(
        &self,
        delivery_id: &str,
        latitude: f64,
        longitude: f64,
    ) -> Result<TrackingPoint, TrackingError> {
        validate_coordinates(latitude, longitude)?;

        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM deliveries WHERE delivery_id = $1)",
        )
        .bind(delivery_id)
        .fetch_one(&self.pool)
        .await?;
        if !exists {
            return Err(TrackingError::DeliveryNotFound(delivery_id.to_string()));
        }

        let id = Uuid::new_v4();
        let recorded_at = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO delivery_tracking (id, delivery_id, latitude, longitude, recorded_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(id)
        .bind(delivery_id)
        .bind(latitude)
        .bind(longitude)
        .bind(recorded_at)
        .execute(&self.pool)
        .await?;

        Ok(TrackingPoint {
            id,
            delivery_id: delivery_id.to_string(),
            latitude,
            longitude,
            recorded_at,
        })
    }

    /// Record a tracking point inside an existing transaction. The caller is
    /// responsible for the delivery existing and for coordinate validation.
    pub async fn append_in_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        delivery_id: &str,
        latitude: f64,
        longitude: f64,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO delivery_tracking (id, delivery_id, latitude, longitude, recorded_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(delivery_id)
        .bind(latitude)
        .bind(longitude)
        .bind(Utc::now())
        .execute(&mut **tx)
        .await?;

        Ok(())
    }

    /// Tracking history for a delivery, most recent point first.
    ///
    /// `limit` defaults to 50 and is capped at 200.
    pub async fn history(
        &self,
        delivery_id: &str,
        limit: Option<i64>,
    ) -> Result<Vec<TrackingPoint>, TrackingError> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM deliveries WHERE delivery_id = $1)",
        )
        .bind(delivery_id)
        .fetch_one(&self.pool)
        .await?;
        if !exists {
            return Err(TrackingError::DeliveryNotFound(delivery_id.to_string()));
        }

        let limit = limit
            .unwrap_or(DEFAULT_HISTORY_LIMIT)
            .clamp(1, MAX_HISTORY_LIMIT);

        let points = sqlx::query_as::<_, TrackingPoint>(
            r#"
            SELECT id, delivery_id, latitude, longitude, recorded_at
            FROM delivery_tracking
            WHERE delivery_id = $1
            ORDER BY recorded_at DESC, seq DESC
            LIMIT $2
            "#,
        )
        .bind(delivery_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(points)
    }

    /// The newest tracking point for a delivery, if any.
    pub async fn latest(&self, delivery_id: &str) -> Result<Option<TrackingPoint>, TrackingError> {
        let point = sqlx::query_as::<_, TrackingPoint>(
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

        Ok(point)
    }
}
