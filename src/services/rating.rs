//! Rating Service
//!
//! Customer ratings for delivered orders. One rating per delivery; every
//! accepted rating refreshes the agent's average in the same transaction
//! so the profile never shows a stale figure.

use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::PgPool;
use thiserror::Error;
use tracing::info;

use crate::models::{
    AgentRatingsResponse, DeliveryStatus, PaginationParams, RatingBucket, RatingEntry,
    SubmitRatingResponse,
};

const MIN_RATING: i16 = 1;
const MAX_RATING: i16 = 5;
const MAX_FEEDBACK_LENGTH: usize = 1000;

#[derive(Debug, Error)]
pub enum RatingError {
    #[error("Delivery not found: {0}")]
    DeliveryNotFound(String),

    #[error("Agent not found: {0}")]
    AgentNotFound(String),

    #[error("Delivery {0} has not been delivered yet")]
    NotDelivered(String),

    #[error("Delivery {0} is already rated")]
    AlreadyRated(String),

    #[error("Rating must be between {MIN_RATING} and {MAX_RATING}, got {0}")]
    InvalidRating(i16),

    #[error("Invalid feedback: {0}")]
    InvalidFeedback(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

fn validate_rating(rating: i16) -> Result<(), RatingError> {
    if (MIN_RATING..=MAX_RATING).contains(&rating) {
        Ok(())
    } else {
        Err(RatingError::InvalidRating(rating))
    }
}

/// Trim feedback; empty collapses to none.
fn normalize_feedback(feedback: Option<&str>) -> Result<Option<String>, RatingError> {
    match feedback.map(str::trim) {
        None | Some("") => Ok(None),
        Some(text) if text.chars().count() > MAX_FEEDBACK_LENGTH => Err(
            RatingError::InvalidFeedback(format!(
                "must be at most {MAX_FEEDBACK_LENGTH} characters"
            )),
        ),
        Some(text) => Ok(Some(text.to_string())),
    }
}

/// Buckets for 5 stars down to 1, with each star's share of the total.
fn build_breakdown(counts: &[(i16, i64)], total: i64) -> Vec<RatingBucket> {
    (1..=MAX_RATING)
        .rev()
        .map(|stars| {
            let count = counts
                .iter()
                .find(|(s, _)| *s == stars)
                .map(|(_, c)| *c)
                .unwrap_or(0);
            let percentage = if total == 0 {
                0.0
            } else {
                (count as f64 / total as f64 * 10_000.0).round() / 100.0
            };
            RatingBucket {
                stars,
                count,
                percentage,
            }
        })
        .collect()
}

pub struct RatingService {
    pool: PgPool,
}

impl RatingService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Submit a customer rating for a delivered order.
    pub async fn submit(
        &self,
        delivery_id: &str,
        rating: i16,
        feedback: Option<&str>,
    ) -> Result<SubmitRatingResponse, RatingError> {
        validate_rating(rating)?;
        let feedback = normalize_feedback(feedback)?;

        let mut tx = self.pool.begin().await?;

        let delivery = sqlx::query_as::<_, (String, DeliveryStatus)>(
            "SELECT agent_id, status FROM deliveries WHERE delivery_id = $1",
        )
        .bind(delivery_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| RatingError::DeliveryNotFound(delivery_id.to_string()))?;

        if delivery.1 != DeliveryStatus::Delivered {
            return Err(RatingError::NotDelivered(delivery_id.to_string()));
        }

        let now = Utc::now();
        let inserted = sqlx::query(
            r#"
            INSERT INTO delivery_ratings (delivery_id, rating, feedback, created_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (delivery_id) DO NOTHING
            "#,
        )
        .bind(delivery_id)
        .bind(rating)
        .bind(&feedback)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        if inserted.rows_affected() == 0 {
            return Err(RatingError::AlreadyRated(delivery_id.to_string()));
        }

        let average = sqlx::query_scalar::<_, Option<Decimal>>(
            r#"
            SELECT ROUND(AVG(r.rating), 2)
            FROM delivery_ratings r
            JOIN deliveries d ON d.delivery_id = r.delivery_id
            WHERE d.agent_id = $1
            "#,
        )
        .bind(&delivery.0)
        .fetch_one(&mut *tx)
        .await?
        .unwrap_or(Decimal::ZERO);

        sqlx::query(
            "UPDATE delivery_agents SET average_rating = $2, updated_at = $3 WHERE agent_id = $1",
        )
        .bind(&delivery.0)
        .bind(average)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        info!(delivery_id, rating, agent_id = delivery.0, "Rating submitted");

        Ok(SubmitRatingResponse {
            delivery_id: delivery_id.to_string(),
            rating,
            agent_average_rating: average,
        })
    }

    /// The agent's ratings, newest first, with the per-star breakdown.
    pub async fn for_agent(
        &self,
        agent_id: &str,
        params: &PaginationParams,
    ) -> Result<AgentRatingsResponse, RatingError> {
        let average = sqlx::query_scalar::<_, Decimal>(
            "SELECT average_rating FROM delivery_agents WHERE agent_id = $1",
        )
        .bind(agent_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| RatingError::AgentNotFound(agent_id.to_string()))?;

        let counts = sqlx::query_as::<_, (i16, i64)>(
            r#"
            SELECT r.rating, COUNT(*)
            FROM delivery_ratings r
            JOIN deliveries d ON d.delivery_id = r.delivery_id
            WHERE d.agent_id = $1
            GROUP BY r.rating
            "#,
        )
        .bind(agent_id)
        .fetch_all(&self.pool)
        .await?;

        let total: i64 = counts.iter().map(|(_, c)| c).sum();

        let items = sqlx::query_as::<_, RatingEntry>(
            r#"
            SELECT r.delivery_id, r.rating, r.feedback, d.delivered_at, r.created_at
            FROM delivery_ratings r
            JOIN deliveries d ON d.delivery_id = r.delivery_id
            WHERE d.agent_id = $1
            ORDER BY r.created_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(agent_id)
        .bind(params.per_page())
        .bind(params.offset())
        .fetch_all(&self.pool)
        .await?;

        let per_page = params.per_page();

        Ok(AgentRatingsResponse {
            agent_id: agent_id.to_string(),
            average_rating: average,
            total,
            breakdown: build_breakdown(&counts, total),
            items,
            page: params.page(),
            per_page,
            total_pages: (total + per_page - 1) / per_page,
        })
    }
}
