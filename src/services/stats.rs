//! Stats Service
//!
//! Recomputes agent counters (delivery totals, earnings, average rating)
//! from the source tables. Terminal delivery transitions call into this
//! within their own transaction; the background refresh job sweeps the
//! whole fleet to correct any drift.

use sqlx::PgPool;

pub struct StatsService {
    pool: PgPool,
}

impl StatsService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Recompute one agent's counters inside a caller-owned transaction.
    pub async fn recompute_agent_in_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        agent_id: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE delivery_agents SET
                total_deliveries = (SELECT COUNT(*) FROM deliveries
                    WHERE agent_id = $1),
                successful_deliveries = (SELECT COUNT(*) FROM deliveries
                    WHERE agent_id = $1 AND status = 'delivered'),
                failed_deliveries = (SELECT COUNT(*) FROM deliveries
                    WHERE agent_id = $1 AND status IN ('cancelled', 'failed')),
                total_earnings = (SELECT COALESCE(SUM(agent_payout), 0) FROM deliveries
                    WHERE agent_id = $1 AND status = 'delivered'),
                average_rating = (SELECT COALESCE(ROUND(AVG(r.rating), 2), 0)
                    FROM delivery_ratings r
                    JOIN deliveries d ON d.delivery_id = r.delivery_id
                    WHERE d.agent_id = $1),
                updated_at = NOW()
            WHERE agent_id = $1
            "#,
        )
        .bind(agent_id)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }

    /// Recompute every agent's counters. Returns the number of agents
    /// refreshed.
    pub async fn recompute_all(&self) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE delivery_agents a SET
                total_deliveries = (SELECT COUNT(*) FROM deliveries d
                    WHERE d.agent_id = a.agent_id),
                successful_deliveries = (SELECT COUNT(*) FROM deliveries d
                    WHERE d.agent_id = a.agent_id AND d.status = 'delivered'),
                failed_deliveries = (SELECT COUNT(*) FROM deliveries d
                    WHERE d.agent_id = a.agent_id AND d.status IN ('cancelled', 'failed')),
                total_earnings = (SELECT COALESCE(SUM(d.agent_payout), 0) FROM deliveries d
                    WHERE d.agent_id = a.agent_id AND d.status = 'delivered'),
                average_rating = (SELECT COALESCE(ROUND(AVG(r.rating), 2), 0)
                    FROM delivery_ratings r
                    JOIN deliveries d ON d.delivery_id = r.delivery_id
                    WHERE d.agent_id = a.agent_id),
                updated_at = NOW()
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
