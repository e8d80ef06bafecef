//! Issue Service
//!
//! Problem reports raised against a delivery: delays, damage, address
//! trouble. Agents report them, support resolves them.

use chrono::Utc;
use sqlx::PgPool;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::models::{DeliveryIssue, IssueType};

/// Issue descriptions and resolutions share the same length cap.
const MAX_TEXT_LENGTH: usize = 1000;

#[derive(Debug, Error)]
pub enum IssueError {
    #[error("Delivery not found: {0}")]
    DeliveryNotFound(String),

    #[error("Issue not found: {0}")]
    IssueNotFound(Uuid),

    #[error("Delivery {delivery_id} is not assigned to agent {agent_id}")]
    NotOwner {
        delivery_id: String,
        agent_id: String,
    },

    #[error("Invalid description: {0}")]
    InvalidDescription(String),

    #[error("Invalid resolution: {0}")]
    InvalidResolution(String),

    #[error("Issue {0} is already resolved")]
    AlreadyResolved(Uuid),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

fn validate_text(text: &str) -> Result<&str, String> {
    let text = text.trim();
    if text.is_empty() {
        return Err("must not be empty".to_string());
    }
    if text.chars().count() > MAX_TEXT_LENGTH {
        return Err(format!("must be at most {MAX_TEXT_LENGTH} characters"));
    }
    Ok(text)
}

pub struct IssueService {
    pool: PgPool,
}

impl IssueService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Report an issue against a delivery. Only the assigned agent may
    /// report.
    pub async fn report(
        &self,
        delivery_id: &str,
        agent_id: &str,
        issue_type: IssueType,
        description: &str,
    ) -> Result<DeliveryIssue, IssueError> {
        let description = validate_text(description).map_err(IssueError::InvalidDescription)?;

        let owner = sqlx::query_scalar::<_, String>(
            "SELECT agent_id FROM deliveries WHERE delivery_id = $1",
        )
        .bind(delivery_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| IssueError::DeliveryNotFound(delivery_id.to_string()))?;

        if owner != agent_id {
            return Err(IssueError::NotOwner {
                delivery_id: delivery_id.to_string(),
                agent_id: agent_id.to_string(),
            });
        }

        let issue_id = Uuid::new_v4();
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO delivery_issues
                (issue_id, delivery_id, issue_type, description, resolved, created_at, updated_at)
            VALUES ($1, $2, $3, $4, FALSE, $5, $5)
            "#,
        )
        .bind(issue_id)
        .bind(delivery_id)
        .bind(issue_type)
        .bind(description)
        .bind(now)
        .execute(&self.pool)
        .await?;

        info!(delivery_id, agent_id, issue_type = %issue_type, "Issue reported");

        Ok(DeliveryIssue {
            issue_id,
            delivery_id: delivery_id.to_string(),
            issue_type,
            description: description.to_string(),
            resolved: false,
            resolution: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Record an issue inside a caller-owned transaction. The caller has
    /// already verified the delivery and the text.
    pub async fn insert_in_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        delivery_id: &str,
        issue_type: IssueType,
        description: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO delivery_issues
                (issue_id, delivery_id, issue_type, description, resolved, created_at, updated_at)
            VALUES ($1, $2, $3, $4, FALSE, $5, $5)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(delivery_id)
        .bind(issue_type)
        .bind(description)
        .bind(Utc::now())
        .execute(&mut **tx)
        .await?;

        Ok(())
    }

    /// Mark an issue resolved with a resolution note. Resolving twice is a
    /// conflict.
    pub async fn resolve(
        &self,
        issue_id: Uuid,
        resolution: &str,
    ) -> Result<DeliveryIssue, IssueError> {
        let resolution = validate_text(resolution).map_err(IssueError::InvalidResolution)?;

        let mut issue = sqlx::query_as::<_, DeliveryIssue>(
            r#"
            SELECT issue_id, delivery_id, issue_type, description, resolved, resolution,
                   created_at, updated_at
            FROM delivery_issues
            WHERE issue_id = $1
            "#,
        )
        .bind(issue_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(IssueError::IssueNotFound(issue_id))?;

        if issue.resolved {
            return Err(IssueError::AlreadyResolved(issue_id));
        }

        let now = Utc::now();
        sqlx::query(
            "UPDATE delivery_issues SET resolved = TRUE, resolution = $2, updated_at = $3 \
             WHERE issue_id = $1",
        )
        .bind(issue_id)
        .bind(resolution)
        .bind(now)
        .execute(&self.pool)
        .await?;

        info!(issue_id = %issue_id, delivery_id = issue.delivery_id, "Issue resolved");

        issue.resolved = true;
        issue.resolution = Some(resolution.to_string());
        issue.updated_at = now;
        Ok(issue)
    }

    /// All issues for a delivery, newest first.
    pub async fn list(&self, delivery_id: &str) -> Result<Vec<DeliveryIssue>, IssueError> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM deliveries WHERE delivery_id = $1)",
        )
        .bind(delivery_id)
        .fetch_one(&self.pool)
        .await?;
        if !exists {
            return Err(IssueError::DeliveryNotFound(delivery_id.to_string()));
        }

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

        Ok(issues)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_is_trimmed() {
        assert_eq!(validate_text("  stuck in traffic  "), Ok("stuck in traffic"));
    }

    #[test]
    fn empty_text_is_rejected() {
        assert!(validate_text("").is_err());
        assert!(validate_text("   ").is_err());
    }

    #[test]
    fn overlong_text_is_rejected() {
        let text = "x".repeat(MAX_TEXT_LENGTH + 1);
        assert!(validate_text(&text).is_err());
        let text = "x".repeat(MAX_TEXT_LENGTH);
        assert!(validate_text(&text).is_ok());
    }
}
