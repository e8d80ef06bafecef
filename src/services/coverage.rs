//! ZIP Coverage Service
//!
//! Manages the set of ZIP codes each agent serves. Coverage gates
//! availability: an agent cannot go available without at least one active
//! ZIP. Rows are deactivated rather than deleted so a per-zip fee override
//! survives a temporary removal.

use sqlx::PgPool;
use thiserror::Error;
use tracing::info;

use crate::models::ZipCoverage;

const MIN_ZIP_LENGTH: usize = 3;
const MAX_ZIP_LENGTH: usize = 10;

#[derive(Debug, Error)]
pub enum CoverageError {
    #[error("Agent not found: {0}")]
    AgentNotFound(String),

    #[error("Invalid ZIP code: {0}")]
    InvalidZipCode(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Normalize a submitted ZIP list: trim, uppercase, drop empties, dedupe
/// preserving first occurrence. Errors on codes outside 3..=10 chars.
pub fn normalize_zip_codes(zip_codes: &[String]) -> Result<Vec<String>, CoverageError> {
    let mut normalized: Vec<String> = Vec::with_capacity(zip_codes.len());
    for raw in zip_codes {
        let zip = raw.trim().to_uppercase();
        if zip.is_empty() {
            continue;
        }
        if zip.len() < MIN_ZIP_LENGTH || zip.len() > MAX_ZIP_LENGTH {
            return Err(CoverageError::InvalidZipCode(format!(
                "'{zip}' must be {MIN_ZIP_LENGTH}-{MAX_ZIP_LENGTH} characters"
            )));
        }
        if !normalized.contains(&zip) {
            normalized.push(zip);
        }
    }
    Ok(normalized)
}

pub struct CoverageService {
    pool: PgPool,
}

impl CoverageService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// All coverage rows for an agent, active rows first, then by zip.
    pub async fn list_coverage(&self, agent_id: &str) -> Result<Vec<ZipCoverage>, CoverageError> {
        self.ensure_agent_exists(agent_id).await?;

        let rows = sqlx::query_as::<_, ZipCoverage>(
            r#"
            SELECT zip_code, is_active, fee_override, updated_at
            FROM agent_zip_coverage
            WHERE agent_id = $1
            ORDER BY is_active DESC, zip_code ASC
            "#,
        )
        .bind(agent_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Replace an agent's active coverage with the given list.
    ///
    /// Zips in the list are upserted active; existing rows not in the list
    /// are deactivated. Returns the resulting active zip codes.
    pub async fn set_coverage(
        &self,
        agent_id: &str,
        zip_codes: &[String],
    ) -> Result<Vec<String>, CoverageError> {
        self.ensure_agent_exists(agent_id).await?;
        let zips = normalize_zip_codes(zip_codes)?;

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            UPDATE agent_zip_coverage
            SET is_active = FALSE, updated_at = NOW()
            WHERE agent_id = $1 AND is_active AND zip_code <> ALL($2)
            "#,
        )
        .bind(agent_id)
        .bind(&zips)
        .execute(&mut *tx)
        .await?;

        for zip in &zips {
            sqlx::query(
                r#"
                INSERT INTO agent_zip_coverage (agent_id, zip_code, is_active)
                VALUES ($1, $2, TRUE)
                ON CONFLICT (agent_id, zip_code) DO UPDATE
                SET is_active = TRUE, updated_at = NOW()
                "#,
            )
            .bind(agent_id)
            .bind(zip)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        info!(agent_id, zips = zips.len(), "Service areas updated");

        Ok(zips)
    }

    async fn ensure_agent_exists(&self, agent_id: &str) -> Result<(), CoverageError> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM delivery_agents WHERE agent_id = $1)",
        )
        .bind(agent_id)
        .fetch_one(&self.pool)
        .await?;

        if exists {
            Ok(())
        } else {
            Err(CoverageError::AgentNotFound(agent_id.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn normalizes_case_and_whitespace() {
        let zips = normalize_zip_codes(&strings(&["  560001 ", "ab-12x"])).unwrap();
        assert_eq!(zips, vec!["560001".to_string(), "AB-12X".to_string()]);
    }

    #[test]
    fn drops_empty_entries_and_duplicates() {
        let zips = normalize_zip_codes(&strings(&["", "560001", " ", "560001"])).unwrap();
        assert_eq!(zips, vec!["560001".to_string()]);
    }

    #[test]
    fn rejects_too_short_zip() {
        let err = normalize_zip_codes(&strings(&["12"])).unwrap_err();
        assert!(matches!(err, CoverageError::InvalidZipCode(_)));
    }

    #[test]
    fn rejects_too_long_zip() {
        let err = normalize_zip_codes(&strings(&["12345678901"])).unwrap_err();
        assert!(matches!(err, CoverageError::InvalidZipCode(_)));
    }

    #[test]
    fn empty_input_yields_empty_list() {
        assert!(normalize_zip_codes(&[]).unwrap().is_empty());
    }
}
