//! Delivery Settings Service
//!
//! Owns the single platform-wide fee configuration row and the pure fee
//! quoting logic used when a delivery is created.

use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::PgPool;
use thiserror::Error;
use tracing::info;

use crate::models::{DeliverySettings, UpdateSettingsRequest};

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Invalid settings: {0}")]
    InvalidSettings(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Service for reading and updating the delivery fee configuration.
pub struct SettingsService {
    pool: PgPool,
}

impl SettingsService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Fetch the settings row. Falls back to the built-in defaults when the
    /// row has never been written; reads never create it.
    pub async fn get(&self) -> Result<DeliverySettings, SettingsError> {
        let row = sqlx::query_as::<_, DeliverySettings>(
            r#"
            SELECT base_delivery_fee, fee_per_km, minimum_delivery_fee,
                   maximum_delivery_fee, calculation_method, free_delivery_threshold,
                   agent_payout_percentage, updated_at
            FROM delivery_settings
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.unwrap_or_default())
    }

    /// Apply a partial update to the settings row, creating it on first write.
    pub async fn update(
        &self,
        request: UpdateSettingsRequest,
    ) -> Result<DeliverySettings, SettingsError> {
        let current = self.get().await?;

        let next = DeliverySettings {
            base_delivery_fee: request.base_delivery_fee.unwrap_or(current.base_delivery_fee),
            fee_per_km: request.fee_per_km.unwrap_or(current.fee_per_km),
            minimum_delivery_fee: request
                .minimum_delivery_fee
                .unwrap_or(current.minimum_delivery_fee),
            maximum_delivery_fee: request
                .maximum_delivery_fee
                .unwrap_or(current.maximum_delivery_fee),
            calculation_method: request
                .calculation_method
                .unwrap_or(current.calculation_method),
            free_delivery_threshold: request
                .free_delivery_threshold
                .unwrap_or(current.free_delivery_threshold),
            agent_payout_percentage: request
                .agent_payout_percentage
                .unwrap_or(current.agent_payout_percentage),
            updated_at: Utc::now(),
        };

        validate_settings(&next)?;

        sqlx::query(
            r#"
            INSERT INTO delivery_settings
                (id, base_delivery_fee, fee_per_km, minimum_delivery_fee,
                 maximum_delivery_fee, calculation_method, free_delivery_threshold,
                 agent_payout_percentage, updated_at)
            VALUES (TRUE, $1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (id) DO UPDATE SET
                base_delivery_fee = EXCLUDED.base_delivery_fee,
                fee_per_km = EXCLUDED.fee_per_km,
                minimum_delivery_fee = EXCLUDED.minimum_delivery_fee,
                maximum_delivery_fee = EXCLUDED.maximum_delivery_fee,
                calculation_method = EXCLUDED.calculation_method,
                free_delivery_threshold = EXCLUDED.free_delivery_threshold,
                agent_payout_percentage = EXCLUDED.agent_payout_percentage,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(next.base_delivery_fee)
        .bind(next.fee_per_km)
        .bind(next.minimum_delivery_fee)
        .bind(next.maximum_delivery_fee)
        .bind(next.calculation_method)
        .bind(next.free_delivery_threshold)
        .bind(next.agent_payout_percentage)
        .bind(next.updated_at)
        .execute(&self.pool)
        .await?;

        info!(
            method = %next.calculation_method,
            base_fee = %next.base_delivery_fee,
            "Delivery settings updated"
        );

        Ok(next)
    }
}

fn validate_settings(settings: &DeliverySettings) -> Result<(), SettingsError> {
    let fees = [
        ("baseDeliveryFee", settings.base_delivery_fee),
        ("feePerKm", settings.fee_per_km),
        ("minimumDeliveryFee", settings.minimum_delivery_fee),
        ("maximumDeliveryFee", settings.maximum_delivery_fee),
        ("freeDeliveryThreshold", settings.free_delivery_threshold),
    ];
    for (name, value) in fees {
        if value < Decimal::ZERO {
            return Err(SettingsError::InvalidSettings(format!(
                "{name} must not be negative"
            )));
        }
    }

    if settings.minimum_delivery_fee > settings.maximum_delivery_fee {
        return Err(SettingsError::InvalidSettings(
            "minimumDeliveryFee must not exceed maximumDeliveryFee".to_string(),
        ));
    }

    if settings.agent_payout_percentage < Decimal::ZERO
        || settings.agent_payout_percentage > Decimal::ONE_HUNDRED
    {
        return Err(SettingsError::InvalidSettings(
            "agentPayoutPercentage must be between 0 and 100".to_string(),
        ));
    }

    Ok(())
}

/// Quote the delivery fee for a prospective delivery.
///
/// Orders at or above the free-delivery threshold ship free under every
/// calculation method. Non-zero quotes are clamped into
/// `[minimum_delivery_fee, maximum_delivery_fee]`.
pub fn quote_fee(
    settings: &DeliverySettings,
    distance_km: Option<Decimal>,
    order_value: Option<Decimal>,
) -> Decimal {
    use crate::models::FeeMethod;

    if let Some(value) = order_value {
        if value >= settings.free_delivery_threshold {
            return Decimal::ZERO;
        }
    }

    let raw = match settings.calculation_method {
        FeeMethod::Fixed => settings.base_delivery_fee,
        FeeMethod::Distance => match distance_km {
            Some(km) => settings.base_delivery_fee + km * settings.fee_per_km,
            None => settings.base_delivery_fee,
        },
        FeeMethod::OrderValue => match order_value {
            Some(value) => {
                let discount = (value / (settings.free_delivery_threshold * Decimal::TWO))
                    .min(Decimal::new(5, 1));
                settings.base_delivery_fee * (Decimal::ONE - discount)
            }
            None => settings.base_delivery_fee,
        },
    };

    raw.max(settings.minimum_delivery_fee)
        .min(settings.maximum_delivery_fee)
        .round_dp(2)
}

/// The share of a delivery fee credited to the agent, rounded to 2 decimals.
pub fn quote_payout(settings: &DeliverySettings, fee: Decimal) -> Decimal {
    (fee * settings.agent_payout_percentage / Decimal::ONE_HUNDRED).round_dp(2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FeeMethod;
    use proptest::prelude::*;

    fn settings_with(method: FeeMethod) -> DeliverySettings {
        DeliverySettings {
            calculation_method: method,
            ..DeliverySettings::default()
        }
    }

    #[test]
    fn fixed_method_quotes_base_fee() {
        let settings = settings_with(FeeMethod::Fixed);
        let fee = quote_fee(&settings, None, None);
        assert_eq!(fee, Decimal::new(4000, 2));
    }

    #[test]
    fn distance_method_adds_per_km_fee() {
        let settings = settings_with(FeeMethod::Distance);
        // 40 + 10 * 5 = 90
        let fee = quote_fee(&settings, Some(Decimal::from(10)), None);
        assert_eq!(fee, Decimal::from(90).round_dp(2));
    }

    #[test]
    fn distance_method_without_distance_falls_back_to_base() {
        let settings = settings_with(FeeMethod::Distance);
        assert_eq!(quote_fee(&settings, None, None), Decimal::new(4000, 2));
    }

    #[test]
    fn long_distance_clamps_to_maximum() {
        let settings = settings_with(FeeMethod::Distance);
        // 40 + 100 * 5 = 540, clamped to 150
        let fee = quote_fee(&settings, Some(Decimal::from(100)), None);
        assert_eq!(fee, Decimal::new(15000, 2));
    }

    #[test]
    fn order_value_discount_clamps_to_minimum() {
        let settings = settings_with(FeeMethod::OrderValue);
        // 499 / 1000 -> discount capped near 0.5 -> 40 * 0.501 ~= 20, below min 30
        let fee = quote_fee(&settings, None, Some(Decimal::from(499)));
        assert_eq!(fee, Decimal::new(3000, 2));
    }

    #[test]
    fn order_value_above_threshold_is_free_for_any_method() {
        for method in [FeeMethod::Fixed, FeeMethod::Distance, FeeMethod::OrderValue] {
            let settings = settings_with(method);
            let fee = quote_fee(&settings, Some(Decimal::from(5)), Some(Decimal::from(500)));
            assert_eq!(fee, Decimal::ZERO);
        }
    }

    #[test]
    fn small_order_gets_small_discount() {
        let settings = settings_with(FeeMethod::OrderValue);
        // discount = 100 / 1000 = 0.1 -> 40 * 0.9 = 36
        let fee = quote_fee(&settings, None, Some(Decimal::from(100)));
        assert_eq!(fee, Decimal::new(3600, 2));
    }

    #[test]
    fn payout_is_percentage_of_fee() {
        let settings = DeliverySettings::default();
        let payout = quote_payout(&settings, Decimal::from(100));
        assert_eq!(payout, Decimal::new(8000, 2));
    }

    #[test]
    fn payout_rounds_to_two_decimals() {
        let settings = DeliverySettings {
            agent_payout_percentage: Decimal::new(3333, 2),
            ..DeliverySettings::default()
        };
        let payout = quote_payout(&settings, Decimal::from(10));
        assert_eq!(payout, Decimal::new(333, 2));
    }

    #[test]
    fn validate_rejects_negative_fee() {
        let settings = DeliverySettings {
            base_delivery_fee: Decimal::from(-1),
            ..DeliverySettings::default()
        };
        assert!(validate_settings(&settings).is_err());
    }

    #[test]
    fn validate_rejects_inverted_bounds() {
        let settings = DeliverySettings {
            minimum_delivery_fee: Decimal::from(200),
            maximum_delivery_fee: Decimal::from(100),
            ..DeliverySettings::default()
        };
        assert!(validate_settings(&settings).is_err());
    }

    #[test]
    fn validate_rejects_payout_percentage_above_100() {
        let settings = DeliverySettings {
            agent_payout_percentage: Decimal::from(101),
            ..DeliverySettings::default()
        };
        assert!(validate_settings(&settings).is_err());
    }

    proptest! {
        /// A quote below the free-delivery threshold always lands inside the
        /// configured bounds, for every calculation method.
        #[test]
        fn quotes_stay_within_bounds(
            distance_km in 0u32..1000,
            order_value in 0u32..500,
            method_idx in 0usize..3,
        ) {
            let method = [FeeMethod::Fixed, FeeMethod::Distance, FeeMethod::OrderValue][method_idx];
            let settings = settings_with(method);
            let fee = quote_fee(
                &settings,
                Some(Decimal::from(distance_km)),
                Some(Decimal::from(order_value)),
            );
            prop_assert!(fee >= settings.minimum_delivery_fee);
            prop_assert!(fee <= settings.maximum_delivery_fee);
        }

        #[test]
        fn payout_never_exceeds_fee(fee in 0u32..10_000) {
            let settings = DeliverySettings::default();
            let fee = Decimal::from(fee);
            prop_assert!(quote_payout(&settings, fee) <= fee);
        }
    }
}
