use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;

/// How the delivery fee is computed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "fee_method", rename_all = "snake_case")]
pub enum FeeMethod {
    Fixed,
    Distance,
    OrderValue,
}

impl fmt::Display for FeeMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Fixed => "fixed",
            Self::Distance => "distance",
            Self::OrderValue => "order_value",
        };
        write!(f, "{s}")
    }
}

impl FromStr for FeeMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fixed" => Ok(Self::Fixed),
            "distance" => Ok(Self::Distance),
            "order_value" => Ok(Self::OrderValue),
            _ => Err(format!("invalid fee method: {s}")),
        }
    }
}

/// Platform-wide delivery fee settings (single row)
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct DeliverySettings {
    pub base_delivery_fee: Decimal,
    pub fee_per_km: Decimal,
    pub minimum_delivery_fee: Decimal,
    pub maximum_delivery_fee: Decimal,
    pub calculation_method: FeeMethod,
    pub free_delivery_threshold: Decimal,
    pub agent_payout_percentage: Decimal,
    pub updated_at: DateTime<Utc>,
}

impl Default for DeliverySettings {
    fn default() -> Self {
        Self {
            base_delivery_fee: Decimal::new(4000, 2),
            fee_per_km: Decimal::new(500, 2),
            minimum_delivery_fee: Decimal::new(3000, 2),
            maximum_delivery_fee: Decimal::new(15000, 2),
            calculation_method: FeeMethod::Fixed,
            free_delivery_threshold: Decimal::new(50000, 2),
            agent_payout_percentage: Decimal::new(8000, 2),
            updated_at: Utc::now(),
        }
    }
}

/// Request payload for updating fee settings; unset fields keep their value
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSettingsRequest {
    pub base_delivery_fee: Option<Decimal>,
    pub fee_per_km: Option<Decimal>,
    pub minimum_delivery_fee: Option<Decimal>,
    pub maximum_delivery_fee: Option<Decimal>,
    pub calculation_method: Option<FeeMethod>,
    pub free_delivery_threshold: Option<Decimal>,
    pub agent_payout_percentage: Option<Decimal>,
}
