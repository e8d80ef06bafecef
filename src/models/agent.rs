use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;

/// Working status of a delivery agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "agent_status", rename_all = "snake_case")]
pub enum AgentStatus {
    Active,
    Offline,
    OnBreak,
    Busy,
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Active => "active",
            Self::Offline => "offline",
            Self::OnBreak => "on_break",
            Self::Busy => "busy",
        };
        write!(f, "{s}")
    }
}

impl FromStr for AgentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "offline" => Ok(Self::Offline),
            "on_break" => Ok(Self::OnBreak),
            "busy" => Ok(Self::Busy),
            _ => Err(format!("invalid agent status: {s}")),
        }
    }
}

/// Vehicle an agent delivers with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "vehicle_type", rename_all = "lowercase")]
pub enum VehicleType {
    Bicycle,
    Scooter,
    Motorcycle,
    Car,
    Van,
}

impl fmt::Display for VehicleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Bicycle => "bicycle",
            Self::Scooter => "scooter",
            Self::Motorcycle => "motorcycle",
            Self::Car => "car",
            Self::Van => "van",
        };
        write!(f, "{s}")
    }
}

/// Delivery agent entity
#[derive(Debug, Clone, FromRow)]
pub struct DeliveryAgent {
    pub agent_id: String,
    pub full_name: String,
    pub phone_number: String,
    pub alternative_phone: Option<String>,
    pub store_id: Option<String>,
    pub status: AgentStatus,
    pub is_available: bool,
    pub vehicle_type: VehicleType,
    pub vehicle_number: Option<String>,
    pub max_concurrent_orders: i32,
    pub service_area_radius_km: i32,
    pub current_latitude: Option<f64>,
    pub current_longitude: Option<f64>,
    pub last_location_update: Option<DateTime<Utc>>,
    pub total_deliveries: i32,
    pub successful_deliveries: i32,
    pub failed_deliveries: i32,
    pub total_earnings: Decimal,
    pub average_rating: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DeliveryAgent {
    /// Share of deliveries completed successfully, as a percentage
    pub fn success_rate(&self) -> f64 {
        if self.total_deliveries == 0 {
            return 0.0;
        }
        let rate = self.successful_deliveries as f64 / self.total_deliveries as f64 * 100.0;
        (rate * 100.0).round() / 100.0
    }
}

/// Request payload for agent registration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterAgentRequest {
    pub full_name: String,
    pub phone_number: String,
    pub alternative_phone: Option<String>,
    pub store_id: Option<String>,
    pub vehicle_type: VehicleType,
    pub vehicle_number: Option<String>,
}

/// Response payload for successful agent registration
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterAgentResponse {
    pub agent_id: String,
    pub full_name: String,
    pub status: AgentStatus,
    pub vehicle_type: VehicleType,
    pub created_at: DateTime<Utc>,
}

/// Full agent profile including derived figures
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentProfile {
    pub agent_id: String,
    pub full_name: String,
    pub phone_number: String,
    pub alternative_phone: Option<String>,
    pub store_id: Option<String>,
    pub status: AgentStatus,
    pub is_available: bool,
    pub vehicle_type: VehicleType,
    pub vehicle_number: Option<String>,
    pub max_concurrent_orders: i32,
    pub service_area_radius_km: i32,
    pub current_latitude: Option<f64>,
    pub current_longitude: Option<f64>,
    pub last_location_update: Option<DateTime<Utc>>,
    pub total_deliveries: i32,
    pub successful_deliveries: i32,
    pub failed_deliveries: i32,
    pub total_earnings: Decimal,
    pub average_rating: Decimal,
    pub success_rate: f64,
    pub active_order_count: i64,
    pub can_accept_orders: bool,
    pub created_at: DateTime<Utc>,
}

/// Compact agent view embedded in delivery responses
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct AgentSummary {
    pub agent_id: String,
    pub full_name: String,
    pub phone_number: String,
    pub vehicle_type: VehicleType,
    pub vehicle_number: Option<String>,
}

/// Roster row for the paginated agent listing
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct AgentListItem {
    pub agent_id: String,
    pub full_name: String,
    pub phone_number: String,
    pub status: AgentStatus,
    pub is_available: bool,
    pub vehicle_type: VehicleType,
    pub total_deliveries: i32,
    pub average_rating: Decimal,
    pub created_at: DateTime<Utc>,
}

/// ZIP coverage row for an agent's service area
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ZipCoverage {
    pub zip_code: String,
    pub is_active: bool,
    pub fee_override: Option<Decimal>,
    pub updated_at: DateTime<Utc>,
}

/// Request payload for replacing an agent's service areas
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetServiceAreasRequest {
    pub zip_codes: Vec<String>,
}

/// Response payload listing an agent's service areas
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceAreasResponse {
    pub agent_id: String,
    pub zip_codes: Vec<ZipCoverage>,
}

/// Request payload for a location report from an agent's device
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateLocationRequest {
    pub latitude: f64,
    pub longitude: f64,
    /// When set to one of the agent's in-flight deliveries, a tracking
    /// point is appended for it as well.
    pub delivery_id: Option<String>,
}

/// Response payload after a location report
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateLocationResponse {
    pub agent_id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub last_location_update: DateTime<Utc>,
    pub tracking_recorded: bool,
}

/// Response payload after toggling availability
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToggleAvailabilityResponse {
    pub agent_id: String,
    pub is_available: bool,
    pub status: AgentStatus,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn agent_with_counts(total: i32, successful: i32) -> DeliveryAgent {
        DeliveryAgent {
            agent_id: "AGT0001".to_string(),
            full_name: "Test Agent".to_string(),
            phone_number: "+15550000000".to_string(),
            alternative_phone: None,
            store_id: None,
            status: AgentStatus::Offline,
            is_available: false,
            vehicle_type: VehicleType::Motorcycle,
            vehicle_number: None,
            max_concurrent_orders: 3,
            service_area_radius_km: 10,
            current_latitude: None,
            current_longitude: None,
            last_location_update: None,
            total_deliveries: total,
            successful_deliveries: successful,
            failed_deliveries: total - successful,
            total_earnings: Decimal::ZERO,
            average_rating: Decimal::ZERO,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_success_rate_zero_when_no_deliveries() {
        assert_eq!(agent_with_counts(0, 0).success_rate(), 0.0);
    }

    #[test]
    fn test_success_rate_rounds_to_two_decimals() {
        // 2/3 = 66.666... -> 66.67
        assert_eq!(agent_with_counts(3, 2).success_rate(), 66.67);
        assert_eq!(agent_with_counts(4, 4).success_rate(), 100.0);
    }

    #[test]
    fn test_agent_status_round_trip() {
        for s in ["active", "offline", "on_break", "busy"] {
            let status: AgentStatus = s.parse().unwrap();
            assert_eq!(status.to_string(), s);
        }
        assert!("driving".parse::<AgentStatus>().is_err());
    }
}
