use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Category of a reported delivery problem
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "issue_type", rename_all = "lowercase")]
pub enum IssueType {
    Delay,
    Damage,
    Location,
    Customer,
    Traffic,
    Vehicle,
    Weather,
    Other,
}

impl IssueType {
    /// Human-readable label
    pub fn label(&self) -> &'static str {
        match self {
            Self::Delay => "Delivery Delay",
            Self::Damage => "Package Damage",
            Self::Location => "Wrong Location",
            Self::Customer => "Customer Unavailable",
            Self::Traffic => "Traffic Issues",
            Self::Vehicle => "Vehicle Problems",
            Self::Weather => "Bad Weather",
            Self::Other => "Other Issue",
        }
    }
}

impl fmt::Display for IssueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Delay => "delay",
            Self::Damage => "damage",
            Self::Location => "location",
            Self::Customer => "customer",
            Self::Traffic => "traffic",
            Self::Vehicle => "vehicle",
            Self::Weather => "weather",
            Self::Other => "other",
        };
        write!(f, "{s}")
    }
}

impl FromStr for IssueType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "delay" => Ok(Self::Delay),
            "damage" => Ok(Self::Damage),
            "location" => Ok(Self::Location),
            "customer" => Ok(Self::Customer),
            "traffic" => Ok(Self::Traffic),
            "vehicle" => Ok(Self::Vehicle),
            "weather" => Ok(Self::Weather),
            "other" => Ok(Self::Other),
            _ => Err(format!("invalid issue type: {s}")),
        }
    }
}

/// Issue reported against a delivery
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryIssue {
    pub issue_id: Uuid,
    pub delivery_id: String,
    pub issue_type: IssueType,
    pub description: String,
    pub resolved: bool,
    pub resolution: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request payload for reporting an issue
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportIssueRequest {
    pub agent_id: String,
    pub issue_type: IssueType,
    pub description: String,
}

/// Request payload for resolving an issue
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveIssueRequest {
    pub resolution: String,
}
