pub mod agent;
pub mod coverage;
pub mod delivery;
pub mod issue;
pub mod jobs;
pub mod rate_limiter;
pub mod rating;
pub mod settings;
pub mod stats;
pub mod tracking;



pub use agent::{AgentError, AgentService};
pub use coverage::{CoverageError, CoverageService};
pub use delivery::{DeliveryError, DeliveryService};
pub use issue::{IssueError, IssueService};
pub use jobs::{StatsJob, StatsJobConfig, run_stats_refresh};
pub use rate_limiter::{
    RateLimitConfig, RateLimitError, RateLimiterService, default_rate_limits,
};
pub use rating::{RatingError, RatingService};
pub use settings::{SettingsError, SettingsService, quote_fee, quote_payout};
pub use stats::StatsService;
pub use tracking::{TrackingError, TrackingService, validate_coordinates};
