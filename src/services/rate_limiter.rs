//! Rate Limiter Service
//!
//! Per-agent, per-action sliding-window limiter for the mobile telemetry
//! endpoints. Courier apps post location pings and availability toggles on
//! timers; a misbehaving device can flood the service, so both endpoints are
//! capped per agent. State is in-memory: limits reset on restart, which is
//! acceptable for telemetry.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

#[derive(Debug, Error)]
pub enum RateLimitError {
    #[error("Rate limit exceeded for action '{action}'. Retry after {retry_after} seconds")]
    RateLimited { action: String, retry_after: u64 },
}

/// Limit for one action type.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Maximum requests allowed in the window
    pub max_requests: u32,
    /// Window duration in seconds
    pub window_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 100,
            window_secs: 3600,
        }
    }
}

/// Default limits per action type.
pub fn default_rate_limits() -> HashMap<String, RateLimitConfig> {
    let mut limits = HashMap::new();

    // Location pings arrive every few seconds while a delivery is moving.
    limits.insert(
        "update_location".to_string(),
        RateLimitConfig {
            max_requests: 120,
            window_secs: 60,
        },
    );

    // Availability flapping is a support headache; keep this one tight.
    limits.insert(
        "toggle_availability".to_string(),
        RateLimitConfig {
            max_requests: 10,
            window_secs: 600,
        },
    );

    limits.insert(
        "agent_register".to_string(),
        RateLimitConfig {
            max_requests: 10,
            window_secs: 3600,
        },
    );

    limits
}

/// Time bucket for tracking requests in a sliding window
#[derive(Debug, Clone)]
struct TimeBucket {
    start_time: DateTime<Utc>,
    count: u32,
}

/// Per-agent, per-action window state
#[derive(Debug, Clone, Default)]
struct AgentActionState {
    buckets: Vec<TimeBucket>,
}

/// Sliding-window rate limiter with time-bucketed tracking. Each agent has
/// independent state; unknown actions fall back to the default config.
#[derive(Debug, Clone)]
pub struct RateLimiterService {
    configs: HashMap<String, RateLimitConfig>,
    /// agent_id -> (action -> state)
    state: Arc<RwLock<HashMap<String, HashMap<String, AgentActionState>>>>,
    /// Bucket granularity in seconds
    bucket_size_secs: u64,
}

impl Default for RateLimiterService {
    fn default() -> Self {
        Self::new(default_rate_limits())
    }
}

impl RateLimiterService {
    pub fn new(configs: HashMap<String, RateLimitConfig>) -> Self {
        Self {
            configs,
            state: Arc::new(RwLock::new(HashMap::new())),
            bucket_size_secs: 60,
        }
    }

    /// Create a rate limiter with custom bucket size (for testing)
    pub fn with_bucket_size(
        configs: HashMap<String, RateLimitConfig>,
        bucket_size_secs: u64,
    ) -> Self {
        Self {
            configs,
            state: Arc::new(RwLock::new(HashMap::new())),
            bucket_size_secs,
        }
    }

    /// Check whether a request is allowed, recording it if so.
    pub async fn check_and_record(
        &self,
        agent_id: &str,
        action: &str,
    ) -> Result<(), RateLimitError> {
        let now = Utc::now();
        let config = self.configs.get(action).cloned().unwrap_or_default();

        let mut state = self.state.write().await;
        let agent_state = state.entry(agent_id.to_string()).or_default();
        let action_state = agent_state.entry(action.to_string()).or_default();

        let window_start = now - Duration::seconds(config.window_secs as i64);
        action_state
            .buckets
            .retain(|b| b.start_time >= window_start);

        let current_count: u32 = action_state.buckets.iter().map(|b| b.count).sum();

        if current_count >= config.max_requests {
            let retry_after = if let Some(oldest) = action_state.buckets.first() {
                let oldest_expiry =
                    oldest.start_time + Duration::seconds(config.window_secs as i64);
                (oldest_expiry - now).num_seconds().max(1) as u64
            } else {
                config.window_secs
            };

            return Err(RateLimitError::RateLimited {
                action: action.to_string(),
                retry_after,
            });
        }

        let bucket_start = self.bucket_start(now);
        if let Some(bucket) = action_state
            .buckets
            .iter_mut()
            .find(|b| b.start_time == bucket_start)
        {
            bucket.count += 1;
        } else {
            action_state.buckets.push(TimeBucket {
                start_time: bucket_start,
                count: 1,
            });
        }

        Ok(())
    }

    fn bucket_start(&self, time: DateTime<Utc>) -> DateTime<Utc> {
        let timestamp_secs = time.timestamp();
        let bucket_start_secs =
            (timestamp_secs / self.bucket_size_secs as i64) * self.bucket_size_secs as i64;
        DateTime::from_timestamp(bucket_start_secs, 0).unwrap_or(time)
    }

    /// Current request count for an agent/action pair (for tests/monitoring)
    pub async fn get_current_count(&self, agent_id: &str, action: &str) -> u32 {
        let now = Utc::now();
        let config = self.configs.get(action).cloned().unwrap_or_default();
        let window_start = now - Duration::seconds(config.window_secs as i64);

        let state = self.state.read().await;
        state
            .get(agent_id)
            .and_then(|agent_state| agent_state.get(action))
            .map(|action_state| {
                action_state
                    .buckets
                    .iter()
                    .filter(|b| b.start_time >= window_start)
                    .map(|b| b.count)
                    .sum()
            })
            .unwrap_or(0)
    }

    /// Clear all rate limit state (useful for testing)
    pub async fn clear(&self) {
        self.state.write().await.clear();
    }

    /// Clear rate limit state for a specific agent
    pub async fn clear_agent(&self, agent_id: &str) {
        self.state.write().await.remove(agent_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> HashMap<String, RateLimitConfig> {
        let mut configs = HashMap::new();
        configs.insert(
            "update_location".to_string(),
            RateLimitConfig {
                max_requests: 5,
                window_secs: 60,
            },
        );
        configs
    }

    #[tokio::test]
    async fn allows_requests_under_limit() {
        let limiter = RateLimiterService::new(test_config());

        for _ in 0..5 {
            let result = limiter.check_and_record("AGT0001", "update_location").await;
            assert!(result.is_ok());
        }
    }

    #[tokio::test]
    async fn blocks_requests_over_limit() {
        let limiter = RateLimiterService::new(test_config());

        for _ in 0..5 {
            limiter
                .check_and_record("AGT0001", "update_location")
                .await
                .unwrap();
        }

        let result = limiter.check_and_record("AGT0001", "update_location").await;
        assert!(result.is_err());

        if let Err(RateLimitError::RateLimited {
            action,
            retry_after,
        }) = result
        {
            assert_eq!(action, "update_location");
            assert!(retry_after > 0);
            assert!(retry_after <= 60);
        }
    }

    #[tokio::test]
    async fn agents_have_independent_limits() {
        let limiter = RateLimiterService::new(test_config());

        for _ in 0..5 {
            limiter
                .check_and_record("AGT0001", "update_location")
                .await
                .unwrap();
        }

        assert!(limiter
            .check_and_record("AGT0001", "update_location")
            .await
            .is_err());
        assert!(limiter
            .check_and_record("AGT0002", "update_location")
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn actions_have_independent_limits() {
        let mut configs = test_config();
        configs.insert(
            "toggle_availability".to_string(),
            RateLimitConfig {
                max_requests: 2,
                window_secs: 60,
            },
        );
        let limiter = RateLimiterService::new(configs);

        for _ in 0..5 {
            limiter
                .check_and_record("AGT0001", "update_location")
                .await
                .unwrap();
        }

        assert!(limiter
            .check_and_record("AGT0001", "update_location")
            .await
            .is_err());
        assert!(limiter
            .check_and_record("AGT0001", "toggle_availability")
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn unknown_action_uses_default_config() {
        let limiter = RateLimiterService::new(HashMap::new());

        for _ in 0..100 {
            limiter
                .check_and_record("AGT0001", "unknown_action")
                .await
                .unwrap();
        }

        assert!(limiter
            .check_and_record("AGT0001", "unknown_action")
            .await
            .is_err());
    }

    #[tokio::test]
    async fn clear_agent_resets_state() {
        let limiter = RateLimiterService::new(test_config());

        for _ in 0..5 {
            limiter
                .check_and_record("AGT0001", "update_location")
                .await
                .unwrap();
        }
        assert!(limiter
            .check_and_record("AGT0001", "update_location")
            .await
            .is_err());

        limiter.clear_agent("AGT0001").await;

        assert!(limiter
            .check_and_record("AGT0001", "update_location")
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn counts_track_recorded_requests() {
        let limiter = RateLimiterService::new(test_config());

        assert_eq!(
            limiter.get_current_count("AGT0001", "update_location").await,
            0
        );

        limiter
            .check_and_record("AGT0001", "update_location")
            .await
            .unwrap();
        limiter
            .check_and_record("AGT0001", "update_location")
            .await
            .unwrap();

        assert_eq!(
            limiter.get_current_count("AGT0001", "update_location").await,
            2
        );
    }
}

#[cfg(test)]
mod integration_tests {
    use super::*;

    #[ignore]
    #[tokio::test]
    async fn window_resets_after_time_passes() {
        let mut configs = HashMap::new();
        configs.insert(
            "update_location".to_string(),
            RateLimitConfig {
                max_requests: 2,
                window_secs: 2,
            },
        );
        let limiter = RateLimiterService::with_bucket_size(configs, 1);
        let agent_id = format!("AGT-{}", uuid::Uuid::new_v4());

        for _ in 0..2 {
            limiter
                .check_and_record(&agent_id, "update_location")
                .await
                .expect("should succeed under limit");
        }
        assert!(limiter
            .check_and_record(&agent_id, "update_location")
            .await
            .is_err());

        tokio::time::sleep(tokio::time::Duration::from_secs(3)).await;

        assert!(limiter
            .check_and_record(&agent_id, "update_location")
            .await
            .is_ok());
    }

    #[ignore]
    #[tokio::test]
    async fn concurrent_requests_respect_the_limit() {
        let mut configs = HashMap::new();
        configs.insert(
            "update_location".to_string(),
            RateLimitConfig {
                max_requests: 5,
                window_secs: 60,
            },
        );
        let limiter = Arc::new(RateLimiterService::with_bucket_size(configs, 1));
        let agent_id = format!("AGT-{}", uuid::Uuid::new_v4());

        let mut handles = vec![];
        for _ in 0..10 {
            let limiter = Arc::clone(&limiter);
            let agent = agent_id.clone();
            handles.push(tokio::spawn(async move {
                limiter.check_and_record(&agent, "update_location").await
            }));
        }

        let mut successes = 0;
        for handle in handles {
            if handle.await.expect("task should not panic").is_ok() {
                successes += 1;
            }
        }

        assert_eq!(successes, 5);
        assert_eq!(
            limiter.get_current_count(&agent_id, "update_location").await,
            5
        );
    }
}
