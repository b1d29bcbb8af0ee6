//! Failure isolation and quota enforcement for provider calls.
//!
//! Both components keep their state in the injected [`KeyValueStore`], keyed
//! per provider (breaker) or per provider and subject (limiter), so every
//! client sharing a store shares the same view.
//!
//! [`KeyValueStore`]: crate::store::KeyValueStore

pub mod circuit_breaker;
pub mod rate_limiter;


pub use circuit_breaker::{CircuitBreaker, CircuitSnapshot, CircuitState, CircuitStatus};
pub use rate_limiter::{RateLimiter, RateWindow};

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that trip a closed circuit
    pub failure_threshold: u32,
    /// Cooldown before an open circuit admits a probe
    #[serde(rename = "recovery_minutes", with = "duration_minutes")]
    pub recovery_timeout: Duration,
    /// Upper bound on a single provider call; also how long a half-open
    /// probe may stay unreported before another caller may probe
    #[serde(rename = "request_timeout_seconds", with = "duration_seconds")]
    pub request_timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimiterConfig {
    pub max_requests: u32,
    #[serde(rename = "window_minutes", with = "duration_minutes")]
    pub window: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(5 * 60), // 5 minutes
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            max_requests: 60,
            window: Duration::from_secs(60), // 1 minute
        }
    }
}

pub(crate) fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::weeks(52 * 100))
}

mod duration_minutes {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs() / 60)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let minutes = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(minutes.saturating_mul(60)))
    }
}

mod duration_seconds {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(deserializer)?))
    }
}
