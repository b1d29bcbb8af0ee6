use super::{RateLimiterConfig, to_chrono};
use crate::env::keys;
use crate::llm::types::{LlmError, Result};
use crate::store::{KeyValueStore, StoreError};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Request quota for one (provider, subject) pair.
///
/// Each pair owns a counter in the shared store that is created by the first
/// request of a window and expires with it, so an elapsed window simply reads
/// as empty.
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn KeyValueStore>,
    config: RateLimiterConfig,
}

/// Current accounting period for one (provider, subject) pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RateWindow {
    pub provider: String,
    pub subject: String,
    pub count: u32,
    pub limit: u32,
    pub window_start: Option<DateTime<Utc>>,
    pub resets_at: Option<DateTime<Utc>>,
}

impl RateWindow {
    pub fn remaining(&self) -> u32 {
        self.limit.saturating_sub(self.count)
    }
}

impl fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimiter")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl RateLimiter {
    pub fn new(store: Arc<dyn KeyValueStore>, config: RateLimiterConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &RateLimiterConfig {
        &self.config
    }

    pub async fn can_make_request(&self, provider: &str, subject: &str) -> Result<bool> {
        let count = self.count(&keys::rate_limit_key(provider, subject)).await?;
        Ok(count < self.config.max_requests)
    }

    /// Count one request against the current window, opening a new window if
    /// none is live. Returns the count after recording.
    pub async fn record_request(&self, provider: &str, subject: &str) -> Result<u32> {
        let key = keys::rate_limit_key(provider, subject);
        let count = self
            .store
            .increment(&key, 1, Some(self.config.window))
            .await?;
        debug!(
            provider = provider,
            subject = subject,
            count = count,
            limit = self.config.max_requests,
            "Recorded request"
        );
        Ok(clamp_count(count))
    }

    pub async fn get_remaining_requests(&self, provider: &str, subject: &str) -> Result<u32> {
        let count = self.count(&keys::rate_limit_key(provider, subject)).await?;
        Ok(self.config.max_requests.saturating_sub(count))
    }

    /// Admission check and record in one atomic step.
    ///
    /// The request is counted first and admitted only if the new count is
    /// within the limit, so parallel callers cannot all pass a stale check.
    /// A rejected attempt stays counted. Returns the remaining quota.
    pub async fn try_acquire(&self, provider: &str, subject: &str) -> Result<u32> {
        let count = self.record_request(provider, subject).await?;
        if count > self.config.max_requests {
            let window = self.window(provider, subject).await?;
            warn!(
                provider = provider,
                subject = subject,
                limit = self.config.max_requests,
                "Rate limit exceeded"
            );
            return Err(LlmError::RateLimitExceeded {
                provider: provider.to_string(),
                subject: subject.to_string(),
                retry_at: window.resets_at,
            });
        }
        Ok(self.config.max_requests - count)
    }

    pub async fn window(&self, provider: &str, subject: &str) -> Result<RateWindow> {
        let key = keys::rate_limit_key(provider, subject);
        let count = self.count(&key).await?;
        let resets_at = if count > 0 {
            self.store.expires_at(&key).await?
        } else {
            None
        };

        Ok(RateWindow {
            provider: provider.to_string(),
            subject: subject.to_string(),
            count,
            limit: self.config.max_requests,
            window_start: resets_at.map(|at| at - to_chrono(self.config.window)),
            resets_at,
        })
    }

    /// Drop the current window for the pair.
    pub async fn clear(&self, provider: &str, subject: &str) -> Result<()> {
        self.store
            .delete(&keys::rate_limit_key(provider, subject))
            .await?;
        Ok(())
    }

    async fn count(&self, key: &str) -> Result<u32> {
        match self.store.get(key).await? {
            None => Ok(0),
            Some(value) => value.as_i64().map(clamp_count).ok_or_else(|| {
                LlmError::from(StoreError::TypeMismatch {
                    key: key.to_string(),
                    expected: "an integer counter",
                })
            }),
        }
    }
}

fn clamp_count(count: i64) -> u32 {
    u32::try_from(count.max(0)).unwrap_or(u32::MAX)
}
