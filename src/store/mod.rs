//! Shared keyed storage used for breaker, limiter and response-cache state.
//!
//! Every component that needs cross-call coordination receives an
//! `Arc<dyn KeyValueStore>` instead of reaching for process-global state, so
//! several clients (or several processes, given a networked backend) observe
//! the same circuit and quota by key. Implementations must make
//! [`KeyValueStore::increment`] and [`KeyValueStore::compare_and_swap`]
//! atomic per key.

pub mod memory;

pub use memory::InMemoryStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::time::Duration;

#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("Value stored under '{key}' is not {expected}")]
    TypeMismatch { key: String, expected: &'static str },
    #[error("Store backend error: {0}")]
    Backend(String),
}

/// Key-value store with TTL, atomic counters and compare-and-swap.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read a value. Expired entries read as absent.
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError>;

    /// Write a value, replacing any previous one.
    async fn put(&self, key: &str, value: Value, ttl: Option<Duration>) -> Result<(), StoreError>;

    /// Remove a key. Returns whether a live entry was removed.
    async fn delete(&self, key: &str) -> Result<bool, StoreError>;

    /// Atomically add `delta` to an integer counter and return the new value.
    ///
    /// An absent or expired key is created at `delta` with `ttl`; the TTL of
    /// an existing counter is left untouched.
    async fn increment(
        &self,
        key: &str,
        delta: i64,
        ttl: Option<Duration>,
    ) -> Result<i64, StoreError>;

    /// Atomically replace the value under `key` with `new` if the current
    /// value equals `expected` (`None` meaning absent or expired).
    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&Value>,
        new: Value,
        ttl: Option<Duration>,
    ) -> Result<bool, StoreError>;

    /// Expiry instant of a live key, if it has one.
    async fn expires_at(&self, key: &str) -> Result<Option<DateTime<Utc>>, StoreError>;
}

pub(crate) fn expiry_from(now: DateTime<Utc>, ttl: Option<Duration>) -> Option<DateTime<Utc>> {
    let ttl = chrono::Duration::from_std(ttl?).ok()?;
    now.checked_add_signed(ttl)
}
