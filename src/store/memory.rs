//! In-process [`KeyValueStore`] backed by a sharded concurrent map.
//!
//! Each operation holds the shard lock for its key for the whole
//! read-modify-write, which gives per-key atomicity for `increment` and
//! `compare_and_swap`. Expired entries are dropped lazily when touched, or in
//! bulk via [`InMemoryStore::purge_expired`].

use super::{KeyValueStore, StoreError, expiry_from};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone)]
struct StoredEntry {
    value: Value,
    expires_at: Option<DateTime<Utc>>,
}

impl StoredEntry {
    fn new(value: Value, now: DateTime<Utc>, ttl: Option<Duration>) -> Self {
        Self {
            value,
            expires_at: expiry_from(now, ttl),
        }
    }

    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    entries: Arc<DashMap<String, StoredEntry>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        let now = Utc::now();
        self.entries
            .iter()
            .filter(|entry| !entry.value().is_expired(now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every expired entry and return how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            debug!("Purged {} expired store entries", removed);
        }
        removed
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}

#[async_trait]
impl KeyValueStore for InMemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let now = Utc::now();
        if let Entry::Occupied(occupied) = self.entries.entry(key.to_string()) {
            if occupied.get().is_expired(now) {
                occupied.remove();
                return Ok(None);
            }
            return Ok(Some(occupied.get().value.clone()));
        }
        Ok(None)
    }

    async fn put(&self, key: &str, value: Value, ttl: Option<Duration>) -> Result<(), StoreError> {
        self.entries
            .insert(key.to_string(), StoredEntry::new(value, Utc::now(), ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let now = Utc::now();
        Ok(self
            .entries
            .remove(key)
            .is_some_and(|(_, entry)| !entry.is_expired(now)))
    }

    async fn increment(
        &self,
        key: &str,
        delta: i64,
        ttl: Option<Duration>,
    ) -> Result<i64, StoreError> {
        let now = Utc::now();
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_expired(now) {
                    occupied.insert(StoredEntry::new(Value::from(delta), now, ttl));
                    return Ok(delta);
                }
                let current = occupied.get().value.as_i64().ok_or_else(|| {
                    StoreError::TypeMismatch {
                        key: key.to_string(),
                        expected: "an integer counter",
                    }
                })?;
                let updated = current.saturating_add(delta);
                occupied.get_mut().value = Value::from(updated);
                Ok(updated)
            }
            Entry::Vacant(vacant) => {
                vacant.insert(StoredEntry::new(Value::from(delta), now, ttl));
                Ok(delta)
            }
        }
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&Value>,
        new: Value,
        ttl: Option<Duration>,
    ) -> Result<bool, StoreError> {
        let now = Utc::now();
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                let current = if occupied.get().is_expired(now) {
                    None
                } else {
                    Some(&occupied.get().value)
                };
                if current != expected {
                    return Ok(false);
                }
                occupied.insert(StoredEntry::new(new, now, ttl));
                Ok(true)
            }
            Entry::Vacant(vacant) => {
                if expected.is_some() {
                    return Ok(false);
                }
                vacant.insert(StoredEntry::new(new, now, ttl));
                Ok(true)
            }
        }
    }

    async fn expires_at(&self, key: &str) -> Result<Option<DateTime<Utc>>, StoreError> {
        let now = Utc::now();
        Ok(self
            .entries
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .and_then(|entry| entry.expires_at))
    }
}
