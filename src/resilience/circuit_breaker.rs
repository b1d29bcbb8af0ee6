//! Per-provider circuit breaker persisted in the shared store.
//!
//! ```text
//! closed --failure_threshold failures--> open --recovery elapsed--> half_open
//! half_open --success--> closed
//! half_open --failure--> open (cooldown restarts)
//! ```
//!
//! The open → half-open transition is evaluated lazily inside
//! [`CircuitBreaker::is_open`]; there are no timers. Every mutation is a
//! compare-and-swap against the stored state, retried on contention, so
//! parallel callers never lose a recorded failure.

use super::{CircuitBreakerConfig, to_chrono};
use crate::env::keys;
use crate::llm::types::Result;
use crate::store::{KeyValueStore, StoreError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitStatus {
    Closed,
    Open,
    HalfOpen,
}

impl fmt::Display for CircuitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CircuitStatus::Closed => "closed",
            CircuitStatus::Open => "open",
            CircuitStatus::HalfOpen => "half_open",
        })
    }
}

/// Stored state for one provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitState {
    pub status: CircuitStatus,
    pub failure_count: u32,
    pub opened_at: Option<DateTime<Utc>>,
    /// When the current half-open probe was admitted
    #[serde(default)]
    pub probe_started_at: Option<DateTime<Utc>>,
}

impl Default for CircuitState {
    fn default() -> Self {
        Self {
            status: CircuitStatus::Closed,
            failure_count: 0,
            opened_at: None,
            probe_started_at: None,
        }
    }
}

/// Read-only view of a provider's circuit for diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CircuitSnapshot {
    pub provider: String,
    pub status: CircuitStatus,
    pub failure_count: u32,
    pub opened_at: Option<DateTime<Utc>>,
    /// When the circuit will next admit a probe
    pub retry_at: Option<DateTime<Utc>>,
}

#[derive(Clone)]
pub struct CircuitBreaker {
    store: Arc<dyn KeyValueStore>,
    config: CircuitBreakerConfig,
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl CircuitBreaker {
    pub fn new(store: Arc<dyn KeyValueStore>, config: CircuitBreakerConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Whether calls to `provider` must be rejected right now.
    ///
    /// An open circuit whose cooldown has elapsed moves to half-open and the
    /// caller that performs that move is admitted as the probe. While the
    /// probe is outstanding other callers are rejected; a probe that has not
    /// reported within `request_timeout` is considered lost and the next
    /// caller takes its place.
    pub async fn is_open(&self, provider: &str) -> Result<bool> {
        let key = keys::circuit_key(provider);
        loop {
            let (raw, state) = self.load(&key).await?;
            let now = Utc::now();

            let next = match state.status {
                CircuitStatus::Closed => return Ok(false),
                CircuitStatus::Open => {
                    if self.cooling_down(&state, now) {
                        return Ok(true);
                    }
                    CircuitState {
                        status: CircuitStatus::HalfOpen,
                        probe_started_at: Some(now),
                        ..state
                    }
                }
                CircuitStatus::HalfOpen => {
                    let probe_outstanding = state
                        .probe_started_at
                        .is_some_and(|at| now < at + to_chrono(self.config.request_timeout));
                    if probe_outstanding {
                        return Ok(true);
                    }
                    CircuitState {
                        probe_started_at: Some(now),
                        ..state
                    }
                }
            };

            if self.swap(&key, raw.as_ref(), &next).await? {
                info!(
                    provider = provider,
                    failure_count = next.failure_count,
                    "Circuit half-open, admitting probe request"
                );
                return Ok(false);
            }
            debug!(provider = provider, "Circuit state changed concurrently, re-reading");
        }
    }

    /// Record a failed call and return the resulting state.
    pub async fn record_failure(&self, provider: &str) -> Result<CircuitSnapshot> {
        let threshold = self.config.failure_threshold.max(1);
        let (previous, next) = self
            .update(provider, |state, now| {
                let mut next = state.clone();
                next.failure_count = state.failure_count.saturating_add(1);
                match state.status {
                    CircuitStatus::Closed if next.failure_count >= threshold => {
                        next.status = CircuitStatus::Open;
                        next.opened_at = Some(now);
                        next.probe_started_at = None;
                    }
                    CircuitStatus::HalfOpen => {
                        next.status = CircuitStatus::Open;
                        next.opened_at = Some(now);
                        next.probe_started_at = None;
                    }
                    CircuitStatus::Closed | CircuitStatus::Open => {}
                }
                Some(next)
            })
            .await?;

        if previous.status != CircuitStatus::Open && next.status == CircuitStatus::Open {
            warn!(
                provider = provider,
                failure_count = next.failure_count,
                from = %previous.status,
                "Circuit opened"
            );
        } else {
            debug!(
                provider = provider,
                failure_count = next.failure_count,
                "Recorded provider failure"
            );
        }

        Ok(self.snapshot(provider, &next))
    }

    /// Record a successful call and return the resulting state.
    ///
    /// A success while open and still cooling down is ignored; callers are
    /// expected to have consulted [`is_open`](Self::is_open) first.
    pub async fn record_success(&self, provider: &str) -> Result<CircuitSnapshot> {
        let (previous, next) = self
            .update(provider, |state, now| match state.status {
                CircuitStatus::Closed if state.failure_count == 0 => None,
                CircuitStatus::Closed | CircuitStatus::HalfOpen => Some(CircuitState::default()),
                CircuitStatus::Open if self.cooling_down(state, now) => None,
                CircuitStatus::Open => Some(CircuitState::default()),
            })
            .await?;

        if previous.status != CircuitStatus::Closed && next.status == CircuitStatus::Closed {
            info!(provider = provider, from = %previous.status, "Circuit closed");
        }

        Ok(self.snapshot(provider, &next))
    }

    pub async fn get_status(&self, provider: &str) -> Result<CircuitSnapshot> {
        let (_, state) = self.load(&keys::circuit_key(provider)).await?;
        Ok(self.snapshot(provider, &state))
    }

    /// Forget all state for `provider`, closing its circuit.
    pub async fn reset(&self, provider: &str) -> Result<()> {
        if self.store.delete(&keys::circuit_key(provider)).await? {
            info!(provider = provider, "Circuit reset");
        }
        Ok(())
    }

    fn cooling_down(&self, state: &CircuitState, now: DateTime<Utc>) -> bool {
        self.retry_at(state).is_some_and(|retry_at| now < retry_at)
    }

    fn retry_at(&self, state: &CircuitState) -> Option<DateTime<Utc>> {
        state
            .opened_at
            .map(|opened_at| opened_at + to_chrono(self.config.recovery_timeout))
    }

    fn snapshot(&self, provider: &str, state: &CircuitState) -> CircuitSnapshot {
        CircuitSnapshot {
            provider: provider.to_string(),
            status: state.status,
            failure_count: state.failure_count,
            opened_at: state.opened_at,
            retry_at: match state.status {
                CircuitStatus::Open => self.retry_at(state),
                CircuitStatus::HalfOpen => state
                    .probe_started_at
                    .map(|at| at + to_chrono(self.config.request_timeout)),
                CircuitStatus::Closed => None,
            },
        }
    }

    async fn load(&self, key: &str) -> Result<(Option<Value>, CircuitState)> {
        let raw = self.store.get(key).await?;
        let state = match &raw {
            Some(value) => serde_json::from_value(value.clone()).map_err(|_| {
                StoreError::TypeMismatch {
                    key: key.to_string(),
                    expected: "a circuit state",
                }
            })?,
            None => CircuitState::default(),
        };
        Ok((raw, state))
    }

    async fn swap(&self, key: &str, expected: Option<&Value>, next: &CircuitState) -> Result<bool> {
        let value = serde_json::to_value(next)
            .map_err(|err| {
                StoreError::Backend(format!("failed to encode circuit state: {}", err))
            })?;
        Ok(self.store.compare_and_swap(key, expected, value, None).await?)
    }

    /// Apply `transition` atomically; `None` from the closure means no change.
    async fn update<F>(&self, provider: &str, transition: F) -> Result<(CircuitState, CircuitState)>
    where
        F: Fn(&CircuitState, DateTime<Utc>) -> Option<CircuitState>,
    {
        let key = keys::circuit_key(provider);
        loop {
            let (raw, state) = self.load(&key).await?;
            let Some(next) = transition(&state, Utc::now()) else {
                return Ok((state.clone(), state));
            };
            if self.swap(&key, raw.as_ref(), &next).await? {
                return Ok((state, next));
            }
        }
    }
}
