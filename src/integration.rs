//! # Guarded LLM access
//!
//! [`LlmService`] is the entry point the rest of the finance backend calls.
//! It owns one [`LlmClient`] per provider and wraps every call in admission
//! control:
//!
//! ```text
//! caller ─► RateLimiter ─► response cache ─► CircuitBreaker ─► ProviderAdapter
//!              │ exhausted       │ hit               │ open            │
//!              ▼                 ▼                   ▼                 ▼
//!     RateLimitExceeded     cached answer       CircuitOpen    record success / failure
//! ```
//!
//! Quota is charged before the breaker is consulted, so a request rejected
//! by an open circuit still counts against the caller's window. Cache hits
//! never reach the breaker: they neither record an outcome nor take the
//! half-open probe, and they are served while the circuit is open. Only
//! generation failures (transport, timeout, HTTP status, unreadable body,
//! authentication) are recorded against the breaker; output that fails to
//! decode as the requested format means the provider answered, and counts as
//! a success.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use fintrack_llm::{GenerationOptions, InMemoryStore, LlmConfig, LlmService};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let service = LlmService::new(LlmConfig::default(), Arc::new(InMemoryStore::new()));
//!
//!     let answer = service
//!         .generate_text(None, "user-42", "How much did I spend on groceries?", &GenerationOptions::new())
//!         .await?;
//!     println!("{}", answer);
//!
//!     let status = service.status(None, "user-42").await?;
//!     println!("circuit {} / {} requests left", status.circuit.status, status.remaining_requests);
//!     Ok(())
//! }
//! ```

use crate::env::keys::ANONYMOUS_SUBJECT;
use crate::llm::{GenerationOptions, LlmClient, LlmClientFactory, LlmConfig, LlmError, Result};
use crate::resilience::{CircuitBreaker, CircuitSnapshot, RateLimiter, RateWindow};
use crate::store::KeyValueStore;
use dashmap::DashMap;
use serde::Serialize;
use serde_json::Value;
use std::future::{self, Future};
use std::sync::Arc;
use tracing::{debug, warn};

/// Provider-facing service with rate limiting and circuit breaking
pub struct LlmService {
    factory: LlmClientFactory,
    breaker: CircuitBreaker,
    limiter: RateLimiter,
    clients: DashMap<String, LlmClient>,
}

/// Admission state of one provider for one subject
#[derive(Debug, Clone, Serialize)]
pub struct ServiceStatus {
    pub provider: String,
    pub circuit: CircuitSnapshot,
    pub remaining_requests: u32,
    pub window: RateWindow,
}

impl LlmService {
    pub fn new(config: LlmConfig, store: Arc<dyn KeyValueStore>) -> Self {
        let breaker = CircuitBreaker::new(Arc::clone(&store), config.circuit_breaker.clone());
        let limiter = RateLimiter::new(Arc::clone(&store), config.rate_limit.clone());
        Self {
            factory: LlmClientFactory::new(config, store),
            breaker,
            limiter,
            clients: DashMap::new(),
        }
    }

    /// Use `client` for its provider instead of building one from configuration.
    pub fn with_client(self, client: LlmClient) -> Self {
        self.clients
            .insert(client.provider_name().to_string(), client);
        self
    }

    pub fn config(&self) -> &LlmConfig {
        self.factory.config()
    }

    pub fn circuit_breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Client for `provider` (or the default provider), built on first use.
    pub fn client(&self, provider: Option<&str>) -> Result<LlmClient> {
        let kind = self.factory.resolve_provider(provider)?;
        if let Some(client) = self.clients.get(kind.as_str()) {
            return Ok(client.clone());
        }

        let client = self.factory.create(Some(kind.as_str()))?;
        Ok(self
            .clients
            .entry(kind.as_str().to_string())
            .or_insert(client)
            .clone())
    }

    pub async fn generate_text(
        &self,
        provider: Option<&str>,
        subject: &str,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<String> {
        self.guarded(
            provider,
            subject,
            |client| async move { Ok(client.cached_text(prompt, options).await) },
            |client| async move { client.generate_text_uncached(prompt, options).await },
        )
        .await
    }

    pub async fn generate_structured_output(
        &self,
        provider: Option<&str>,
        subject: &str,
        prompt: &str,
        format: &str,
        options: &GenerationOptions,
    ) -> Result<Value> {
        self.guarded(
            provider,
            subject,
            |client| async move {
                client
                    .cached_structured_output(prompt, format, options)
                    .await
            },
            |client| async move {
                client
                    .generate_structured_output_uncached(prompt, format, options)
                    .await
            },
        )
        .await
    }

    pub async fn generate_embeddings(
        &self,
        provider: Option<&str>,
        subject: &str,
        text: &str,
    ) -> Result<Vec<f32>> {
        self.guarded(
            provider,
            subject,
            |_| future::ready(Ok(None)),
            |client| async move { client.generate_embeddings(text).await },
        )
        .await
    }

    pub async fn status(&self, provider: Option<&str>, subject: &str) -> Result<ServiceStatus> {
        let provider = self.factory.resolve_provider(provider)?.as_str();
        let subject = subject_or_anonymous(subject);
        let circuit = self.breaker.get_status(provider).await?;
        let window = self.limiter.window(provider, subject).await?;

        Ok(ServiceStatus {
            provider: provider.to_string(),
            circuit,
            remaining_requests: window.remaining(),
            window,
        })
    }

    /// Close the circuit for `provider`, discarding its failure history.
    pub async fn reset_circuit(&self, provider: Option<&str>) -> Result<()> {
        let provider = self.factory.resolve_provider(provider)?.as_str();
        self.breaker.reset(provider).await
    }

    /// Charge quota, then answer from `lookup` if it has a cached result.
    /// Otherwise consult the breaker and run `call`, whose outcome is the
    /// only thing recorded against the circuit.
    async fn guarded<T, L, LFut, F, Fut>(
        &self,
        provider: Option<&str>,
        subject: &str,
        lookup: L,
        call: F,
    ) -> Result<T>
    where
        L: FnOnce(LlmClient) -> LFut,
        LFut: Future<Output = Result<Option<T>>>,
        F: FnOnce(LlmClient) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let client = self.client(provider)?;
        let provider = client.provider_name();
        let subject = subject_or_anonymous(subject);

        let remaining = self.limiter.try_acquire(provider, subject).await?;
        if let Some(cached) = lookup(client.clone()).await? {
            debug!(provider, subject, remaining, "Served from response cache");
            return Ok(cached);
        }

        self.check_circuit(provider).await?;
        debug!(provider, subject, remaining, "Request admitted");

        let result = call(client).await;
        self.record_outcome(provider, &result).await;
        result
    }

    async fn check_circuit(&self, provider: &str) -> Result<()> {
        if self.breaker.is_open(provider).await? {
            let circuit = self.breaker.get_status(provider).await?;
            warn!(
                provider,
                failure_count = circuit.failure_count,
                "Circuit open, rejecting request"
            );
            return Err(LlmError::CircuitOpen {
                provider: provider.to_string(),
                retry_at: circuit.retry_at,
            });
        }
        Ok(())
    }

    async fn record_outcome<T>(&self, provider: &str, result: &Result<T>) {
        let recorded = match result {
            Ok(_) | Err(LlmError::MalformedOutput { .. }) => {
                self.breaker.record_success(provider).await.map(|_| ())
            }
            Err(e) if e.is_generation_failure() => {
                self.breaker.record_failure(provider).await.map(|_| ())
            }
            Err(_) => Ok(()),
        };

        if let Err(e) = recorded {
            warn!(provider, error = %e, "Failed to record call outcome");
        }
    }
}

fn subject_or_anonymous(subject: &str) -> &str {
    let subject = subject.trim();
    if subject.is_empty() {
        ANONYMOUS_SUBJECT
    } else {
        subject
    }
}
