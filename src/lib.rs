//! # FinTrack LLM
//!
//! Resilient LLM client layer for the FinTrack personal-finance backend.
//! Every call to a language-model backend goes through a provider-agnostic
//! client and is governed by a per-provider circuit breaker and a
//! per-(provider, subject) rate limiter.
//!
//! ## Architecture Overview
//!
//! - **[`store`]**: Shared key-value storage with TTL, atomic counters and compare-and-swap
//! - **[`llm`]**: Provider adapters (Ollama, OpenAI-compatible, Mock), the caching client and its factory
//! - **[`resilience`]**: Circuit breaker and rate limiter persisted in the shared store
//! - **[`integration`]**: [`LlmService`], which admits, executes and records every call
//! - **[`cli`]**: Argument parsing and configuration discovery for the `fintrack-llm` binary
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use fintrack_llm::{GenerationOptions, InMemoryStore, LlmConfig, LlmService};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let service = LlmService::new(LlmConfig::default(), Arc::new(InMemoryStore::new()));
//!
//!     let budget = service
//!         .generate_structured_output(
//!             None,
//!             "user-42",
//!             "Suggest a monthly grocery budget as {\"amount\": number}",
//!             "json",
//!             &GenerationOptions::new(),
//!         )
//!         .await?;
//!
//!     println!("Suggested budget: {}", budget["amount"]);
//!     Ok(())
//! }
//! ```

/// Shared key-value storage.
///
/// Circuit state, rate windows and cached responses all live here, keyed by
/// provider and subject, so every client built on the same store observes
/// the same state.
pub mod store;

/// Provider-agnostic LLM interface.
pub mod llm;

/// Failure isolation and request quotas.
pub mod resilience;

/// Admission-controlled access to LLM providers.
pub mod integration;

/// Environment constants, store keys and path utilities.
pub mod env;

// CLI module for command-line interface
pub mod cli;

pub use store::{InMemoryStore, KeyValueStore, StoreError};

pub use llm::{
    ClientSettings, GenerationOptions, LlmClient, LlmClientFactory, LlmConfig, LlmError,
    OutputFormat, ProviderAdapter, ProviderConfig, ProviderKind,
};

pub use resilience::{
    CircuitBreaker, CircuitBreakerConfig, CircuitSnapshot, CircuitStatus, RateLimiter,
    RateLimiterConfig, RateWindow,
};

pub use integration::{LlmService, ServiceStatus};
