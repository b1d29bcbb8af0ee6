use crate::resilience::{CircuitBreakerConfig, RateLimiterConfig};
use crate::store::StoreError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Default per-call transport timeout when a provider does not set one
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Per-call generation options.
///
/// Serialized with a stable field order so it can be part of a cache
/// fingerprint; `extra` is a `BTreeMap` for the same reason.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_window: Option<u32>,
    /// Replaces the configured system prompt for this call
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    /// Output format requested from the backend (e.g. "json")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, Value>,
}

impl GenerationOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_top_p(mut self, top_p: f32) -> Self {
        self.top_p = Some(top_p);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    pub fn wants_json(&self) -> bool {
        self.format
            .as_deref()
            .is_some_and(|format| format.eq_ignore_ascii_case("json"))
    }
}

/// Supported LLM backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Ollama,
    OpenAI,
    Mock,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Ollama => "ollama",
            ProviderKind::OpenAI => "openai",
            ProviderKind::Mock => "mock",
        }
    }

    pub fn all() -> [ProviderKind; 3] {
        [ProviderKind::Ollama, ProviderKind::OpenAI, ProviderKind::Mock]
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = LlmError;

    fn from_str(name: &str) -> std::result::Result<Self, Self::Err> {
        match name.trim().to_lowercase().as_str() {
            "ollama" => Ok(ProviderKind::Ollama),
            "openai" => Ok(ProviderKind::OpenAI),
            "mock" => Ok(ProviderKind::Mock),
            _ => Err(LlmError::UnsupportedProvider(name.to_string())),
        }
    }
}

/// Provider-specific configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding_model: Option<String>,
    /// Transport timeout in seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_window: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub additional_config: HashMap<String, Value>,
}

impl ProviderConfig {
    /// Field-wise merge: every value set in `overrides` wins.
    pub fn merge(&self, overrides: &ProviderConfig) -> ProviderConfig {
        let mut additional_config = self.additional_config.clone();
        additional_config.extend(
            overrides
                .additional_config
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );

        ProviderConfig {
            base_url: overrides.base_url.clone().or_else(|| self.base_url.clone()),
            api_key: overrides.api_key.clone().or_else(|| self.api_key.clone()),
            model: overrides.model.clone().or_else(|| self.model.clone()),
            embedding_model: overrides
                .embedding_model
                .clone()
                .or_else(|| self.embedding_model.clone()),
            timeout: overrides.timeout.or(self.timeout),
            temperature: overrides.temperature.or(self.temperature),
            top_p: overrides.top_p.or(self.top_p),
            context_window: overrides.context_window.or(self.context_window),
            max_tokens: overrides.max_tokens.or(self.max_tokens),
            additional_config,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout.unwrap_or(DEFAULT_TIMEOUT_SECS))
    }
}

/// Complete configuration for the LLM client layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Provider used when a caller does not name one
    pub provider: String,
    pub cache_enabled: bool,
    /// Response cache lifetime in seconds
    pub cache_ttl: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    pub providers: BTreeMap<String, ProviderConfig>,
    pub circuit_breaker: CircuitBreakerConfig,
    pub rate_limit: RateLimiterConfig,
}

impl LlmConfig {
    pub fn provider_config(&self, name: &str) -> ProviderConfig {
        self.providers.get(name).cloned().unwrap_or_default()
    }

    pub fn client_settings(&self) -> ClientSettings {
        ClientSettings {
            cache_enabled: self.cache_enabled,
            cache_ttl: Duration::from_secs(self.cache_ttl),
            system_prompt: self.system_prompt.clone(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        let mut providers = BTreeMap::new();
        providers.insert(
            ProviderKind::Ollama.as_str().to_string(),
            ProviderConfig {
                base_url: Some("http://localhost:11434".to_string()),
                model: Some("llama3.1:8b".to_string()),
                timeout: Some(DEFAULT_TIMEOUT_SECS),
                temperature: Some(0.7),
                top_p: Some(0.9),
                context_window: Some(4096),
                ..Default::default()
            },
        );
        providers.insert(
            ProviderKind::OpenAI.as_str().to_string(),
            ProviderConfig {
                base_url: Some("https://api.openai.com/v1".to_string()),
                model: Some("gpt-4o-mini".to_string()),
                embedding_model: Some("text-embedding-3-small".to_string()),
                timeout: Some(DEFAULT_TIMEOUT_SECS),
                temperature: Some(0.7),
                max_tokens: Some(1024),
                ..Default::default()
            },
        );

        Self {
            provider: ProviderKind::Ollama.as_str().to_string(),
            cache_enabled: true,
            cache_ttl: 3600, // 1 hour
            system_prompt: Some(
                "You are a careful personal-finance assistant. Answer using only the \
                 account, transaction and budget data you are given, and say so when \
                 the data is insufficient."
                    .to_string(),
            ),
            providers,
            circuit_breaker: CircuitBreakerConfig::default(),
            rate_limit: RateLimiterConfig::default(),
        }
    }
}

/// Settings shared by every client built from one configuration
#[derive(Debug, Clone, PartialEq)]
pub struct ClientSettings {
    pub cache_enabled: bool,
    pub cache_ttl: Duration,
    pub system_prompt: Option<String>,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            cache_enabled: true,
            cache_ttl: Duration::from_secs(3600),
            system_prompt: None,
        }
    }
}

/// Errors surfaced by the LLM client layer
#[derive(Debug, Clone, thiserror::Error)]
pub enum LlmError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),
    #[error("Provider returned HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },
    #[error("Invalid provider response: {0}")]
    InvalidResponse(String),
    #[error("Authentication failed: {0}")]
    Authentication(String),
    #[error("Malformed {format} output: {message}")]
    MalformedOutput { format: String, message: String },
    #[error("Unsupported provider: {0}")]
    UnsupportedProvider(String),
    #[error("Unsupported output format: {0}")]
    UnsupportedFormat(String),
    #[error("Invalid configuration: {0}")]
    Configuration(String),
    #[error("Rate limit exceeded for '{subject}' on provider '{provider}'")]
    RateLimitExceeded {
        provider: String,
        subject: String,
        retry_at: Option<DateTime<Utc>>,
    },
    #[error("Circuit breaker is open for provider '{provider}'")]
    CircuitOpen {
        provider: String,
        retry_at: Option<DateTime<Utc>>,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl LlmError {
    /// Transport or backend failure; the kind of error a circuit breaker counts.
    pub fn is_generation_failure(&self) -> bool {
        matches!(
            self,
            LlmError::Network(_)
                | LlmError::Timeout(_)
                | LlmError::HttpStatus { .. }
                | LlmError::InvalidResponse(_)
                | LlmError::Authentication(_)
        )
    }

    /// Rejected by policy before the provider was called.
    pub fn is_admission_rejection(&self) -> bool {
        matches!(
            self,
            LlmError::RateLimitExceeded { .. } | LlmError::CircuitOpen { .. }
        )
    }

    /// When the caller may try again, if the rejection carries one.
    pub fn retry_at(&self) -> Option<DateTime<Utc>> {
        match self {
            LlmError::RateLimitExceeded { retry_at, .. }
            | LlmError::CircuitOpen { retry_at, .. } => *retry_at,
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, LlmError>;
