//! Deterministic in-process provider for tests and offline development.
//!
//! Responses come from a prompt → text table, falling back to a default
//! response; embeddings are derived from a hash of the input so equal texts
//! always embed identically. Every call is counted and the last request is
//! kept for inspection. Failures can be queued with
//! [`MockProvider::fail_next`] to exercise breaker behavior.

use crate::llm::provider::ProviderAdapter;
use crate::llm::types::{GenerationOptions, LlmError, ProviderConfig};
use futures::future::BoxFuture;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

pub const DEFAULT_MODEL: &str = "mock-model";
pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = 8;

/// A generation request as the mock received it.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRequest {
    pub prompt: String,
    pub system_prompt: Option<String>,
    pub options: GenerationOptions,
}

#[derive(Debug)]
pub struct MockProvider {
    model: String,
    responses: HashMap<String, String>,
    default_response: Option<String>,
    embedding_dimensions: usize,
    text_calls: AtomicUsize,
    embedding_calls: AtomicUsize,
    queued_failures: Mutex<VecDeque<LlmError>>,
    last_request: Mutex<Option<RecordedRequest>>,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MockProvider {
    pub fn new() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            responses: HashMap::new(),
            default_response: None,
            embedding_dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
            text_calls: AtomicUsize::new(0),
            embedding_calls: AtomicUsize::new(0),
            queued_failures: Mutex::new(VecDeque::new()),
            last_request: Mutex::new(None),
        }
    }

    /// Answer `prompt` with `response`.
    pub fn with_response(mut self, prompt: impl Into<String>, response: impl Into<String>) -> Self {
        self.responses.insert(prompt.into(), response.into());
        self
    }

    /// Answer every unmatched prompt with `response`.
    pub fn with_default_response(mut self, response: impl Into<String>) -> Self {
        self.default_response = Some(response.into());
        self
    }

    pub fn with_embedding_dimensions(mut self, dimensions: usize) -> Self {
        self.embedding_dimensions = dimensions.max(1);
        self
    }

    /// Make the next call (text or embeddings) fail with `error`.
    pub fn fail_next(&self, error: LlmError) {
        lock(&self.queued_failures).push_back(error);
    }

    /// Number of `generate_text` calls received.
    pub fn call_count(&self) -> usize {
        self.text_calls.load(Ordering::SeqCst)
    }

    pub fn embedding_call_count(&self) -> usize {
        self.embedding_calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<RecordedRequest> {
        lock(&self.last_request).clone()
    }

    fn respond(&self, prompt: &str) -> String {
        self.responses
            .get(prompt)
            .or(self.default_response.as_ref())
            .cloned()
            .unwrap_or_else(|| format!("Mock response to: {}", prompt))
    }

    fn embed(&self, text: &str) -> Vec<f32> {
        let mut values = Vec::with_capacity(self.embedding_dimensions);
        let mut block = 0u32;
        while values.len() < self.embedding_dimensions {
            let digest = Sha256::new()
                .chain_update(block.to_be_bytes())
                .chain_update(text.as_bytes())
                .finalize();
            values.extend(
                digest
                    .iter()
                    .take(self.embedding_dimensions - values.len())
                    .map(|byte| (*byte as f32 / 127.5) - 1.0),
            );
            block += 1;
        }
        values
    }

    fn take_failure(&self) -> Option<LlmError> {
        lock(&self.queued_failures).pop_front()
    }
}

impl ProviderAdapter for MockProvider {
    fn initialize(config: ProviderConfig) -> Result<Self, LlmError> {
        let additional = &config.additional_config;
        let mut provider = MockProvider::new();

        if let Some(model) = config.model.clone() {
            provider.model = model;
        }

        if let Some(responses) = additional.get("responses") {
            let table = responses.as_object().ok_or_else(|| {
                LlmError::Configuration("mock 'responses' must be a table".to_string())
            })?;
            for (prompt, response) in table {
                let response = response.as_str().ok_or_else(|| {
                    LlmError::Configuration(format!(
                        "mock response for '{}' must be a string",
                        prompt
                    ))
                })?;
                provider.responses.insert(prompt.clone(), response.to_string());
            }
        }

        provider.default_response = additional
            .get("default_response")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string());

        if let Some(dimensions) = additional.get("embedding_dimensions").and_then(|v| v.as_u64()) {
            provider = provider.with_embedding_dimensions(dimensions as usize);
        }

        Ok(provider)
    }

    fn provider_name(&self) -> &'static str {
        "mock"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn generate_text<'a>(
        &'a self,
        prompt: &'a str,
        system_prompt: Option<&'a str>,
        options: &'a GenerationOptions,
    ) -> BoxFuture<'a, Result<String, LlmError>> {
        Box::pin(async move {
            self.text_calls.fetch_add(1, Ordering::SeqCst);
            *lock(&self.last_request) = Some(RecordedRequest {
                prompt: prompt.to_string(),
                system_prompt: system_prompt.map(|s| s.to_string()),
                options: options.clone(),
            });

            if let Some(error) = self.take_failure() {
                return Err(error);
            }
            Ok(self.respond(prompt))
        })
    }

    fn generate_embeddings<'a>(
        &'a self,
        text: &'a str,
    ) -> BoxFuture<'a, Result<Vec<f32>, LlmError>> {
        Box::pin(async move {
            self.embedding_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(error) = self.take_failure() {
                return Err(error);
            }
            Ok(self.embed(text))
        })
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_canned_and_default_responses() {
        let provider = MockProvider::new()
            .with_response("balance?", "Your balance is $100.")
            .with_default_response("I don't know.");
        let options = GenerationOptions::new();

        assert_eq!(
            provider.generate_text("balance?", None, &options).await.unwrap(),
            "Your balance is $100."
        );
        assert_eq!(
            provider.generate_text("other", Some("sys"), &options).await.unwrap(),
            "I don't know."
        );
        assert_eq!(provider.call_count(), 2);

        let last = provider.last_request().unwrap();
        assert_eq!(last.prompt, "other");
        assert_eq!(last.system_prompt.as_deref(), Some("sys"));
    }

    #[tokio::test]
    async fn test_queued_failure_is_returned_once() {
        let provider = MockProvider::new();
        provider.fail_next(LlmError::Network("connection refused".to_string()));
        let options = GenerationOptions::new();

        assert!(matches!(
            provider.generate_text("x", None, &options).await,
            Err(LlmError::Network(_))
        ));
        assert!(provider.generate_text("x", None, &options).await.is_ok());
        assert_eq!(provider.call_count(), 2);
    }

    #[tokio::test]
    async fn test_embeddings_are_deterministic() {
        let provider = MockProvider::new().with_embedding_dimensions(40);

        let first = provider.generate_embeddings("groceries").await.unwrap();
        let second = provider.generate_embeddings("groceries").await.unwrap();
        let other = provider.generate_embeddings("rent").await.unwrap();

        assert_eq!(first.len(), 40);
        assert_eq!(first, second);
        assert_ne!(first, other);
        assert!(first.iter().all(|v| (-1.0..=1.0).contains(v)));
        assert_eq!(provider.embedding_call_count(), 3);
    }

    #[test]
    fn test_initialize_from_config() {
        let mut additional_config = HashMap::new();
        additional_config.insert("responses".to_string(), json!({ "hi": "hello" }));
        additional_config.insert("default_response".to_string(), json!("fallback"));
        additional_config.insert("embedding_dimensions".to_string(), json!(4));

        let provider = MockProvider::initialize(ProviderConfig {
            model: Some("mock-large".to_string()),
            additional_config,
            ..Default::default()
        })
        .unwrap();

        assert_eq!(provider.model(), "mock-large");
        assert_eq!(provider.respond("hi"), "hello");
        assert_eq!(provider.respond("anything"), "fallback");
        assert_eq!(provider.embed("x").len(), 4);
    }

    #[test]
    fn test_initialize_rejects_bad_responses() {
        let mut additional_config = HashMap::new();
        additional_config.insert("responses".to_string(), json!(["not", "a", "table"]));

        let result = MockProvider::initialize(ProviderConfig {
            additional_config,
            ..Default::default()
        });
        assert!(matches!(result, Err(LlmError::Configuration(_))));
    }
}
