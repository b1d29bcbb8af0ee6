//! High-level client over a single provider adapter.
//!
//! [`LlmClient`] injects the configured system prompt, caches successful
//! completions in the shared store and decodes structured output. It does no
//! admission control; that belongs to [`crate::integration::LlmService`].

use crate::env::keys;
use crate::llm::provider::ProviderAdapter;
use crate::llm::structured::OutputFormat;
use crate::llm::types::{ClientSettings, GenerationOptions, LlmError, Result};
use crate::store::KeyValueStore;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Everything that makes two generations interchangeable.
#[derive(Serialize)]
struct Fingerprint<'a> {
    provider: &'a str,
    model: &'a str,
    system_prompt: Option<&'a str>,
    prompt: &'a str,
    options: &'a GenerationOptions,
}

#[derive(Clone)]
pub struct LlmClient {
    adapter: Arc<dyn ProviderAdapter>,
    store: Arc<dyn KeyValueStore>,
    settings: ClientSettings,
}

impl std::fmt::Debug for LlmClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmClient")
            .field("provider", &self.adapter.provider_name())
            .field("model", &self.adapter.model())
            .field("settings", &self.settings)
            .finish()
    }
}

impl LlmClient {
    pub fn new(
        adapter: Arc<dyn ProviderAdapter>,
        store: Arc<dyn KeyValueStore>,
        settings: ClientSettings,
    ) -> Self {
        info!(
            provider = adapter.provider_name(),
            model = adapter.model(),
            cache_enabled = settings.cache_enabled,
            "Created LLM client"
        );
        Self {
            adapter,
            store,
            settings,
        }
    }

    pub fn provider_name(&self) -> &'static str {
        self.adapter.provider_name()
    }

    pub fn model(&self) -> &str {
        self.adapter.model()
    }

    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    pub fn adapter(&self) -> &Arc<dyn ProviderAdapter> {
        &self.adapter
    }

    /// Generate a completion, serving it from the response cache when an
    /// identical request was answered within the cache TTL.
    ///
    /// Adapter errors propagate unchanged and are never cached.
    pub async fn generate_text(&self, prompt: &str, options: &GenerationOptions) -> Result<String> {
        match self.cached_text(prompt, options).await {
            Some(text) => Ok(text),
            None => self.generate_text_uncached(prompt, options).await,
        }
    }

    /// Cached completion for this request, if any.
    pub async fn cached_text(&self, prompt: &str, options: &GenerationOptions) -> Option<String> {
        let key = self.request_key(prompt, options)?;
        let text = self.cached_response(&key).await?;
        debug!(provider = self.provider_name(), "Response cache hit");
        Some(text)
    }

    /// Call the provider without reading the cache; a successful completion
    /// is written back to it.
    pub async fn generate_text_uncached(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<String> {
        let text = self.call_provider(prompt, options).await?;
        if let Some(key) = self.request_key(prompt, options) {
            self.store_response(&key, &text).await;
        }
        Ok(text)
    }

    /// Generate output in a structured `format` and decode it.
    ///
    /// The format instruction is appended to the effective system prompt and
    /// the backend is asked for that format natively. Output that does not
    /// decode yields [`LlmError::MalformedOutput`] and is not cached.
    pub async fn generate_structured_output(
        &self,
        prompt: &str,
        format: &str,
        options: &GenerationOptions,
    ) -> Result<Value> {
        match self.cached_structured_output(prompt, format, options).await? {
            Some(value) => Ok(value),
            None => {
                self.generate_structured_output_uncached(prompt, format, options)
                    .await
            }
        }
    }

    /// Cached decoded output for this request, if any.
    pub async fn cached_structured_output(
        &self,
        prompt: &str,
        format: &str,
        options: &GenerationOptions,
    ) -> Result<Option<Value>> {
        let format: OutputFormat = format.parse()?;
        let options = self.structured_options(format, options);
        Ok(self
            .cached_text(prompt, &options)
            .await
            .and_then(|raw| format.decode(&raw).ok()))
    }

    /// Call the provider for structured output without reading the cache.
    /// Only output that decodes is written back.
    pub async fn generate_structured_output_uncached(
        &self,
        prompt: &str,
        format: &str,
        options: &GenerationOptions,
    ) -> Result<Value> {
        let format: OutputFormat = format.parse()?;
        let options = self.structured_options(format, options);
        let raw = self.call_provider(prompt, &options).await?;
        let value = format.decode(&raw).inspect_err(|e| {
            warn!(provider = self.provider_name(), error = %e, "Structured output did not decode")
        })?;

        if let Some(key) = self.request_key(prompt, &options) {
            self.store_response(&key, &raw).await;
        }
        Ok(value)
    }

    /// Generate JSON output and decode it into `T`.
    pub async fn generate_structured<T: DeserializeOwned>(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<T> {
        let value = self
            .generate_structured_output(prompt, OutputFormat::Json.as_str(), options)
            .await?;
        serde_json::from_value(value).map_err(|e| LlmError::MalformedOutput {
            format: OutputFormat::Json.as_str().to_string(),
            message: e.to_string(),
        })
    }

    /// Embed `text`. Embeddings are not cached.
    pub async fn generate_embeddings(&self, text: &str) -> Result<Vec<f32>> {
        self.adapter.generate_embeddings(text).await
    }

    pub async fn health_check(&self) -> Result<()> {
        self.adapter.health_check().await
    }

    async fn call_provider(&self, prompt: &str, options: &GenerationOptions) -> Result<String> {
        let request_id = Uuid::new_v4();
        debug!(
            %request_id,
            provider = self.provider_name(),
            prompt_len = prompt.len(),
            "Calling provider"
        );
        self.adapter
            .generate_text(prompt, self.system_prompt(options), options)
            .await
            .inspect_err(|e| {
                warn!(%request_id, provider = self.provider_name(), error = %e, "Generation failed")
            })
    }

    fn system_prompt<'a>(&'a self, options: &'a GenerationOptions) -> Option<&'a str> {
        options
            .system_prompt
            .as_deref()
            .or(self.settings.system_prompt.as_deref())
    }

    fn request_key(&self, prompt: &str, options: &GenerationOptions) -> Option<String> {
        if !self.settings.cache_enabled {
            return None;
        }
        self.cache_key(prompt, self.system_prompt(options), options)
            .inspect_err(|e| warn!(error = %e, "Skipping response cache"))
            .ok()
    }

    fn structured_options(
        &self,
        format: OutputFormat,
        options: &GenerationOptions,
    ) -> GenerationOptions {
        let system_prompt = match self.system_prompt(options) {
            Some(base) if !base.trim().is_empty() => {
                format!("{}\n\n{}", base.trim_end(), format.instruction())
            }
            _ => format.instruction().to_string(),
        };

        let mut options = options.clone();
        options.system_prompt = Some(system_prompt);
        options.format = Some(format.as_str().to_string());
        options
    }

    /// Store key for a request; SHA-256 over every input that shapes the output.
    pub fn cache_key(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
        options: &GenerationOptions,
    ) -> std::result::Result<String, serde_json::Error> {
        let fingerprint = Fingerprint {
            provider: self.provider_name(),
            model: options.model.as_deref().unwrap_or(self.adapter.model()),
            system_prompt,
            prompt,
            options,
        };
        let encoded = serde_json::to_vec(&fingerprint)?;
        Ok(keys::response_cache_key(&hex::encode(Sha256::digest(&encoded))))
    }

    async fn cached_response(&self, key: &str) -> Option<String> {
        match self.store.get(key).await {
            Ok(Some(Value::String(text))) => Some(text),
            Ok(Some(_)) => {
                warn!(key, "Ignoring non-text response cache entry");
                None
            }
            Ok(None) => None,
            Err(e) => {
                warn!(key, error = %e, "Response cache read failed");
                None
            }
        }
    }

    async fn store_response(&self, key: &str, text: &str) {
        if let Err(e) = self
            .store
            .put(key, Value::String(text.to_string()), Some(self.settings.cache_ttl))
            .await
        {
            warn!(key, error = %e, "Response cache write failed");
        }
    }
}
