use crate::llm::client::LlmClient;
use crate::llm::mock_provider::MockProvider;
use crate::llm::ollama_provider::OllamaProvider;
use crate::llm::openai_provider::OpenAIProvider;
use crate::llm::provider::ProviderAdapter;
use crate::llm::types::{LlmConfig, LlmError, ProviderConfig, ProviderKind};
use crate::store::KeyValueStore;
use std::sync::Arc;
use tracing::debug;

/// Factory for creating LLM clients from shared configuration
#[derive(Clone)]
pub struct LlmClientFactory {
    config: LlmConfig,
    store: Arc<dyn KeyValueStore>,
}

impl std::fmt::Debug for LlmClientFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmClientFactory")
            .field("default_provider", &self.config.provider)
            .finish_non_exhaustive()
    }
}

impl LlmClientFactory {
    pub fn new(config: LlmConfig, store: Arc<dyn KeyValueStore>) -> Self {
        Self { config, store }
    }

    pub fn config(&self) -> &LlmConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn KeyValueStore> {
        &self.store
    }

    /// Resolve an optional provider name to a supported provider.
    pub fn resolve_provider(&self, name: Option<&str>) -> Result<ProviderKind, LlmError> {
        name.unwrap_or(self.config.provider.as_str()).parse()
    }

    /// Build a client for `name`, or for the default provider when `None`.
    pub fn create(&self, name: Option<&str>) -> Result<LlmClient, LlmError> {
        self.create_with_overrides(name, &ProviderConfig::default())
    }

    /// Build a client with per-call configuration merged over the shared one.
    pub fn create_with_overrides(
        &self,
        name: Option<&str>,
        overrides: &ProviderConfig,
    ) -> Result<LlmClient, LlmError> {
        let kind = self.resolve_provider(name)?;
        let config = self.config.provider_config(kind.as_str()).merge(overrides);
        debug!(provider = %kind, "Creating provider adapter");

        let adapter = Self::create_adapter(kind, config)?;
        Ok(LlmClient::new(
            adapter,
            Arc::clone(&self.store),
            self.config.client_settings(),
        ))
    }

    pub fn create_adapter(
        kind: ProviderKind,
        config: ProviderConfig,
    ) -> Result<Arc<dyn ProviderAdapter>, LlmError> {
        match kind {
            ProviderKind::Ollama => Ok(Arc::new(OllamaProvider::initialize(config)?)),
            ProviderKind::OpenAI => Ok(Arc::new(OpenAIProvider::initialize(config)?)),
            ProviderKind::Mock => Ok(Arc::new(MockProvider::initialize(config)?)),
        }
    }
}
