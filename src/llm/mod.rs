pub mod client;
pub mod factory;
pub mod mock_provider;
pub mod ollama_provider;
pub mod openai_provider;
pub mod provider;
pub mod structured;
pub mod types;

pub use client::LlmClient;
pub use factory::LlmClientFactory;
pub use mock_provider::MockProvider;
pub use ollama_provider::OllamaProvider;
pub use openai_provider::OpenAIProvider;
pub use provider::ProviderAdapter;
pub use structured::OutputFormat;
pub use types::*;
