//! Ollama implementation of [`ProviderAdapter`].
//!
//! Talks to a local Ollama model server over its native HTTP API:
//! `POST /api/generate` for completions, `POST /api/embeddings` for
//! embeddings and `GET /api/tags` as a liveness probe. Streaming is disabled;
//! every call waits for the full response, bounded by the configured timeout.

use crate::llm::provider::{
    ProviderAdapter, endpoint, error_for_status, map_transport_error, parse_base_url,
};
use crate::llm::types::{GenerationOptions, LlmError, ProviderConfig};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use url::Url;

pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";
pub const DEFAULT_MODEL: &str = "llama3.1:8b";

pub struct OllamaProvider {
    client: reqwest::Client,
    base_url: Url,
    model: String,
    embedding_model: String,
    timeout: Duration,
    config: ProviderConfig,
}

#[derive(Debug, Serialize)]
struct OllamaGenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<&'a str>,
    options: OllamaOptions,
}

#[derive(Debug, Default, Serialize)]
struct OllamaOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_ctx: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct OllamaGenerateResponse {
    response: String,
}

#[derive(Debug, Serialize)]
struct OllamaEmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct OllamaEmbeddingResponse {
    embedding: Vec<f32>,
}

impl OllamaProvider {
    fn build_generate_request<'a>(
        &'a self,
        prompt: &'a str,
        system_prompt: Option<&'a str>,
        options: &'a GenerationOptions,
    ) -> OllamaGenerateRequest<'a> {
        OllamaGenerateRequest {
            model: options.model.as_deref().unwrap_or(self.model.as_str()),
            prompt,
            system: system_prompt,
            stream: false,
            format: options.wants_json().then_some("json"),
            options: OllamaOptions {
                temperature: options.temperature.or(self.config.temperature),
                top_p: options.top_p.or(self.config.top_p),
                num_ctx: options.context_window.or(self.config.context_window),
                num_predict: options.max_tokens.or(self.config.max_tokens),
            },
        }
    }

    fn parse_generate_response(body: &str) -> Result<String, LlmError> {
        let parsed: OllamaGenerateResponse = serde_json::from_str(body)
            .map_err(|e| LlmError::InvalidResponse(format!("ollama generate: {}", e)))?;
        Ok(parsed.response.trim().to_string())
    }

    fn parse_embedding_response(body: &str) -> Result<Vec<f32>, LlmError> {
        let parsed: OllamaEmbeddingResponse = serde_json::from_str(body)
            .map_err(|e| LlmError::InvalidResponse(format!("ollama embeddings: {}", e)))?;
        if parsed.embedding.is_empty() {
            return Err(LlmError::InvalidResponse(
                "ollama returned an empty embedding".to_string(),
            ));
        }
        Ok(parsed.embedding)
    }

    async fn post_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<String, LlmError> {
        let url = endpoint(&self.base_url, path)?;
        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| map_transport_error(e, self.timeout))?;

        if !response.status().is_success() {
            return Err(error_for_status(response).await);
        }

        response
            .text()
            .await
            .map_err(|e| map_transport_error(e, self.timeout))
    }
}

impl ProviderAdapter for OllamaProvider {
    fn initialize(config: ProviderConfig) -> Result<Self, LlmError> {
        let base_url = parse_base_url(config.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL))?;
        let model = config
            .model
            .clone()
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let embedding_model = config
            .embedding_model
            .clone()
            .unwrap_or_else(|| model.clone());
        let timeout = config.timeout();

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LlmError::Configuration(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url,
            model,
            embedding_model,
            timeout,
            config,
        })
    }

    fn provider_name(&self) -> &'static str {
        "ollama"
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
            let request = self.build_generate_request(prompt, system_prompt, options);
            debug!(model = request.model, "Sending Ollama generate request");
            let body = self.post_json("api/generate", &request).await?;
            Self::parse_generate_response(&body)
        })
    }

    fn generate_embeddings<'a>(
        &'a self,
        text: &'a str,
    ) -> BoxFuture<'a, Result<Vec<f32>, LlmError>> {
        Box::pin(async move {
            let request = OllamaEmbeddingRequest {
                model: &self.embedding_model,
                prompt: text,
            };
            let body = self.post_json("api/embeddings", &request).await?;
            Self::parse_embedding_response(&body)
        })
    }

    fn health_check(&self) -> BoxFuture<'_, Result<(), LlmError>> {
        Box::pin(async move {
            let url = endpoint(&self.base_url, "api/tags")?;
            let response = self
                .client
                .get(url)
                .send()
                .await
                .map_err(|e| map_transport_error(e, self.timeout))?;
            if response.status().is_success() {
                Ok(())
            } else {
                Err(error_for_status(response).await)
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn provider() -> OllamaProvider {
        OllamaProvider::initialize(ProviderConfig {
            model: Some("llama3.1:8b".to_string()),
            temperature: Some(0.5),
            context_window: Some(4096),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_generate_request_uses_config_defaults() {
        let provider = provider();
        let options = GenerationOptions::new();
        let request =
            provider.build_generate_request("How much did I spend?", Some("be brief"), &options);

        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({
                "model": "llama3.1:8b",
                "prompt": "How much did I spend?",
                "system": "be brief",
                "stream": false,
                "options": { "temperature": 0.5, "num_ctx": 4096 }
            })
        );
    }

    #[test]
    fn test_generate_request_applies_overrides_and_json_format() {
        let provider = provider();
        let options = GenerationOptions::new()
            .with_model("mistral")
            .with_temperature(0.0)
            .with_max_tokens(128)
            .with_format("json");
        let request = provider.build_generate_request("prompt", None, &options);
        let value = serde_json::to_value(&request).unwrap();

        assert_eq!(value["model"], "mistral");
        assert_eq!(value["format"], "json");
        assert_eq!(value["options"]["temperature"], 0.0);
        assert_eq!(value["options"]["num_predict"], 128);
        assert!(value.get("system").is_none());
    }

    #[test]
    fn test_parse_responses() {
        let text = OllamaProvider::parse_generate_response(
            r#"{"model":"llama3.1:8b","response":"  You spent $42.  ","done":true}"#,
        )
        .unwrap();
        assert_eq!(text, "You spent $42.");

        let embedding =
            OllamaProvider::parse_embedding_response(r#"{"embedding":[0.1,0.2,0.3]}"#).unwrap();
        assert_eq!(embedding.len(), 3);

        assert!(matches!(
            OllamaProvider::parse_generate_response("<html>"),
            Err(LlmError::InvalidResponse(_))
        ));
        assert!(matches!(
            OllamaProvider::parse_embedding_response(r#"{"embedding":[]}"#),
            Err(LlmError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_initialize_rejects_bad_url() {
        let result = OllamaProvider::initialize(ProviderConfig {
            base_url: Some("localhost without scheme".to_string()),
            ..Default::default()
        });
        assert!(matches!(result, Err(LlmError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_unreachable_server_is_generation_failure() {
        let provider = OllamaProvider::initialize(ProviderConfig {
            base_url: Some("http://127.0.0.1:9".to_string()),
            timeout: Some(2),
            ..Default::default()
        })
        .unwrap();

        let err = provider
            .generate_text("hello", None, &GenerationOptions::new())
            .await
            .unwrap_err();
        assert!(err.is_generation_failure());
    }
}
