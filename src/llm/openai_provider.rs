//! OpenAI-compatible implementation of [`ProviderAdapter`].
//!
//! Works against the hosted OpenAI API and any server exposing the same
//! `/chat/completions` and `/embeddings` endpoints. An API key is required.

use crate::llm::provider::{
    ProviderAdapter, endpoint, error_for_status, map_transport_error, parse_base_url,
};
use crate::llm::types::{GenerationOptions, LlmError, ProviderConfig};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

/// HTTP-backed OpenAI-compatible provider.
pub struct OpenAIProvider {
    client: reqwest::Client,
    base_url: Url,
    api_key: String,
    model: String,
    embedding_model: String,
    timeout: Duration,
    config: ProviderConfig,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

impl OpenAIProvider {
    fn build_chat_request<'a>(
        &'a self,
        prompt: &'a str,
        system_prompt: Option<&'a str>,
        options: &'a GenerationOptions,
    ) -> ChatRequest<'a> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = system_prompt {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: prompt,
        });

        ChatRequest {
            model: options.model.as_deref().unwrap_or(self.model.as_str()),
            messages,
            temperature: options.temperature.or(self.config.temperature),
            top_p: options.top_p.or(self.config.top_p),
            max_tokens: options.max_tokens.or(self.config.max_tokens),
            stream: false,
            response_format: options
                .wants_json()
                .then(|| serde_json::json!({ "type": "json_object" })),
        }
    }

    fn parse_chat_response(body: &str) -> Result<String, LlmError> {
        let parsed: ChatResponse = serde_json::from_str(body)
            .map_err(|e| LlmError::InvalidResponse(format!("chat completion: {}", e)))?;
        let choice = parsed.choices.into_iter().next().ok_or_else(|| {
            LlmError::InvalidResponse("chat completion contained no choices".to_string())
        })?;

        if choice.finish_reason.as_deref() == Some("length") {
            warn!("OpenAI completion was truncated by max_tokens");
        }

        choice
            .message
            .content
            .map(|content| content.trim().to_string())
            .ok_or_else(|| LlmError::InvalidResponse("chat completion had no content".to_string()))
    }

    fn parse_embedding_response(body: &str) -> Result<Vec<f32>, LlmError> {
        let parsed: EmbeddingResponse = serde_json::from_str(body)
            .map_err(|e| LlmError::InvalidResponse(format!("embeddings: {}", e)))?;
        parsed
            .data
            .into_iter()
            .next()
            .map(|data| data.embedding)
            .filter(|embedding| !embedding.is_empty())
            .ok_or_else(|| LlmError::InvalidResponse("embeddings response was empty".to_string()))
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
            .bearer_auth(&self.api_key)
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

impl ProviderAdapter for OpenAIProvider {
    fn initialize(config: ProviderConfig) -> Result<Self, LlmError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| {
                LlmError::Authentication(
                    "API key is required for the openai provider".to_string(),
                )
            })?;
        let base_url = parse_base_url(config.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL))?;
        let model = config
            .model
            .clone()
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let embedding_model = config
            .embedding_model
            .clone()
            .unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.to_string());
        let timeout = config.timeout();

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LlmError::Configuration(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url,
            api_key,
            model,
            embedding_model,
            timeout,
            config,
        })
    }

    fn provider_name(&self) -> &'static str {
        "openai"
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
            let request = self.build_chat_request(prompt, system_prompt, options);
            debug!(model = request.model, "Sending chat completion request");
            let body = self.post_json("chat/completions", &request).await?;
            Self::parse_chat_response(&body)
        })
    }

    fn generate_embeddings<'a>(
        &'a self,
        text: &'a str,
    ) -> BoxFuture<'a, Result<Vec<f32>, LlmError>> {
        Box::pin(async move {
            let request = EmbeddingRequest {
                model: &self.embedding_model,
                input: text,
            };
            let body = self.post_json("embeddings", &request).await?;
            Self::parse_embedding_response(&body)
        })
    }

    fn health_check(&self) -> BoxFuture<'_, Result<(), LlmError>> {
        Box::pin(async move {
            let url = endpoint(&self.base_url, "models")?;
            let response = self
                .client
                .get(url)
                .bearer_auth(&self.api_key)
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
