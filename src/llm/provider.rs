use crate::llm::types::{GenerationOptions, LlmError, ProviderConfig};
use futures::future::BoxFuture;

/// Uniform low-level transport to one LLM backend.
///
/// Adapters are stateless per call: they translate a generation request into
/// the backend's wire protocol and back, enforce the configured transport
/// timeout, and surface every transport problem as an [`LlmError`]. Retry,
/// caching and admission control live above this layer.
pub trait ProviderAdapter: Send + Sync {
    /// Build and validate an adapter from its configuration
    fn initialize(config: ProviderConfig) -> Result<Self, LlmError>
    where
        Self: Sized;

    /// Get provider name/identifier
    fn provider_name(&self) -> &'static str;

    /// Model used when a request does not name one
    fn model(&self) -> &str;

    /// Generate a completion for `prompt`
    ///
    /// # Arguments
    /// * `prompt` - The user prompt
    /// * `system_prompt` - Optional system instruction sent alongside the prompt
    /// * `options` - Sampling and format options; unset values fall back to the
    ///   provider configuration
    fn generate_text<'a>(
        &'a self,
        prompt: &'a str,
        system_prompt: Option<&'a str>,
        options: &'a GenerationOptions,
    ) -> BoxFuture<'a, Result<String, LlmError>>;

    /// Compute an embedding vector for `text`
    fn generate_embeddings<'a>(&'a self, text: &'a str)
    -> BoxFuture<'a, Result<Vec<f32>, LlmError>>;

    /// Test provider connectivity
    fn health_check(&self) -> BoxFuture<'_, Result<(), LlmError>> {
        Box::pin(async { Ok(()) })
    }
}

/// Map a transport error from `reqwest` onto the crate error taxonomy.
pub(crate) fn map_transport_error(error: reqwest::Error, timeout: std::time::Duration) -> LlmError {
    if error.is_timeout() {
        LlmError::Timeout(timeout)
    } else if error.is_decode() {
        LlmError::InvalidResponse(error.to_string())
    } else {
        LlmError::Network(error.to_string())
    }
}

/// Turn a non-success response into an error, keeping a bounded body excerpt.
pub(crate) async fn error_for_status(response: reqwest::Response) -> LlmError {
    let status = response.status();
    let body: String = response
        .text()
        .await
        .unwrap_or_default()
        .chars()
        .take(512)
        .collect();

    match status.as_u16() {
        401 | 403 => LlmError::Authentication(format!("HTTP {}: {}", status, body)),
        code => LlmError::HttpStatus { status: code, body },
    }
}

/// Resolve `path` against a provider base URL, tolerating a missing trailing slash.
pub(crate) fn endpoint(base_url: &url::Url, path: &str) -> Result<url::Url, LlmError> {
    let mut base = base_url.clone();
    if !base.path().ends_with('/') {
        let with_slash = format!("{}/", base.path());
        base.set_path(&with_slash);
    }
    base.join(path.trim_start_matches('/'))
        .map_err(|e| LlmError::Configuration(format!("invalid endpoint '{}': {}", path, e)))
}

pub(crate) fn parse_base_url(raw: &str) -> Result<url::Url, LlmError> {
    let url = url::Url::parse(raw)
        .map_err(|e| LlmError::Configuration(format!("invalid base_url '{}': {}", raw, e)))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        scheme => Err(LlmError::Configuration(format!(
            "unsupported base_url scheme '{}'",
            scheme
        ))),
    }
}
