//! This module provides a simplified synchronous wrapper around the `llm` crate, and the two narrow
//! contracts the pipeline consumes: [`TextCompletion`] and [`TextEmbedding`].
//!
//! The solvers only ever see the traits, so tests run against the mocks in
//! [`crate::test_util`] and the network backend is chosen by configuration.

use llm::LLMProvider;
use llm::builder::{LLMBackend, LLMBuilder};
pub use llm::chat::ChatMessage;
use llm::chat::StructuredOutputFormat;
use llm::error::LLMError;
use serde::Deserialize;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// API Key wrapper that hides the key in debug output.
#[derive(Deserialize)]
pub struct ApiKey(pub String);

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("********")
    }
}

/// Configuration for LLM clients.
#[derive(Debug, Deserialize)]
pub struct LLMConfig {
    /// Hostname and port at which to find the LLM serve. Example: "http://[::1]:11434"
    pub address: Option<String>,

    /// API Key for the LLM service.
    pub api_key: Option<ApiKey>,

    /// Which backend to use, e.g. "ollama".
    pub backend: String,

    /// Name of the model to invoke.
    pub model: String,

    /// Maximum output tokens.
    pub max_tokens: u32,
}

#[derive(Debug, Error)]
pub enum CompletionError {
    /// The service could not be reached or the connection broke. Worth retrying.
    #[error("transport failure: {0}")]
    Transport(String),
    /// The service answered with an error.
    #[error("provider error: {0}")]
    Provider(String),
    #[error("invalid LLM configuration: {0}")]
    Config(String),
}

impl From<LLMError> for CompletionError {
    fn from(err: LLMError) -> Self {
        match err {
            LLMError::HttpError(message) => CompletionError::Transport(message),
            other => CompletionError::Provider(other.to_string()),
        }
    }
}

/// Wrapper for an LLM client with helper methods.
pub struct BumpLLM {
    client: Box<dyn LLMProvider>,
}

impl BumpLLM {
    /// Builds an LLM client from configuration.
    pub fn build(
        config: &LLMConfig,
        output_format_json: Option<&str>,
        system_prompt: &str,
    ) -> Result<Self, CompletionError> {
        let backend = LLMBackend::from_str(&config.backend)
            .map_err(|e| CompletionError::Config(format!("unknown backend: {e}")))?;

        let mut llm_builder = LLMBuilder::new()
            .backend(backend)
            .model(&config.model)
            .max_tokens(config.max_tokens)
            .temperature(0.0)
            .system(system_prompt);

        if let Some(format) = output_format_json {
            let output_format: StructuredOutputFormat = serde_json::from_str(format)
                .map_err(|e| CompletionError::Config(format!("bad output schema: {e}")))?;
            llm_builder = llm_builder.schema(output_format);
        }
        if let Some(ref address) = config.address
            && !address.is_empty()
        {
            llm_builder = llm_builder.base_url(address);
        }
        if let Some(ref api_key) = config.api_key
            && !api_key.0.is_empty()
        {
            llm_builder = llm_builder.api_key(&api_key.0);
        }

        let client = llm_builder.build()?;
        Ok(Self { client })
    }

    fn runtime() -> Result<tokio::runtime::Runtime, CompletionError> {
        tokio::runtime::Builder::new_current_thread()
            .enable_io()
            .enable_time()
            .build()
            .map_err(|e| CompletionError::Transport(format!("tokio runtime: {e}")))
    }

    /// Invokes the LLM and returns the raw response text.
    pub fn invoke(&self, request: &[ChatMessage]) -> Result<String, CompletionError> {
        let response = Self::runtime()?.block_on(self.client.chat(request))?;
        response
            .text()
            .ok_or_else(|| CompletionError::Provider("no response text".into()))
    }

    /// Embeds every input, in order.
    pub fn embed(&self, inputs: Vec<String>) -> Result<Vec<Vec<f32>>, CompletionError> {
        Ok(Self::runtime()?.block_on(self.client.embed(inputs))?)
    }
}

/// A completion reply: the code found between the fences, and everything the model said.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    /// Empty when the reply contained no fenced code block.
    pub code: String,
    pub raw: String,
}

impl Completion {
    pub fn from_raw(raw: String) -> Completion {
        Completion {
            code: extract_code(&raw).unwrap_or_default(),
            raw,
        }
    }
}

/// A text-completion service.
pub trait TextCompletion: Send + Sync {
    /// Short identifier of the backend and model, used to key the response cache.
    fn name(&self) -> String;

    fn complete(&self, prompt: &str, system_context: &str) -> Result<Completion, CompletionError>;
}

/// A text-embedding service.
pub trait TextEmbedding: Send + Sync {
    fn embed(&self, text: &str) -> Result<Vec<f32>, CompletionError>;
}

/// [`TextCompletion`] backed by the `llm` crate.
pub struct LlmCompletion {
    config: Arc<LLMConfig>,
}

impl LlmCompletion {
    pub fn new(config: Arc<LLMConfig>) -> LlmCompletion {
        LlmCompletion { config }
    }
}

impl TextCompletion for LlmCompletion {
    fn name(&self) -> String {
        format!("{}-{}", self.config.backend, self.config.model).replace(['/', ':'], "_")
    }

    fn complete(&self, prompt: &str, system_context: &str) -> Result<Completion, CompletionError> {
        let llm = BumpLLM::build(&self.config, None, system_context)?;
        let request = [ChatMessage::user().content(prompt).build()];
        let raw = llm.invoke(&request)?;
        debug!("completion returned {} bytes", raw.len());
        Ok(Completion::from_raw(raw))
    }
}

/// [`TextEmbedding`] backed by the `llm` crate.
pub struct LlmEmbedding {
    config: Arc<LLMConfig>,
}

impl LlmEmbedding {
    pub fn new(config: Arc<LLMConfig>) -> LlmEmbedding {
        LlmEmbedding { config }
    }
}

impl TextEmbedding for LlmEmbedding {
    fn embed(&self, text: &str) -> Result<Vec<f32>, CompletionError> {
        let llm = BumpLLM::build(&self.config, None, "")?;
        llm.embed(vec![text.to_string()])?
            .into_iter()
            .next()
            .ok_or_else(|| CompletionError::Provider("empty embedding response".into()))
    }
}

/// Calls `provider` until it answers, retrying only transport failures. Other errors, and
/// replies without code, are returned to the caller as they are.
pub fn complete_retrying(
    provider: &dyn TextCompletion,
    prompt: &str,
    system_context: &str,
    backoff: Duration,
) -> Result<Completion, CompletionError> {
    let mut attempt = 0u32;
    loop {
        match provider.complete(prompt, system_context) {
            Err(CompletionError::Transport(message)) => {
                attempt += 1;
                warn!("completion transport failure (attempt {attempt}): {message}");
                std::thread::sleep(backoff);
            }
            other => return other,
        }
    }
}

/// Returns the contents of the first fenced (```) block of `response`, without the language tag.
pub fn extract_code(response: &str) -> Option<String> {
    let open = response.find("```")?;
    let after_fence = &response[open + 3..];
    // Skip the language tag, if any.
    let body_start = after_fence.find('\n').map(|i| i + 1)?;
    let body = &after_fence[body_start..];
    let close = body.find("```")?;
    Some(body[..close].trim_end_matches(['\n', '\r']).to_string())
}

/// Cosine similarity of two vectors; 0 when either is all zeros or the lengths differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::MockCompletion;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn extracts_fenced_code() {
        let reply = "Here you go:\n```java\nobj.newMethod();\n```\nDone.";
        assert_eq!(extract_code(reply).as_deref(), Some("obj.newMethod();"));
        assert_eq!(extract_code("no code here"), None);
        assert_eq!(extract_code("```java\nunterminated"), None);
    }

    #[test]
    fn retries_transport_failures_only() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let provider = MockCompletion::new(move |_, _| {
            if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(CompletionError::Transport("connection reset".into()))
            } else {
                Ok("```\nx();\n```".into())
            }
        });
        let completion =
            complete_retrying(&provider, "p", "s", Duration::from_millis(0)).unwrap();
        assert_eq!(completion.code, "x();");
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        let failing = MockCompletion::new(|_, _| Err(CompletionError::Provider("bad".into())));
        assert!(matches!(
            complete_retrying(&failing, "p", "s", Duration::from_millis(0)),
            Err(CompletionError::Provider(_))
        ));
    }

    #[test]
    fn cosine() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
    }
}
