//! LLM Client: chat completions over OpenAI-compatible and Ollama backends.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use gm_core::config::LlmConfig;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::error::LlmError;
use crate::service::CompletionService;
use crate::types::{ChatMessage, LlmResponse, SamplingParams};

/// Provider backend for chat completions.
#[derive(Debug, Clone)]
pub enum LlmProvider {
    /// Ollama's native chat endpoint.
    Ollama {
        /// Server root, e.g. `http://localhost:11434`.
        base_url: String,
    },
    /// Any server speaking the OpenAI chat-completions protocol.
    OpenAiCompatible {
        /// Server root, without `/v1`.
        base_url: String,
        /// Bearer token.
        api_key: String,
    },
    /// No backend: every call fails with [`LlmError::Unavailable`].
    None,
}

/// HTTP client that routes chat requests to the configured backend.
pub struct LlmClient {
    provider: LlmProvider,
    http: Client,
    model: String,
    timeout_ms: u64,
    max_retries: u32,
    max_tokens: u32,
}

impl std::fmt::Debug for LlmClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let provider = match &self.provider {
            LlmProvider::Ollama { .. } => "ollama",
            LlmProvider::OpenAiCompatible { .. } => "openai",
            LlmProvider::None => "none",
        };
        f.debug_struct("LlmClient")
            .field("provider", &provider)
            .field("model", &self.model)
            .field("timeout_ms", &self.timeout_ms)
            .finish_non_exhaustive()
    }
}

/// Extracts `(text, tokens)` from a successful response body.
type Extractor = fn(&Value) -> (String, u32);

fn openai_text(json: &Value) -> (String, u32) {
    let text = json["choices"][0]["message"]["content"]
        .as_str()
        .unwrap_or("")
        .trim()
        .to_string();
    let tokens = json["usage"]["completion_tokens"].as_u64().unwrap_or(0);
    (text, u32::try_from(tokens).unwrap_or(u32::MAX))
}

fn ollama_text(json: &Value) -> (String, u32) {
    let text = json["message"]["content"]
        .as_str()
        .unwrap_or("")
        .trim()
        .to_string();
    let tokens = json["eval_count"].as_u64().unwrap_or(0);
    (text, u32::try_from(tokens).unwrap_or(u32::MAX))
}

impl LlmClient {
    /// Create a client for an explicit provider.
    #[must_use]
    pub fn new(provider: LlmProvider, model: impl Into<String>, timeout_ms: u64, max_retries: u32) -> Self {
        Self {
            provider,
            http: Client::new(),
            model: model.into(),
            timeout_ms,
            max_retries,
            max_tokens: 700,
        }
    }

    /// Create a client with no backend.
    #[must_use]
    pub fn none() -> Self {
        Self::new(LlmProvider::None, String::new(), 0, 0)
    }

    /// Build a client from the `[llm]` config section.
    ///
    /// An OpenAI-compatible provider without an API key is treated as
    /// unconfigured and yields a client with no backend.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::ConfigError`] for an unknown provider name.
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        let base_url = config.base_url.trim_end_matches('/').to_string();
        let provider = match config.provider.to_ascii_lowercase().as_str() {
            "openai" => match config.api_key.as_deref().filter(|k| !k.trim().is_empty()) {
                Some(key) => LlmProvider::OpenAiCompatible {
                    base_url,
                    api_key: key.to_string(),
                },
                None => {
                    warn!("No API key configured; completion service disabled");
                    LlmProvider::None
                }
            },
            "ollama" => LlmProvider::Ollama { base_url },
            "none" => LlmProvider::None,
            other => {
                return Err(LlmError::ConfigError(format!("unknown provider '{other}'")));
            }
        };

        let mut client = Self::new(
            provider,
            config.model.clone(),
            config.request_timeout_ms,
            config.max_retries,
        );
        client.max_tokens = config.max_tokens;
        info!(?client, "Completion client ready");
        Ok(client)
    }

    /// Send a single `"ping"` and return the model's answer.
    ///
    /// # Errors
    ///
    /// Returns the underlying request error.
    pub async fn health_check(&self) -> Result<LlmResponse, LlmError> {
        let params = SamplingParams::new(0.0).with_max_tokens(8);
        self.complete(&[ChatMessage::user("ping")], &params).await
    }

    async fn post_with_retries(
        &self,
        url: &str,
        api_key: Option<&str>,
        body: &Value,
        extract: Extractor,
    ) -> Result<LlmResponse, LlmError> {
        let mut last_error = String::new();
        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                debug!(attempt = attempt + 1, of = self.max_retries + 1, "Retrying LLM call");
            }

            let start = Instant::now();
            let mut request = self
                .http
                .post(url)
                .json(body)
                .timeout(Duration::from_millis(self.timeout_ms));
            if let Some(key) = api_key {
                request = request.bearer_auth(key);
            }
            let result = request.send().await;
            let latency_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

            match result {
                Ok(resp) if resp.status().is_success() => {
                    let json: Value = resp
                        .json()
                        .await
                        .map_err(|e| LlmError::ParseError(e.to_string()))?;
                    let (text, tokens_generated) = extract(&json);
                    debug!(latency_ms, tokens_generated, "LLM call complete");
                    return Ok(LlmResponse {
                        text,
                        tokens_generated,
                        latency_ms,
                        model: self.model.clone(),
                    });
                }
                Ok(resp) => {
                    let status = resp.status();
                    last_error = format!("HTTP {status}: {}", resp.text().await.unwrap_or_default());
                    warn!(%url, error = %last_error, "LLM endpoint returned an error");
                }
                Err(e) => {
                    if e.is_timeout() {
                        warn!(%url, timeout_ms = self.timeout_ms, "LLM request timed out");
                        if self.max_retries == 0 {
                            return Err(LlmError::Timeout(self.timeout_ms));
                        }
                    } else {
                        warn!(%url, error = %e, "LLM request failed");
                    }
                    if self.max_retries == 0 {
                        return Err(e.into());
                    }
                    last_error = e.to_string();
                }
            }
        }

        Err(LlmError::RetriesExhausted {
            attempts: self.max_retries + 1,
            last_error,
        })
    }
}

#[async_trait]
impl CompletionService for LlmClient {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        params: &SamplingParams,
    ) -> Result<LlmResponse, LlmError> {
        let max_tokens = params.max_tokens.unwrap_or(self.max_tokens);
        match &self.provider {
            LlmProvider::None => Err(LlmError::Unavailable("No LLM provider configured".into())),
            LlmProvider::Ollama { base_url } => {
                let body = json!({
                    "model": self.model,
                    "messages": messages,
                    "stream": false,
                    "options": {
                        "temperature": params.temperature,
                        "presence_penalty": params.presence_penalty,
                        "frequency_penalty": params.frequency_penalty,
                        "num_predict": max_tokens,
                    }
                });
                let url = format!("{base_url}/api/chat");
                self.post_with_retries(&url, None, &body, ollama_text).await
            }
            LlmProvider::OpenAiCompatible { base_url, api_key } => {
                let body = json!({
                    "model": self.model,
                    "messages": messages,
                    "temperature": params.temperature,
                    "presence_penalty": params.presence_penalty,
                    "frequency_penalty": params.frequency_penalty,
                    "max_tokens": max_tokens,
                });
                let url = format!("{base_url}/v1/chat/completions");
                self.post_with_retries(&url, Some(api_key), &body, openai_text)
                    .await
            }
        }
    }

    fn is_available(&self) -> bool {
        !matches!(self.provider, LlmProvider::None)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openai_without_key_is_unavailable() {
        let client = LlmClient::from_config(&LlmConfig::default()).expect("client");
        assert!(!client.is_available());
    }

    #[test]
    fn openai_with_key_is_available() {
        let config = LlmConfig {
            api_key: Some("sk-test".to_string()),
            ..LlmConfig::default()
        };
        let client = LlmClient::from_config(&config).expect("client");
        assert!(client.is_available());
        assert_eq!(client.model_name(), "llama3");
    }

    #[test]
    fn unknown_provider_is_config_error() {
        let config = LlmConfig {
            provider: "carrier-pigeon".to_string(),
            ..LlmConfig::default()
        };
        assert!(matches!(
            LlmClient::from_config(&config),
            Err(LlmError::ConfigError(_))
        ));
    }

    #[tokio::test]
    async fn none_provider_fails_fast() {
        let client = LlmClient::none();
        let err = client
            .complete(&[ChatMessage::user("ciao")], &SamplingParams::new(0.4))
            .await
            .expect_err("no backend");
        assert!(matches!(err, LlmError::Unavailable(_)));
    }

    #[test]
    fn response_extractors() {
        let openai = json!({
            "choices": [{"message": {"content": "  {\"action\":\"final\"}  "}}],
            "usage": {"completion_tokens": 12}
        });
        assert_eq!(openai_text(&openai), ("{\"action\":\"final\"}".to_string(), 12));

        let ollama = json!({"message": {"content": "ciao"}, "eval_count": 3});
        assert_eq!(ollama_text(&ollama), ("ciao".to_string(), 3));
        assert_eq!(ollama_text(&json!({})), (String::new(), 0));
    }
}
