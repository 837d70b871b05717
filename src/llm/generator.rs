//! Core `TextGenerator` trait and `ApiGenerator` implementation.
//!
//! `ApiGenerator` calls any OpenAI-compatible `/v1/chat/completions`
//! endpoint.  All connection details come from [`GenerativeConfig`];
//! request shape per model comes from [`super::models::capabilities`].

use async_trait::async_trait;
use thiserror::Error;

use crate::config::{GenerativeConfig, ReasoningEffort};
use crate::llm::models::{capabilities, DEFAULT_TEMPERATURE};

// ---------------------------------------------------------------------------
// LlmError
// ---------------------------------------------------------------------------

/// Errors that can occur while calling the generative provider.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LlmError {
    /// HTTP transport or connection error.
    #[error("HTTP request failed: {0}")]
    Request(String),

    /// The request did not complete within the configured timeout.
    #[error("generative request timed out")]
    Timeout,

    /// The provider answered with a non-success status.
    #[error("provider returned {status}: {message}")]
    Status { status: u16, message: String },

    /// The HTTP response could not be parsed as expected JSON.
    #[error("failed to parse provider response: {0}")]
    Parse(String),
}

impl From<reqwest::Error> for LlmError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            LlmError::Timeout
        } else {
            LlmError::Request(e.to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

/// One system + user exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub system_prompt: String,
    pub user_text: String,
    pub model: String,
    pub reasoning_effort: ReasoningEffort,
    pub max_tokens: u32,
}

/// Token accounting reported by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

impl TokenUsage {
    pub fn add(&mut self, other: &TokenUsage) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.total_tokens += other.total_tokens;
    }
}

/// Provider output.  `text` is empty when the provider returned no content.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Generation {
    pub text: String,
    pub usage: TokenUsage,
}

// ---------------------------------------------------------------------------
// TextGenerator trait
// ---------------------------------------------------------------------------

/// Async trait for a generative text provider.
///
/// Implementors must be `Send + Sync` so they can be shared across tasks
/// (e.g. wrapped in `Arc<dyn TextGenerator>`).
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<Generation, LlmError>;
}

// ---------------------------------------------------------------------------
// ApiGenerator
// ---------------------------------------------------------------------------

/// Calls an OpenAI-compatible `/v1/chat/completions` endpoint.
pub struct ApiGenerator {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl ApiGenerator {
    /// Build an `ApiGenerator` from application config.
    ///
    /// The HTTP client carries the per-request timeout from
    /// `config.timeout_secs`.
    pub fn from_config(config: &GenerativeConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        }
    }

    /// JSON body for `request`, shaped for the target model.
    pub fn request_body(request: &GenerationRequest) -> serde_json::Value {
        let caps = capabilities(&request.model);

        let mut body = serde_json::json!({
            "model": request.model,
            "messages": [
                { "role": "system", "content": request.system_prompt },
                { "role": "user",   "content": request.user_text     }
            ],
        });
        body[caps.max_tokens_param] = request.max_tokens.into();
        if caps.is_reasoning {
            body["reasoning_effort"] = request.reasoning_effort.as_str().into();
        }
        if caps.supports_temperature {
            body["temperature"] = DEFAULT_TEMPERATURE.into();
        }
        body
    }
}

#[async_trait]
impl TextGenerator for ApiGenerator {
    /// The `Authorization: Bearer …` header is attached only when an API
    /// key is configured and non-empty.
    async fn generate(&self, request: &GenerationRequest) -> Result<Generation, LlmError> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let mut req = self.client.post(&url).json(&Self::request_body(request));

        let key = self.api_key.as_deref().unwrap_or("");
        if !key.is_empty() {
            req = req.bearer_auth(key);
        }

        let response = req.send().await?;
        let status = response.status();

        let raw = response.text().await?;

        if !status.is_success() {
            let message = serde_json::from_str::<serde_json::Value>(&raw)
                .ok()
                .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
                .unwrap_or_else(|| format!("API returned {}", status.as_u16()));
            return Err(LlmError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let json: serde_json::Value =
            serde_json::from_str(&raw).map_err(|e| LlmError::Parse(e.to_string()))?;

        let text = json["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or("")
            .trim()
            .to_string();

        let usage = TokenUsage {
            prompt_tokens: json["usage"]["prompt_tokens"].as_u64().unwrap_or(0),
            completion_tokens: json["usage"]["completion_tokens"].as_u64().unwrap_or(0),
            total_tokens: json["usage"]["total_tokens"].as_u64().unwrap_or(0),
        };

        Ok(Generation { text, usage })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn make_request(model: &str) -> GenerationRequest {
        GenerationRequest {
            system_prompt: "sys".into(),
            user_text: "hello".into(),
            model: model.into(),
            reasoning_effort: ReasoningEffort::Low,
            max_tokens: 512,
        }
    }

    #[test]
    fn from_config_builds_without_panic() {
        let _generator = ApiGenerator::from_config(&GenerativeConfig::default());
    }

    #[test]
    fn from_config_trims_trailing_slash() {
        let config = GenerativeConfig {
            base_url: "http://localhost:8080/".into(),
            ..GenerativeConfig::default()
        };
        let generator = ApiGenerator::from_config(&config);
        assert_eq!(generator.base_url, "http://localhost:8080");
    }

    #[test]
    fn reasoning_model_body_has_effort_and_no_temperature() {
        let body = ApiGenerator::request_body(&make_request("gpt-5-nano"));
        assert_eq!(body["max_completion_tokens"], 512);
        assert_eq!(body["reasoning_effort"], "low");
        assert!(body.get("temperature").is_none());
        assert!(body.get("max_tokens").is_none());
        assert_eq!(body["messages"][1]["content"], "hello");
    }

    #[test]
    fn classic_model_body_has_temperature() {
        let body = ApiGenerator::request_body(&make_request("gpt-4o"));
        assert_eq!(body["max_tokens"], 512);
        assert!(body["temperature"].as_f64().is_some());
        assert!(body.get("reasoning_effort").is_none());
    }

    #[test]
    fn usage_accumulates() {
        let mut total = TokenUsage::default();
        total.add(&TokenUsage {
            prompt_tokens: 10,
            completion_tokens: 2,
            total_tokens: 12,
        });
        total.add(&TokenUsage {
            prompt_tokens: 5,
            completion_tokens: 1,
            total_tokens: 6,
        });
        assert_eq!(total.total_tokens, 18);
        assert_eq!(total.prompt_tokens, 15);
    }

    /// Verify that `ApiGenerator` is object-safe (usable as `dyn TextGenerator`).
    #[test]
    fn generator_is_object_safe() {
        let generator: Box<dyn TextGenerator> =
            Box::new(ApiGenerator::from_config(&GenerativeConfig::default()));
        drop(generator);
    }
}
