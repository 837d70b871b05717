//! `SpeechSynthesizer` trait and the HTTP implementation.

use async_trait::async_trait;
use thiserror::Error;

use crate::config::{SynthesisConfig, VoiceProfile};
use crate::config::voice::DEFAULT_SYNTHESIS_MODEL;

/// Response header carrying the provider-side history reference.
pub const HISTORY_ITEM_HEADER: &str = "history-item-id";

// ---------------------------------------------------------------------------
// SynthesisError
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SynthesisError {
    /// No API key is configured; nothing was sent.
    #[error("no synthesis API key configured")]
    MissingApiKey,

    /// The request named a voice that does not exist and no fallback voice
    /// is configured.
    #[error("no voice found for alias: {0}")]
    NoVoice(String),

    #[error("HTTP request failed: {0}")]
    Request(String),

    #[error("synthesis request timed out")]
    Timeout,

    #[error("synthesis provider returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("failed to read synthesis response: {0}")]
    Parse(String),
}

impl From<reqwest::Error> for SynthesisError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            SynthesisError::Timeout
        } else {
            SynthesisError::Request(e.to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Synthesized audio plus the provider's reference to it, if any.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SynthesizedAudio {
    pub bytes: Vec<u8>,
    /// Lets the audio be fetched again later for replay.
    pub history_item_id: Option<String>,
}

#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(
        &self,
        text: &str,
        voice: &VoiceProfile,
    ) -> Result<SynthesizedAudio, SynthesisError>;

    /// Fetch previously generated audio by provider history id.
    async fn fetch_history_audio(&self, history_item_id: &str) -> Result<Vec<u8>, SynthesisError>;
}

// ---------------------------------------------------------------------------
// Request shape
// ---------------------------------------------------------------------------

/// `voice_settings` object for `voice`.
///
/// `style` is only sent to the multilingual v2 model and only when
/// positive; `speed` only when it differs from 1.0.
pub fn voice_settings(voice: &VoiceProfile) -> serde_json::Value {
    let mut settings = serde_json::json!({
        "stability": voice.stability,
        "similarity_boost": voice.similarity_boost,
        "use_speaker_boost": voice.use_speaker_boost,
    });
    if voice.model_id == DEFAULT_SYNTHESIS_MODEL {
        if let Some(style) = voice.style.filter(|s| *s > 0.0) {
            settings["style"] = style.into();
        }
    }
    if let Some(speed) = voice.speed.filter(|s| (*s - 1.0).abs() > f32::EPSILON) {
        settings["speed"] = speed.into();
    }
    settings
}

// ---------------------------------------------------------------------------
// HttpSynthesizer
// ---------------------------------------------------------------------------

pub struct HttpSynthesizer {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpSynthesizer {
    pub fn from_config(config: &SynthesisConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config
                .api_key
                .clone()
                .filter(|k| !k.trim().is_empty()),
        }
    }

    fn key(&self) -> Result<&str, SynthesisError> {
        self.api_key.as_deref().ok_or(SynthesisError::MissingApiKey)
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, SynthesisError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        Err(SynthesisError::Status {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl SpeechSynthesizer for HttpSynthesizer {
    async fn synthesize(
        &self,
        text: &str,
        voice: &VoiceProfile,
    ) -> Result<SynthesizedAudio, SynthesisError> {
        let key = self.key()?;
        let url = format!("{}/v1/text-to-speech/{}", self.base_url, voice.voice_id);
        let body = serde_json::json!({
            "text": text,
            "model_id": voice.model_id,
            "voice_settings": voice_settings(voice),
        });

        log::debug!(
            "tts: synthesizing {} chars with voice '{}' ({})",
            text.chars().count(),
            voice.alias,
            voice.model_id
        );

        let response = self
            .client
            .post(&url)
            .header("xi-api-key", key)
            .json(&body)
            .send()
            .await?;
        let response = Self::check_status(response).await?;

        let history_item_id = response
            .headers()
            .get(HISTORY_ITEM_HEADER)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .map(str::to_string);

        let bytes = response
            .bytes()
            .await
            .map_err(|e| SynthesisError::Parse(e.to_string()))?
            .to_vec();

        Ok(SynthesizedAudio {
            bytes,
            history_item_id,
        })
    }

    async fn fetch_history_audio(&self, history_item_id: &str) -> Result<Vec<u8>, SynthesisError> {
        let key = self.key()?;
        let url = format!("{}/v1/history/{}/audio", self.base_url, history_item_id);

        let response = self.client.get(&url).header("xi-api-key", key).send().await?;
        let response = Self::check_status(response).await?;

        let bytes = response
            .bytes()
            .await
            .map_err(|e| SynthesisError::Parse(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}
