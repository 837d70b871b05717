//! Voice profiles: synthesis identity plus per-voice pipeline overrides.

use serde::{Deserialize, Serialize};

use super::{GenerativeOverride, MaxMessageLength, ReplacementRule};

pub const DEFAULT_SYNTHESIS_MODEL: &str = "eleven_multilingual_v2";

/// A named speaker configuration.
///
/// Read-only to the pipeline.  Every override defaults to "inherit the
/// global setting".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceProfile {
    /// Unique key requests refer to.
    pub alias: String,
    /// Provider-side voice identifier.
    pub voice_id: String,
    /// Provider-side synthesis model.
    pub model_id: String,

    pub stability: f32,
    pub similarity_boost: f32,
    pub use_speaker_boost: bool,
    /// Style exaggeration; only sent for the multilingual v2 model.
    pub style: Option<f32>,
    /// Speaking rate; only sent when it differs from 1.0.
    pub speed: Option<f32>,
    /// Playback volume (0 – 100) overriding the global volume.
    pub volume: Option<u32>,

    // ---- sanitization -----------------------------------------------------
    pub ignore_sanitization: bool,
    pub allow_user_bracket_tags: bool,
    pub allow_zalgo_text: bool,
    pub allow_emojis: bool,

    // ---- replacements -----------------------------------------------------
    pub ignore_global_replacements: bool,
    pub replacements: Vec<ReplacementRule>,

    // ---- length limits ----------------------------------------------------
    pub ignore_max_message_length: bool,
    pub max_message_length_override: Option<MaxMessageLength>,

    // ---- generative processing --------------------------------------------
    pub ignore_generative_processing: bool,
    pub generative_override: Option<GenerativeOverride>,
    /// Generative model used for this voice instead of the global one.
    pub model_override: Option<String>,
}

impl Default for VoiceProfile {
    fn default() -> Self {
        Self {
            alias: "default".into(),
            voice_id: "21m00Tcm4TlvDq8ikWAM".into(),
            model_id: DEFAULT_SYNTHESIS_MODEL.into(),
            stability: 0.5,
            similarity_boost: 0.75,
            use_speaker_boost: true,
            style: None,
            speed: None,
            volume: None,
            ignore_sanitization: false,
            allow_user_bracket_tags: false,
            allow_zalgo_text: false,
            allow_emojis: false,
            ignore_global_replacements: false,
            replacements: Vec::new(),
            ignore_max_message_length: false,
            max_message_length_override: None,
            ignore_generative_processing: false,
            generative_override: None,
            model_override: None,
        }
    }
}

impl VoiceProfile {
    /// A profile with default settings under the given alias and voice id.
    pub fn named(alias: impl Into<String>, voice_id: impl Into<String>) -> Self {
        Self {
            alias: alias.into(),
            voice_id: voice_id.into(),
            ..Self::default()
        }
    }

    /// Whether the synthesis model understands bracketed performance tags.
    ///
    /// ```
    /// use stream_tts::config::VoiceProfile;
    ///
    /// let mut voice = VoiceProfile::default();
    /// assert!(!voice.supports_directive_tags());
    /// voice.model_id = "eleven_v3".into();
    /// assert!(voice.supports_directive_tags());
    /// ```
    pub fn supports_directive_tags(&self) -> bool {
        self.model_id.contains("v3")
    }

    /// Effective playback volume.
    pub fn volume_or(&self, global: u32) -> u32 {
        self.volume.unwrap_or(global)
    }
}
