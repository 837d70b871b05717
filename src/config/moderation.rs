//! Generative processing and content moderation settings.
//!
//! These are plain data.  The layering of global settings with a voice's
//! [`GenerativeOverride`] lives in [`crate::llm::policy`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// How aggressively a moderation rule is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strictness {
    Off,
    #[default]
    Standard,
    Strict,
}

impl Strictness {
    pub fn is_active(self) -> bool {
        self != Strictness::Off
    }
}

/// What to do when a moderation classifier could not be reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Fail closed: treat the request as blocked.
    #[default]
    Block,
    /// Fail open: continue with whatever text is available.
    Skip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProfanityMode {
    /// Profanity blocks the whole message (joins the safety classifier).
    Block,
    /// Profane words are swapped for the replacement word.
    #[default]
    Replace,
    /// No profanity handling.
    Allow,
}

/// Reasoning effort hint for models that accept one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReasoningEffort {
    #[default]
    Minimal,
    Low,
    Medium,
    High,
}

impl ReasoningEffort {
    pub fn as_str(self) -> &'static str {
        match self {
            ReasoningEffort::Minimal => "minimal",
            ReasoningEffort::Low => "low",
            ReasoningEffort::Medium => "medium",
            ReasoningEffort::High => "high",
        }
    }
}

// ---------------------------------------------------------------------------
// Rules
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfanityRule {
    pub mode: ProfanityMode,
    pub level: Strictness,
    /// Word spoken in place of a profane word in `replace` mode.
    pub replacement_word: String,
    /// Words never treated as profanity.
    pub exceptions: Vec<String>,
}

impl Default for ProfanityRule {
    fn default() -> Self {
        Self {
            mode: ProfanityMode::Replace,
            level: Strictness::Standard,
            replacement_word: "quack".into(),
            exceptions: Vec::new(),
        }
    }
}

impl ProfanityRule {
    pub fn replaces(&self) -> bool {
        self.mode == ProfanityMode::Replace && self.level.is_active()
    }

    pub fn blocks(&self) -> bool {
        self.mode == ProfanityMode::Block && self.level.is_active()
    }
}

/// Strictness per moderation rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModerationRules {
    pub sexual_content: Strictness,
    pub hate_speech: Strictness,
    pub violence: Strictness,
    pub doxxing: Strictness,
    pub misinformation: Strictness,
    pub song_lyrics: Strictness,
    pub media_quotes: Strictness,
    pub profanity: ProfanityRule,
}

impl Default for ModerationRules {
    fn default() -> Self {
        Self {
            sexual_content: Strictness::Standard,
            hate_speech: Strictness::Standard,
            violence: Strictness::Standard,
            doxxing: Strictness::Standard,
            misinformation: Strictness::Standard,
            song_lyrics: Strictness::Standard,
            media_quotes: Strictness::Off,
            profanity: ProfanityRule::default(),
        }
    }
}

impl ModerationRules {
    /// Every rule switched off, profanity allowed.
    pub fn all_off() -> Self {
        Self {
            sexual_content: Strictness::Off,
            hate_speech: Strictness::Off,
            violence: Strictness::Off,
            doxxing: Strictness::Off,
            misinformation: Strictness::Off,
            song_lyrics: Strictness::Off,
            media_quotes: Strictness::Off,
            profanity: ProfanityRule {
                mode: ProfanityMode::Allow,
                level: Strictness::Off,
                ..ProfanityRule::default()
            },
        }
    }
}

/// Topic presets (`true` = blocked, `false` = explicitly allowed) plus
/// free-form blocked topics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TopicSelection {
    pub presets: BTreeMap<String, bool>,
    pub custom: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContentModerationConfig {
    pub enabled: bool,
    pub on_failure: FailurePolicy,
    pub rules: ModerationRules,
    pub blocked_topics: TopicSelection,
    /// Streamer-written rules appended to the topic classifier.
    pub custom_instructions: String,
}

impl Default for ContentModerationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            on_failure: FailurePolicy::Block,
            rules: ModerationRules::default(),
            blocked_topics: TopicSelection::default(),
            custom_instructions: String::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// GenerativeConfig
// ---------------------------------------------------------------------------

/// Settings for the generative text provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerativeConfig {
    /// Master switch for moderation and voice direction.
    pub enabled: bool,
    /// Base URL of an OpenAI-compatible API.
    pub base_url: String,
    /// API key.  Without one, generative processing is skipped.
    pub api_key: Option<String>,
    /// Model identifier sent to the API.
    pub model: String,
    pub reasoning_effort: ReasoningEffort,
    /// Maximum seconds to wait for a single provider call.
    pub timeout_secs: u64,
    /// Let the voice-direction pass add performance tags for voices that
    /// support them.
    pub emotion_enhancement: bool,
    pub content_moderation: ContentModerationConfig,
}

impl Default for GenerativeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: "https://api.openai.com".into(),
            api_key: None,
            model: "gpt-5-nano".into(),
            reasoning_effort: ReasoningEffort::Minimal,
            timeout_secs: 30,
            emotion_enhancement: true,
            content_moderation: ContentModerationConfig::default(),
        }
    }
}

impl GenerativeConfig {
    /// `true` when a non-empty API key is configured.
    pub fn has_api_key(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.trim().is_empty())
    }
}

// ---------------------------------------------------------------------------
// Voice-level overrides
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TopicMergeMode {
    #[default]
    Inherit,
    /// Voice presets win per key; custom topics are appended.
    Additive,
    Override,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstructionMergeMode {
    #[default]
    Inherit,
    Append,
    Override,
}

/// Per-rule strictness overrides.  `None` keeps the global value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleOverrides {
    pub sexual_content: Option<Strictness>,
    pub hate_speech: Option<Strictness>,
    pub violence: Option<Strictness>,
    pub doxxing: Option<Strictness>,
    pub misinformation: Option<Strictness>,
    pub song_lyrics: Option<Strictness>,
    pub media_quotes: Option<Strictness>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TopicOverride {
    pub mode: TopicMergeMode,
    pub topics: TopicSelection,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstructionOverride {
    pub mode: InstructionMergeMode,
    pub text: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModerationOverride {
    pub enabled: Option<bool>,
    pub on_failure: Option<FailurePolicy>,
    pub rules: RuleOverrides,
    /// Replaces the global profanity rule wholesale when set.
    pub profanity: Option<ProfanityRule>,
    pub topics: TopicOverride,
    pub instructions: InstructionOverride,
}

/// A voice's adjustments to the global [`GenerativeConfig`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerativeOverride {
    pub moderation: Option<ModerationOverride>,
    pub emotion_enhancement: Option<bool>,
}
