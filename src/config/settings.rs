//! Application settings structs, defaults and TOML persistence.
//!
//! All structs implement `Serialize`, `Deserialize`, `Default` and `Clone`
//! so they can be round-tripped through TOML files and shared across tasks.
//! Every struct is `#[serde(default)]`, so a partial `settings.toml` only
//! needs to name the values it changes.

use std::path::PathBuf;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::{AppPaths, GenerativeConfig, VoiceProfile};

// ---------------------------------------------------------------------------
// ServerConfig
// ---------------------------------------------------------------------------

/// Inbound request listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the line-protocol listener binds to.
    pub bind_address: String,
    /// TCP port of the listener.
    pub port: u16,
    /// Voice alias used when a request does not name one.
    pub default_voice_alias: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1".into(),
            port: 7591,
            default_voice_alias: None,
        }
    }
}

// ---------------------------------------------------------------------------
// ActionConfig
// ---------------------------------------------------------------------------

/// Action ids on the external action server.  `None` disables the actuator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionConfig {
    pub show_action_id: Option<String>,
    pub hide_action_id: Option<String>,
    pub refund_action_id: Option<String>,
}

// ---------------------------------------------------------------------------
// PlaybackConfig
// ---------------------------------------------------------------------------

/// Volume and overlay timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Volume (0 – 100) used when a voice has no override.
    pub global_volume: u32,
    /// How long a finished item stays on screen before hide is signalled.
    pub minimum_linger_ms: u64,
    /// Time the overlay needs to finish its hide animation.
    pub animation_duration_ms: u64,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            global_volume: 100,
            minimum_linger_ms: 1500,
            animation_duration_ms: 1200,
        }
    }
}

// ---------------------------------------------------------------------------
// ReviewConfig
// ---------------------------------------------------------------------------

/// Manual moderation: blocked items wait for an operator instead of being
/// refunded automatically.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReviewConfig {
    pub manual: bool,
}

// ---------------------------------------------------------------------------
// HistoryConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Maximum number of entries kept in memory.
    pub in_app_limit: usize,
    /// Append every entry to a daily JSONL file.
    pub file_logging: bool,
    /// Directory for the JSONL files.  `None` uses [`AppPaths::history_dir`].
    pub log_dir: Option<PathBuf>,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            in_app_limit: 100,
            file_logging: false,
            log_dir: None,
        }
    }
}

impl HistoryConfig {
    /// Directory the JSONL files live in.
    pub fn resolved_log_dir(&self) -> PathBuf {
        self.log_dir
            .clone()
            .unwrap_or_else(|| AppPaths::new().history_dir)
    }
}

// ---------------------------------------------------------------------------
// SanitizationConfig
// ---------------------------------------------------------------------------

/// Independently toggle-able sanitizer steps.  Spam collapsing is not
/// listed because it always runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SanitizationConfig {
    pub strip_html: bool,
    pub strip_code: bool,
    pub strip_zalgo: bool,
    pub replace_emojis: bool,
    pub strip_brackets: bool,
}

impl Default for SanitizationConfig {
    fn default() -> Self {
        Self {
            strip_html: true,
            strip_code: true,
            strip_zalgo: true,
            replace_emojis: true,
            strip_brackets: true,
        }
    }
}

impl SanitizationConfig {
    /// Every optional step switched off.
    pub fn disabled() -> Self {
        Self {
            strip_html: false,
            strip_code: false,
            strip_zalgo: false,
            replace_emojis: false,
            strip_brackets: false,
        }
    }
}

// ---------------------------------------------------------------------------
// ReplacementRule
// ---------------------------------------------------------------------------

/// A single pattern substitution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplacementRule {
    pub pattern: String,
    pub replacement: String,
    pub is_regex: bool,
    pub case_sensitive: bool,
    pub enabled: bool,
}

impl Default for ReplacementRule {
    fn default() -> Self {
        Self {
            pattern: String::new(),
            replacement: String::new(),
            is_regex: false,
            case_sensitive: false,
            enabled: true,
        }
    }
}

impl ReplacementRule {
    /// Case-insensitive literal rule.
    pub fn literal(pattern: impl Into<String>, replacement: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            replacement: replacement.into(),
            ..Self::default()
        }
    }

    /// Regex rule; case-insensitive unless the rule says otherwise.
    pub fn regex(pattern: impl Into<String>, replacement: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            replacement: replacement.into(),
            is_regex: true,
            ..Self::default()
        }
    }
}

// ---------------------------------------------------------------------------
// MaxMessageLength
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LengthLimit {
    pub enabled: bool,
    pub value: usize,
}

impl Default for LengthLimit {
    fn default() -> Self {
        Self {
            enabled: false,
            value: 0,
        }
    }
}

/// Dual character / word cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaxMessageLength {
    pub characters: LengthLimit,
    pub words: LengthLimit,
}

impl Default for MaxMessageLength {
    fn default() -> Self {
        Self {
            characters: LengthLimit {
                enabled: false,
                value: 500,
            },
            words: LengthLimit {
                enabled: false,
                value: 50,
            },
        }
    }
}

// ---------------------------------------------------------------------------
// SynthesisConfig
// ---------------------------------------------------------------------------

/// Speech synthesis provider connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisConfig {
    /// Base URL of the provider API.
    pub base_url: String,
    /// API key.  Synthesis fails fast when absent.
    pub api_key: Option<String>,
    /// Maximum seconds to wait for a synthesis response.
    pub timeout_secs: u64,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.elevenlabs.io".into(),
            api_key: None,
            timeout_secs: 30,
        }
    }
}

// ---------------------------------------------------------------------------
// AppConfig  (top-level)
// ---------------------------------------------------------------------------

/// Top-level application configuration, serialised as `settings.toml`.
///
/// # Persistence
///
/// ```rust,no_run
/// use stream_tts::config::AppConfig;
///
/// // Load (returns Default when file is missing)
/// let config = AppConfig::load().unwrap();
///
/// // Modify and save
/// // config.save().unwrap();
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub actions: ActionConfig,
    pub playback: PlaybackConfig,
    pub review: ReviewConfig,
    pub history: HistoryConfig,
    pub sanitization: SanitizationConfig,
    pub max_message_length: MaxMessageLength,
    pub generative: GenerativeConfig,
    pub synthesis: SynthesisConfig,
    /// Global replacement rules, applied before voice rules.
    pub replacements: Vec<ReplacementRule>,
    /// Configured voices, keyed by alias.
    pub voices: Vec<VoiceProfile>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            actions: ActionConfig::default(),
            playback: PlaybackConfig::default(),
            review: ReviewConfig::default(),
            history: HistoryConfig::default(),
            sanitization: SanitizationConfig::default(),
            max_message_length: MaxMessageLength::default(),
            generative: GenerativeConfig::default(),
            synthesis: SynthesisConfig::default(),
            replacements: Vec::new(),
            voices: vec![VoiceProfile::default()],
        }
    }
}

impl AppConfig {
    /// Load configuration from the platform-appropriate `settings.toml`.
    ///
    /// Returns `Ok(AppConfig::default())` when the file does not exist yet.
    pub fn load() -> Result<Self> {
        Self::load_from(&AppPaths::new().settings_file)
    }

    /// Load from an explicit path (useful for tests).
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to the platform-appropriate `settings.toml`,
    /// creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        self.save_to(&AppPaths::new().settings_file)
    }

    /// Save to an explicit path (useful for tests).
    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Resolve a voice by alias.
    ///
    /// Falls back to the configured default alias, then to the first voice.
    pub fn voice(&self, alias: Option<&str>) -> Option<&VoiceProfile> {
        let by_alias = |wanted: &str| self.voices.iter().find(|v| v.alias == wanted);

        alias
            .and_then(by_alias)
            .or_else(|| {
                self.server
                    .default_voice_alias
                    .as_deref()
                    .and_then(by_alias)
            })
            .or_else(|| self.voices.first())
    }

    /// Alias recorded on a request that did not name one.
    pub fn default_alias(&self) -> String {
        self.server
            .default_voice_alias
            .clone()
            .or_else(|| self.voices.first().map(|v| v.alias.clone()))
            .unwrap_or_else(|| "default".into())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ProfanityMode, Strictness};
    use tempfile::tempdir;

    #[test]
    fn round_trip_toml() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("settings.toml");

        let mut original = AppConfig::default();
        original.replacements.push(ReplacementRule::regex(r"(?i)\bgg\b", "good game"));
        original.review.manual = true;
        original
            .generative
            .content_moderation
            .blocked_topics
            .presets
            .insert("politics".into(), true);
        original.save_to(&path).expect("save");

        let loaded = AppConfig::load_from(&path).expect("load");

        assert_eq!(loaded.server.port, original.server.port);
        assert_eq!(loaded.replacements, original.replacements);
        assert!(loaded.review.manual);
        assert_eq!(loaded.voices.len(), 1);
        assert_eq!(loaded.voices[0].alias, original.voices[0].alias);
        assert_eq!(
            loaded
                .generative
                .content_moderation
                .blocked_topics
                .presets
                .get("politics"),
            Some(&true)
        );
    }

    #[test]
    fn load_missing_returns_default() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("nonexistent.toml");

        let config = AppConfig::load_from(&path).expect("should not error");
        assert_eq!(config.server.port, 7591);
        assert_eq!(config.generative.model, "gpt-5-nano");
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("settings.toml");
        std::fs::write(&path, "[playback]\nglobal_volume = 40\n").unwrap();

        let config = AppConfig::load_from(&path).expect("load");
        assert_eq!(config.playback.global_volume, 40);
        assert_eq!(config.playback.minimum_linger_ms, 1500);
        assert!(config.sanitization.strip_html);
    }

    #[test]
    fn default_values() {
        let cfg = AppConfig::default();

        assert_eq!(cfg.playback.global_volume, 100);
        assert_eq!(cfg.playback.animation_duration_ms, 1200);
        assert_eq!(cfg.history.in_app_limit, 100);
        assert!(!cfg.review.manual);
        assert_eq!(cfg.max_message_length.characters.value, 500);
        assert_eq!(cfg.max_message_length.words.value, 50);
        assert!(!cfg.max_message_length.characters.enabled);

        let rules = &cfg.generative.content_moderation.rules;
        assert_eq!(rules.hate_speech, Strictness::Standard);
        assert_eq!(rules.media_quotes, Strictness::Off);
        assert_eq!(rules.profanity.mode, ProfanityMode::Replace);
        assert_eq!(rules.profanity.replacement_word, "quack");
    }

    #[test]
    fn voice_lookup_falls_back_to_default_then_first() {
        let mut cfg = AppConfig::default();
        cfg.voices = vec![
            VoiceProfile::named("narrator", "v-1"),
            VoiceProfile::named("goblin", "v-2"),
        ];

        assert_eq!(cfg.voice(Some("goblin")).unwrap().alias, "goblin");
        assert_eq!(cfg.voice(Some("missing")).unwrap().alias, "narrator");

        cfg.server.default_voice_alias = Some("goblin".into());
        assert_eq!(cfg.voice(None).unwrap().alias, "goblin");
        assert_eq!(cfg.default_alias(), "goblin");
    }
}
