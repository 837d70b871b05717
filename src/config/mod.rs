//! Configuration module for the stream TTS relay.
//!
//! Provides `AppConfig` (top-level settings), sub-configs for each subsystem,
//! voice profiles with their per-voice pipeline overrides, `AppPaths` for
//! cross-platform data directories, and TOML persistence via
//! `AppConfig::load` / `AppConfig::save`.

pub mod moderation;
pub mod paths;
pub mod settings;
pub mod voice;

pub use moderation::{
    ContentModerationConfig, FailurePolicy, GenerativeConfig, GenerativeOverride,
    InstructionMergeMode, InstructionOverride, ModerationOverride, ModerationRules,
    ProfanityMode, ProfanityRule, ReasoningEffort, RuleOverrides, Strictness, TopicMergeMode,
    TopicOverride, TopicSelection,
};
pub use paths::AppPaths;
pub use settings::{
    ActionConfig, AppConfig, HistoryConfig, LengthLimit, MaxMessageLength, PlaybackConfig,
    ReplacementRule, ReviewConfig, SanitizationConfig, ServerConfig, SynthesisConfig,
};
pub use voice::VoiceProfile;
