//! Effective generative configuration for one request.
//!
//! Layers, in order:
//!
//! 1. hard bypass: no provider, generative processing disabled, or the
//!    voice sets `ignore_generative_processing` → `None`;
//! 2. global settings (serde defaults fill anything unset);
//! 3. the voice's [`GenerativeOverride`], field by field:
//!
//! | field                | merge                                      |
//! |----------------------|--------------------------------------------|
//! | enabled, on_failure  | replace when set                           |
//! | per-rule strictness  | replace when set                           |
//! | profanity            | replace whole rule when set                |
//! | topics               | `inherit` / `additive` / `override`        |
//! | custom instructions  | `inherit` / `append` / `override`          |
//! | emotion enhancement  | replace when set                           |
//! | model                | `model_override` replaces                  |

use crate::config::{
    FailurePolicy, GenerativeConfig, InstructionMergeMode, InstructionOverride, ModerationOverride,
    ModerationRules, ReasoningEffort, RuleOverrides, TopicMergeMode, TopicOverride,
    TopicSelection, VoiceProfile,
};

#[derive(Debug, Clone, PartialEq)]
pub struct EffectiveModeration {
    pub enabled: bool,
    pub on_failure: FailurePolicy,
    pub rules: ModerationRules,
    pub topics: TopicSelection,
    pub custom_instructions: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EffectiveGenerative {
    pub model: String,
    pub reasoning_effort: ReasoningEffort,
    /// Emotion enhancement as configured.
    pub emotion_enhancement: bool,
    /// Enhancement is on and the voice's synthesis model understands tags.
    pub directive_tags: bool,
    pub moderation: EffectiveModeration,
}

impl EffectiveGenerative {
    /// Whether there is any generative work to do for this request.
    pub fn should_run(&self) -> bool {
        self.moderation.enabled || self.emotion_enhancement
    }
}

/// Resolve the generative settings for a request.  `None` means skip
/// generative processing entirely.
pub fn resolve(
    global: &GenerativeConfig,
    voice: Option<&VoiceProfile>,
    provider_available: bool,
) -> Option<EffectiveGenerative> {
    if !provider_available || !global.enabled {
        return None;
    }
    if voice.is_some_and(|v| v.ignore_generative_processing) {
        return None;
    }

    let base = &global.content_moderation;
    let mut moderation = EffectiveModeration {
        enabled: base.enabled,
        on_failure: base.on_failure,
        rules: base.rules.clone(),
        topics: base.blocked_topics.clone(),
        custom_instructions: base.custom_instructions.clone(),
    };
    let mut emotion_enhancement = global.emotion_enhancement;

    let over = voice.and_then(|v| v.generative_override.as_ref());
    if let Some(over) = over {
        if let Some(m) = &over.moderation {
            apply_moderation_override(&mut moderation, m);
        }
        if let Some(enhance) = over.emotion_enhancement {
            emotion_enhancement = enhance;
        }
    }

    let model = voice
        .and_then(|v| v.model_override.clone())
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| global.model.clone());

    Some(EffectiveGenerative {
        model,
        reasoning_effort: global.reasoning_effort,
        emotion_enhancement,
        directive_tags: emotion_enhancement && voice.is_some_and(|v| v.supports_directive_tags()),
        moderation,
    })
}

fn apply_moderation_override(target: &mut EffectiveModeration, over: &ModerationOverride) {
    if let Some(enabled) = over.enabled {
        target.enabled = enabled;
    }
    if let Some(policy) = over.on_failure {
        target.on_failure = policy;
    }
    apply_rule_overrides(&mut target.rules, &over.rules);
    if let Some(profanity) = &over.profanity {
        target.rules.profanity = profanity.clone();
    }
    target.topics = merge_topics(&target.topics, &over.topics);
    target.custom_instructions = merge_instructions(&target.custom_instructions, &over.instructions);
}

fn apply_rule_overrides(rules: &mut ModerationRules, over: &RuleOverrides) {
    let pairs = [
        (&mut rules.sexual_content, over.sexual_content),
        (&mut rules.hate_speech, over.hate_speech),
        (&mut rules.violence, over.violence),
        (&mut rules.doxxing, over.doxxing),
        (&mut rules.misinformation, over.misinformation),
        (&mut rules.song_lyrics, over.song_lyrics),
        (&mut rules.media_quotes, over.media_quotes),
    ];
    for (slot, value) in pairs {
        if let Some(level) = value {
            *slot = level;
        }
    }
}

/// Merge topic selections according to the override mode.
pub fn merge_topics(global: &TopicSelection, over: &TopicOverride) -> TopicSelection {
    match over.mode {
        TopicMergeMode::Inherit => global.clone(),
        TopicMergeMode::Override => over.topics.clone(),
        TopicMergeMode::Additive => {
            let mut merged = global.clone();
            merged
                .presets
                .extend(over.topics.presets.iter().map(|(k, v)| (k.clone(), *v)));
            for topic in &over.topics.custom {
                if !merged.custom.contains(topic) {
                    merged.custom.push(topic.clone());
                }
            }
            merged
        }
    }
}

/// Merge custom instructions according to the override mode.
pub fn merge_instructions(global: &str, over: &InstructionOverride) -> String {
    match over.mode {
        InstructionMergeMode::Inherit => global.to_string(),
        InstructionMergeMode::Override => over.text.clone(),
        InstructionMergeMode::Append => {
            let voice = over.text.trim();
            if voice.is_empty() {
                global.to_string()
            } else if global.trim().is_empty() {
                voice.to_string()
            } else {
                format!("{global}\n\nVoice-specific rules:\n{voice}")
            }
        }
    }
}
