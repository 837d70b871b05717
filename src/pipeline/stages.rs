//! The per-request transform pipeline.
//!
//! ```text
//! text ─▶ sanitize ─▶ replace ─▶ limit ─▶ moderate ─▶ final text | blocked
//! ```
//!
//! Truncation runs before moderation so the length cap governs what the
//! generative provider sees.  Moderated output may exceed the cap (added tags).

use crate::config::{AppConfig, VoiceProfile};
use crate::llm::{policy, ModerationOutcome, Moderator};
use crate::text::{
    apply_rule_sets, effective_limits, effective_sanitization, enforce, sanitize, TruncatedBy,
};

use super::item::{ModerationRecord, StageSnapshots};

/// Everything the stages produced for one request.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StageRecord {
    pub snapshots: StageSnapshots,
    pub sanitization_applied: Vec<String>,
    pub rule_sets_applied: usize,
    pub was_truncated: bool,
    pub truncated_by: Option<TruncatedBy>,
    pub moderation: ModerationRecord,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StageOutcome {
    Ready { record: StageRecord, final_text: String },
    Blocked { record: StageRecord, reason: String },
}

/// Run every stage for `text`.
///
/// `moderator` is `None` when no generative provider is configured; the
/// generative stage is then skipped.
pub async fn run_stages(
    text: &str,
    config: &AppConfig,
    voice: Option<&VoiceProfile>,
    moderator: Option<&Moderator>,
) -> StageOutcome {
    let mut record = StageRecord::default();

    // 1. sanitize
    let sanitization = effective_sanitization(&config.sanitization, voice);
    let sanitized = sanitize(text, &sanitization);
    record.sanitization_applied = sanitized.applied.iter().map(|s| s.to_string()).collect();
    record.snapshots.sanitized = Some(sanitized.text.clone());

    // 2. replace
    let replaced = apply_rule_sets(&sanitized.text, &config.replacements, voice);
    record.rule_sets_applied = replaced.applied.len();
    record.snapshots.replaced = Some(replaced.text.clone());

    // 3. limit
    let limits = effective_limits(&config.max_message_length, voice);
    let limited = enforce(&replaced.text, &limits);
    record.was_truncated = limited.was_truncated;
    record.truncated_by = limited.truncated_by;
    record.snapshots.truncated = Some(limited.text.clone());

    log::debug!(
        "pipeline: sanitized [{}], {} rule set(s), truncated: {:?}",
        record.sanitization_applied.join(", "),
        record.rule_sets_applied,
        record.truncated_by
    );

    // 4. moderate
    let effective = moderator.and_then(|m| {
        policy::resolve(&config.generative, voice, true)
            .filter(|e| e.should_run())
            .map(|e| (m, e))
    });
    let Some((moderator, effective)) = effective else {
        log::debug!("pipeline: generative stage skipped");
        return StageOutcome::Ready {
            final_text: limited.text,
            record,
        };
    };

    let moderated = moderator.process(&limited.text, &effective).await;
    record.moderation.used = true;
    record.moderation.report = Some(moderated.report);

    match moderated.outcome {
        ModerationOutcome::Blocked { reason } => StageOutcome::Blocked { record, reason },
        ModerationOutcome::Passed {
            text,
            tags_added,
            rewrite_rejected,
        } => {
            record.moderation.tags_added = tags_added;
            record.moderation.rewrite_rejected = rewrite_rejected;
            record.snapshots.moderated = Some(text.clone());
            StageOutcome::Ready {
                record,
                final_text: text,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use async_trait::async_trait;

    use crate::config::{LengthLimit, ReplacementRule};
    use crate::llm::{Generation, GenerationRequest, LlmError, TextGenerator};

    /// Safety classifier answers with a fixed verdict, voice direction echoes.
    struct FixedGenerator(&'static str);

    #[async_trait]
    impl TextGenerator for FixedGenerator {
        async fn generate(&self, request: &GenerationRequest) -> Result<Generation, LlmError> {
            let text = if request.system_prompt.starts_with("You are a content safety") {
                self.0.to_string()
            } else if request.system_prompt.contains("OUTPUT RULES") {
                request.user_text.clone()
            } else {
                "PASS".to_string()
            };
            Ok(Generation {
                text,
                ..Generation::default()
            })
        }
    }

    fn config() -> AppConfig {
        let mut config = AppConfig::default();
        config.replacements = vec![ReplacementRule::literal("gg", "good game")];
        config.max_message_length.words = LengthLimit {
            enabled: true,
            value: 4,
        };
        config
    }

    #[tokio::test]
    async fn stages_run_in_order_without_provider() {
        let outcome =
            run_stages("<i>gg</i> everyone well played today", &config(), None, None).await;
        match outcome {
            StageOutcome::Ready { record, final_text } => {
                assert_eq!(
                    record.snapshots.sanitized.as_deref(),
                    Some("gg everyone well played today")
                );
                assert_eq!(
                    record.snapshots.replaced.as_deref(),
                    Some("good game everyone well played today")
                );
                assert_eq!(final_text, "good game everyone well");
                assert_eq!(record.truncated_by, Some(TruncatedBy::Words));
                assert_eq!(record.sanitization_applied, vec!["html"]);
                assert!(!record.moderation.used);
            }
            other => panic!("expected ready, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn blocked_text_stops_before_synthesis() {
        let moderator = Moderator::new(Arc::new(FixedGenerator("BLOCKED: VIOLENCE - threat")));
        let outcome = run_stages("I will find you", &config(), None, Some(&moderator)).await;
        match outcome {
            StageOutcome::Blocked { record, reason } => {
                assert_eq!(reason, "VIOLENCE - threat");
                assert!(record.moderation.used);
                assert_eq!(record.snapshots.truncated.as_deref(), Some("I will find you"));
            }
            other => panic!("expected block, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn passing_text_records_moderated_snapshot() {
        let moderator = Moderator::new(Arc::new(FixedGenerator("PASS")));
        let outcome = run_stages("hello chat", &config(), None, Some(&moderator)).await;
        match outcome {
            StageOutcome::Ready { record, final_text } => {
                assert_eq!(final_text, "hello chat");
                assert!(record.moderation.used);
                assert_eq!(record.snapshots.moderated.as_deref(), Some("hello chat"));
            }
            other => panic!("expected ready, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn voice_opt_out_skips_generative_stage() {
        let moderator = Moderator::new(Arc::new(FixedGenerator("BLOCKED: anything")));
        let voice = VoiceProfile {
            ignore_generative_processing: true,
            ..VoiceProfile::default()
        };
        let outcome = run_stages("hello", &config(), Some(&voice), Some(&moderator)).await;
        match outcome {
            StageOutcome::Ready { record, final_text } => {
                assert_eq!(final_text, "hello");
                assert!(!record.moderation.used);
                assert_eq!(record.snapshots.moderated, None);
            }
            other => panic!("expected ready, got {other:?}"),
        }
    }
}
