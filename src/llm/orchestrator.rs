//! Moderation and voice direction for one request.
//!
//! [`Moderator`] fans out up to four provider calls and folds the results:
//!
//! ```text
//!            ┌─ safety     ─┐
//!   text ────┼─ topics     ─┼── join (all settle) ──▶ fold
//!            ├─ copyright  ─┤                          │
//!            └─ voice      ─┘                          ▼
//!   1. first BLOCKED in safety → topics → copyright order wins
//!   2. else voice output (or original) + word-preservation check
//!   3. classifier transport failure + on_failure=block → blocked
//! ```
//!
//! A failing call never cancels its siblings.

use std::sync::Arc;

use tokio::time::Instant;

use crate::config::FailurePolicy;
use crate::llm::generator::{Generation, GenerationRequest, LlmError, TextGenerator, TokenUsage};
use crate::llm::policy::EffectiveGenerative;
use crate::llm::preserve::check_word_preservation;
use crate::llm::prompt::{
    build_copyright_prompt, build_safety_prompt, build_topic_prompt, build_voice_direction_prompt,
    check_if_blocked,
};
use crate::text::{post_process_directive_tags, SPAM_REWRITE_MARKER};

/// Token limit for classifier calls.
pub const CLASSIFIER_MAX_TOKENS: u32 = 2048;

/// Token limit for the voice-direction call, scaled with input length.
pub fn voice_max_tokens(text: &str) -> u32 {
    let scaled = (text.chars().count() as u32).saturating_mul(3);
    scaled.clamp(256, 2048)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classifier {
    Safety,
    Topics,
    Copyright,
}

impl Classifier {
    pub fn label(self) -> &'static str {
        match self {
            Classifier::Safety => "safety",
            Classifier::Topics => "topics",
            Classifier::Copyright => "copyright",
        }
    }
}

// ---------------------------------------------------------------------------
// Outcome types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum ModerationOutcome {
    Passed {
        text: String,
        tags_added: Vec<String>,
        /// The voice output failed the preservation check and was replaced.
        rewrite_rejected: bool,
    },
    Blocked {
        reason: String,
    },
}

impl ModerationOutcome {
    pub fn is_blocked(&self) -> bool {
        matches!(self, ModerationOutcome::Blocked { .. })
    }
}

/// Usage and timing for one request.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ModerationReport {
    pub usage: TokenUsage,
    pub total_ms: u64,
    pub parallel_tasks: usize,
    pub model: String,
    /// `"<task>: <error>"` for every call that failed.
    pub task_errors: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Moderated {
    pub outcome: ModerationOutcome,
    pub report: ModerationReport,
}

// ---------------------------------------------------------------------------
// Moderator
// ---------------------------------------------------------------------------

pub struct Moderator {
    generator: Arc<dyn TextGenerator>,
}

impl Moderator {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    /// Run every applicable task for `text` and fold the results.
    pub async fn process(&self, text: &str, policy: &EffectiveGenerative) -> Moderated {
        let start = Instant::now();
        let mut report = ModerationReport {
            model: policy.model.clone(),
            ..ModerationReport::default()
        };

        if text.trim().is_empty() {
            return Moderated {
                outcome: ModerationOutcome::Passed {
                    text: String::new(),
                    tags_added: Vec::new(),
                    rewrite_rejected: false,
                },
                report,
            };
        }

        let moderation = &policy.moderation;
        let (safety, topics, copyright) = if moderation.enabled {
            (
                build_safety_prompt(moderation),
                build_topic_prompt(moderation),
                build_copyright_prompt(moderation),
            )
        } else {
            (None, None, None)
        };
        let voice_prompt =
            build_voice_direction_prompt(policy.directive_tags, &moderation.rules.profanity);

        report.parallel_tasks = 1 + [&safety, &topics, &copyright]
            .iter()
            .filter(|p| p.is_some())
            .count();
        log::debug!(
            "moderation: running {} task(s) with model {}",
            report.parallel_tasks,
            policy.model
        );

        let (safety, topics, copyright, voice) = tokio::join!(
            self.classify(safety, text, policy),
            self.classify(topics, text, policy),
            self.classify(copyright, text, policy),
            self.call(voice_prompt, text, policy, voice_max_tokens(text)),
        );

        // -- fold classifiers -------------------------------------------------
        let mut blocked: Option<String> = None;
        let mut classifier_failure: Option<String> = None;

        let verdicts = [
            (Classifier::Safety, safety),
            (Classifier::Topics, topics),
            (Classifier::Copyright, copyright),
        ];
        for (kind, result) in verdicts {
            match result {
                None => {}
                Some(Ok(generation)) => {
                    report.usage.add(&generation.usage);
                    if let Some(reason) = check_if_blocked(&generation.text) {
                        log::info!("moderation: blocked by {}: {reason}", kind.label());
                        if blocked.is_none() {
                            blocked = Some(reason);
                        }
                    }
                }
                Some(Err(e)) => {
                    log::warn!("moderation: {} task failed: {e}", kind.label());
                    report.task_errors.push(format!("{}: {e}", kind.label()));
                    classifier_failure.get_or_insert_with(|| e.to_string());
                }
            }
        }

        let voice_output = match voice {
            Ok(generation) => {
                report.usage.add(&generation.usage);
                Some(generation.text)
            }
            Err(e) => {
                log::warn!("moderation: voice task failed: {e}");
                report.task_errors.push(format!("voice: {e}"));
                None
            }
        };

        report.total_ms = start.elapsed().as_millis() as u64;

        if let Some(reason) = blocked {
            return Moderated {
                outcome: ModerationOutcome::Blocked { reason },
                report,
            };
        }

        // -- voice output ---------------------------------------------------
        let mut final_text = voice_output
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| text.to_string());

        let mut rewrite_rejected = false;
        if !text.contains(SPAM_REWRITE_MARKER) {
            let check =
                check_word_preservation(text, &final_text, Some(&moderation.rules.profanity));
            if !check.preserved {
                log::warn!(
                    "moderation: {}",
                    check.warning.as_deref().unwrap_or("rewrite rejected")
                );
                rewrite_rejected = true;
                final_text = if policy.directive_tags {
                    format!("[neutral] {text}")
                } else {
                    text.to_string()
                };
            }
        }

        if let Some(err) = classifier_failure {
            if moderation.enabled && moderation.on_failure == FailurePolicy::Block {
                return Moderated {
                    outcome: ModerationOutcome::Blocked {
                        reason: format!("Content moderation unavailable: {err}"),
                    },
                    report,
                };
            }
            log::info!("moderation: classifier unavailable, continuing (on_failure = skip)");
        }

        let processed = post_process_directive_tags(&final_text);
        log::debug!(
            "moderation: passed in {} ms, {} tag(s), {} token(s)",
            report.total_ms,
            processed.tags_added.len(),
            report.usage.total_tokens
        );

        Moderated {
            outcome: ModerationOutcome::Passed {
                text: processed.text,
                tags_added: processed.tags_added,
                rewrite_rejected,
            },
            report,
        }
    }

    async fn classify(
        &self,
        prompt: Option<String>,
        text: &str,
        policy: &EffectiveGenerative,
    ) -> Option<Result<Generation, LlmError>> {
        match prompt {
            Some(prompt) => Some(self.call(prompt, text, policy, CLASSIFIER_MAX_TOKENS).await),
            None => None,
        }
    }

    async fn call(
        &self,
        system_prompt: String,
        text: &str,
        policy: &EffectiveGenerative,
        max_tokens: u32,
    ) -> Result<Generation, LlmError> {
        let request = GenerationRequest {
            system_prompt,
            user_text: text.to_string(),
            model: policy.model.clone(),
            reasoning_effort: policy.reasoning_effort,
            max_tokens,
        };
        self.generator.generate(&request).await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::config::{GenerativeConfig, ModerationRules, VoiceProfile};
    use crate::llm::policy::resolve;

    /// Answers by matching the system prompt's opening line.
    #[derive(Default)]
    struct ScriptedGenerator {
        safety: Option<Result<String, LlmError>>,
        topics: Option<Result<String, LlmError>>,
        copyright: Option<Result<String, LlmError>>,
        voice: Option<Result<String, LlmError>>,
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl TextGenerator for ScriptedGenerator {
        async fn generate(&self, request: &GenerationRequest) -> Result<Generation, LlmError> {
            let prompt = &request.system_prompt;
            let (label, answer) = if prompt.starts_with("You are a content safety") {
                ("safety", &self.safety)
            } else if prompt.starts_with("You are a topic") {
                ("topics", &self.topics)
            } else if prompt.starts_with("You are a copyright") {
                ("copyright", &self.copyright)
            } else {
                ("voice", &self.voice)
            };
            self.seen.lock().unwrap().push(label.to_string());
            let text = match answer.clone() {
                Some(Ok(text)) => text,
                Some(Err(e)) => return Err(e),
                None if label == "voice" => request.user_text.clone(),
                None => "PASS".to_string(),
            };
            Ok(Generation {
                text,
                usage: TokenUsage {
                    prompt_tokens: 10,
                    completion_tokens: 2,
                    total_tokens: 12,
                },
            })
        }
    }

    fn policy_with(rules: ModerationRules, voice: Option<&VoiceProfile>) -> EffectiveGenerative {
        let mut global = GenerativeConfig::default();
        global.content_moderation.rules = rules;
        resolve(&global, voice, true).unwrap()
    }

    fn default_policy() -> EffectiveGenerative {
        policy_with(ModerationRules::default(), None)
    }

    #[tokio::test]
    async fn clean_text_passes_with_voice_output() {
        let gen = Arc::new(ScriptedGenerator {
            voice: Some(Ok("Hello there friends!".into())),
            ..ScriptedGenerator::default()
        });
        let moderator = Moderator::new(gen.clone());
        let result = moderator.process("hello there friends", &default_policy()).await;

        assert_eq!(
            result.outcome,
            ModerationOutcome::Passed {
                text: "Hello there friends!".into(),
                tags_added: vec![],
                rewrite_rejected: false,
            }
        );
        // safety + copyright + voice; no topics configured
        assert_eq!(result.report.parallel_tasks, 3);
        assert_eq!(result.report.usage.total_tokens, 36);
        assert_eq!(gen.seen.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn first_blocking_classifier_wins() {
        let gen = Arc::new(ScriptedGenerator {
            safety: Some(Ok("BLOCKED: HATE SPEECH - slur".into())),
            copyright: Some(Ok("BLOCKED: SONG LYRICS - full verse".into())),
            ..ScriptedGenerator::default()
        });
        let result = Moderator::new(gen).process("some text", &default_policy()).await;
        assert_eq!(
            result.outcome,
            ModerationOutcome::Blocked {
                reason: "HATE SPEECH - slur".into()
            }
        );
    }

    #[tokio::test]
    async fn empty_classifier_answer_is_a_pass() {
        let gen = Arc::new(ScriptedGenerator {
            safety: Some(Ok(String::new())),
            ..ScriptedGenerator::default()
        });
        let result = Moderator::new(gen).process("good game", &default_policy()).await;
        assert!(!result.outcome.is_blocked());
    }

    #[tokio::test]
    async fn classifier_failure_blocks_when_fail_closed() {
        let gen = Arc::new(ScriptedGenerator {
            safety: Some(Err(LlmError::Timeout)),
            ..ScriptedGenerator::default()
        });
        let result = Moderator::new(gen).process("good game", &default_policy()).await;
        match result.outcome {
            ModerationOutcome::Blocked { reason } => {
                assert!(reason.starts_with("Content moderation unavailable:"));
            }
            other => panic!("expected block, got {other:?}"),
        }
        assert_eq!(result.report.task_errors.len(), 1);
    }

    #[tokio::test]
    async fn classifier_failure_passes_when_fail_open() {
        let gen = Arc::new(ScriptedGenerator {
            safety: Some(Err(LlmError::Timeout)),
            ..ScriptedGenerator::default()
        });
        let mut policy = default_policy();
        policy.moderation.on_failure = FailurePolicy::Skip;
        let result = Moderator::new(gen).process("good game", &policy).await;
        assert!(!result.outcome.is_blocked());
    }

    #[tokio::test]
    async fn voice_failure_keeps_original_text() {
        let gen = Arc::new(ScriptedGenerator {
            voice: Some(Err(LlmError::Request("connection reset".into()))),
            ..ScriptedGenerator::default()
        });
        let result = Moderator::new(gen).process("good game", &default_policy()).await;
        assert_eq!(
            result.outcome,
            ModerationOutcome::Passed {
                text: "good game".into(),
                tags_added: vec![],
                rewrite_rejected: false,
            }
        );
    }

    #[tokio::test]
    async fn rewritten_output_falls_back_to_neutral_tag() {
        let voice = VoiceProfile {
            model_id: "eleven_v3".into(),
            ..VoiceProfile::default()
        };
        let gen = Arc::new(ScriptedGenerator {
            voice: Some(Ok("[cheerful] greetings planet".into())),
            ..ScriptedGenerator::default()
        });
        let policy = policy_with(ModerationRules::default(), Some(&voice));
        let result = Moderator::new(gen).process("hello world", &policy).await;
        assert_eq!(
            result.outcome,
            ModerationOutcome::Passed {
                text: "[neutral] hello world".into(),
                tags_added: vec!["[neutral]".into()],
                rewrite_rejected: true,
            }
        );
    }

    #[tokio::test]
    async fn spam_directive_allows_creative_rewrite() {
        let gen = Arc::new(ScriptedGenerator {
            voice: Some(Ok("Someone fell asleep on the keyboard.".into())),
            ..ScriptedGenerator::default()
        });
        let input = "123... a long number **Spam detected: roast the spammer**";
        let result = Moderator::new(gen).process(input, &default_policy()).await;
        match result.outcome {
            ModerationOutcome::Passed {
                text,
                rewrite_rejected,
                ..
            } => {
                assert_eq!(text, "Someone fell asleep on the keyboard.");
                assert!(!rewrite_rejected);
            }
            other => panic!("expected pass, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn moderation_off_runs_only_voice() {
        let gen = Arc::new(ScriptedGenerator {
            safety: Some(Ok("BLOCKED: anything".into())),
            ..ScriptedGenerator::default()
        });
        let mut policy = default_policy();
        policy.moderation.enabled = false;
        let result = Moderator::new(gen.clone()).process("hello", &policy).await;

        assert!(!result.outcome.is_blocked());
        assert_eq!(*gen.seen.lock().unwrap(), vec!["voice".to_string()]);
    }

    #[tokio::test]
    async fn no_active_rules_cannot_block() {
        let gen = Arc::new(ScriptedGenerator::default());
        let policy = policy_with(ModerationRules::all_off(), None);
        let result = Moderator::new(gen.clone()).process("anything at all", &policy).await;

        assert!(!result.outcome.is_blocked());
        assert_eq!(result.report.parallel_tasks, 1);
    }

    #[test]
    fn voice_budget_scales_with_length() {
        assert_eq!(voice_max_tokens("hi"), 256);
        assert_eq!(voice_max_tokens(&"a".repeat(100)), 300);
        assert_eq!(voice_max_tokens(&"a".repeat(5000)), 2048);
    }
}
