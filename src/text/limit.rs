//! Length limiter: dual character / word caps.
//!
//! Characters are checked first and win the attribution when both caps
//! fire.  A character cut backs up to the last space, unless that space
//! sits before 80% of the limit.

use serde::{Deserialize, Serialize};

use crate::config::{MaxMessageLength, VoiceProfile};

/// Which cap shortened the text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TruncatedBy {
    Characters,
    Words,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LimitOutcome {
    pub text: String,
    pub was_truncated: bool,
    pub truncated_by: Option<TruncatedBy>,
    pub char_count: usize,
    pub word_count: usize,
}

/// Resolve the limits for a request: voice opt-out → built-in defaults,
/// voice override → override, else global.
pub fn effective_limits(global: &MaxMessageLength, voice: Option<&VoiceProfile>) -> MaxMessageLength {
    match voice {
        Some(v) if v.ignore_max_message_length => MaxMessageLength::default(),
        Some(v) => v.max_message_length_override.unwrap_or(*global),
        None => *global,
    }
}

fn truncate_chars(text: &str, limit: usize) -> String {
    let cut: String = text.chars().take(limit).collect();
    let last_space = cut.chars().rev().position(|c| c == ' ').map(|from_end| {
        cut.chars().count() - 1 - from_end
    });

    match last_space {
        Some(idx) if idx as f64 > limit as f64 * 0.8 => cut.chars().take(idx).collect(),
        _ => cut,
    }
}

/// Apply the caps to `text`.
///
/// ```
/// use stream_tts::config::{LengthLimit, MaxMessageLength};
/// use stream_tts::text::{enforce, TruncatedBy};
///
/// let limits = MaxMessageLength {
///     words: LengthLimit { enabled: true, value: 2 },
///     ..MaxMessageLength::default()
/// };
/// let out = enforce("one two three", &limits);
/// assert_eq!(out.text, "one two");
/// assert_eq!(out.truncated_by, Some(TruncatedBy::Words));
/// ```
pub fn enforce(text: &str, limits: &MaxMessageLength) -> LimitOutcome {
    let mut current = text.to_string();
    let mut truncated_by = None;

    let chars = limits.characters;
    if chars.enabled && current.chars().count() > chars.value {
        current = truncate_chars(&current, chars.value);
        truncated_by = Some(TruncatedBy::Characters);
    }

    let words = limits.words;
    if words.enabled {
        let split: Vec<&str> = current.split_whitespace().collect();
        if split.len() > words.value {
            current = split[..words.value].join(" ");
            truncated_by.get_or_insert(TruncatedBy::Words);
        }
    }

    LimitOutcome {
        char_count: current.chars().count(),
        word_count: current.split_whitespace().count(),
        was_truncated: truncated_by.is_some(),
        truncated_by,
        text: current,
    }
}
