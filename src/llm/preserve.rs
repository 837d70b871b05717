//! Word-preservation check for voice-direction output.
//!
//! The voice-direction task may add tags, vocalizations and sustain or
//! singing glyphs, and may swap profanity for the replacement word.  It may
//! not rewrite what the viewer said.  This module measures how much of the
//! original survived.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::ProfanityRule;
use crate::text::normalize_whitespace;

static TAGS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[[^\]]*\]").unwrap());
static VOCALIZATIONS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*[^*]*\*").unwrap());
static GLYPHS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[♪~]").unwrap());
static PUNCTUATION: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w\s]").unwrap());

const STOP_WORDS: &[&str] = &[
    "a", "an", "the", "is", "are", "was", "were", "be", "been", "being", "i", "you", "he", "she",
    "it", "we", "they", "my", "your", "his", "her", "its", "our", "their", "to", "of", "in",
    "for", "on", "at", "by", "with", "as", "and", "or", "but", "so", "if", "then", "that",
    "this", "what", "which", "who", "when", "where", "how", "why", "just", "not", "no", "yes",
];

/// Minimum share of significant words that must survive.
pub const MIN_PRESERVATION_RATIO: f64 = 0.6;

/// Outcome of [`check_word_preservation`].
#[derive(Debug, Clone, PartialEq)]
pub struct PreservationCheck {
    pub preserved: bool,
    pub ratio: f64,
    pub warning: Option<String>,
}

impl PreservationCheck {
    fn kept(ratio: f64) -> Self {
        Self {
            preserved: true,
            ratio,
            warning: None,
        }
    }
}

/// Strip tags, vocalizations and glyphs, then lower-case.
pub fn extract_spoken_words(text: &str) -> String {
    let text = TAGS.replace_all(text, "");
    let text = VOCALIZATIONS.replace_all(&text, "");
    let text = GLYPHS.replace_all(&text, "");
    normalize_whitespace(&text).to_lowercase()
}

/// Words worth comparing: punctuation removed, stop words and words of two
/// characters or fewer dropped.
pub fn significant_words(text: &str) -> HashSet<String> {
    let lowered = text.to_lowercase();
    let cleaned = PUNCTUATION.replace_all(&lowered, "");
    cleaned
        .split_whitespace()
        .filter(|w| w.chars().count() > 2 && !STOP_WORDS.contains(w))
        .map(str::to_string)
        .collect()
}

/// Compare `processed` against `original`.
///
/// Rejected when the spoken output is more than twice as long as a spoken
/// input longer than 20 characters, or when fewer than 60% of the
/// original's significant words reappear.  With profanity replacement on,
/// a missing word counts as kept while the replacement word is present.
pub fn check_word_preservation(
    original: &str,
    processed: &str,
    profanity: Option<&ProfanityRule>,
) -> PreservationCheck {
    let original_spoken = extract_spoken_words(original);
    let processed_spoken = extract_spoken_words(processed);
    let original_len = original_spoken.chars().count();
    let processed_len = processed_spoken.chars().count();

    if original_len > 20 && processed_len > original_len * 2 {
        let factor = processed_len as f64 / original_len as f64;
        return PreservationCheck {
            preserved: false,
            ratio: original_len as f64 / processed_len as f64,
            warning: Some(format!(
                "output is {}x longer than input, likely generated content",
                factor.round()
            )),
        };
    }

    let original_words = significant_words(&original_spoken);
    if original_words.is_empty() {
        return PreservationCheck::kept(1.0);
    }
    let processed_words = significant_words(&processed_spoken);

    let replacement_present = profanity
        .filter(|p| p.replaces())
        .map(|p| p.replacement_word.trim().to_lowercase())
        .is_some_and(|word| !word.is_empty() && processed_words.contains(&word));

    let kept = original_words
        .iter()
        .filter(|w| processed_words.contains(*w) || replacement_present)
        .count();
    let ratio = kept as f64 / original_words.len() as f64;

    if ratio < MIN_PRESERVATION_RATIO {
        return PreservationCheck {
            preserved: false,
            ratio,
            warning: Some(format!(
                "voice direction may have rewritten the message (only {}% of words kept)",
                (ratio * 100.0).round()
            )),
        };
    }
    PreservationCheck::kept(ratio)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spoken_words_drop_directions() {
        assert_eq!(
            extract_spoken_words("[excited] Hello *gasp* ♪ World~"),
            "hello world"
        );
    }

    #[test]
    fn significant_words_skip_stop_words_and_short_words() {
        let words = significant_words("I am at the big castle, right?");
        assert_eq!(words.len(), 3);
        assert!(words.contains("big"));
        assert!(words.contains("castle"));
        assert!(words.contains("right"));
    }

    #[test]
    fn tags_alone_preserve() {
        let check = check_word_preservation(
            "we actually won the game",
            "[joyful] We actually won the game!",
            None,
        );
        assert!(check.preserved);
        assert_eq!(check.ratio, 1.0);
    }

    #[test]
    fn rewrite_is_rejected() {
        let check = check_word_preservation("hello world", "[calm] greetings planet", None);
        assert!(!check.preserved);
        assert_eq!(check.ratio, 0.0);
        assert!(check.warning.is_some());
    }

    #[test]
    fn runaway_length_is_rejected() {
        let original = "tell me a story about dragons please";
        let processed = format!("{original} {}", "once upon a time there was a dragon ".repeat(3));
        let check = check_word_preservation(original, &processed, None);
        assert!(!check.preserved);
        assert!(check.warning.unwrap().contains("longer"));
    }

    #[test]
    fn replacement_word_counts_as_kept() {
        let profanity = ProfanityRule::default();
        let check = check_word_preservation(
            "what the fuck",
            "[shocked] what the quack",
            Some(&profanity),
        );
        assert!(check.preserved);

        let without = check_word_preservation("what the fuck", "[shocked] what the quack", None);
        assert!(!without.preserved);
    }

    #[test]
    fn short_greeting_always_preserved() {
        assert!(check_word_preservation("hi", "[cheerful] hey there", None).preserved);
    }
}
