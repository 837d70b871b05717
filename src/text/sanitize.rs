//! Sanitizer: strips noise from raw viewer text before anything else sees it.
//!
//! Steps run in a fixed order, each recorded in [`Sanitized::applied`] only
//! when it actually changed the text:
//!
//! | step       | toggle            | effect                                   |
//! |------------|-------------------|------------------------------------------|
//! | `html`     | `strip_html`      | drop tags, decode a few entities         |
//! | `code`     | `strip_code`      | drop fenced and inline code spans        |
//! | `zalgo`    | `strip_zalgo`     | drop combining marks                     |
//! | `emojis`   | `replace_emojis`  | see [`super::emoji`]                     |
//! | `spam`     | always on         | see [`super::spam`]                      |
//! | `brackets` | `strip_brackets`  | drop tags outside the directive allow-list |
//!
//! Whitespace is normalised at the end of every run, and running the
//! sanitizer on its own output changes nothing.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::{SanitizationConfig, VoiceProfile};

use super::{emoji, normalize_whitespace, spam, tags};

static HTML_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").unwrap());
static HTML_ENTITY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)&(nbsp|amp|lt|gt|quot|#39|apos);").unwrap());
static FENCED_CODE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)```.*?```").unwrap());
static INLINE_CODE: Lazy<Regex> = Lazy::new(|| Regex::new(r"`[^`]+`").unwrap());
static COMBINING_MARK: Lazy<Regex> = Lazy::new(|| Regex::new(r"\p{Mn}+").unwrap());

/// Sanitized text plus the names of the steps that changed it.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Sanitized {
    pub text: String,
    pub applied: Vec<&'static str>,
}

/// Resolve the sanitizer toggles for a request.
///
/// `ignore_sanitization` turns every optional step off; otherwise the
/// global toggles apply and each `allow_*` voice flag switches off its own
/// step.
pub fn effective_sanitization(
    global: &SanitizationConfig,
    voice: Option<&VoiceProfile>,
) -> SanitizationConfig {
    let Some(voice) = voice else {
        return *global;
    };
    if voice.ignore_sanitization {
        return SanitizationConfig::disabled();
    }

    SanitizationConfig {
        strip_brackets: global.strip_brackets && !voice.allow_user_bracket_tags,
        strip_zalgo: global.strip_zalgo && !voice.allow_zalgo_text,
        replace_emojis: global.replace_emojis && !voice.allow_emojis,
        ..*global
    }
}

fn decode_entities(text: &str) -> String {
    HTML_ENTITY
        .replace_all(text, |caps: &regex::Captures| {
            match caps[1].to_ascii_lowercase().as_str() {
                "nbsp" => " ",
                "amp" => "&",
                "lt" => "<",
                "gt" => ">",
                "quot" => "\"",
                _ => "'",
            }
            .to_string()
        })
        .into_owned()
}

fn strip_html(text: &str) -> String {
    decode_entities(&HTML_TAG.replace_all(text, ""))
}

fn strip_code(text: &str) -> String {
    let without_fences = FENCED_CODE.replace_all(text, " ");
    INLINE_CODE.replace_all(&without_fences, " ").into_owned()
}

fn strip_zalgo(text: &str) -> String {
    COMBINING_MARK.replace_all(text, "").into_owned()
}

/// Run the sanitizer over `text` with the given toggles.
///
/// ```
/// use stream_tts::config::SanitizationConfig;
/// use stream_tts::text::sanitize;
///
/// let out = sanitize("<b>hi</b> 🔥🔥 [mod]", &SanitizationConfig::default());
/// assert_eq!(out.text, "hi double fire");
/// assert_eq!(out.applied, vec!["html", "emojis", "brackets"]);
/// ```
pub fn sanitize(text: &str, config: &SanitizationConfig) -> Sanitized {
    let steps: [(&'static str, bool, fn(&str) -> String); 6] = [
        ("html", config.strip_html, strip_html),
        ("code", config.strip_code, strip_code),
        ("zalgo", config.strip_zalgo, strip_zalgo),
        ("emojis", config.replace_emojis, emoji::speak_emoji),
        ("spam", true, spam::collapse_spam),
        ("brackets", config.strip_brackets, tags::strip_disallowed_tags),
    ];

    let mut current = text.to_string();
    let mut applied = Vec::new();

    for (name, enabled, step) in steps {
        if !enabled {
            continue;
        }
        let next = step(&current);
        if normalize_whitespace(&next) != normalize_whitespace(&current) {
            log::debug!("sanitize: step '{name}' changed the text");
            applied.push(name);
            current = next;
        }
    }

    // Removing a tag can join neighbours into a fresh spam run.
    if applied.contains(&"brackets") {
        let next = spam::collapse_spam(&current);
        if normalize_whitespace(&next) != normalize_whitespace(&current) {
            log::debug!("sanitize: spam collapse fired again after tag removal");
            if !applied.contains(&"spam") {
                applied.push("spam");
            }
            current = next;
        }
    }

    Sanitized {
        text: normalize_whitespace(&current),
        applied,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_on() -> SanitizationConfig {
        SanitizationConfig::default()
    }

    #[test]
    fn clean_text_is_idempotent() {
        let inputs = [
            "hello there chat, how is everyone doing?",
            "[laughs] that was great",
            "GO GO GO GO GO GO GO GO",
            "<i>styled</i> `code` h\u{0301}e\u{0302}llo 😂😂 [bad tag] 12345678901234567890",
            "GO GO GO [mod] GO GO GO",
            "call 12345[x]678901",
        ];
        for input in inputs {
            let once = sanitize(input, &all_on());
            let twice = sanitize(&once.text, &all_on());
            assert_eq!(twice.text, once.text, "input: {input}");
            assert!(twice.applied.is_empty(), "input: {input}");
        }
    }

    #[test]
    fn tag_removal_that_joins_a_spam_run_is_collapsed() {
        let out = sanitize("GO GO GO [mod] GO GO GO", &all_on());
        assert_eq!(out.text, "GO, times 6");
        assert_eq!(out.applied, vec!["brackets", "spam"]);

        let out = sanitize("call 12345[x]678901", &all_on());
        assert_eq!(out.text, "call 123... a long number");
        assert_eq!(out.applied, vec!["brackets", "spam"]);
    }

    #[test]
    fn repeated_word_spam_is_collapsed() {
        let out = sanitize("GO GO GO GO GO GO GO GO", &all_on());
        assert_eq!(out.text, "GO, so many of them");
        assert_eq!(out.applied, vec!["spam"]);
    }

    #[test]
    fn long_digit_run_is_previewed() {
        let input = "1234567890".repeat(3) + "12345";
        let out = sanitize(&input, &all_on());
        assert_eq!(out.text, "123... an absurdly long number");
    }

    #[test]
    fn html_tags_and_entities() {
        let out = sanitize("<script>x</script> Tom &AMP; Jerry &lt;3", &all_on());
        assert_eq!(out.text, "x Tom & Jerry <3");
        assert_eq!(out.applied, vec!["html"]);
    }

    #[test]
    fn code_spans_are_removed() {
        let out = sanitize("look ```rm -rf\n/``` at `this` now", &all_on());
        assert_eq!(out.text, "look at now");
        assert_eq!(out.applied, vec!["code"]);
    }

    #[test]
    fn zalgo_marks_are_removed() {
        let out = sanitize("z\u{0334}\u{0351}a\u{0358}lgo", &all_on());
        assert_eq!(out.text, "zalgo");
        assert_eq!(out.applied, vec!["zalgo"]);
    }

    #[test]
    fn spam_collapse_runs_even_when_everything_is_off() {
        let out = sanitize("ha ha ha ha ha ha", &SanitizationConfig::disabled());
        assert_eq!(out.text, "ha, times 6");
    }

    #[test]
    fn disabled_steps_leave_their_input() {
        let out = sanitize("[shouts] 🔥 <b>x</b>", &SanitizationConfig::disabled());
        assert_eq!(out.text, "[shouts] 🔥 <b>x</b>");
        assert!(out.applied.is_empty());
    }

    #[test]
    fn voice_flags_switch_off_their_steps() {
        let global = SanitizationConfig::default();
        let mut voice = VoiceProfile::default();
        voice.allow_emojis = true;
        voice.allow_user_bracket_tags = true;

        let eff = effective_sanitization(&global, Some(&voice));
        assert!(!eff.replace_emojis);
        assert!(!eff.strip_brackets);
        assert!(eff.strip_zalgo);
        assert!(eff.strip_html);

        voice.ignore_sanitization = true;
        assert_eq!(
            effective_sanitization(&global, Some(&voice)),
            SanitizationConfig::disabled()
        );
    }

    #[test]
    fn voice_cannot_enable_a_globally_disabled_step() {
        let global = SanitizationConfig {
            strip_zalgo: false,
            ..SanitizationConfig::default()
        };
        let eff = effective_sanitization(&global, Some(&VoiceProfile::default()));
        assert!(!eff.strip_zalgo);
    }
}
