//! Replacement engine: ordered pattern substitutions, global rules first,
//! then the voice's own rules.
//!
//! A rule that fails to compile is logged and skipped; it never stops the
//! rules after it.  Regex replacements accept the settings-file group syntax
//! (`$1`, `$&`, `$<name>`, `$$`) as well as `${name}`.

use once_cell::sync::Lazy;
use regex::{NoExpand, Regex, RegexBuilder};
use thiserror::Error;

use crate::config::{ReplacementRule, VoiceProfile};

// ---------------------------------------------------------------------------
// Errors and results
// ---------------------------------------------------------------------------

/// A single malformed replacement rule.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RuleError {
    #[error("invalid pattern {pattern:?}: {reason}")]
    InvalidPattern { pattern: String, reason: String },
}

/// Which rule list a set of substitutions came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleScope {
    Global,
    Voice(String),
}

/// A rule list that changed the text, with the number of enabled rules in it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedRuleSet {
    pub scope: RuleScope,
    pub rule_count: usize,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ReplacementOutcome {
    pub text: String,
    pub applied: Vec<AppliedRuleSet>,
}

/// Result of previewing one rule against sample text.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RuleTrial {
    pub result: String,
    pub matched: bool,
    pub error: Option<String>,
}

// ---------------------------------------------------------------------------
// Compilation
// ---------------------------------------------------------------------------

static INLINE_FLAGS: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\(\?([imsuxy]+)\)").unwrap());

/// A rule ready to run.
enum Compiled<'a> {
    /// Case-sensitive literal: plain substring replacement.
    Exact(&'a str),
    Pattern(Regex),
}

fn compile(rule: &ReplacementRule) -> Result<Compiled<'_>, RuleError> {
    if !rule.is_regex {
        if rule.case_sensitive {
            return Ok(Compiled::Exact(&rule.pattern));
        }
        let regex = RegexBuilder::new(&regex::escape(&rule.pattern))
            .case_insensitive(true)
            .build()
            .map_err(|e| invalid(&rule.pattern, e))?;
        return Ok(Compiled::Pattern(regex));
    }

    let (flags, body) = match INLINE_FLAGS.captures(&rule.pattern) {
        Some(caps) => {
            let whole = caps.get(0).map_or(0, |m| m.end());
            (caps[1].to_string(), &rule.pattern[whole..])
        }
        None => (String::new(), rule.pattern.as_str()),
    };

    let regex = RegexBuilder::new(body)
        .case_insensitive(flags.contains('i') || !rule.case_sensitive)
        .multi_line(flags.contains('m'))
        .dot_matches_new_line(flags.contains('s'))
        .build()
        .map_err(|e| invalid(&rule.pattern, e))?;
    Ok(Compiled::Pattern(regex))
}

fn invalid(pattern: &str, err: regex::Error) -> RuleError {
    RuleError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: err.to_string(),
    }
}

fn run(compiled: &Compiled<'_>, rule: &ReplacementRule, text: &str) -> String {
    match compiled {
        Compiled::Exact(pattern) => text.replace(pattern, &rule.replacement),
        Compiled::Pattern(regex) if rule.is_regex => regex
            .replace_all(text, expansion_template(&rule.replacement).as_str())
            .into_owned(),
        Compiled::Pattern(regex) => regex
            .replace_all(text, NoExpand(&rule.replacement))
            .into_owned(),
    }
}

/// Rewrite a replacement string into `regex` expansion syntax.
///
/// `$N` takes at most two digits and always ends there, so `$1s` is group 1
/// followed by `s`.  A `$` that starts no reference stays literal.
fn expansion_template(replacement: &str) -> String {
    let mut out = String::with_capacity(replacement.len() + 8);
    let mut chars = replacement.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '$' {
            out.push(c);
            continue;
        }
        match chars.peek().copied() {
            Some('$') => {
                chars.next();
                out.push_str("$$");
            }
            Some('&') => {
                chars.next();
                out.push_str("${0}");
            }
            Some(d) if d.is_ascii_digit() => {
                let mut group = String::new();
                while group.len() < 2 {
                    match chars.peek() {
                        Some(d) if d.is_ascii_digit() => {
                            group.push(*d);
                            chars.next();
                        }
                        _ => break,
                    }
                }
                out.push_str(&format!("${{{group}}}"));
            }
            Some(open @ ('<' | '{')) => {
                let close = if open == '<' { '>' } else { '}' };
                let rest: String = chars.clone().skip(1).collect();
                match rest.find(close) {
                    Some(end) if end > 0 => {
                        out.push_str(&format!("${{{}}}", &rest[..end]));
                        let taken = rest[..end].chars().count() + 2;
                        for _ in 0..taken {
                            chars.next();
                        }
                    }
                    _ => out.push_str("$$"),
                }
            }
            _ => out.push_str("$$"),
        }
    }
    out
}

fn is_active(rule: &ReplacementRule) -> bool {
    rule.enabled && !rule.pattern.is_empty()
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Check that a regex pattern (with optional inline flag prefix) compiles.
pub fn validate_pattern(pattern: &str) -> Result<(), RuleError> {
    compile(&ReplacementRule::regex(pattern, "")).map(|_| ())
}

/// Apply every active rule in order.  Broken rules are skipped.
pub fn apply_rules(text: &str, rules: &[ReplacementRule]) -> String {
    let mut current = text.to_string();
    for rule in rules.iter().filter(|r| is_active(r)) {
        match compile(rule) {
            Ok(compiled) => current = run(&compiled, rule, &current),
            Err(e) => log::warn!("replace: skipping rule: {e}"),
        }
    }
    current
}

/// Apply global rules (unless the voice opts out), then the voice's rules.
///
/// ```
/// use stream_tts::config::ReplacementRule;
/// use stream_tts::text::apply_rule_sets;
///
/// let global = vec![ReplacementRule::literal("gg", "good game")];
/// let out = apply_rule_sets("GG everyone", &global, None);
/// assert_eq!(out.text, "good game everyone");
/// assert_eq!(out.applied.len(), 1);
/// ```
pub fn apply_rule_sets(
    text: &str,
    global: &[ReplacementRule],
    voice: Option<&VoiceProfile>,
) -> ReplacementOutcome {
    let mut current = text.to_string();
    let mut applied = Vec::new();

    let mut sets: Vec<(RuleScope, &[ReplacementRule])> = Vec::new();
    if !voice.is_some_and(|v| v.ignore_global_replacements) {
        sets.push((RuleScope::Global, global));
    }
    if let Some(voice) = voice {
        sets.push((RuleScope::Voice(voice.alias.clone()), voice.replacements.as_slice()));
    }

    for (scope, rules) in sets {
        let next = apply_rules(&current, rules);
        if next != current {
            applied.push(AppliedRuleSet {
                scope,
                rule_count: rules.iter().filter(|r| is_active(r)).count(),
            });
            current = next;
        }
    }

    ReplacementOutcome {
        text: current,
        applied,
    }
}

/// Preview a single rule against `text` without touching any rule list.
pub fn test_rule(text: &str, rule: &ReplacementRule) -> RuleTrial {
    if rule.pattern.is_empty() {
        return RuleTrial {
            result: text.to_string(),
            ..RuleTrial::default()
        };
    }
    match compile(rule) {
        Ok(compiled) => {
            let matched = match &compiled {
                Compiled::Exact(pattern) => text.contains(pattern),
                Compiled::Pattern(regex) => regex.is_match(text),
            };
            RuleTrial {
                result: run(&compiled, rule, text),
                matched,
                error: None,
            }
        }
        Err(e) => RuleTrial {
            result: text.to_string(),
            matched: false,
            error: Some(e.to_string()),
        },
    }
}
