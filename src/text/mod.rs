//! Pure text transforms applied to every request before generative
//! processing.
//!
//! ```text
//! raw text
//!    │
//!    ├─ sanitize::sanitize        html → code → zalgo → emoji → spam → brackets
//!    ├─ replace::apply_rule_sets  global rules, then voice rules
//!    └─ limit::enforce            character cap, then word cap
//! ```
//!
//! None of these functions touch shared state; the scheduler calls them
//! from the task that owns a single request.

pub mod emoji;
pub mod limit;
pub mod replace;
pub mod sanitize;
pub mod spam;
pub mod tags;

pub use limit::{effective_limits, enforce, LimitOutcome, TruncatedBy};
pub use replace::{
    apply_rule_sets, apply_rules, test_rule, validate_pattern, AppliedRuleSet, ReplacementOutcome,
    RuleError, RuleScope, RuleTrial,
};
pub use sanitize::{effective_sanitization, sanitize, Sanitized};
pub use tags::{post_process_directive_tags, DirectiveTags, SPAM_REWRITE_MARKER};

/// Collapse every whitespace run to a single space and trim both ends.
///
/// ```
/// use stream_tts::text::normalize_whitespace;
///
/// assert_eq!(normalize_whitespace("  a \n\t b  "), "a b");
/// ```
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
