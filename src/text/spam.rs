//! Collapsing of repetitive spam: very long digit runs and a single word
//! repeated many times in a row.

use once_cell::sync::Lazy;
use regex::Regex;

/// Digit runs at least this long are collapsed.
pub const MIN_DIGIT_RUN: usize = 10;
/// A word repeated at least this many consecutive times is collapsed.
pub const MIN_WORD_REPEATS: usize = 6;

static DIGIT_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[0-9]{10,}").unwrap());

/// Run both collapsers.
pub fn collapse_spam(text: &str) -> String {
    collapse_repeated_words(&collapse_long_numbers(text))
}

/// Replace digit runs of [`MIN_DIGIT_RUN`] or more with a short preview and
/// a phrase describing the length.
///
/// ```
/// use stream_tts::text::spam::collapse_long_numbers;
///
/// assert_eq!(
///     collapse_long_numbers("call 12345678901"),
///     "call 123... a long number"
/// );
/// ```
pub fn collapse_long_numbers(text: &str) -> String {
    DIGIT_RUN
        .replace_all(text, |caps: &regex::Captures| {
            let digits = &caps[0];
            let phrase = match digits.len() {
                n if n >= 30 => "an absurdly long number",
                n if n >= 15 => "a very long number",
                _ => "a long number",
            };
            format!("{}... {phrase}", &digits[..3])
        })
        .into_owned()
}

/// A whitespace-separated token split around its word characters.
struct Token<'a> {
    raw: &'a str,
    prefix: &'a str,
    core: &'a str,
    suffix: &'a str,
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

impl<'a> Token<'a> {
    fn split(raw: &'a str) -> Self {
        let core_start = raw.find(is_word_char).unwrap_or(raw.len());
        let rest = &raw[core_start..];
        let core_len = rest.find(|c: char| !is_word_char(c)).unwrap_or(rest.len());
        Self {
            raw,
            prefix: &raw[..core_start],
            core: &rest[..core_len],
            suffix: &rest[core_len..],
        }
    }
}

/// Number of consecutive tokens starting at `start` that repeat the same
/// word.  Only the first token may carry leading punctuation and only the
/// last may carry trailing punctuation.
fn run_length(tokens: &[Token<'_>], start: usize) -> usize {
    let first = &tokens[start];
    if first.core.is_empty() || !first.suffix.is_empty() {
        return 1;
    }
    let key = first.core.to_lowercase();

    let mut end = start + 1;
    while let Some(token) = tokens.get(end) {
        if !token.prefix.is_empty() || token.core.to_lowercase() != key {
            break;
        }
        end += 1;
        if !token.suffix.is_empty() {
            break;
        }
    }
    end - start
}

fn repeat_phrase(count: usize) -> String {
    match count {
        n if n >= 10 => "a whole wall of them".into(),
        n if n >= 7 => "so many of them".into(),
        n => format!("times {n}"),
    }
}

/// Collapse a word repeated [`MIN_WORD_REPEATS`] or more times in a row
/// (case-insensitively) into the word plus a count phrase.
///
/// Text without such a run is returned unchanged, whitespace included.
///
/// ```
/// use stream_tts::text::spam::collapse_repeated_words;
///
/// assert_eq!(
///     collapse_repeated_words("lol lol LOL lol lol lol"),
///     "lol, times 6"
/// );
/// ```
pub fn collapse_repeated_words(text: &str) -> String {
    let tokens: Vec<Token<'_>> = text.split_whitespace().map(Token::split).collect();
    let mut out: Vec<String> = Vec::with_capacity(tokens.len());
    let mut collapsed = false;

    let mut i = 0;
    while i < tokens.len() {
        let run = run_length(&tokens, i);
        if run >= MIN_WORD_REPEATS {
            let first = &tokens[i];
            let last = &tokens[i + run - 1];
            out.push(format!(
                "{}{}, {}{}",
                first.prefix,
                first.core,
                repeat_phrase(run),
                last.suffix
            ));
            collapsed = true;
            i += run;
        } else {
            out.push(tokens[i].raw.to_string());
            i += 1;
        }
    }

    if collapsed {
        out.join(" ")
    } else {
        text.to_string()
    }
}
