//! Emoji to speech.
//!
//! Three passes, in order:
//!
//! 1. runs of the *same* mapped emoji collapse into one scaled phrase
//!    (`🔥🔥` → "double fire", `🔥🔥🔥🔥🔥🔥🔥` → "a whole wall of fire");
//! 2. remaining mapped emoji become their description;
//! 3. anything else in the emoji blocks is dropped.
//!
//! Variation selector 16 is optional on every mapped emoji, so `❤` and
//! `❤️` speak the same.

use once_cell::sync::Lazy;
use regex::Regex;

use super::normalize_whitespace;

/// Spoken descriptions for common chat emoji.
pub const EMOJI_DESCRIPTIONS: &[(&str, &str)] = &[
    ("😂", "crying laughing"),
    ("🤣", "rolling on the floor laughing"),
    ("😭", "sobbing"),
    ("😀", "grinning"),
    ("😃", "big smile"),
    ("😄", "smiling"),
    ("😁", "beaming"),
    ("😅", "nervous laugh"),
    ("😆", "laughing"),
    ("😉", "wink"),
    ("😊", "blushing smile"),
    ("😍", "heart eyes"),
    ("🥰", "smiling with hearts"),
    ("😘", "blowing a kiss"),
    ("😎", "cool"),
    ("🤩", "star struck"),
    ("🥳", "party face"),
    ("🤔", "thinking"),
    ("🤨", "raised eyebrow"),
    ("😐", "neutral face"),
    ("😑", "expressionless"),
    ("🙄", "eye roll"),
    ("😏", "smirk"),
    ("😬", "grimace"),
    ("😳", "flushed"),
    ("🥺", "pleading"),
    ("😢", "crying"),
    ("😤", "huffing"),
    ("😠", "angry"),
    ("😡", "furious"),
    ("🤬", "swearing"),
    ("😱", "screaming"),
    ("😨", "scared"),
    ("😴", "sleeping"),
    ("🥱", "yawning"),
    ("🤯", "mind blown"),
    ("🥶", "freezing"),
    ("🥵", "overheated"),
    ("🤡", "clown"),
    ("🤢", "nauseous"),
    ("🤮", "vomiting"),
    ("😇", "angel"),
    ("😈", "devil"),
    ("👻", "ghost"),
    ("👽", "alien"),
    ("🤖", "robot"),
    ("💀", "skull"),
    ("☠️", "skull and crossbones"),
    ("💩", "poop"),
    ("🙃", "upside down face"),
    ("🫡", "salute"),
    ("🤝", "handshake"),
    ("👍", "thumbs up"),
    ("👎", "thumbs down"),
    ("👏", "clapping"),
    ("🙌", "raised hands"),
    ("🙏", "praying hands"),
    ("👋", "waving"),
    ("✌️", "peace sign"),
    ("🤞", "fingers crossed"),
    ("👌", "okay"),
    ("💪", "flexing"),
    ("👀", "eyes"),
    ("👁️", "eye"),
    ("🫠", "melting"),
    ("❤️", "heart"),
    ("💔", "broken heart"),
    ("💕", "two hearts"),
    ("💖", "sparkling heart"),
    ("💯", "one hundred"),
    ("🔥", "fire"),
    ("✨", "sparkles"),
    ("⭐", "star"),
    ("🌟", "glowing star"),
    ("⚡", "lightning"),
    ("💥", "boom"),
    ("🎉", "party popper"),
    ("🎊", "confetti"),
    ("🎁", "gift"),
    ("🏆", "trophy"),
    ("🎮", "video game"),
    ("🎵", "music note"),
    ("🎶", "music notes"),
    ("💰", "money bag"),
    ("💸", "money with wings"),
    ("🚀", "rocket"),
    ("🍕", "pizza"),
    ("🍿", "popcorn"),
    ("☕", "coffee"),
    ("🍺", "beer"),
    ("🐐", "goat"),
    ("🐸", "frog"),
    ("🐍", "snake"),
    ("🦆", "duck"),
    ("🐶", "dog"),
    ("🐱", "cat"),
    ("🌈", "rainbow"),
    ("🧢", "cap"),
    ("🗿", "moai"),
    ("🤓", "nerd"),
    ("✅", "check mark"),
    ("❌", "cross mark"),
    ("⚠️", "warning"),
    ("🏳️", "white flag"),
];

const VARIATION_SELECTOR: char = '\u{FE0F}';

struct EmojiPattern {
    single: Regex,
    run: Regex,
    description: &'static str,
}

static PATTERNS: Lazy<Vec<EmojiPattern>> = Lazy::new(|| {
    EMOJI_DESCRIPTIONS
        .iter()
        .map(|(emoji, description)| {
            let base: String = emoji.chars().filter(|c| *c != VARIATION_SELECTOR).collect();
            let single = format!("{}\u{FE0F}?", regex::escape(&base));
            EmojiPattern {
                run: Regex::new(&format!(r"(?:{single}\s*){{2,}}")).unwrap(),
                single: Regex::new(&single).unwrap(),
                description,
            }
        })
        .collect()
});

static UNMAPPED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        "[",
        "\u{1F600}-\u{1F64F}",
        "\u{1F300}-\u{1F5FF}",
        "\u{1F680}-\u{1F6FF}",
        "\u{1F1E0}-\u{1F1FF}",
        "\u{2600}-\u{26FF}",
        "\u{2700}-\u{27BF}",
        "\u{FE00}-\u{FE0F}",
        "\u{1F900}-\u{1F9FF}",
        "\u{1FA00}-\u{1FAFF}",
        "\u{200D}",
        "\u{20E3}",
        "\u{E0020}-\u{E007F}",
        "]",
    ))
    .unwrap()
});

fn run_phrase(description: &str, count: usize) -> String {
    match count {
        n if n >= 7 => format!(" a whole wall of {description} "),
        n if n >= 4 => format!(" so many {description} "),
        3 => format!(" {description} times 3 "),
        _ => format!(" double {description} "),
    }
}

/// Replace emoji with speakable text.
///
/// ```
/// use stream_tts::text::emoji::speak_emoji;
///
/// assert_eq!(speak_emoji("gg 🔥🔥"), "gg double fire");
/// assert_eq!(speak_emoji("nice 👍"), "nice thumbs up");
/// ```
pub fn speak_emoji(text: &str) -> String {
    let mut out = text.to_string();

    for pattern in PATTERNS.iter() {
        if !pattern.single.is_match(&out) {
            continue;
        }
        out = pattern
            .run
            .replace_all(&out, |caps: &regex::Captures| {
                let count = pattern.single.find_iter(&caps[0]).count();
                run_phrase(pattern.description, count)
            })
            .into_owned();
    }

    for pattern in PATTERNS.iter() {
        let spoken = format!(" {} ", pattern.description);
        out = pattern
            .single
            .replace_all(&out, regex::NoExpand(&spoken))
            .into_owned();
    }

    let stripped = UNMAPPED.replace_all(&out, "");
    normalize_whitespace(&stripped)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_tiers_scale_with_count() {
        assert_eq!(speak_emoji("😂😂"), "double crying laughing");
        assert_eq!(speak_emoji("😂😂😂"), "crying laughing times 3");
        assert_eq!(speak_emoji("😂 😂 😂 😂 😂"), "so many crying laughing");
        assert_eq!(speak_emoji(&"💀".repeat(9)), "a whole wall of skull");
    }

    #[test]
    fn different_emoji_do_not_form_a_run() {
        assert_eq!(speak_emoji("🔥👍"), "fire thumbs up");
    }

    #[test]
    fn variation_selector_is_optional() {
        assert_eq!(speak_emoji("i ❤ it"), "i heart it");
        assert_eq!(speak_emoji("i ❤️ it"), "i heart it");
        assert_eq!(speak_emoji("❤️❤"), "double heart");
    }

    #[test]
    fn unmapped_emoji_are_dropped() {
        assert_eq!(speak_emoji("hello 🦑 there"), "hello there");
        assert_eq!(speak_emoji("🇺🇸 flag"), "flag");
    }

    #[test]
    fn plain_text_is_untouched() {
        assert_eq!(speak_emoji("no emoji here: 1, 2, 3!"), "no emoji here: 1, 2, 3!");
    }
}
