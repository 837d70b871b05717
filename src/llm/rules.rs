//! Catalogue of moderation rules and topic presets.
//!
//! Each rule carries one classifier instruction per active strictness
//! tier.  Copyright rules also carry a risk tier used to order them.

use crate::config::{ModerationRules, Strictness};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleCategory {
    Safety,
    Copyright,
    Profanity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RiskTier {
    High,
    Medium,
}

impl RiskTier {
    pub fn label(self) -> &'static str {
        match self {
            RiskTier::High => "HIGH RISK",
            RiskTier::Medium => "MEDIUM RISK",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuleDefinition {
    pub name: &'static str,
    pub category: RuleCategory,
    pub risk: Option<RiskTier>,
    pub standard: &'static str,
    pub strict: &'static str,
}

impl RuleDefinition {
    /// Instruction for `level`, or `None` when the rule is off.
    pub fn instruction(&self, level: Strictness) -> Option<&'static str> {
        match level {
            Strictness::Off => None,
            Strictness::Standard => Some(self.standard),
            Strictness::Strict => Some(self.strict),
        }
    }
}

// ---------------------------------------------------------------------------
// Safety
// ---------------------------------------------------------------------------

pub const SEXUAL_CONTENT: RuleDefinition = RuleDefinition {
    name: "Sexual Content",
    category: RuleCategory::Safety,
    risk: None,
    standard: "graphic sexual descriptions, pornographic content, or sexual harassment aimed at \
               someone. Innuendo, dance references and mild flirting PASS at this level",
    strict: "any sexual content: explicit material, innuendo, suggestive themes, flirting, \
             sexual jokes and double entendres",
};

pub const HATE_SPEECH: RuleDefinition = RuleDefinition {
    name: "Hate Speech",
    category: RuleCategory::Safety,
    risk: None,
    standard: "slurs, calls for violence against identity groups, identity-based harassment and \
               dehumanising language. Competitive trash talk and gaming language (\"destroy that \
               team\", \"get wrecked\") is not hate speech",
    strict: "everything blocked at standard plus dog-whistles, coded bigotry, harmful \
             stereotypes, microaggressions and identity-based backhanded compliments",
};

pub const VIOLENCE: RuleDefinition = RuleDefinition {
    name: "Violence & Threats",
    category: RuleCategory::Safety,
    risk: None,
    standard: "credible threats against a specific real person, instructions for real-world \
               violence, encouragement of self-harm or suicide, terroristic threats. In-game \
               violence and meme phrases (\"kill it with fire\") PASS",
    strict: "any violent or threatening content: direct or implied threats, aggressive language, \
             violent imagery, weapons in a threatening context",
};

pub const DOXXING: RuleDefinition = RuleDefinition {
    name: "Personal Information",
    category: RuleCategory::Safety,
    risk: None,
    standard: "full addresses, phone numbers, government ids, card numbers or other private data \
               that identifies someone",
    strict: "any potentially identifying detail: partial addresses, workplaces, schools, \
             neighbourhoods, licence plates, relatives combined with locations",
};

pub const MISINFORMATION: RuleDefinition = RuleDefinition {
    name: "Misinformation",
    category: RuleCategory::Safety,
    risk: None,
    standard: "dangerous medical, legal or safety advice that could cause real harm",
    strict: "any harmful misinformation: dangerous advice, conspiracy theories, unverified claims \
             stated as fact, misleading statistics",
};

// ---------------------------------------------------------------------------
// Copyright
// ---------------------------------------------------------------------------

pub const SONG_LYRICS: RuleDefinition = RuleDefinition {
    name: "Song Lyrics",
    category: RuleCategory::Copyright,
    risk: Some(RiskTier::High),
    standard: "two or more consecutive lines of lyrics from a copyrighted song. Public-domain \
               songs (nursery rhymes, folk songs, carols, anthems), song titles, artist names, \
               parodies and single isolated lines are allowed. When unsure whether lyrics are \
               copyrighted, block",
    strict: "any recognisable line from a copyrighted song, including single iconic lines. \
             Public-domain songs, titles and artist names are still allowed",
};

pub const MEDIA_QUOTES: RuleDefinition = RuleDefinition {
    name: "Movie/TV/Book Quotes",
    category: RuleCategory::Copyright,
    risk: Some(RiskTier::Medium),
    standard: "substantial verbatim passages from movies, TV or books: full monologues or several \
               consecutive lines of dialogue. Short iconic one-liners are allowed",
    strict: "any recognisable quote from copyrighted media, including famous one-liners. \
             Character names, plot discussion and paraphrase are allowed",
};

// ---------------------------------------------------------------------------
// Profanity
// ---------------------------------------------------------------------------

pub const PROFANITY: RuleDefinition = RuleDefinition {
    name: "Profanity",
    category: RuleCategory::Profanity,
    risk: None,
    standard: "strong profanity: the f-word, s-word, c-word and their variants, hard slurs and \
               other severe swear words",
    strict: "any profanity, from strong swear words to mild ones (damn, hell, crap, ass) and \
             crude language",
};

/// Safety rules paired with their configured strictness, in prompt order.
pub fn safety_rules(rules: &ModerationRules) -> [(&'static RuleDefinition, Strictness); 5] {
    [
        (&SEXUAL_CONTENT, rules.sexual_content),
        (&HATE_SPEECH, rules.hate_speech),
        (&VIOLENCE, rules.violence),
        (&DOXXING, rules.doxxing),
        (&MISINFORMATION, rules.misinformation),
    ]
}

/// Copyright rules paired with their configured strictness.
pub fn copyright_rules(rules: &ModerationRules) -> [(&'static RuleDefinition, Strictness); 2] {
    [
        (&SONG_LYRICS, rules.song_lyrics),
        (&MEDIA_QUOTES, rules.media_quotes),
    ]
}

// ---------------------------------------------------------------------------
// Topic presets
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TopicPreset {
    pub key: &'static str,
    pub name: &'static str,
    pub description: &'static str,
}

pub const TOPIC_PRESETS: &[TopicPreset] = &[
    TopicPreset {
        key: "politics",
        name: "Politics",
        description: "divisive political discussion: partisan arguments, debates, campaigning, \
                      political trolling. Not casual mentions of countries or hyperbole",
    },
    TopicPreset {
        key: "religion",
        name: "Religion",
        description: "religious debates, proselytising, theological arguments, religious \
                      trolling. Not exclamations like \"oh my god\" or holiday references",
    },
    TopicPreset {
        key: "streamer_drama",
        name: "Streamer/Creator Drama",
        description: "controversies and gossip about other streamers or creators",
    },
    TopicPreset {
        key: "spoilers",
        name: "Spoilers & Backseating",
        description: "plot spoilers, puzzle solutions, unsolicited gameplay instructions",
    },
    TopicPreset {
        key: "trauma_dumping",
        name: "Trauma Dumping",
        description: "heavy personal trauma and therapy-level confessions shared publicly",
    },
    TopicPreset {
        key: "crypto_finance",
        name: "Crypto & Financial Schemes",
        description: "cryptocurrency, NFTs, trading tips, get-rich-quick schemes, financial \
                      promotion",
    },
    TopicPreset {
        key: "console_wars",
        name: "Console/Platform Wars",
        description: "platform tribalism and console superiority arguments",
    },
    TopicPreset {
        key: "body_image",
        name: "Body Image & Appearance",
        description: "comments on weight or appearance, body shaming, unsolicited appearance \
                      opinions",
    },
    TopicPreset {
        key: "relationship_status",
        name: "Relationship Status",
        description: "questions about dating, partners or marriage, parasocial inquiries",
    },
    TopicPreset {
        key: "age_location",
        name: "Age & Location",
        description: "real attempts to extract identifying personal information. Not casual \
                      \"where are you from?\" or timezone questions",
    },
    TopicPreset {
        key: "competitor_mentions",
        name: "Competitor Mentions",
        description: "promoting other streamers or advertising competing channels",
    },
    TopicPreset {
        key: "real_world_tragedies",
        name: "Real-World Tragedies",
        description: "current disasters, shootings, attacks and other ongoing tragedies",
    },
];

fn folded(key: &str) -> String {
    key.chars()
        .filter(|c| *c != '_' && *c != '-')
        .flat_map(char::to_lowercase)
        .collect()
}

/// Find a preset by key.  `streamer_drama`, `streamerDrama` and
/// `streamer-drama` all resolve to the same preset.
pub fn topic_preset(key: &str) -> Option<&'static TopicPreset> {
    let wanted = folded(key);
    TOPIC_PRESETS.iter().find(|p| folded(p.key) == wanted)
}
