//! Text cleanup for speech output and case folding for command matching.
//!
//! Replies from the remote model arrive as chat-style markdown with emoji and
//! links. None of that should be read aloud, so every queued utterance is run
//! through [`clean_for_speech`] right before it reaches the engine.

use std::sync::LazyLock;

use regex::Regex;

static CODE_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"```[\s\S]*?```").expect("valid regex"));
static MARKDOWN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[*#`]+").expect("valid regex"));
static LINK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"https?://\S+").expect("valid regex"));
static LETTER_EMOTICON: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(?::[pd]|\bxd)\b").expect("valid regex"));
static SYMBOL_EMOTICON: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r":\)|:\(|;\)|<3").expect("valid regex"));
static EMOJI: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[\x{1F000}-\x{1FAFF}\x{2600}-\x{27BF}\x{FE00}-\x{FE0F}\x{200D}]+")
        .expect("valid regex")
});
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Strip markdown, links, emoticons and emoji, then collapse whitespace.
///
/// An empty result means there is nothing worth speaking.
pub fn clean_for_speech(text: &str) -> String {
    let cleaned = CODE_BLOCK.replace_all(text, "");
    let cleaned = MARKDOWN.replace_all(&cleaned, "");
    let cleaned = LINK.replace_all(&cleaned, "");
    let cleaned = LETTER_EMOTICON.replace_all(&cleaned, "");
    let cleaned = SYMBOL_EMOTICON.replace_all(&cleaned, "");
    let cleaned = EMOJI.replace_all(&cleaned, "");
    WHITESPACE.replace_all(&cleaned, " ").trim().to_string()
}

/// Lowercase with Turkish dotted/dotless i rules.
pub fn fold_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            'I' => out.push('ı'),
            'İ' => out.push('i'),
            _ => out.extend(ch.to_lowercase()),
        }
    }
    out
}

/// Uppercase with Turkish dotted/dotless i rules.
pub fn upper_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            'i' => out.push('İ'),
            'ı' => out.push('I'),
            _ => out.extend(ch.to_uppercase()),
        }
    }
    out
}

/// Upper-case the first character, Turkish-aware.
pub fn capitalize_first(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some('i') => format!("İ{}", chars.as_str()),
        Some('ı') => format!("I{}", chars.as_str()),
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// One recognized utterance: the text as heard plus the form rules match against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Utterance {
    pub raw: String,
    pub normalized: String,
}

impl Utterance {
    pub fn new(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let normalized = fold_case(&raw)
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");
        Self { raw, normalized }
    }

    pub fn is_empty(&self) -> bool {
        self.normalized.is_empty()
    }
}
