//! File name sanitization.
//!
//! Titles, headlines and dates scraped from web pages are turned into a file
//! name fragment by running them through a fixed sequence of text passes.
//! Every pass is a pure `fn(&str) -> String`, exposed on its own and listed
//! in execution order in [`PIPELINE`]. The order is part of the contract:
//! whitespace is collapsed before words are reconstructed, and umlauts are
//! transliterated before the remaining diacritics are stripped.
//!
//! # Example
//!
//! ```rust
//! use picgrab_core::sanitize::sanitize;
//!
//! assert_eq!(sanitize("2017-03-29 - Probe"), "2017-03-29_-_Probe");
//! assert_eq!(sanitize("Übel & Gefährlich"), "Uebel_Gefaehrlich");
//! ```

use std::sync::LazyLock;

use regex::Regex;
use time::OffsetDateTime;
use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

/// Character substituted for whitespace and illegal characters.
pub const PLACEHOLDER: char = '_';

/// Maximum length of a sanitized name.
///
/// NTFS allows 255 characters per name; 11 are kept free for a `_<unix time>`
/// disambiguation suffix and 4 for a short file extension.
pub const MAX_LENGTH: usize = 255 - 11 - 4;

/// A single sanitization pass.
pub type Pass = fn(&str) -> String;

/// All passes in the order [`sanitize`] applies them.
pub const PIPELINE: [(&str, Pass); 8] = [
    ("whitespace", collapse_whitespace),
    ("profanity", recreate_profanity),
    ("contractions", recreate_contractions),
    ("umlauts", replace_umlauts),
    ("diacritics", remove_diacritics),
    ("illegal_characters", replace_illegal_characters),
    ("placeholders", collapse_placeholders),
    ("crop", crop),
];

static WHITESPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));

static PROFANITY: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [
        (
            r"(\s|^)(s|S)(?:[^a-zA-Z\s]|h)(?:[^a-zA-Z\s]|i)(?:[^a-zA-Z\s]|t)(\s|$)",
            "${1}${2}hit${3}",
        ),
        (r"(\s|^)(?:[^a-zA-Z\s]{4})(\s|$)", "${1}shit${2}"),
        (r"(S)(?:[^a-zA-Z]|H)(?:[^a-zA-Z]|I)(?:[^a-zA-Z]|T)", "SHIT"),
        (r"(f|F)[^a-zA-Z](c|[^a-zA-Z])k", "${1}uck"),
        (r"F[^a-zA-Z](c|[^a-zA-Z])K", "FUCK"),
        (r"(B|b)[^a-zA-Z]tch", "${1}itch"),
        (r"(B|b)[^a-zA-Z]TCH", "BITCH"),
    ]
    .into_iter()
    .map(|(pattern, replacement)| (Regex::new(pattern).expect("valid profanity regex"), replacement))
    .collect()
});

static CONTRACTIONS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [
        (r"(\s|^)((?:[Ss]?[Hh]e|[Tt]hey|[Ww]e|I))[`´'’‘]ll", "${1}${2} will"),
        (r"(\s|^)((?:[Ss]?[Hh]e))[`´'’‘]s", "${1}${2} is"),
        (r"(\s|^)(I)[`´'’‘]m", "${1}${2} am"),
        (r"(\s|^)((?:[Tt]hey|[Ww]e|I|[Ss]hould))[`´'’‘]ve", "${1}${2} have"),
        (r"(\s|^)([Tt]hey|[Ww]e|[Yy]ou)[`´'’‘]re", "${1}${2} are"),
        (
            r"(\s|^)([Ii]s|[Dd]oes|[Dd]id|[Dd]o|[Ww]ere|[Ww]ould|[Cc]ould|[Ss]hould)n[`´'’‘]t",
            "${1}${2} not",
        ),
        (r"(\s|^)([Ww])on[`´'’‘]t", "${1}${2}ill not"),
        (r"(\s|^)([Cc])an[`´'’‘]t", "${1}${2}annot"),
    ]
    .into_iter()
    .map(|(pattern, replacement)| (Regex::new(pattern).expect("valid contraction regex"), replacement))
    .collect()
});

static DROPPED_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"[´`'"’.‘]"#).expect("valid drop regex"));

static ILLEGAL_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^a-zA-Z0-9_-]").expect("valid illegal regex"));

static PLACEHOLDER_RUN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"_{2,}").expect("valid placeholder regex"));

static EDGE_PLACEHOLDER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^_+|_+$").expect("valid edge placeholder regex"));

/// Turns arbitrary text into a file name fragment.
///
/// The result only contains `[a-zA-Z0-9_-]`, is never longer than
/// [`MAX_LENGTH`] and is never empty: input that sanitizes to nothing is
/// replaced by the current Unix time.
pub fn sanitize(input: &str) -> String {
    let trimmed = input.trim();
    let output = if trimmed.is_empty() {
        String::new()
    } else {
        PIPELINE
            .iter()
            .fold(trimmed.to_string(), |text, (_, pass)| pass(&text))
    };

    if output.trim().is_empty() { unix_timestamp() } else { output }
}

/// Current Unix time in whole seconds.
pub fn unix_timestamp() -> String {
    OffsetDateTime::now_utc().unix_timestamp().to_string()
}

/// Replaces every whitespace run with a single [`PLACEHOLDER`].
pub fn collapse_whitespace(input: &str) -> String {
    if input.trim().is_empty() {
        return String::new();
    }

    WHITESPACE_RE.replace_all(input, "_").into_owned()
}

/// Restores a small set of deliberately obfuscated swear words.
///
/// Only the configured shapes are recognised (`f#ck`, `$h!t`, `b!tch` and
/// their all caps variants); nothing else is corrected.
pub fn recreate_profanity(input: &str) -> String {
    if input.trim().is_empty() {
        return String::new();
    }

    apply_all(&PROFANITY, input)
}

/// Expands common English contractions, keeping the case of the leading word.
pub fn recreate_contractions(input: &str) -> String {
    if input.trim().is_empty() {
        return String::new();
    }

    apply_all(&CONTRACTIONS, input)
}

/// Transliterates German and Scandinavian letters to ASCII digraphs.
///
/// An uppercase letter followed by another uppercase letter is written in
/// capitals (`ÖL` becomes `OEL`), otherwise in title case (`Öl` becomes `Oel`).
pub fn replace_umlauts(input: &str) -> String {
    if input.trim().is_empty() {
        return String::new();
    }

    let mut output = String::with_capacity(input.len() + 8);
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        match umlaut_digraph(c) {
            Some(digraph) if c.is_uppercase() && chars.peek().is_some_and(|next| next.is_uppercase()) => {
                output.push_str(&digraph.to_uppercase());
            }
            Some(digraph) => output.push_str(digraph),
            None => output.push(c),
        }
    }

    output
}

fn umlaut_digraph(c: char) -> Option<&'static str> {
    match c {
        'ä' | 'æ' => Some("ae"),
        'ö' | 'ø' => Some("oe"),
        'ü' => Some("ue"),
        'Ä' | 'Æ' => Some("Ae"),
        'Ö' | 'Ø' => Some("Oe"),
        'Ü' => Some("Ue"),
        _ => None,
    }
}

/// Strips accents by canonical decomposition, keeping the base letters.
pub fn remove_diacritics(input: &str) -> String {
    if input.trim().is_empty() {
        return String::new();
    }

    input.nfd().filter(|c| !is_combining_mark(*c)).collect()
}

/// Drops quotes and periods, then replaces every character outside
/// `[a-zA-Z0-9_-]` with a [`PLACEHOLDER`].
pub fn replace_illegal_characters(input: &str) -> String {
    if input.trim().is_empty() {
        return String::new();
    }

    let output = DROPPED_RE.replace_all(input, "");
    ILLEGAL_RE.replace_all(&output, "_").into_owned()
}

/// Collapses placeholder runs and strips placeholders from both ends.
pub fn collapse_placeholders(input: &str) -> String {
    if input.trim().is_empty() {
        return String::new();
    }

    let output = PLACEHOLDER_RUN_RE.replace_all(input, "_");
    EDGE_PLACEHOLDER_RE.replace_all(&output, "").into_owned()
}

/// Keeps at most [`MAX_LENGTH`] characters from the start of the input.
pub fn crop(input: &str) -> String {
    if input.trim().is_empty() {
        return String::new();
    }

    input.chars().take(MAX_LENGTH).collect()
}

fn apply_all(rules: &[(Regex, &str)], input: &str) -> String {
    rules.iter().fold(input.to_string(), |text, (pattern, replacement)| {
        pattern.replace_all(&text, *replacement).into_owned()
    })
}
