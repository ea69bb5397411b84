//! Candidate-name heuristics.
//!
//! Resumes arrive as files named things like `John_Smith_Resume.pdf` or
//! `resume-jane-doe.pdf`. When the analysis result carries no structured
//! candidate name, the display name is derived from the filename here.
//! Everything in this module is pure and deterministic.

use once_cell::sync::Lazy;
use regex::Regex;

/// "First Last" at the start of the stem, followed by more separators or
/// nothing: `John_Smith_Resume`, `jane doe`.
static NAME_AT_START: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([A-Za-z]+)[ _.\-]+([A-Za-z]+)(?:[ _.\-]|$)").unwrap());

/// "First Last" at the end of the stem: `Resume_John_Smith`.
static NAME_AT_END: Lazy<Regex> = Lazy::new(|| Regex::new(r"([A-Za-z]+)[ _.\-]+([A-Za-z]+)$").unwrap());

static SEPARATORS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ _.\-]+").unwrap());

/// Filename vocabulary that is never part of a person's name.
const STOP_WORDS: &[&str] = &[
    "resume", "cv", "curriculum", "vitae", "cover", "letter", "final", "draft", "copy", "updated",
    "latest", "new", "old", "version", "doc", "document", "file", "scan", "scanned", "print",
];

/// Tries to extract a candidate name from a resume filename.
///
/// Patterns are tried in priority order against the extension-stripped stem:
/// a leading "First Last" pair, then a trailing one. Matching is
/// case-insensitive; a match is normalized to Title Case. If neither pattern
/// yields a valid pair, the cleaned filename is accepted only when it still
/// looks like a bare two-or-three-word name.
pub fn extract_name_from_filename(file_name: &str) -> Option<String> {
    let stem = stem(file_name);

    for pattern in [&NAME_AT_START, &NAME_AT_END] {
        if let Some(caps) = pattern.captures(stem) {
            let (first, last) = (&caps[1], &caps[2]);
            if is_name_word(first) && is_name_word(last) {
                return Some(format!("{} {}", title_case(first), title_case(last)));
            }
        }
    }

    let cleaned = clean_filename(file_name);
    let words: Vec<&str> = cleaned.split_whitespace().collect();
    if (2..=3).contains(&words.len()) && words.iter().all(|w| is_name_word(w)) {
        let titled: Vec<String> = words.iter().map(|w| title_case(w)).collect();
        return Some(titled.join(" "));
    }

    None
}

/// Resolves the display name for a record, in priority order: the explicit
/// name from the analysis result, the filename heuristic, the cleaned
/// filename, and finally a literal placeholder.
pub fn resolve_candidate_name(explicit: Option<&str>, file_name: &str) -> String {
    if let Some(name) = explicit {
        let name = name.trim();
        if !name.is_empty() {
            return name.to_string();
        }
    }
    if let Some(name) = extract_name_from_filename(file_name) {
        return name;
    }
    let cleaned = clean_filename(file_name);
    if cleaned.is_empty() {
        "Unknown Candidate".to_string()
    } else {
        cleaned
    }
}

/// Extension stripped, separators replaced by single spaces, trimmed.
pub fn clean_filename(file_name: &str) -> String {
    SEPARATORS.replace_all(stem(file_name), " ").trim().to_string()
}

/// Strips a trailing `.ext` when the extension is plain alphanumeric.
fn stem(file_name: &str) -> &str {
    match file_name.rsplit_once('.') {
        Some((stem, ext))
            if !stem.is_empty() && !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()) =>
        {
            stem
        }
        _ => file_name,
    }
}

fn is_name_word(word: &str) -> bool {
    let len = word.chars().count();
    (2..=20).contains(&len)
        && word.chars().all(|c| c.is_ascii_alphabetic())
        && !STOP_WORDS.contains(&word.to_ascii_lowercase().as_str())
}

fn title_case(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(|c| c.to_lowercase()))
            .collect(),
        None => String::new(),
    }
}
