//! Text normalization for references and path segments.

use once_cell::sync::Lazy;
use regex::Regex;

/// Terms that carry no matching signal.
pub const STOP_WORDS: [&str; 21] = [
    "a", "an", "and", "at", "by", "for", "from", "in", "into", "of", "on", "or", "the", "to",
    "with", "dated", "re", "pdf", "doc", "docx", "copy",
];

/// Minimum length of a term returned by `tokenize`.
pub const MIN_TERM_LEN: usize = 3;

static EXTENSION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\.[a-z][a-z0-9]{1,4}$").expect("extension regex"));

// Short alphabetic code followed by a hyphen and a word, e.g. "abc-letter".
static PREFIX_CODE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z]{2,4}-([a-z])").expect("prefix code regex"));

static DATE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(^|[^0-9])(?:19|20)\d{2}[-_.]\d{2}[-_.]\d{2}([^0-9]|$)").expect("date regex")
});

static VERSION_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bv\d+\b").expect("version regex"));

static DIGITS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").expect("digits regex"));

/// Clean raw text into its comparable form.
///
/// Lowercases, strips a trailing file extension, a leading short prefix code,
/// ISO-like dates and version markers, and collapses every separator to a
/// single space. `clean(clean(x)) == clean(x)`.
pub fn clean(text: &str) -> String {
    let lowered = text.trim().to_lowercase();
    let stripped = EXTENSION_RE.replace(&lowered, "");
    let stripped = PREFIX_CODE_RE.replace(&stripped, "$1");
    let stripped = DATE_RE.replace_all(&stripped, "$1 $2");

    let collapsed: String = stripped
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();

    VERSION_RE
        .replace_all(&collapsed, " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn is_stop_word(term: &str) -> bool {
    STOP_WORDS.contains(&term)
}

/// Split text into ordered, de-duplicated terms.
///
/// Drops stop words and terms shorter than `MIN_TERM_LEN` characters.
pub fn tokenize(text: &str) -> Vec<String> {
    let mut terms: Vec<String> = Vec::new();
    for term in clean(text).split_whitespace() {
        if term.chars().count() < MIN_TERM_LEN || is_stop_word(term) {
            continue;
        }
        if !terms.iter().any(|t| t == term) {
            terms.push(term.to_string());
        }
    }
    terms
}

/// Tokens used for word overlap. Unlike `tokenize`, short codes such as
/// `a5` or `02` are kept.
pub fn word_tokens(text: &str) -> Vec<String> {
    let mut tokens: Vec<String> = Vec::new();
    for token in clean(text).split_whitespace() {
        if is_stop_word(token) {
            continue;
        }
        if !tokens.iter().any(|t| t == token) {
            tokens.push(token.to_string());
        }
    }
    tokens
}

/// Final path segment, accepting both `/` and `\` separators.
pub fn basename(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

/// Directory part of a path, if it has one.
pub fn parent_folder(path: &str) -> Option<&str> {
    path.rfind(['/', '\\']).map(|idx| &path[..idx])
}

/// Directory components of a path, root first.
pub fn folder_segments(path: &str) -> Vec<&str> {
    match parent_folder(path) {
        Some(folder) => folder.split(['/', '\\']).filter(|s| !s.is_empty()).collect(),
        None => Vec::new(),
    }
}

/// Digit-generalized form of a string, e.g. "exhibit a# #".
pub fn generalize(text: &str) -> String {
    DIGITS_RE.replace_all(&clean(text), "#").into_owned()
}

/// Last digit run of a file name, ignoring the extension.
///
/// Returns the parsed value and the digits as written.
pub fn trailing_number(text: &str) -> Option<(u32, &str)> {
    let name = basename(text);
    let stem = match name.rfind('.') {
        Some(idx) if idx > 0 && name[idx + 1..].chars().any(|c| c.is_ascii_alphabetic()) => {
            &name[..idx]
        }
        _ => name,
    };

    DIGITS_RE
        .find_iter(stem)
        .last()
        .and_then(|m| m.as_str().parse().ok().map(|value| (value, m.as_str())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_clean_case_and_separators() {
        assert_eq!(clean("Exhibit_A5-01.PDF"), "exhibit a5 01");
        assert_eq!(clean("Exhibit_A5-01.PDF"), clean("exhibit a5 01"));
    }

    #[test]
    fn test_clean_is_idempotent() {
        let samples = [
            "Exhibit A5-03 – Claimant Letter",
            "ABC-Letter to Respondent_v2.docx",
            "bundle/2023-01-05 Witness Statement (Final).pdf",
            "archive.tar.gz",
            "  Report v3 dated 2021_11_30  ",
        ];
        for sample in samples {
            let once = clean(sample);
            assert_eq!(clean(&once), once, "not idempotent for {sample:?}");
        }
    }

    #[test]
    fn test_clean_strips_noise() {
        assert_eq!(clean("ABC-Letter to Respondent_v2.docx"), "letter to respondent");
        assert_eq!(clean("Minutes 2023-01-05 meeting"), "minutes meeting");
        assert_eq!(clean("CW-1"), "cw 1");
    }

    #[test]
    fn test_tokenize_filters() {
        assert_eq!(
            tokenize("The Letter from Claimant to the Tribunal / A5-01"),
            vec!["letter", "claimant", "tribunal"]
        );
    }

    #[test]
    fn test_word_tokens_keep_codes() {
        assert_eq!(word_tokens("Exhibit A5-02"), vec!["exhibit", "a5", "02"]);
    }

    #[test]
    fn test_path_parts() {
        assert_eq!(basename("folder/sub/A5-01.pdf"), "A5-01.pdf");
        assert_eq!(basename(r"C:\docs\file.pdf"), "file.pdf");
        assert_eq!(basename("plain.pdf"), "plain.pdf");
        assert_eq!(parent_folder("folder/sub/A5-01.pdf"), Some("folder/sub"));
        assert_eq!(parent_folder("plain.pdf"), None);
        assert_eq!(folder_segments("/root/a/b/file.pdf"), vec!["root", "a", "b"]);
    }

    #[test]
    fn test_generalize() {
        assert_eq!(generalize("Exhibit A5-01"), "exhibit a# #");
        assert_eq!(generalize("folder/A5-01-letter.pdf"), "folder a# # letter");
    }

    #[test]
    fn test_trailing_number() {
        assert_eq!(trailing_number("folder/A5-02-letter.pdf"), Some((2, "02")));
        assert_eq!(trailing_number("C0003.pdf"), Some((3, "0003")));
        assert_eq!(trailing_number("Exhibit A5-12"), Some((12, "12")));
        assert_eq!(trailing_number("letter.pdf"), None);
    }
}
