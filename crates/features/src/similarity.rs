//! Word- and character-level similarity between a reference and a path.

use rphonetic::{Encoder, Soundex};
use strsim::normalized_levenshtein;

use crate::normalize::{basename, clean, word_tokens};

/// Credit for a token that is a prefix/substring of a path token.
pub const PARTIAL_CREDIT: f64 = 0.7;

/// Credit for a token that only sounds like a path token.
pub const PHONETIC_CREDIT: f64 = 0.5;

/// Token overlap between a reference and the basename of a path.
///
/// Exact tokens earn full credit, near-duplicates partial credit; the sum is
/// normalized by the larger token count.
pub fn word_score(reference: &str, path: &str) -> f64 {
    let ref_tokens = word_tokens(reference);
    let path_tokens = word_tokens(basename(path));
    if ref_tokens.is_empty() || path_tokens.is_empty() {
        return 0.0;
    }

    let soundex = Soundex::default();
    let credit: f64 = ref_tokens
        .iter()
        .map(|token| token_credit(token, &path_tokens, &soundex))
        .sum();

    (credit / ref_tokens.len().max(path_tokens.len()) as f64).min(1.0)
}

fn token_credit(token: &str, candidates: &[String], soundex: &Soundex) -> f64 {
    if candidates.iter().any(|c| c == token) {
        return 1.0;
    }
    if candidates.iter().any(|c| is_partial_match(token, c)) {
        return PARTIAL_CREDIT;
    }
    if candidates.iter().any(|c| sounds_alike(token, c, soundex)) {
        return PHONETIC_CREDIT;
    }
    0.0
}

/// Near-duplicate tokens: equal numbers written with different padding, or
/// one word containing the other.
pub fn is_partial_match(a: &str, b: &str) -> bool {
    let numeric = |s: &str| !s.is_empty() && s.chars().all(|c| c.is_ascii_digit());
    if numeric(a) || numeric(b) {
        return match (a.parse::<u64>(), b.parse::<u64>()) {
            (Ok(x), Ok(y)) => x == y,
            _ => false,
        };
    }

    let (short, long) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    short.chars().count() >= 3 && long.contains(short)
}

fn sounds_alike(a: &str, b: &str, soundex: &Soundex) -> bool {
    let alphabetic = |s: &str| s.len() >= 3 && s.chars().all(|c| c.is_ascii_alphabetic());
    if !alphabetic(a) || !alphabetic(b) {
        return false;
    }
    let code = soundex.encode(a);
    !code.is_empty() && code == soundex.encode(b)
}

/// Normalized edit-distance similarity of the cleaned reference and the
/// cleaned basename.
pub fn char_score(reference: &str, path: &str) -> f64 {
    let reference = clean(reference);
    let name = clean(basename(path));
    if reference.is_empty() || name.is_empty() {
        return 0.0;
    }
    normalized_levenshtein(&reference, &name)
}
