//! Token-overlap duplicate detection against recently published titles.

use std::collections::HashSet;
use unicode_normalization::char::is_combining_mark;

/// Share of the candidate's tokens that must appear in one history title.
/// The comparison is strict: exactly half is not a duplicate.
pub const DUPLICATE_THRESHOLD: f64 = 0.5;

/// Drops everything but word characters and whitespace, then lowercases.
///
/// Combining marks (Arabic harakat, accents) are not word characters, so a
/// vowelled title matches its plain spelling.
pub fn normalize(text: &str) -> String {
    text.chars()
        .filter(|&c| !is_combining_mark(c))
        .filter(|c| c.is_alphanumeric() || *c == '_' || c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

pub fn token_set(text: &str) -> HashSet<String> {
    normalize(text)
        .split_whitespace()
        .map(str::to_owned)
        .collect()
}

/// `|candidate ∩ other| / |candidate|`, or `None` when the candidate has no tokens.
pub fn overlap_ratio(candidate: &HashSet<String>, other: &HashSet<String>) -> Option<f64> {
    if candidate.is_empty() {
        return None;
    }
    let shared = candidate.intersection(other).count();
    Some(shared as f64 / candidate.len() as f64)
}

/// True when some history title shares more than half of the candidate's tokens.
///
/// A candidate without any word tokens is never a duplicate. Neither input is
/// modified; the scan stops at the first matching title.
pub fn is_duplicate<S: AsRef<str>>(candidate: &str, history: &[S]) -> bool {
    let candidate_tokens = token_set(candidate);
    if candidate_tokens.is_empty() {
        return false;
    }

    history.iter().any(|old| {
        overlap_ratio(&candidate_tokens, &token_set(old.as_ref()))
            .is_some_and(|ratio| ratio > DUPLICATE_THRESHOLD)
    })
}
