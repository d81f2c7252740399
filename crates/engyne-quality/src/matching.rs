// SPDX-FileCopyrightText: 2026 Engyne Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Keyword and country matching.

/// Minimum keyword length eligible for fuzzy matching.
const FUZZY_MIN_LEN: usize = 4;

/// Lowercase, replace anything outside `[a-z0-9 ]` with a space, collapse runs.
pub fn normalize_text(value: &str) -> String {
    let mapped: String = value
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_lowercase() || c.is_ascii_digit() {
                c
            } else {
                ' '
            }
        })
        .collect();
    mapped.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn similarity(a: &str, b: &str) -> f64 {
    strsim::normalized_levenshtein(a, b)
}

/// Whether any keyword matches `text`.
///
/// A literal containment on normalized text always wins. With `fuzzy`
/// set, keywords of at least four characters also match when a token (for
/// one-word keywords) or a same-width token window (for phrases) reaches
/// `threshold` similarity.
pub fn keywords_match(text: &str, keywords: &[String], fuzzy: bool, threshold: f64) -> bool {
    let normalized = normalize_text(text);
    if normalized.is_empty() {
        return false;
    }
    let tokens: Vec<&str> = normalized.split(' ').collect();

    keywords.iter().any(|raw| {
        let keyword = normalize_text(raw);
        if keyword.is_empty() {
            return false;
        }
        if normalized.contains(&keyword) {
            return true;
        }
        if !fuzzy || keyword.len() < FUZZY_MIN_LEN {
            return false;
        }

        let width = keyword.split(' ').count();
        if width == 1 {
            return tokens
                .iter()
                .filter(|t| t.len() >= FUZZY_MIN_LEN)
                .any(|t| similarity(t, &keyword) >= threshold);
        }
        if width > tokens.len() {
            return similarity(&normalized, &keyword) >= threshold;
        }
        tokens
            .windows(width)
            .any(|w| similarity(&w.join(" "), &keyword) >= threshold)
    })
}

/// Canonical country value. Common abbreviations collapse to one name.
pub fn canonical_country(value: &str) -> String {
    let normalized = normalize_text(value);
    match normalized.as_str() {
        "us" | "usa" | "united states of america" | "united states" => "united states".to_string(),
        "uk" | "united kingdom" => "united kingdom".to_string(),
        "aus" | "australia" => "australia".to_string(),
        _ => normalized,
    }
}

/// Exact canonical match of a parsed country field against a term list.
///
/// Only whole values are compared: "India" never matches "Indiana", and
/// country names appearing in free text are never consulted.
pub fn country_in(country: &str, terms: &[String]) -> bool {
    let country = canonical_country(country);
    !country.is_empty() && terms.iter().any(|t| canonical_country(t) == country)
}
