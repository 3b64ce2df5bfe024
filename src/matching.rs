//! Name normalization and fuzzy matching of LLM candidates to real places.

use crate::types::{Place, Recommendation};

/// Word-overlap threshold for the last-resort match tier.
const WORD_OVERLAP_MIN: f64 = 0.6;

/// Canonical form used for every name comparison in the pipeline:
/// lowercase, apostrophes stripped, hyphens become spaces, trimmed.
pub fn normalize_name(name: &str) -> String {
    name.to_lowercase()
        .replace(['\'', '\u{2019}'], "")
        .replace('-', " ")
        .trim()
        .to_string()
}

/// Find the best real-place match for a recommendation.
///
/// Tiers, first hit wins:
/// 1. exact normalized equality
/// 2. substring containment in either direction
/// 3. word overlap ≥ 0.6 of the recommendation's word count
pub fn best_place_match<'a>(rec: &Recommendation, places: &'a [Place]) -> Option<&'a Place> {
    let rec_norm = normalize_name(&rec.name);
    if rec_norm.is_empty() {
        return None;
    }

    if let Some(exact) = places.iter().find(|p| normalize_name(&p.name) == rec_norm) {
        return Some(exact);
    }

    if let Some(sub) = places.iter().find(|p| {
        let place_norm = normalize_name(&p.name);
        !place_norm.is_empty()
            && (place_norm.contains(&rec_norm) || rec_norm.contains(&place_norm))
    }) {
        return Some(sub);
    }

    places
        .iter()
        .find(|p| word_overlap(&rec_norm, &normalize_name(&p.name)) >= WORD_OVERLAP_MIN)
}

/// Fraction of the recommendation's words also present in the place name.
fn word_overlap(rec_norm: &str, place_norm: &str) -> f64 {
    let rec_words: Vec<&str> = rec_norm.split_whitespace().collect();
    if rec_words.is_empty() {
        return 0.0;
    }
    let shared = rec_words
        .iter()
        .filter(|w| place_norm.split_whitespace().any(|pw| pw == **w))
        .count();
    shared as f64 / rec_words.len() as f64
}
