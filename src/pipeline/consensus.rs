//! Consensus scoring: fuse all provider outputs and validations into one
//! ranked list.
//!
//! Pure in-memory fold, no I/O. Deterministic given the same generation and
//! validation inputs.

use std::collections::HashMap;

use crate::matching::normalize_name;
use crate::types::{CrossValidationResult, ProviderResult, Recommendation};

/// Per-extra-provider agreement bonus and its cap.
const AGREEMENT_BONUS_STEP: f64 = 0.05;
const AGREEMENT_BONUS_CAP: f64 = 0.20;

/// Penalty weights for validator flags.
const INACCURATE_PENALTY: f64 = 0.20;
const OUT_OF_RANGE_PENALTY: f64 = 0.30;

/// Bonus for a verified real-place match and the rating bonus scale.
const REAL_PLACE_BONUS: f64 = 0.15;
const RATING_BONUS_SCALE: f64 = 0.05;

/// Weights for the two score components.
const BASE_WEIGHT: f64 = 0.4;
const VALIDATION_WEIGHT: f64 = 0.35;

/// Output of the consensus fold.
#[derive(Debug)]
pub struct ConsensusOutcome {
    /// Deduplicated, scored, ranked, trimmed list.
    pub ranked: Vec<Recommendation>,
    /// Candidate count across all providers before grouping.
    pub total_candidates: usize,
}

struct Group {
    key: String,
    members: Vec<Recommendation>,
}

/// Run the consensus fold over all successful generations and all validation
/// results, returning at most `max_results` recommendations.
pub fn consensus_rank(
    generation_results: &[ProviderResult],
    validation_results: &[CrossValidationResult],
    max_results: usize,
) -> ConsensusOutcome {
    // 1-2. Flatten successful generations, group by normalized name in
    // first-seen order.
    let mut groups: Vec<Group> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut total_candidates = 0usize;

    for result in generation_results.iter().filter(|r| r.success) {
        for rec in &result.recommendations {
            total_candidates += 1;
            let key = normalize_name(&rec.name);
            match index.get(&key) {
                Some(&i) => groups[i].members.push(rec.clone()),
                None => {
                    index.insert(key.clone(), groups.len());
                    groups.push(Group {
                        key,
                        members: vec![rec.clone()],
                    });
                }
            }
        }
    }

    // 3. Score each group.
    let mut ranked: Vec<Recommendation> = groups
        .iter()
        .map(|group| score_group(group, validation_results))
        .collect();

    // 4. Rank and trim.
    ranked.sort_by(|a, b| {
        b.confidence_score
            .partial_cmp(&a.confidence_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(b.agreement_count.cmp(&a.agreement_count))
    });
    ranked.truncate(max_results);

    ConsensusOutcome {
        ranked,
        total_candidates,
    }
}

fn score_group(group: &Group, validation_results: &[CrossValidationResult]) -> Recommendation {
    let members = &group.members;

    // Representative: highest base confidence, first occurrence on ties.
    let mut representative = &members[0];
    for member in &members[1..] {
        if member.confidence_score > representative.confidence_score {
            representative = member;
        }
    }

    let base_score =
        members.iter().map(|m| m.confidence_score).sum::<f64>() / members.len() as f64;

    let agreement_count = members.len();
    let agreement_bonus =
        ((agreement_count as f64 - 1.0) * AGREEMENT_BONUS_STEP).min(AGREEMENT_BONUS_CAP);

    // Validation entries addressed at this group, across every (v, s) pair.
    let entries: Vec<_> = validation_results
        .iter()
        .flat_map(|r| r.entries.iter())
        .filter(|e| normalize_name(&e.original_name) == group.key)
        .collect();

    let validation_score = if entries.is_empty() {
        base_score
    } else {
        entries.iter().map(|e| e.validation_score).sum::<f64>() / entries.len() as f64
    };

    let inaccurate = entries.iter().filter(|e| e.flagged_inaccurate).count();
    let out_of_range = entries.iter().filter(|e| e.flagged_out_of_range).count();
    let flag_penalty =
        INACCURATE_PENALTY * inaccurate as f64 + OUT_OF_RANGE_PENALTY * out_of_range as f64;

    let real_place_bonus = representative
        .enriched_place
        .as_ref()
        .filter(|p| p.is_verified_real_place)
        .map(|_| REAL_PLACE_BONUS)
        .unwrap_or(0.0);
    let rating_bonus = representative
        .enriched_place
        .as_ref()
        .and_then(|p| p.rating)
        .map(|rating| RATING_BONUS_SCALE * (rating / 5.0))
        .unwrap_or(0.0);

    let final_score = (base_score * BASE_WEIGHT
        + validation_score * VALIDATION_WEIGHT
        + agreement_bonus
        + real_place_bonus
        + rating_bonus
        - flag_penalty)
        .clamp(0.0, 1.0);
    let final_score = (final_score * 1000.0).round() / 1000.0;

    let mut merged = representative.clone();
    merged.set_score(final_score);
    merged.agreement_count = agreement_count;
    merged.highlights = merge_highlights(members);
    merged.why_recommended = members
        .iter()
        .find_map(|m| m.why_recommended.clone().filter(|w| !w.trim().is_empty()));
    merged
}

/// Union highlights across the group: case-insensitive dedup, first-seen
/// order, capped at five.
fn merge_highlights(members: &[Recommendation]) -> Vec<String> {
    let mut seen: Vec<String> = Vec::new();
    let mut out: Vec<String> = Vec::new();
    for member in members {
        for highlight in &member.highlights {
            let folded = highlight.to_lowercase();
            if !seen.contains(&folded) {
                seen.push(folded);
                out.push(highlight.clone());
                if out.len() == Recommendation::MAX_HIGHLIGHTS {
                    return out;
                }
            }
        }
    }
    out
}

// =============================================================================
// TESTS
// =============================================================================
