//! Prompt builders for the three provider operations.
//!
//! Every prompt demands a JSON-only reply; the parser still treats whatever
//! comes back as untrusted text.

use std::fmt::Write;

use crate::types::{Category, Recommendation};

/// Entry count requested from each provider during generation.
const GENERATION_MIN_ENTRIES: usize = 12;
const GENERATION_MAX_ENTRIES: usize = 15;

/// Where the request is anchored, for prompt rendering.
#[derive(Debug, Clone)]
pub struct LocationContext {
    pub lat: f64,
    pub lng: f64,
    /// Resolved display name, or the raw address when geocoding failed.
    pub display_name: String,
    pub radius_meters: u32,
}

fn category_list(categories: &[Category]) -> String {
    categories
        .iter()
        .map(|c| c.prompt_phrase())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Stage-3 prompt: ask one provider for its candidate list.
pub fn generation_prompt(location: &LocationContext, categories: &[Category]) -> String {
    format!(
        r#"You are a local expert recommending real, currently operating places.

Find the best {categories} near {display_name} (latitude {lat:.4}, longitude {lng:.4}), within roughly {radius} meters.

Respond with ONLY a JSON object, no prose before or after:
{{"recommendations": [{{"name": "...", "description": "...", "address": "...", "latitude": 0.0, "longitude": 0.0, "confidenceScore": 0.0, "highlights": ["...", "..."], "whyRecommended": "..."}}]}}

Rules:
- {min_entries} to {max_entries} entries, best first.
- Only real places you are confident exist; confidenceScore in [0,1] reflects that confidence.
- highlights: at most 5 short phrases.
- Omit address/latitude/longitude when unsure rather than guessing."#,
        categories = category_list(categories),
        display_name = location.display_name,
        lat = location.lat,
        lng = location.lng,
        radius = location.radius_meters,
        min_entries = GENERATION_MIN_ENTRIES,
        max_entries = GENERATION_MAX_ENTRIES,
    )
}

/// Stage-5 prompt: one provider scores another provider's list.
pub fn validation_prompt(
    location: &LocationContext,
    source_provider: &str,
    recommendations: &[Recommendation],
) -> String {
    let mut listing = String::new();
    for rec in recommendations {
        let _ = write!(listing, "- name: {}", rec.name);
        if let Some(address) = &rec.address {
            let _ = write!(listing, " | address: {address}");
        }
        if let (Some(lat), Some(lng)) = (rec.lat, rec.lng) {
            let _ = write!(listing, " | at: {lat:.4},{lng:.4}");
        }
        if !rec.description.is_empty() {
            let _ = write!(listing, " | {}", rec.description);
        }
        listing.push('\n');
    }

    format!(
        r#"Another assistant ({source_provider}) recommended these places near {display_name} (latitude {lat:.4}, longitude {lng:.4}, radius {radius} m):

{listing}
For each entry, judge whether it is a real place, accurately described, and actually within range.

Respond with ONLY a JSON object:
{{"validations": [{{"name": "...", "validationScore": 0.0, "flaggedAsInaccurate": false, "flaggedAsOutOfRange": false, "comment": "..."}}]}}

Rules:
- One validation per listed entry, same name verbatim.
- validationScore in [0,1]: how confident you are the entry is real and correct.
- flaggedAsInaccurate: the description or details are wrong or the place likely does not exist.
- flaggedAsOutOfRange: the place is real but clearly outside the radius.
- comment only when a flag is set."#,
        display_name = location.display_name,
        lat = location.lat,
        lng = location.lng,
        radius = location.radius_meters,
    )
}

/// Stage-7 prompt: polish copy for the final ranked list without touching
/// order or membership.
pub fn synthesis_prompt(location: &LocationContext, ranked: &[Recommendation]) -> String {
    let mut listing = String::new();
    for (idx, rec) in ranked.iter().enumerate() {
        let _ = writeln!(
            listing,
            "{}. {} — {}",
            idx + 1,
            rec.name,
            if rec.description.is_empty() {
                "(no description)"
            } else {
                &rec.description
            }
        );
        if !rec.highlights.is_empty() {
            let _ = writeln!(listing, "   highlights: {}", rec.highlights.join("; "));
        }
    }

    format!(
        r#"These are the final consensus recommendations near {display_name}, already ranked:

{listing}
Rewrite the copy so it reads as one consistent, concise voice.

Respond with ONLY a JSON object:
{{"recommendations": [{{"name": "...", "description": "...", "highlights": ["..."], "whyRecommended": "..."}}]}}

Rules:
- Keep the same entries, same names, same order, same count ({count}).
- description: 1-2 polished sentences. highlights: at most 5 short phrases.
- Do not invent places or change which places appear."#,
        display_name = location.display_name,
        count = ranked.len(),
    )
}
