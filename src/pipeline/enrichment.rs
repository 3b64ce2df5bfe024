//! Stage 4: match LLM candidates against real-world places.

use std::sync::Arc;

use tracing::{info, warn};

use crate::matching::best_place_match;
use crate::places::PlacesProvider;
use crate::types::{Category, ProviderResult};

/// Fetch nearby places for the first requested category and attach the best
/// match to every recommendation across all providers.
///
/// Returns whether enrichment ran. Any failure degrades to `false`; nothing
/// here can abort the request.
pub async fn run_enrichment(
    places: Option<&Arc<dyn PlacesProvider>>,
    geocoding_available: bool,
    lat: f64,
    lng: f64,
    primary_category: Category,
    radius_meters: u32,
    max_places: u32,
    generation_results: &mut [ProviderResult],
) -> bool {
    if !geocoding_available {
        info!("skipping places enrichment: geocoding unavailable");
        return false;
    }
    let Some(provider) = places else {
        info!("skipping places enrichment: no places provider configured");
        return false;
    };

    let nearby = match provider
        .nearby(lat, lng, primary_category, radius_meters, max_places)
        .await
    {
        Ok(nearby) => nearby,
        Err(e) => {
            warn!(error = %e, "places lookup failed; continuing without enrichment");
            return false;
        }
    };

    let mut matched = 0usize;
    for result in generation_results.iter_mut().filter(|r| r.success) {
        for rec in &mut result.recommendations {
            if let Some(place) = best_place_match(rec, &nearby) {
                rec.enriched_place = Some(place.clone());
                matched += 1;
            }
        }
    }
    info!(
        places = nearby.len(),
        matched, "places enrichment complete"
    );
    true
}
