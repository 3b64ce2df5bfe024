//! Recommendation consensus pipeline.
//!
//! Eight stages over a per-request context:
//! geocode → cache check → parallel generation → places enrichment →
//! cross-validation → consensus scoring → synthesis → cache write.
//! A cache hit short-circuits after stage 2; degraded collaborators
//! (geocoder, places, individual providers) never abort the request.

pub mod consensus;
pub mod enrichment;
pub mod generation;
pub mod synthesis;
pub mod validation;

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use rand::Rng;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cache::{address_cache_key, coordinate_cache_key, ResponseCache};
use crate::config::AppConfig;
use crate::credentials::CredentialScope;
use crate::error::PipelineError;
use crate::geocode::Geocoder;
use crate::places::PlacesProvider;
use crate::prompts::LocationContext;
use crate::providers::RecommendationProvider;
use crate::types::{
    ProviderResult, RecommendationRequest, RecommendationResponse, ResponseMetadata,
};

pub use consensus::{consensus_rank, ConsensusOutcome};
pub use synthesis::CONSENSUS_SOURCE;

/// One in this many cache writes also triggers an async purge of expired
/// rows, in lieu of a background sweeper.
const PURGE_DENOMINATOR: u32 = 50;

// =============================================================================
// CONTEXT
// =============================================================================

/// Where the request resolved to, produced by the geocode stage.
#[derive(Debug, Clone)]
struct ResolvedLocation {
    lat: f64,
    lng: f64,
    /// Canonical display name when geocoding produced one.
    resolved_address: Option<String>,
    /// Text shown to LLMs: resolved name, raw address, or coordinate string.
    display_name: String,
    geocoding_available: bool,
}

// =============================================================================
// PIPELINE
// =============================================================================

/// The orchestrator. Holds process-wide collaborators; per-request state
/// lives on the stack of [`Pipeline::run`].
pub struct Pipeline {
    config: AppConfig,
    providers: Vec<Arc<dyn RecommendationProvider>>,
    geocoder: Option<Arc<dyn Geocoder>>,
    places: Option<Arc<dyn PlacesProvider>>,
    cache: Arc<dyn ResponseCache>,
}

impl Pipeline {
    pub fn new(
        config: AppConfig,
        providers: Vec<Arc<dyn RecommendationProvider>>,
        geocoder: Option<Arc<dyn Geocoder>>,
        places: Option<Arc<dyn PlacesProvider>>,
        cache: Arc<dyn ResponseCache>,
    ) -> Self {
        Self {
            config,
            providers,
            geocoder,
            places,
            cache,
        }
    }

    /// Run one request through the pipeline.
    ///
    /// `cancel` represents the client connection; tripping it aborts every
    /// in-flight provider call and fails the request with
    /// [`PipelineError::Cancelled`].
    pub async fn run(
        &self,
        mut request: RecommendationRequest,
        cancel: CancellationToken,
    ) -> Result<RecommendationResponse, PipelineError> {
        let started = Instant::now();
        request.validate().map_err(PipelineError::InvalidRequest)?;
        let scope = CredentialScope::new(std::mem::take(&mut request.user_api_keys));

        // Stage 1: geocode.
        let location = self.geocode(&request).await;

        // Stage 2: cache check.
        let cache_key = self.cache_key(&request, &location);
        if !request.force_refresh {
            match self.cache.get(&cache_key).await {
                Ok(Some(mut cached)) => {
                    info!(key = %cache_key, "cache hit");
                    cached.from_cache = true;
                    return Ok(cached);
                }
                Ok(None) => debug!(key = %cache_key, "cache miss"),
                Err(e) => warn!(key = %cache_key, error = %e, "cache read failed; treating as miss"),
            }
        }

        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        let prompt_location = LocationContext {
            lat: location.lat,
            lng: location.lng,
            display_name: location.display_name.clone(),
            radius_meters: request.radius_meters,
        };

        // Stage 3: parallel generation.
        let mut generation_results = generation::run_generation(
            &self.providers,
            &prompt_location,
            &request.categories,
            &scope,
            &cancel,
        )
        .await;

        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }
        if !generation_results
            .iter()
            .any(|r| r.success && !r.recommendations.is_empty())
        {
            return Err(PipelineError::NoProviders);
        }

        // Stage 4: places enrichment.
        let enriched = enrichment::run_enrichment(
            self.places.as_ref(),
            location.geocoding_available,
            location.lat,
            location.lng,
            request.primary_category(),
            request.radius_meters,
            self.config.places.max_results,
            &mut generation_results,
        )
        .await;

        // Stage 5: cross-validation.
        let validation_results = validation::run_cross_validation(
            &self.providers,
            &prompt_location,
            &generation_results,
            &scope,
            &cancel,
        )
        .await;

        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        // Stage 6: consensus scoring.
        let outcome = consensus_rank(
            &generation_results,
            &validation_results,
            request.max_results as usize,
        );
        let mut ranked = outcome.ranked;

        // Stage 7: synthesis.
        let synthesized_by = synthesis::run_synthesis(
            &self.providers,
            &prompt_location,
            &generation_results,
            &mut ranked,
            &scope,
            &cancel,
        )
        .await;

        let response = RecommendationResponse {
            lat: location.lat,
            lng: location.lng,
            resolved_address: location.resolved_address,
            category: request.primary_category(),
            categories: request.categories.clone(),
            recommendations: ranked,
            metadata: build_metadata(
                &generation_results,
                enriched,
                outcome.total_candidates,
                started,
                synthesized_by,
            ),
            from_cache: false,
            generated_at: Utc::now(),
        };

        // Stage 8: cache write (awaited; failure is non-fatal).
        self.cache_write(&cache_key, &response).await;

        Ok(response)
    }

    async fn geocode(&self, request: &RecommendationRequest) -> ResolvedLocation {
        if let (Some(lat), Some(lng)) = (request.latitude, request.longitude) {
            let coord_label = format!("{lat:.4}, {lng:.4}");
            let display_name = match &self.geocoder {
                Some(geocoder) => match geocoder.reverse(lat, lng).await {
                    Ok(Some(name)) => name,
                    Ok(None) => coord_label.clone(),
                    Err(e) => {
                        warn!(error = %e, "reverse geocoding failed; using coordinate label");
                        coord_label.clone()
                    }
                },
                None => coord_label.clone(),
            };
            return ResolvedLocation {
                lat,
                lng,
                resolved_address: Some(display_name.clone()),
                display_name,
                geocoding_available: true,
            };
        }

        // Request validation guarantees an address when coordinates are absent.
        let address = request.address.clone().unwrap_or_default();
        if let Some(geocoder) = &self.geocoder {
            match geocoder.forward(&address).await {
                Ok(Some(hit)) => {
                    return ResolvedLocation {
                        lat: hit.lat,
                        lng: hit.lng,
                        resolved_address: Some(hit.display_name.clone()),
                        display_name: hit.display_name,
                        geocoding_available: true,
                    }
                }
                Ok(None) => info!(address = %address, "forward geocoding found no match"),
                Err(e) => warn!(error = %e, "forward geocoding failed"),
            }
        }
        ResolvedLocation {
            lat: 0.0,
            lng: 0.0,
            resolved_address: None,
            display_name: address,
            geocoding_available: false,
        }
    }

    fn cache_key(&self, request: &RecommendationRequest, location: &ResolvedLocation) -> String {
        if location.geocoding_available {
            coordinate_cache_key(
                location.lat,
                location.lng,
                &request.categories,
                self.config.cache.grid_precision_decimal_places,
            )
        } else {
            address_cache_key(request.address.as_deref().unwrap_or(""), &request.categories)
        }
    }

    async fn cache_write(&self, key: &str, response: &RecommendationResponse) {
        let ttl =
            std::time::Duration::from_secs(self.config.cache.default_ttl_hours as u64 * 3600);
        if let Err(e) = self.cache.put(key, response, ttl).await {
            warn!(key = %key, error = %e, "cache write failed");
            return;
        }
        debug!(key = %key, "cache write complete");

        if rand::thread_rng().gen_range(0..PURGE_DENOMINATOR) == 0 {
            let cache = self.cache.clone();
            tokio::spawn(async move {
                match cache.purge_expired().await {
                    Ok(removed) => debug!(removed, "purged expired cache entries"),
                    Err(e) => warn!(error = %e, "cache purge failed"),
                }
            });
        }
    }
}

fn build_metadata(
    generation_results: &[ProviderResult],
    enriched: bool,
    total_candidates: usize,
    started: Instant,
    synthesized_by: String,
) -> ResponseMetadata {
    ResponseMetadata {
        providers_used: generation_results
            .iter()
            .filter(|r| r.success)
            .map(|r| r.provider_name.clone())
            .collect(),
        providers_failed: generation_results
            .iter()
            .filter(|r| !r.success)
            .map(|r| r.provider_name.clone())
            .collect(),
        google_places_enriched: enriched,
        total_candidates_evaluated: total_candidates,
        total_elapsed_ms: started.elapsed().as_millis() as u64,
        synthesized_by,
    }
}
