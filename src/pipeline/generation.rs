//! Stage 3: parallel generation across all available providers.

use std::sync::Arc;
use std::time::Instant;

use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::credentials::CredentialScope;
use crate::parser::parse_generation;
use crate::prompts::{generation_prompt, LocationContext};
use crate::providers::RecommendationProvider;
use crate::types::{Category, ProviderResult};

/// Fan out the same generation prompt to every available provider and join.
///
/// Per-provider failures (including per-call timeouts and cancellation) are
/// captured as failed [`ProviderResult`]s; the join itself never fails.
/// Results come back in registry order so downstream tie-breaks are
/// deterministic.
pub async fn run_generation(
    providers: &[Arc<dyn RecommendationProvider>],
    location: &LocationContext,
    categories: &[Category],
    scope: &CredentialScope,
    cancel: &CancellationToken,
) -> Vec<ProviderResult> {
    let prompt = generation_prompt(location, categories);
    let primary = categories.first().copied().unwrap_or(Category::All);

    let available: Vec<_> = providers
        .iter()
        .filter(|p| p.is_available(scope))
        .cloned()
        .collect();
    if available.is_empty() {
        warn!("no providers available for generation");
        return Vec::new();
    }

    let concurrency = available.len();
    stream::iter(available.into_iter().map(|provider| {
        let prompt = prompt.clone();
        let scope = scope.clone();
        let cancel = cancel.clone();
        async move {
            let start = Instant::now();
            match provider.generate(&prompt, &scope, &cancel).await {
                Ok(raw) => {
                    let elapsed = start.elapsed();
                    let recommendations = parse_generation(&raw, primary, provider.name());
                    if recommendations.is_empty() {
                        warn!(
                            provider = %provider.name(),
                            "generation response contained no usable recommendations"
                        );
                        return ProviderResult::failed(
                            provider.name(),
                            "response contained no usable recommendations",
                            elapsed,
                        );
                    }
                    info!(
                        provider = %provider.name(),
                        count = recommendations.len(),
                        elapsed_ms = elapsed.as_millis() as u64,
                        "generation succeeded"
                    );
                    ProviderResult::succeeded(provider.name(), recommendations, raw, elapsed)
                }
                Err(e) => {
                    let elapsed = start.elapsed();
                    warn!(
                        provider = %provider.name(),
                        code = e.code(),
                        error = %e,
                        "generation failed"
                    );
                    ProviderResult::failed(provider.name(), e.to_string(), elapsed)
                }
            }
        }
    }))
    // `buffered` (not unordered) keeps registry order in the joined output.
    .buffered(concurrency)
    .collect()
    .await
}
