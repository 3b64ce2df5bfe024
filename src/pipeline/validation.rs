//! Stage 5: cross-validation round.
//!
//! Every available provider scores every other provider's list: N providers
//! with M successful sources yield up to N×M−overlap concurrent tasks. A
//! failed pair contributes an empty result instead of an error.

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::credentials::CredentialScope;
use crate::parser::parse_validations;
use crate::prompts::{validation_prompt, LocationContext};
use crate::providers::RecommendationProvider;
use crate::types::{CrossValidationResult, ProviderResult};

/// Cap on concurrent validation calls; pairs beyond it queue.
const VALIDATION_CONCURRENCY: usize = 8;

/// Run all (validator, source) pairs concurrently and collect the verdicts.
/// Skipped entirely when fewer than two providers generated successfully.
pub async fn run_cross_validation(
    providers: &[Arc<dyn RecommendationProvider>],
    location: &LocationContext,
    generation_results: &[ProviderResult],
    scope: &CredentialScope,
    cancel: &CancellationToken,
) -> Vec<CrossValidationResult> {
    let successful: Vec<&ProviderResult> = generation_results
        .iter()
        .filter(|r| r.success && !r.recommendations.is_empty())
        .collect();
    if successful.len() < 2 {
        debug!(
            successful = successful.len(),
            "skipping cross-validation: not enough successful providers"
        );
        return Vec::new();
    }

    let mut pairs: Vec<(Arc<dyn RecommendationProvider>, &ProviderResult)> = Vec::new();
    for validator in providers.iter().filter(|p| p.is_available(scope)) {
        for source in &successful {
            if validator.name() != source.provider_name {
                pairs.push((validator.clone(), source));
            }
        }
    }

    stream::iter(pairs.into_iter().map(|(validator, source)| {
        let prompt = validation_prompt(location, &source.provider_name, &source.recommendations);
        let scope = scope.clone();
        let cancel = cancel.clone();
        let source_name = source.provider_name.clone();
        async move {
            match validator.validate(&prompt, &scope, &cancel).await {
                Ok(raw) => {
                    let entries = parse_validations(&raw);
                    debug!(
                        validator = %validator.name(),
                        source = %source_name,
                        entries = entries.len(),
                        "cross-validation pair complete"
                    );
                    CrossValidationResult {
                        validated_by: validator.name().to_string(),
                        original_source: source_name,
                        entries,
                    }
                }
                Err(e) => {
                    warn!(
                        validator = %validator.name(),
                        source = %source_name,
                        code = e.code(),
                        error = %e,
                        "cross-validation pair failed"
                    );
                    CrossValidationResult::empty(validator.name(), source_name)
                }
            }
        }
    }))
    .buffer_unordered(VALIDATION_CONCURRENCY)
    .collect()
    .await
}
