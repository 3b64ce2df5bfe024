//! Stage 7: polish pass by the fastest successful provider.
//!
//! Synthesis may rewrite copy but never reorders, adds, or removes entries.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::credentials::CredentialScope;
use crate::parser::parse_synthesis;
use crate::prompts::{synthesis_prompt, LocationContext};
use crate::providers::RecommendationProvider;
use crate::types::{ProviderResult, Recommendation};

/// Name recorded when no provider polished the list, and stamped on every
/// candidate after a successful polish.
pub const CONSENSUS_SOURCE: &str = "Consensus";

/// Rewrite descriptions/highlights on the ranked list in place. Returns the
/// synthesizer name for response metadata.
pub async fn run_synthesis(
    providers: &[Arc<dyn RecommendationProvider>],
    location: &LocationContext,
    generation_results: &[ProviderResult],
    ranked: &mut [Recommendation],
    scope: &CredentialScope,
    cancel: &CancellationToken,
) -> String {
    if ranked.is_empty() {
        return CONSENSUS_SOURCE.to_string();
    }

    let Some(synthesizer) = fastest_available(providers, generation_results, scope) else {
        return CONSENSUS_SOURCE.to_string();
    };

    let prompt = synthesis_prompt(location, ranked);
    let raw = match synthesizer.synthesize(&prompt, scope, cancel).await {
        Ok(raw) => raw,
        Err(e) => {
            warn!(
                provider = %synthesizer.name(),
                code = e.code(),
                error = %e,
                "synthesis failed; keeping consensus copy"
            );
            return CONSENSUS_SOURCE.to_string();
        }
    };

    let entries = parse_synthesis(&raw);
    if entries.is_empty() {
        warn!(provider = %synthesizer.name(), "synthesis response unusable; keeping consensus copy");
        return CONSENSUS_SOURCE.to_string();
    }

    let mut rewritten = 0usize;
    for rec in ranked.iter_mut() {
        if let Some(entry) = entries
            .iter()
            .find(|e| e.name.eq_ignore_ascii_case(&rec.name))
        {
            // Prior copy survives when the synthesizer returned an empty field.
            if let Some(description) = &entry.description {
                rec.description = description.clone();
            }
            if !entry.highlights.is_empty() {
                rec.highlights = entry.highlights.clone();
            }
            if entry.why_recommended.is_some() {
                rec.why_recommended = entry.why_recommended.clone();
            }
            rewritten += 1;
        }
    }
    for rec in ranked.iter_mut() {
        rec.source_provider = CONSENSUS_SOURCE.to_string();
    }

    info!(
        provider = %synthesizer.name(),
        rewritten,
        total = ranked.len(),
        "synthesis complete"
    );
    synthesizer.name().to_string()
}

/// The successful provider with the smallest measured elapsed time that is
/// still available; ties keep the earlier entry in registry order (generation
/// results preserve it).
fn fastest_available(
    providers: &[Arc<dyn RecommendationProvider>],
    generation_results: &[ProviderResult],
    scope: &CredentialScope,
) -> Option<Arc<dyn RecommendationProvider>> {
    let mut best: Option<(&ProviderResult, Arc<dyn RecommendationProvider>)> = None;
    for result in generation_results.iter().filter(|r| r.success) {
        let Some(provider) = providers
            .iter()
            .find(|p| p.name() == result.provider_name && p.is_available(scope))
        else {
            continue;
        };
        match &best {
            Some((current, _)) if result.elapsed >= current.elapsed => {}
            _ => best = Some((result, provider.clone())),
        }
    }
    best.map(|(_, provider)| provider)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::ProviderError;
    use crate::types::Category;
    use async_trait::async_trait;
    use std::time::Duration;

    struct StubProvider {
        name: String,
        response: Result<String, String>,
    }

    #[async_trait]
    impl RecommendationProvider for StubProvider {
        fn name(&self) -> &str {
            &self.name
        }

        fn is_available(&self, _scope: &CredentialScope) -> bool {
            true
        }

        async fn generate(
            &self,
            _prompt: &str,
            _scope: &CredentialScope,
            _cancel: &CancellationToken,
        ) -> Result<String, ProviderError> {
            unreachable!("synthesis tests never generate")
        }

        async fn validate(
            &self,
            _prompt: &str,
            _scope: &CredentialScope,
            _cancel: &CancellationToken,
        ) -> Result<String, ProviderError> {
            unreachable!("synthesis tests never validate")
        }

        async fn synthesize(
            &self,
            _prompt: &str,
            _scope: &CredentialScope,
            _cancel: &CancellationToken,
        ) -> Result<String, ProviderError> {
            self.response
                .clone()
                .map_err(|m| ProviderError::schema(self.name.clone(), m))
        }
    }

    fn ranked() -> Vec<Recommendation> {
        vec![
            Recommendation::new("Alpha", "old alpha", Category::All, 0.9, "a"),
            Recommendation::new("Beta", "old beta", Category::All, 0.8, "b"),
        ]
    }

    fn gen_result(name: &str, millis: u64) -> ProviderResult {
        ProviderResult::succeeded(
            name,
            vec![Recommendation::new("x", "d", Category::All, 0.5, name)],
            String::new(),
            Duration::from_millis(millis),
        )
    }

    fn location() -> LocationContext {
        LocationContext {
            lat: 0.0,
            lng: 0.0,
            display_name: "here".to_string(),
            radius_meters: 1000,
        }
    }

    #[tokio::test]
    async fn picks_fastest_and_rewrites_matching_names() {
        let providers: Vec<Arc<dyn RecommendationProvider>> = vec![
            Arc::new(StubProvider {
                name: "slow".to_string(),
                response: Ok(String::new()),
            }),
            Arc::new(StubProvider {
                name: "fast".to_string(),
                response: Ok(r#"{"recommendations": [
                    {"name": "ALPHA", "description": "new alpha", "highlights": ["h1"]},
                    {"name": "Gamma", "description": "not in list"}
                ]}"#
                .to_string()),
            }),
        ];
        let generation = vec![gen_result("slow", 500), gen_result("fast", 100)];
        let mut list = ranked();
        let name = run_synthesis(
            &providers,
            &location(),
            &generation,
            &mut list,
            &CredentialScope::empty(),
            &CancellationToken::new(),
        )
        .await;

        assert_eq!(name, "fast");
        // Case-insensitive match rewrote Alpha; Beta untouched but restamped.
        assert_eq!(list[0].description, "new alpha");
        assert_eq!(list[0].highlights, vec!["h1".to_string()]);
        assert_eq!(list[1].description, "old beta");
        assert!(list.iter().all(|r| r.source_provider == CONSENSUS_SOURCE));
        assert_eq!(list.len(), 2);
    }

    #[tokio::test]
    async fn failure_leaves_list_untouched() {
        let providers: Vec<Arc<dyn RecommendationProvider>> = vec![Arc::new(StubProvider {
            name: "only".to_string(),
            response: Err("boom".to_string()),
        })];
        let generation = vec![gen_result("only", 100)];
        let mut list = ranked();
        let name = run_synthesis(
            &providers,
            &location(),
            &generation,
            &mut list,
            &CredentialScope::empty(),
            &CancellationToken::new(),
        )
        .await;

        assert_eq!(name, CONSENSUS_SOURCE);
        assert_eq!(list[0].description, "old alpha");
        assert_eq!(list[0].source_provider, "a");
    }

    #[tokio::test]
    async fn empty_list_skips_synthesis() {
        let providers: Vec<Arc<dyn RecommendationProvider>> = vec![Arc::new(StubProvider {
            name: "only".to_string(),
            response: Ok("{}".to_string()),
        })];
        let mut list: Vec<Recommendation> = Vec::new();
        let name = run_synthesis(
            &providers,
            &location(),
            &[gen_result("only", 100)],
            &mut list,
            &CredentialScope::empty(),
            &CancellationToken::new(),
        )
        .await;
        assert_eq!(name, CONSENSUS_SOURCE);
    }
}
