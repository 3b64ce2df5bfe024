//! LLM provider adapters.
//!
//! An adapter is a value implementing [`RecommendationProvider`]; the
//! pipeline holds a tagged collection of them. Adding a provider is a new
//! config entry plus a registration in [`build_registry`] — nothing else
//! changes.

pub mod chat;
pub mod error;
pub mod streaming;

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::config::{AppConfig, ProviderConfig, ProviderKind};
use crate::credentials::CredentialScope;

pub use chat::ChatCompletionAdapter;
pub use error::ProviderError;
pub use streaming::StreamingChatAdapter;

/// One LLM provider, able to serve all three pipeline operations.
///
/// The operations share their plumbing: per-call timeout, a single user-role
/// message carrying the prompt, and a JSON-only response expectation. They
/// differ only in the prompt the stage hands them, so adapters route all
/// three through one completion path.
#[async_trait]
pub trait RecommendationProvider: Send + Sync {
    /// Stable tag used in logs, metadata, and credential overrides.
    fn name(&self) -> &str;

    /// Whether this provider can serve the current request. A user-supplied
    /// key in the scope activates a provider the process config leaves off.
    fn is_available(&self, scope: &CredentialScope) -> bool;

    async fn generate(
        &self,
        prompt: &str,
        scope: &CredentialScope,
        cancel: &CancellationToken,
    ) -> Result<String, ProviderError>;

    async fn validate(
        &self,
        prompt: &str,
        scope: &CredentialScope,
        cancel: &CancellationToken,
    ) -> Result<String, ProviderError>;

    async fn synthesize(
        &self,
        prompt: &str,
        scope: &CredentialScope,
        cancel: &CancellationToken,
    ) -> Result<String, ProviderError>;
}

fn available(config: &ProviderConfig, scope: &CredentialScope) -> bool {
    scope.has_user_key(&config.tag) || (config.enabled && config.api_key.is_some())
}

#[async_trait]
impl RecommendationProvider for ChatCompletionAdapter {
    fn name(&self) -> &str {
        &self.config().tag
    }

    fn is_available(&self, scope: &CredentialScope) -> bool {
        available(self.config(), scope)
    }

    async fn generate(
        &self,
        prompt: &str,
        scope: &CredentialScope,
        cancel: &CancellationToken,
    ) -> Result<String, ProviderError> {
        self.complete(prompt, scope, cancel).await
    }

    async fn validate(
        &self,
        prompt: &str,
        scope: &CredentialScope,
        cancel: &CancellationToken,
    ) -> Result<String, ProviderError> {
        self.complete(prompt, scope, cancel).await
    }

    async fn synthesize(
        &self,
        prompt: &str,
        scope: &CredentialScope,
        cancel: &CancellationToken,
    ) -> Result<String, ProviderError> {
        self.complete(prompt, scope, cancel).await
    }
}

#[async_trait]
impl RecommendationProvider for StreamingChatAdapter {
    fn name(&self) -> &str {
        &self.config().tag
    }

    fn is_available(&self, scope: &CredentialScope) -> bool {
        available(self.config(), scope)
    }

    async fn generate(
        &self,
        prompt: &str,
        scope: &CredentialScope,
        cancel: &CancellationToken,
    ) -> Result<String, ProviderError> {
        self.complete(prompt, scope, cancel).await
    }

    async fn validate(
        &self,
        prompt: &str,
        scope: &CredentialScope,
        cancel: &CancellationToken,
    ) -> Result<String, ProviderError> {
        self.complete(prompt, scope, cancel).await
    }

    async fn synthesize(
        &self,
        prompt: &str,
        scope: &CredentialScope,
        cancel: &CancellationToken,
    ) -> Result<String, ProviderError> {
        self.complete(prompt, scope, cancel).await
    }
}

/// Build the adapter collection from process configuration. An adapter whose
/// HTTP client cannot be constructed is skipped with a warning rather than
/// failing startup.
pub fn build_registry(config: &AppConfig) -> Vec<Arc<dyn RecommendationProvider>> {
    let mut registry: Vec<Arc<dyn RecommendationProvider>> = Vec::new();
    for provider in &config.providers {
        let built: Result<Arc<dyn RecommendationProvider>, ProviderError> = match provider.kind {
            ProviderKind::Chat => {
                ChatCompletionAdapter::new(provider.clone()).map(|a| Arc::new(a) as _)
            }
            ProviderKind::Streaming => {
                StreamingChatAdapter::new(provider.clone()).map(|a| Arc::new(a) as _)
            }
        };
        match built {
            Ok(adapter) => registry.push(adapter),
            Err(e) => warn!(provider = %provider.tag, error = %e, "skipping provider adapter"),
        }
    }
    registry
}
