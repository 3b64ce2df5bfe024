//! Error types for provider adapters.

use std::time::Duration;

use thiserror::Error;

/// Errors surfaced by a single provider call. The generation and validation
/// stages absorb these at the task boundary; nothing here aborts a request
/// except `Cancelled`.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// No API key in process configuration or request scope.
    #[error("{provider}: no API key configured")]
    MissingKey { provider: String },

    /// Per-call deadline expired.
    #[error("{provider}: timed out after {timeout:?}")]
    Timeout { provider: String, timeout: Duration },

    /// Request-scoped cancellation tripped while the call was in flight.
    #[error("{provider}: cancelled")]
    Cancelled { provider: String },

    /// Non-success HTTP status from the provider endpoint.
    #[error("{provider}: HTTP {status}: {message}")]
    Api {
        provider: String,
        status: u16,
        message: String,
    },

    /// Response body did not carry the expected shape.
    #[error("{provider}: unexpected response: {message}")]
    Schema { provider: String, message: String },

    /// Network-level failure.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

impl ProviderError {
    pub fn schema(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Schema {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Short code for structured logs and failure metadata.
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingKey { .. } => "missing_key",
            Self::Timeout { .. } => "timeout",
            Self::Cancelled { .. } => "cancelled",
            Self::Api { .. } => "api_error",
            Self::Schema { .. } => "schema_error",
            Self::Http(_) => "http_error",
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}
