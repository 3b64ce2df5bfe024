//! OpenAI-compatible chat-completions adapter.
//!
//! One POST per call: `{model, messages:[{role:"user", content}], max_tokens}`
//! against `{endpoint}/chat/completions`. The raw content string is returned
//! untouched; structural parsing happens at the stage layer.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::config::ProviderConfig;
use crate::credentials::CredentialScope;

use super::error::ProviderError;

// =============================================================================
// API TYPES
// =============================================================================

#[derive(Serialize)]
pub(crate) struct ChatApiRequest<'a> {
    pub model: &'a str,
    pub messages: Vec<ApiMessage<'a>>,
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub stream: bool,
}

#[derive(Serialize)]
pub(crate) struct ApiMessage<'a> {
    pub role: &'static str,
    pub content: &'a str,
}

#[derive(Deserialize)]
struct ChatApiResponse {
    choices: Option<Vec<Choice>>,
    error: Option<ApiError>,
}

#[derive(Deserialize)]
struct Choice {
    message: Option<ChoiceMessage>,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ApiError {
    message: Option<String>,
}

// =============================================================================
// ADAPTER
// =============================================================================

/// Chat-completions adapter for one configured provider.
#[derive(Debug, Clone)]
pub struct ChatCompletionAdapter {
    config: ProviderConfig,
    client: reqwest::Client,
}

impl ChatCompletionAdapter {
    pub fn new(config: ProviderConfig) -> Result<Self, ProviderError> {
        let client = build_client(config.timeout)?;
        Ok(Self { config, client })
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    /// Issue one chat-completion call and return the raw content string.
    pub async fn complete(
        &self,
        prompt: &str,
        scope: &CredentialScope,
        cancel: &CancellationToken,
    ) -> Result<String, ProviderError> {
        let api_key = scope
            .key_for(&self.config)
            .ok_or_else(|| ProviderError::MissingKey {
                provider: self.config.tag.clone(),
            })?
            .to_string();
        let model = scope.model_for(&self.config);
        let endpoint = scope.endpoint_for(&self.config);

        let body = ChatApiRequest {
            model,
            messages: vec![ApiMessage {
                role: "user",
                content: prompt,
            }],
            max_tokens: self.config.max_tokens,
            stream: false,
        };

        let call = async {
            let response = self
                .client
                .post(format!("{}/chat/completions", endpoint.trim_end_matches('/')))
                .bearer_auth(&api_key)
                .json(&body)
                .send()
                .await?;

            let status = response.status();
            let text = response.text().await?;

            if !status.is_success() {
                let message = serde_json::from_str::<ChatApiResponse>(&text)
                    .ok()
                    .and_then(|r| r.error)
                    .and_then(|e| e.message)
                    .unwrap_or_else(|| truncate(&text, 200));
                return Err(ProviderError::Api {
                    provider: self.config.tag.clone(),
                    status: status.as_u16(),
                    message,
                });
            }

            let parsed: ChatApiResponse = serde_json::from_str(&text)
                .map_err(|e| ProviderError::schema(&self.config.tag, format!("invalid JSON: {e}")))?;

            if let Some(error) = parsed.error {
                return Err(ProviderError::Api {
                    provider: self.config.tag.clone(),
                    status: status.as_u16(),
                    message: error.message.unwrap_or_default(),
                });
            }

            let content = parsed
                .choices
                .and_then(|c| c.into_iter().next())
                .and_then(|c| c.message)
                .and_then(|m| m.content)
                .unwrap_or_default();

            if content.trim().is_empty() {
                return Err(ProviderError::schema(&self.config.tag, "empty content"));
            }

            Ok(content)
        };

        guarded(&self.config.tag, self.config.timeout, cancel, call).await
    }
}

/// Shared HTTP client construction for provider adapters. The per-call
/// deadline is layered separately so the client timeout only backstops it.
pub(crate) fn build_client(timeout: Duration) -> Result<reqwest::Client, ProviderError> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    reqwest::Client::builder()
        .timeout(timeout + Duration::from_secs(5))
        .default_headers(headers)
        .gzip(true)
        .build()
        .map_err(ProviderError::Http)
}

/// Race a provider call against its per-call deadline and the request's
/// cancellation token. Cancellation drops the in-flight future, which aborts
/// the underlying connection.
pub(crate) async fn guarded<F>(
    provider: &str,
    per_call: Duration,
    cancel: &CancellationToken,
    call: F,
) -> Result<String, ProviderError>
where
    F: std::future::Future<Output = Result<String, ProviderError>>,
{
    tokio::select! {
        _ = cancel.cancelled() => Err(ProviderError::Cancelled {
            provider: provider.to_string(),
        }),
        outcome = tokio::time::timeout(per_call, call) => match outcome {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout {
                provider: provider.to_string(),
                timeout: per_call,
            }),
        },
    }
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        let mut end = max;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}…", &s[..end])
    }
}
