//! SSE streaming aggregator adapter.
//!
//! Same request shape as the chat adapter plus `stream: true`. The response
//! is a stream of `data: {json}` lines terminated by the literal sentinel
//! `data: [DONE]`. Content and reasoning deltas accumulate into separate
//! buffers; reasoning-only models (which put their entire answer in
//! `reasoning_content`) fall back to the reasoning buffer when the content
//! buffer ends empty.

use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::config::ProviderConfig;
use crate::credentials::CredentialScope;

use super::chat::{build_client, guarded, truncate, ApiMessage, ChatApiRequest};
use super::error::ProviderError;

const DONE_SENTINEL: &str = "[DONE]";

// =============================================================================
// STREAM FRAME TYPES
// =============================================================================

#[derive(Deserialize)]
struct StreamFrame {
    choices: Option<Vec<FrameChoice>>,
}

#[derive(Deserialize)]
struct FrameChoice {
    delta: Option<FrameDelta>,
}

#[derive(Deserialize, Default)]
struct FrameDelta {
    content: Option<String>,
    text: Option<String>,
    reasoning_content: Option<String>,
    reasoning: Option<String>,
}

// =============================================================================
// ADAPTER
// =============================================================================

/// Streaming chat adapter for aggregator-style providers.
#[derive(Debug, Clone)]
pub struct StreamingChatAdapter {
    config: ProviderConfig,
    client: reqwest::Client,
}

impl StreamingChatAdapter {
    pub fn new(config: ProviderConfig) -> Result<Self, ProviderError> {
        let client = build_client(config.timeout)?;
        Ok(Self { config, client })
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    /// Issue one streaming call, aggregate deltas, and return the final text.
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
            stream: true,
        };

        let call = async {
            let mut response = self
                .client
                .post(format!("{}/chat/completions", endpoint.trim_end_matches('/')))
                .bearer_auth(&api_key)
                .json(&body)
                .send()
                .await?;

            let status = response.status();
            if !status.is_success() {
                let text = response.text().await.unwrap_or_default();
                return Err(ProviderError::Api {
                    provider: self.config.tag.clone(),
                    status: status.as_u16(),
                    message: truncate(&text, 200),
                });
            }

            let mut buffers = StreamBuffers::default();
            let mut pending = String::new();

            while let Some(chunk) = response.chunk().await? {
                pending.push_str(&String::from_utf8_lossy(&chunk));
                while let Some(newline) = pending.find('\n') {
                    let line = pending[..newline].trim().to_string();
                    pending.drain(..=newline);
                    if buffers.consume_line(&line) {
                        return Ok(buffers.into_text(&self.config.tag)?);
                    }
                }
            }

            // Stream ended without [DONE]; a final unterminated line may still
            // carry a frame.
            let tail = pending.trim().to_string();
            if !tail.is_empty() {
                buffers.consume_line(&tail);
            }
            buffers.into_text(&self.config.tag)
        };

        guarded(&self.config.tag, self.config.timeout, cancel, call).await
    }
}

// =============================================================================
// DELTA ACCUMULATION
// =============================================================================

#[derive(Default)]
struct StreamBuffers {
    content: String,
    reasoning: String,
}

impl StreamBuffers {
    /// Feed one SSE line. Returns true on the `[DONE]` sentinel.
    fn consume_line(&mut self, line: &str) -> bool {
        let Some(data) = line.strip_prefix("data:") else {
            return false;
        };
        let data = data.trim();
        if data == DONE_SENTINEL {
            return true;
        }

        let Ok(frame) = serde_json::from_str::<StreamFrame>(data) else {
            return false;
        };
        let delta = frame
            .choices
            .and_then(|c| c.into_iter().next())
            .and_then(|c| c.delta)
            .unwrap_or_default();

        if let Some(content) = delta.content {
            self.content.push_str(&content);
        }
        if let Some(text) = delta.text {
            self.content.push_str(&text);
        }
        if let Some(reasoning) = delta.reasoning_content {
            self.reasoning.push_str(&reasoning);
        }
        if let Some(reasoning) = delta.reasoning {
            self.reasoning.push_str(&reasoning);
        }
        false
    }

    fn into_text(self, provider: &str) -> Result<String, ProviderError> {
        if !self.content.trim().is_empty() {
            Ok(self.content)
        } else if !self.reasoning.trim().is_empty() {
            Ok(self.reasoning)
        } else {
            Err(ProviderError::schema(provider, "stream carried no content"))
        }
    }
}
