//! Inference backend abstraction and the Gemini HTTP implementation.
//!
//! Defines the [`InferenceBackend`] trait (one prompt plus one inline media
//! blob in, one text completion out) and [`GeminiBackend`], which calls the
//! `generateContent` endpoint of the Generative Language API.
//!
//! # Retry Strategy
//!
//! `api.max_retries` defaults to 0: a failed call is reported once and never
//! re-attempted. When raised, transient errors are retried with exponential
//! backoff:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use anyhow::Result;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::time::Duration;
use thiserror::Error;

use crate::config::ApiConfig;
use crate::models::MediaItem;

/// Errors from the Gemini HTTP client.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{message} (HTTP {status})")]
    Api { status: u16, message: String },

    #[error("malformed response: {0}")]
    Parse(String),
}

/// Media payload encoded for inline transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineMedia {
    pub mime_type: String,
    /// Standard base64 of the file contents.
    pub data: String,
}

impl InlineMedia {
    pub fn from_bytes(bytes: &[u8], mime_type: &str) -> Self {
        Self {
            mime_type: mime_type.to_string(),
            data: STANDARD.encode(bytes),
        }
    }

    /// Read the whole file into memory and encode it.
    pub fn load(item: &MediaItem) -> Result<Self> {
        let bytes = std::fs::read(&item.path)
            .map_err(|e| anyhow::anyhow!("failed to read {}: {}", item.path.display(), e))?;
        Ok(Self::from_bytes(&bytes, item.mime_type))
    }
}

/// A remote multimodal model.
///
/// One request, one free-form text answer. No streaming, no follow-up turns.
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    /// Short label for logs (e.g. `"gemini"`).
    fn name(&self) -> &str;

    /// Ask `model` to answer `prompt` about `media`.
    async fn generate(&self, model: &str, prompt: &str, media: &InlineMedia) -> Result<String>;
}

/// Backend for the Generative Language API (`generateContent`).
pub struct GeminiBackend {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    max_retries: u32,
}

impl GeminiBackend {
    /// Build from `[api]` with an already resolved credential.
    pub fn new(config: &ApiConfig, api_key: String) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(secs) = config.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        Ok(Self {
            client: builder.build()?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            max_retries: config.max_retries,
        })
    }

    fn endpoint(&self, model: &str) -> String {
        format!("{}/v1beta/models/{}:generateContent", self.base_url, model)
    }

    async fn generate_once(
        &self,
        url: &str,
        body: &serde_json::Value,
    ) -> std::result::Result<String, (BackendError, bool)> {
        let resp = self
            .client
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await;

        let response = match resp {
            Ok(r) => r,
            Err(e) => return Err((BackendError::Http(e), true)),
        };

        let status = response.status();
        if status.is_success() {
            let json: serde_json::Value = response
                .json()
                .await
                .map_err(|e| (BackendError::Parse(e.to_string()), false))?;
            return parse_generate_response(&json).map_err(|e| (e, false));
        }

        let retryable = status.as_u16() == 429 || status.is_server_error();
        let body_text = response.text().await.unwrap_or_default();
        Err((
            BackendError::Api {
                status: status.as_u16(),
                message: api_error_message(&body_text),
            },
            retryable,
        ))
    }
}

#[async_trait]
impl InferenceBackend for GeminiBackend {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn generate(&self, model: &str, prompt: &str, media: &InlineMedia) -> Result<String> {
        let url = self.endpoint(model);
        let body = generate_request_body(prompt, media);

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s, 4s, 8s, ...
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tracing::debug!(attempt, ?delay, "retrying generateContent");
                tokio::time::sleep(delay).await;
            }

            tracing::debug!(
                model,
                mime_type = %media.mime_type,
                payload_bytes = media.data.len(),
                "POST generateContent"
            );

            match self.generate_once(&url, &body).await {
                Ok(text) => return Ok(text),
                Err((err, true)) => {
                    last_err = Some(err);
                    continue;
                }
                Err((err, false)) => return Err(err.into()),
            }
        }

        Err(last_err
            .map(anyhow::Error::from)
            .unwrap_or_else(|| anyhow::anyhow!("generateContent failed after retries")))
    }
}

/// Request body: one user turn with the prompt text and the inline blob.
pub fn generate_request_body(prompt: &str, media: &InlineMedia) -> serde_json::Value {
    serde_json::json!({
        "contents": [{
            "role": "user",
            "parts": [
                { "text": prompt },
                {
                    "inline_data": {
                        "mime_type": media.mime_type,
                        "data": media.data,
                    }
                }
            ]
        }]
    })
}

/// Extract the answer text from a `generateContent` response.
///
/// Concatenates `candidates[0].content.parts[*].text`.
pub fn parse_generate_response(json: &serde_json::Value) -> std::result::Result<String, BackendError> {
    let candidate = json
        .get("candidates")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first());

    let candidate = match candidate {
        Some(c) => c,
        None => {
            let reason = json
                .pointer("/promptFeedback/blockReason")
                .and_then(|r| r.as_str());
            return Err(BackendError::Parse(match reason {
                Some(r) => format!("prompt blocked: {}", r),
                None => "missing candidates".to_string(),
            }));
        }
    };

    let parts = candidate
        .pointer("/content/parts")
        .and_then(|p| p.as_array())
        .ok_or_else(|| {
            let finish = candidate
                .get("finishReason")
                .and_then(|f| f.as_str())
                .unwrap_or("unknown");
            BackendError::Parse(format!("candidate has no content (finishReason: {})", finish))
        })?;

    let text: String = parts
        .iter()
        .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
        .collect();

    if text.is_empty() {
        return Err(BackendError::Parse("candidate has no text".to_string()));
    }
    Ok(text)
}

/// The API's own `error.message`, or the raw body when it isn't JSON.
fn api_error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.pointer("/error/message")
                .and_then(|m| m.as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.trim().to_string())
}
