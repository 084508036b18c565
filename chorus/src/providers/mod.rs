//! Provider adapters.
//!
//! Each adapter turns a [`NormalizedMessage`] into one provider's wire
//! payload, performs the HTTP call and extracts plain text from the reply.
//! Every failure is normalized into a [`ProviderError`] before it leaves the
//! adapter, so the aggregator never sees provider-specific error shapes.
//!
//! - [`OpenAiChatAdapter`]: OpenAI chat completions (ChatGPT, DeepSeek, OpenRouter)
//! - [`GeminiAdapter`]: Gemini `generateContent`
//! - [`AnthropicAdapter`]: Anthropic Messages
//! - [`RetryOnOverload`]: wraps one adapter with a single retry on overload

mod anthropic;
mod gemini;
mod openai;
mod retry;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use thiserror::Error;

use crate::config::{ChatConfig, ProviderConfig, ProviderKind};
use crate::error::{ChorusError, Result};
use crate::models::{MediaType, NormalizedMessage};

pub use anthropic::AnthropicAdapter;
pub use gemini::GeminiAdapter;
pub use openai::OpenAiChatAdapter;
pub use retry::RetryOnOverload;

/// Failure of a single provider call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// Transport, auth, quota or format failure reported by (or on the way to)
    /// the provider. `status` is the HTTP status when one was received.
    #[error("{message}")]
    Api {
        status: Option<u16>,
        message: String,
    },

    #[error("{label} timed out after {}ms", .after.as_millis())]
    Timeout { label: String, after: Duration },

    #[error("Invalid image format for {provider}: {media_type}. Supported formats are: {supported}")]
    UnsupportedMedia {
        provider: String,
        media_type: MediaType,
        supported: String,
    },
}

impl ProviderError {
    pub fn api(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => *status,
            _ => None,
        }
    }

    /// Transient "service overloaded" signature: HTTP 503/529 or an
    /// `overloaded`/`503` marker in the message. Auth and request errors
    /// never match.
    pub fn is_overloaded(&self) -> bool {
        match self {
            Self::Api { status, message } => {
                if matches!(status, Some(503) | Some(529)) {
                    return true;
                }
                if matches!(status, Some(s) if *s < 500) {
                    return false;
                }
                let lower = message.to_lowercase();
                lower.contains("overloaded") || lower.contains("503")
            }
            _ => false,
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(error: reqwest::Error) -> Self {
        let status = error.status().map(|s| s.as_u16());
        if error.is_timeout() {
            return Self::api(status, format!("Provider request timed out: {error}"));
        }
        if error.is_decode() {
            return Self::api(status, format!("Failed to parse provider response: {error}"));
        }
        Self::api(status, format!("Provider request failed: {error}"))
    }
}

/// One LLM provider behind a uniform call shape.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Key used in the aggregate response, e.g. `chatgpt`.
    fn name(&self) -> &str;

    /// Image media types this provider accepts. Empty for text-only models.
    fn supported_media_types(&self) -> &[MediaType];

    async fn invoke(&self, message: &NormalizedMessage) -> std::result::Result<String, ProviderError>;
}

/// Rejects any image part the adapter cannot send, before any network call.
pub(crate) fn ensure_supported_media(
    provider: &str,
    supported: &[MediaType],
    message: &NormalizedMessage,
) -> std::result::Result<(), ProviderError> {
    for (media_type, _) in message.images() {
        if !supported.contains(&media_type) {
            let supported = if supported.is_empty() {
                "none (text only)".to_string()
            } else {
                supported
                    .iter()
                    .map(MediaType::as_str)
                    .collect::<Vec<_>>()
                    .join(", ")
            };
            return Err(ProviderError::UnsupportedMedia {
                provider: provider.to_string(),
                media_type,
                supported,
            });
        }
    }
    Ok(())
}

/// Pull a human-readable message out of a provider error body.
///
/// All three providers nest it under `error.message`; anything else falls
/// back to the raw body.
pub(crate) fn error_message_from_body(body: &str) -> String {
    let parsed: Option<serde_json::Value> = serde_json::from_str(body).ok();
    let message = parsed.as_ref().and_then(|value| {
        value
            .pointer("/error/message")
            .or_else(|| value.get("message"))
            .and_then(|m| m.as_str())
            .map(str::to_string)
    });

    match message {
        Some(message) if !message.trim().is_empty() => message,
        _ if body.trim().is_empty() => "Empty error response from provider".to_string(),
        _ => body.to_string(),
    }
}

/// Decode a successful JSON body, or turn a non-2xx reply into
/// [`ProviderError::Api`] carrying the status.
pub(crate) async fn read_json<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> std::result::Result<T, ProviderError> {
    let status = response.status();

    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ProviderError::api(
            Some(status.as_u16()),
            error_message_from_body(&body),
        ));
    }

    let bytes = response.bytes().await?;
    serde_json::from_slice(&bytes).map_err(|e| {
        tracing::debug!(
            response_preview = %String::from_utf8_lossy(&bytes).chars().take(100).collect::<String>(),
            error = %e,
            "Failed to parse provider response"
        );
        ProviderError::api(
            Some(status.as_u16()),
            format!("Failed to parse provider response: {e}"),
        )
    })
}

/// Shared HTTP client settings for provider adapters.
pub(crate) fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        // Outer bound only; the aggregator's guard usually fires first.
        .timeout(timeout + Duration::from_secs(5))
        .build()
        .map_err(|e| ChorusError::Configuration(format!("Failed to create HTTP client: {e}")))
}

pub(crate) fn extra_header_map(headers: &[(String, String)]) -> Result<HeaderMap> {
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| ChorusError::Configuration(format!("Invalid header name '{name}': {e}")))?;
        let value = HeaderValue::from_str(value).map_err(|e| {
            ChorusError::Configuration(format!("Invalid value for header '{name}': {e}"))
        })?;
        map.insert(name, value);
    }
    Ok(map)
}

/// Build the adapter for one configured provider.
pub fn build_adapter(
    config: &ProviderConfig,
    timeout: Duration,
) -> Result<Arc<dyn ProviderAdapter>> {
    let adapter: Arc<dyn ProviderAdapter> = match config.kind {
        ProviderKind::OpenAiChat => Arc::new(OpenAiChatAdapter::new(config, timeout)?),
        ProviderKind::Gemini => Arc::new(GeminiAdapter::new(config, timeout)?),
        ProviderKind::Anthropic => Arc::new(AnthropicAdapter::new(config, timeout)?),
    };
    Ok(adapter)
}

/// Build every configured adapter, wrapping the designated one in
/// [`RetryOnOverload`].
pub fn build_adapters(
    providers: &[ProviderConfig],
    chat: &ChatConfig,
) -> Result<Vec<Arc<dyn ProviderAdapter>>> {
    let timeout = Duration::from_millis(chat.timeout_ms);
    let retry_delay = Duration::from_millis(chat.retry_delay_ms);

    providers
        .iter()
        .map(|provider| {
            let adapter = build_adapter(provider, timeout)?;
            let retry = chat
                .retry_provider
                .as_deref()
                .is_some_and(|name| name.eq_ignore_ascii_case(&provider.name));

            if retry {
                tracing::info!(provider = %provider.name, delay_ms = chat.retry_delay_ms, "Enabling single retry on overload");
                Ok(Arc::new(RetryOnOverload::new(adapter, retry_delay)) as Arc<dyn ProviderAdapter>)
            } else {
                Ok(adapter)
            }
        })
        .collect()
}
