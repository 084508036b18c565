use std::collections::BTreeSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::error::{ChorusError, Result};
use crate::models::{AggregateResponse, MediaType, NormalizedMessage, ProviderOutcome};
use crate::providers::{ProviderAdapter, ProviderError};

use super::attachment::UploadedAttachment;
use super::sanitize::{sanitize, GENERIC_ERROR};
use super::timeout::with_timeout;

pub const INVALID_IMAGE_MESSAGE: &str =
    "Invalid image format. Supported formats are: JPEG, PNG, GIF, and WebP";

/// One inbound chat turn as handed over by the transport layer.
#[derive(Debug)]
pub struct ChatRequest {
    pub prompt: String,
    pub attachment: Option<UploadedAttachment>,
}

impl ChatRequest {
    pub fn text(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            attachment: None,
        }
    }

    pub fn with_attachment(prompt: impl Into<String>, attachment: UploadedAttachment) -> Self {
        Self {
            prompt: prompt.into(),
            attachment: Some(attachment),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AggregatorSettings {
    pub timeout: Duration,
    pub max_prompt_chars: usize,
    pub require_prompt: bool,
    pub is_production: bool,
}

impl From<&Config> for AggregatorSettings {
    fn from(config: &Config) -> Self {
        Self {
            timeout: Duration::from_millis(config.chat.timeout_ms),
            max_prompt_chars: config.chat.max_prompt_chars,
            require_prompt: config.chat.require_prompt,
            is_production: config.is_production(),
        }
    }
}

/// Fans one request out to every configured provider and merges the results.
///
/// Providers fail independently: a timeout or error from one of them only
/// fills its own `errors` entry, the others are still returned.
#[derive(Clone)]
pub struct Aggregator {
    adapters: Arc<Vec<Arc<dyn ProviderAdapter>>>,
    settings: AggregatorSettings,
}

impl Aggregator {
    pub fn new(adapters: Vec<Arc<dyn ProviderAdapter>>, settings: AggregatorSettings) -> Self {
        Self {
            adapters: Arc::new(adapters),
            settings,
        }
    }

    pub fn provider_names(&self) -> Vec<&str> {
        self.adapters.iter().map(|adapter| adapter.name()).collect()
    }

    pub fn settings(&self) -> &AggregatorSettings {
        &self.settings
    }

    pub async fn handle(&self, request: ChatRequest) -> Result<AggregateResponse> {
        self.handle_with_cancel(request, CancellationToken::new())
            .await
    }

    /// Like [`handle`](Self::handle), but gives up on in-flight providers as
    /// soon as `cancel` fires.
    ///
    /// The attachment is deleted before returning on every path. If this
    /// future is dropped instead, the attachment's own drop removes it.
    pub async fn handle_with_cancel(
        &self,
        request: ChatRequest,
        cancel: CancellationToken,
    ) -> Result<AggregateResponse> {
        let ChatRequest { prompt, attachment } = request;

        let result = self.run(&prompt, attachment.as_ref(), &cancel).await;

        if let Some(attachment) = attachment {
            match attachment.cleanup() {
                Ok(path) => tracing::debug!(path = %path.display(), "Removed uploaded attachment"),
                Err(e) => tracing::warn!(error = %e, "Failed to remove uploaded attachment"),
            }
        }

        result
    }

    async fn run(
        &self,
        prompt: &str,
        attachment: Option<&UploadedAttachment>,
        cancel: &CancellationToken,
    ) -> Result<AggregateResponse> {
        if self.adapters.is_empty() {
            return Err(ChorusError::Configuration(
                "AI client is not initialized".to_string(),
            ));
        }

        self.validate_prompt(prompt, attachment.is_some())?;

        let image = match attachment {
            Some(attachment) => {
                let media_type: MediaType = attachment
                    .content_type()
                    .parse()
                    .map_err(|_| ChorusError::Validation(INVALID_IMAGE_MESSAGE.to_string()))?;
                Some((media_type, attachment.read().await?))
            }
            None => None,
        };

        let message = Arc::new(NormalizedMessage::build(
            prompt,
            image
                .as_ref()
                .map(|(media_type, bytes)| (*media_type, bytes.as_slice())),
        ));
        drop(image);

        let mut response = AggregateResponse::for_providers(self.provider_names());
        let mut unanswered: BTreeSet<String> = response.responses.keys().cloned().collect();
        let mut tasks = JoinSet::new();

        for adapter in self.adapters.iter() {
            let adapter = Arc::clone(adapter);
            let message = Arc::clone(&message);
            let timeout = self.settings.timeout;

            tasks.spawn(async move {
                let name = adapter.name().to_string();
                let started = Instant::now();
                let call = AssertUnwindSafe(adapter.invoke(&message)).catch_unwind();
                let result = with_timeout(
                    async {
                        call.await.unwrap_or_else(|_| {
                            Err(ProviderError::api(None, "Provider call panicked"))
                        })
                    },
                    timeout,
                    &name,
                )
                .await;
                (name, started.elapsed(), result)
            });
        }

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::info!(pending = tasks.len(), "Chat request cancelled, abandoning providers");
                    tasks.abort_all();
                    return Err(ChorusError::Cancelled);
                }
                next = tasks.join_next() => match next {
                    None => break,
                    Some(Ok((name, elapsed, result))) => {
                        unanswered.remove(&name);
                        response.record(self.outcome(name, elapsed, result));
                    }
                    Some(Err(e)) => {
                        tracing::error!(error = %e, "Provider task failed to complete");
                    }
                },
            }
        }

        // Tasks that died without reporting still owe their provider an error.
        for name in unanswered {
            response.record(ProviderOutcome::failure(name, GENERIC_ERROR));
        }

        Ok(response)
    }

    fn validate_prompt(&self, prompt: &str, has_attachment: bool) -> Result<()> {
        let blank = prompt.trim().is_empty();
        if blank && (!has_attachment || self.settings.require_prompt) {
            return Err(ChorusError::Validation("Prompt is required".to_string()));
        }

        if prompt.chars().count() > self.settings.max_prompt_chars {
            return Err(ChorusError::Validation(format!(
                "Prompt too long (max {} chars)",
                self.settings.max_prompt_chars
            )));
        }

        Ok(())
    }

    fn outcome(
        &self,
        name: String,
        elapsed: Duration,
        result: std::result::Result<String, ProviderError>,
    ) -> ProviderOutcome {
        let elapsed_ms = elapsed.as_millis() as u64;
        match result {
            Ok(text) => {
                tracing::info!(provider = %name, elapsed_ms, response_len = text.len(), "Provider responded");
                ProviderOutcome::success(name, text)
            }
            Err(error) => {
                tracing::warn!(provider = %name, elapsed_ms, status = ?error.status(), error = %error, "Provider failed");
                let message = sanitize(&error, self.settings.is_production);
                ProviderOutcome::failure(name, message)
            }
        }
    }
}
