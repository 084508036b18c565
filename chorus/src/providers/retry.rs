use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::models::{MediaType, NormalizedMessage};

use super::{ProviderAdapter, ProviderError};

/// Retries the wrapped adapter exactly once, after a fixed delay, when the
/// first attempt fails with an overloaded-class error. Any other error is
/// returned as is.
pub struct RetryOnOverload {
    inner: Arc<dyn ProviderAdapter>,
    delay: Duration,
}

impl RetryOnOverload {
    pub fn new(inner: Arc<dyn ProviderAdapter>, delay: Duration) -> Self {
        Self { inner, delay }
    }
}

#[async_trait]
impl ProviderAdapter for RetryOnOverload {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn supported_media_types(&self) -> &[MediaType] {
        self.inner.supported_media_types()
    }

    async fn invoke(&self, message: &NormalizedMessage) -> Result<String, ProviderError> {
        match self.inner.invoke(message).await {
            Err(error) if error.is_overloaded() => {
                tracing::warn!(
                    provider = %self.inner.name(),
                    delay_ms = self.delay.as_millis() as u64,
                    error = %error,
                    "Provider overloaded, retrying once"
                );
                tokio::time::sleep(self.delay).await;
                self.inner.invoke(message).await
            }
            other => other,
        }
    }
}
