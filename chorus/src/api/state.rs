use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::chat::{Aggregator, AggregatorSettings};
use crate::config::Config;
use crate::providers::ProviderAdapter;

use super::rate_limit::RateLimiter;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub aggregator: Aggregator,
    pub rate_limiter: Arc<RateLimiter>,
    /// Cancelled on shutdown; in-flight chat requests stop waiting on providers.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(
        config: Config,
        adapters: Vec<Arc<dyn ProviderAdapter>>,
        shutdown: CancellationToken,
    ) -> Self {
        let aggregator = Aggregator::new(adapters, AggregatorSettings::from(&config));
        let rate_limiter = Arc::new(RateLimiter::new(&config.rate_limit));

        Self {
            config: Arc::new(config),
            aggregator,
            rate_limiter,
            shutdown,
        }
    }
}
