//! Per-client request limiting for `/api/*`.
//!
//! Clients are keyed by peer IP and share one `governor` keyed limiter. The
//! quota is `max_requests` per window as a burst, refilled evenly across the
//! window. Responses carry draft-7 `RateLimit` / `RateLimit-Policy` headers.

use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::time::Duration;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{HeaderMap, HeaderValue, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::clock::{Clock, DefaultClock};
use governor::middleware::StateInformationMiddleware;
use governor::state::keyed::DefaultKeyedStateStore;
use governor::{Quota, RateLimiter as KeyedLimiter};

use crate::config::RateLimitConfig;
use crate::error::ChorusError;

use super::state::AppState;

/// Idle client entries are dropped once the table grows past this size.
const SWEEP_THRESHOLD: usize = 10_000;

type ClientLimiter =
    KeyedLimiter<String, DefaultKeyedStateStore<String>, DefaultClock, StateInformationMiddleware>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed { remaining: u32, reset_secs: u64 },
    Limited { reset_secs: u64 },
}

pub struct RateLimiter {
    limiter: ClientLimiter,
    clock: DefaultClock,
    window: Duration,
    max_requests: NonZeroU32,
    /// Time for one request slot to refill.
    replenish: Duration,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        let max_requests = NonZeroU32::new(config.max_requests).unwrap_or(NonZeroU32::MIN);
        let window = Duration::from_millis(config.window_ms);
        let replenish = window / max_requests.get();

        let quota = Quota::with_period(replenish)
            .unwrap_or_else(|| Quota::per_second(max_requests))
            .allow_burst(max_requests);

        Self {
            limiter: KeyedLimiter::keyed(quota).with_middleware::<StateInformationMiddleware>(),
            clock: DefaultClock::default(),
            window,
            max_requests,
            replenish,
        }
    }

    pub fn max_requests(&self) -> u32 {
        self.max_requests.get()
    }

    pub fn window_secs(&self) -> u64 {
        self.window.as_secs().max(1)
    }

    /// Count one request for `key` and decide whether it may proceed.
    pub fn check(&self, key: &str) -> RateDecision {
        if self.limiter.len() > SWEEP_THRESHOLD {
            self.limiter.retain_recent();
        }

        match self.limiter.check_key(&key.to_string()) {
            Ok(snapshot) => {
                let remaining = snapshot.remaining_burst_capacity();
                let used = self.max_requests.get().saturating_sub(remaining);
                RateDecision::Allowed {
                    remaining,
                    reset_secs: ceil_secs(self.replenish * used),
                }
            }
            Err(not_until) => RateDecision::Limited {
                reset_secs: ceil_secs(not_until.wait_time_from(self.clock.now())).max(1),
            },
        }
    }

    fn insert_headers(&self, headers: &mut HeaderMap, remaining: u32, reset_secs: u64) {
        let limit = format!(
            "limit={}, remaining={}, reset={}",
            self.max_requests, remaining, reset_secs
        );
        let policy = format!("{};w={}", self.max_requests, self.window_secs());

        if let Ok(value) = HeaderValue::from_str(&limit) {
            headers.insert("ratelimit", value);
        }
        if let Ok(value) = HeaderValue::from_str(&policy) {
            headers.insert("ratelimit-policy", value);
        }
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("window", &self.window)
            .field("max_requests", &self.max_requests)
            .finish_non_exhaustive()
    }
}

fn ceil_secs(duration: Duration) -> u64 {
    duration.as_secs_f64().ceil() as u64
}

fn client_key(request: &Request<Body>) -> String {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let key = client_key(&request);
    let limiter = &state.rate_limiter;

    match limiter.check(&key) {
        RateDecision::Allowed {
            remaining,
            reset_secs,
        } => {
            let mut response = next.run(request).await;
            limiter.insert_headers(response.headers_mut(), remaining, reset_secs);
            response
        }
        RateDecision::Limited { reset_secs } => {
            tracing::warn!(client = %key, "Rate limit exceeded");
            let mut response = ChorusError::RateLimited {
                retry_after_secs: reset_secs,
            }
            .into_response();
            limiter.insert_headers(response.headers_mut(), 0, reset_secs);
            response
        }
    }
}
