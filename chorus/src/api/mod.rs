pub mod handlers;
mod rate_limit;
mod routes;
mod state;

pub use rate_limit::{rate_limit_middleware, RateDecision, RateLimiter};
pub use routes::create_router;
pub use state::AppState;
