//! Request fan-out: validation, per-provider timeouts, error sanitizing and
//! upload lifetime.

mod aggregator;
mod attachment;
mod sanitize;
mod timeout;

pub use aggregator::{Aggregator, AggregatorSettings, ChatRequest, INVALID_IMAGE_MESSAGE};
pub use attachment::UploadedAttachment;
pub use sanitize::{sanitize, GENERIC_ERROR};
pub use timeout::with_timeout;
