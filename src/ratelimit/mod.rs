//! Per-client rate limiting.

mod bucket;
mod client_key;
mod limiter;

pub use bucket::{BucketSettings, TokenBucket};
pub use client_key::{ClientKey, ClientKeyError};
pub use limiter::ClientRateLimiter;
