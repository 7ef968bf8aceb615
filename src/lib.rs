//! Marquee - Movie Catalog JSON API
//!
//! A JSON API over a movie catalog. Requests pass through a per-client
//! token-bucket limiter and a bearer-token resolver before reaching
//! permission-gated handlers. Updates use optimistic concurrency, and the
//! process drains in-flight requests and background work on shutdown.

pub mod auth;
pub mod background;
pub mod catalog;
pub mod concurrency;
pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod notify;
pub mod ratelimit;
pub mod store;
pub mod validation;

pub use error::{MarqueeError, Result};
