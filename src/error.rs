//! Error types for the Marquee service.

use thiserror::Error;

use crate::config::ConfigLoadError;

/// Process-level error type for Marquee operations.
///
/// Request-scoped failures never surface here; they are mapped to HTTP
/// responses by [`crate::http::ApiError`].
#[derive(Error, Debug)]
pub enum MarqueeError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigLoadError),

    /// The listener could not be bound during startup
    #[error("Failed to bind listener on {addr}: {source}")]
    Bind {
        addr: std::net::SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// The HTTP listener failed while serving or while shutting down
    #[error("Listener error: {0}")]
    Listener(#[source] std::io::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Marquee operations.
pub type Result<T> = std::result::Result<T, MarqueeError>;
