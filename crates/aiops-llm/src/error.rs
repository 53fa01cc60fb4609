//! Error types for aiops-llm

use thiserror::Error;

/// Reasoning backend error type
#[derive(Debug, Error)]
pub enum Error {
    /// Provider not configured (missing key, empty model, ...)
    #[error("provider not configured: {0}")]
    NotConfigured(String),

    /// Credentials rejected by the provider
    #[error("authentication failed: {0}")]
    AuthError(String),

    /// Rate limit exceeded
    #[error("rate limit exceeded")]
    RateLimited,

    /// Request did not complete in time
    #[error("timeout after {0}ms")]
    Timeout(u64),

    /// Output did not parse or did not conform to the requested schema
    #[error("malformed output: {0}")]
    MalformedOutput(String),

    /// Network error
    #[error("network error: {0}")]
    Network(String),

    /// Non-success response from the provider
    #[error("api error: {0}")]
    Api(String),
}

impl Error {
    /// Whether retrying the same request may succeed
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::RateLimited | Self::Network(_) | Self::Timeout(_))
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
