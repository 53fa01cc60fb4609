//! Error types for aiops-tools

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Registry error type
///
/// These are contract violations raised before an adapter runs. Failures of
/// the external fetch itself are [`ToolFailure`] values, never errors.
#[derive(Debug, Error)]
pub enum Error {
    /// No capability registered under this name
    #[error("unknown capability: {0}")]
    UnknownCapability(String),

    /// A capability with this name is already registered
    #[error("duplicate capability: {0}")]
    DuplicateCapability(String),

    /// Arguments do not satisfy the capability's input schema
    #[error("schema violation for '{capability}': {detail}")]
    SchemaViolation {
        /// Capability name
        capability: String,
        /// Validation error
        detail: String,
    },

    /// HTTP client could not be built
    #[error("http client: {0}")]
    Http(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Typed failure kind of a single tool invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The requested entity does not exist upstream
    NotFound,
    /// Upstream unreachable or answered with a server error
    UpstreamUnavailable,
    /// Upstream rate limit hit
    RateLimited,
    /// Upstream answered with something we cannot interpret
    MalformedUpstreamResponse,
    /// Invocation exceeded its time budget
    Timeout,
    /// Run was cancelled before the invocation finished
    Cancelled,
    /// Resolved arguments did not satisfy the input schema
    SchemaViolation,
    /// Capability vanished between planning and execution
    UnknownCapability,
    /// A step this one depends on did not succeed
    DependencyFailed,
}

impl FailureKind {
    /// Returns the string representation
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::UpstreamUnavailable => "upstream_unavailable",
            Self::RateLimited => "rate_limited",
            Self::MalformedUpstreamResponse => "malformed_upstream_response",
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
            Self::SchemaViolation => "schema_violation",
            Self::UnknownCapability => "unknown_capability",
            Self::DependencyFailed => "dependency_failed",
        }
    }

    /// Whether the same invocation may succeed if retried
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::UpstreamUnavailable | Self::RateLimited | Self::Timeout
        )
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Typed failure returned by an adapter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolFailure {
    /// Failure kind
    pub kind: FailureKind,
    /// Human-readable detail (never contains credentials)
    pub message: String,
}

impl ToolFailure {
    /// Create a new failure
    #[must_use]
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// `NotFound` failure
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(FailureKind::NotFound, message)
    }

    /// `UpstreamUnavailable` failure
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(FailureKind::UpstreamUnavailable, message)
    }

    /// `RateLimited` failure
    #[must_use]
    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(FailureKind::RateLimited, message)
    }

    /// `MalformedUpstreamResponse` failure
    #[must_use]
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(FailureKind::MalformedUpstreamResponse, message)
    }

    /// Whether retrying may help
    #[must_use]
    pub fn is_transient(&self) -> bool {
        self.kind.is_transient()
    }
}

impl fmt::Display for ToolFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl From<Error> for ToolFailure {
    fn from(e: Error) -> Self {
        let kind = match &e {
            Error::UnknownCapability(_) => FailureKind::UnknownCapability,
            Error::SchemaViolation { .. } => FailureKind::SchemaViolation,
            Error::DuplicateCapability(_) | Error::Http(_) => FailureKind::UpstreamUnavailable,
        };
        Self::new(kind, e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_kinds() {
        assert!(FailureKind::UpstreamUnavailable.is_transient());
        assert!(FailureKind::RateLimited.is_transient());
        assert!(FailureKind::Timeout.is_transient());
        assert!(!FailureKind::NotFound.is_transient());
        assert!(!FailureKind::MalformedUpstreamResponse.is_transient());
        assert!(!FailureKind::DependencyFailed.is_transient());
    }

    #[test]
    fn test_failure_serialization() {
        let failure = ToolFailure::not_found("no such city: Atlantis");
        let json = serde_json::to_value(&failure).unwrap();
        assert_eq!(json["kind"], "not_found");
        assert_eq!(failure.to_string(), "not_found: no such city: Atlantis");
    }

    #[test]
    fn test_registry_error_conversion() {
        let failure: ToolFailure = Error::SchemaViolation {
            capability: "weather_current".into(),
            detail: "$.location: expected string, found integer".into(),
        }
        .into();
        assert_eq!(failure.kind, FailureKind::SchemaViolation);
        assert!(failure.message.contains("weather_current"));
    }
}
