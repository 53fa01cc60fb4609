//! Error types for aiops-core
//!
//! Internal stage errors ([`Error`]) are collapsed into a closed set of
//! caller-visible codes ([`FailureReason`]) before they leave the
//! orchestrator as a [`PipelineFailure`].

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Core error type
#[derive(Debug, Error)]
pub enum Error {
    /// The plan is structurally unusable (retryable within the attempt bound)
    #[error("invalid plan: {0}")]
    InvalidPlan(String),

    /// Plan arguments violate a capability's input schema
    #[error("schema violation in step {step}: {detail}")]
    SchemaViolation {
        /// Offending step id
        step: u32,
        /// Validation detail
        detail: String,
    },

    /// Invalid configuration
    #[error("invalid configuration: {field}")]
    InvalidConfig {
        /// Config field name
        field: String,
        /// Detailed message
        message: String,
    },

    /// Reasoning backend error (after stage retries)
    #[error("backend error: {0}")]
    Backend(#[from] aiops_llm::Error),

    /// Tool registry error
    #[error("tool error: {0}")]
    Tool(#[from] aiops_tools::Error),

    /// Run deadline elapsed
    #[error("timed out after {0}ms")]
    Timeout(u64),

    /// Run cancelled
    #[error("run cancelled")]
    Cancelled,

    /// Internal error (serialization, etc.)
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Caller-visible code for this error
    #[must_use]
    pub fn reason(&self) -> FailureReason {
        match self {
            Error::InvalidPlan(_) => FailureReason::InvalidPlan,
            Error::SchemaViolation { .. } => FailureReason::SchemaViolation,
            Error::Timeout(_) => FailureReason::Timeout,
            Error::Cancelled => FailureReason::Cancelled,
            Error::Backend(aiops_llm::Error::Timeout(_)) => FailureReason::Timeout,
            Error::InvalidConfig { .. }
            | Error::Backend(_)
            | Error::Tool(_)
            | Error::Internal(_) => FailureReason::UpstreamFailure,
        }
    }
}

/// Closed set of failure codes a caller can observe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// Plan arguments violate a capability schema (terminal)
    SchemaViolation,
    /// Planner kept producing unusable plans
    InvalidPlan,
    /// A backend stage failed after retries (terminal)
    UpstreamFailure,
    /// Every attempt failed verification; best draft returned unverified
    VerificationExhausted,
    /// Overall deadline elapsed
    Timeout,
    /// Run was cancelled
    Cancelled,
}

impl FailureReason {
    /// Stable snake_case code
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SchemaViolation => "schema_violation",
            Self::InvalidPlan => "invalid_plan",
            Self::UpstreamFailure => "upstream_failure",
            Self::VerificationExhausted => "verification_exhausted",
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal failure of a pipeline run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{reason}: {message}")]
pub struct PipelineFailure {
    /// Failure code
    pub reason: FailureReason,
    /// Human-readable detail
    pub message: String,
    /// Request the failure belongs to
    pub request_id: Option<Uuid>,
    /// Planning cycles consumed before failing
    pub attempts: u32,
}

impl PipelineFailure {
    /// Create a failure with no request context
    pub fn new(reason: FailureReason, message: impl Into<String>) -> Self {
        Self {
            reason,
            message: message.into(),
            request_id: None,
            attempts: 0,
        }
    }

    /// Build from a stage error
    pub fn from_error(error: &Error, request_id: Uuid, attempts: u32) -> Self {
        Self {
            reason: error.reason(),
            message: error.to_string(),
            request_id: Some(request_id),
            attempts,
        }
    }
}

/// Trait for user-friendly error messages
///
/// Provides human-readable error messages and suggestions for fixing.
pub trait UserFriendlyError {
    /// Get a user-friendly error message
    fn user_message(&self) -> String;

    /// Get a suggestion for how to fix the error
    fn suggestion(&self) -> Option<String>;
}

impl UserFriendlyError for Error {
    fn user_message(&self) -> String {
        match self {
            Error::InvalidPlan(msg) => format!("📋 Could not build a usable plan: {}", msg),
            Error::SchemaViolation { step, detail } => {
                format!("📋 Step {} has invalid arguments: {}", step, detail)
            }
            Error::InvalidConfig { field, message } => {
                format!("⚙️ Configuration error in '{}': {}", field, message)
            }
            Error::Backend(aiops_llm::Error::NotConfigured(msg)) => {
                format!("🔑 Reasoning backend is not configured: {}", msg)
            }
            Error::Backend(e) => format!("🤖 Reasoning backend error: {}", e),
            Error::Tool(e) => format!("🔧 Tool error: {}", e),
            Error::Timeout(ms) => format!("⏳ No answer within {} seconds.", ms / 1000),
            Error::Cancelled => "✋ The request was cancelled.".to_string(),
            Error::Internal(msg) => format!("❌ Internal error: {}", msg),
        }
    }

    fn suggestion(&self) -> Option<String> {
        match self {
            Error::InvalidPlan(_) | Error::SchemaViolation { .. } => {
                Some("💡 Try rephrasing the request more specifically.".to_string())
            }
            Error::InvalidConfig { field, .. } => Some(format!(
                "💡 Check the '{}' setting in config/default.toml or the AIOPS_ environment variables.",
                field
            )),
            Error::Backend(aiops_llm::Error::NotConfigured(_) | aiops_llm::Error::AuthError(_)) => {
                Some("💡 Set the GROQ_API_KEY environment variable or add it to .env.".to_string())
            }
            Error::Backend(aiops_llm::Error::RateLimited) => {
                Some("💡 Wait a moment before retrying.".to_string())
            }
            Error::Timeout(_) => Some("💡 Retry with a larger --timeout.".to_string()),
            _ => None,
        }
    }
}

impl UserFriendlyError for PipelineFailure {
    fn user_message(&self) -> String {
        match self.reason {
            FailureReason::SchemaViolation => {
                format!("📋 The plan asked a tool for invalid input: {}", self.message)
            }
            FailureReason::InvalidPlan => format!(
                "📋 Could not build a usable plan after {} attempt(s): {}",
                self.attempts, self.message
            ),
            FailureReason::UpstreamFailure => {
                format!("🤖 A required service failed: {}", self.message)
            }
            FailureReason::VerificationExhausted => {
                format!("🔍 The answer could not be verified: {}", self.message)
            }
            FailureReason::Timeout => format!("⏳ Timed out: {}", self.message),
            FailureReason::Cancelled => "✋ The request was cancelled.".to_string(),
        }
    }

    fn suggestion(&self) -> Option<String> {
        match self.reason {
            FailureReason::SchemaViolation | FailureReason::InvalidPlan => {
                Some("💡 Try rephrasing the request more specifically.".to_string())
            }
            FailureReason::UpstreamFailure => Some(
                "💡 Check GROQ_API_KEY and your network connection, then retry.".to_string(),
            ),
            FailureReason::VerificationExhausted => {
                Some("💡 Increase --rounds to allow more attempts.".to_string())
            }
            FailureReason::Timeout => Some("💡 Retry with a larger --timeout.".to_string()),
            FailureReason::Cancelled => None,
        }
    }
}

/// Format an error for display in the CLI
pub fn format_error_for_cli(error: &dyn UserFriendlyError) -> String {
    let mut output = String::new();

    output.push_str(&error.user_message());
    output.push_str("\n\n");

    if let Some(suggestion) = error.suggestion() {
        output.push_str(&suggestion);
        output.push('\n');
    }

    output
}
