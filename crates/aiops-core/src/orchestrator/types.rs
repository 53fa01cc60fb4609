//! Orchestrator types
//!
//! - `RunState` for the pipeline state machine
//! - `AnswerStatus` and `Answer` for the run report

use crate::error::FailureReason;
use crate::plan::Plan;
use crate::verifier::Verdict;
use aiops_tools::ToolResult;
use serde::Serialize;
use std::fmt;
use uuid::Uuid;

/// Pipeline state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum RunState {
    /// Asking the planner for a plan
    Planning,
    /// Running tool steps and synthesizing the draft
    Executing,
    /// Checking the draft
    Verifying,
    /// Starting another planning cycle
    Retrying,
    /// Answer produced
    Done,
    /// Terminal failure
    Failed(FailureReason),
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Planning => f.write_str("planning"),
            Self::Executing => f.write_str("executing"),
            Self::Verifying => f.write_str("verifying"),
            Self::Retrying => f.write_str("retrying"),
            Self::Done => f.write_str("done"),
            Self::Failed(reason) => write!(f, "failed({})", reason),
        }
    }
}

/// Whether the answer passed verification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AnswerStatus {
    /// Passed verification
    Verified,
    /// Best effort after the attempt bound
    Unverified,
}

/// Run report returned to the caller
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    /// Request id
    pub request_id: Uuid,
    /// Final answer text
    pub text: String,
    /// Passed verification
    pub verified: bool,
    /// Verified or unverified
    pub status: AnswerStatus,
    /// Why the answer is unverified
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<FailureReason>,
    /// Planning cycles used
    pub attempts: u32,
    /// Plan behind the returned draft
    pub plan: Plan,
    /// Tool results behind the returned draft
    pub tool_results: Vec<ToolResult>,
    /// Verdict on the returned draft
    pub verdict: Verdict,
    /// Categories flagged unavailable
    pub unavailable: Vec<String>,
    /// Wall-clock duration
    pub elapsed_ms: u64,
    /// States visited, in order
    pub transitions: Vec<RunState>,
}

impl Answer {
    /// Number of tool invocations behind the answer
    #[must_use]
    pub fn invocation_count(&self) -> usize {
        self.tool_results.len()
    }
}
