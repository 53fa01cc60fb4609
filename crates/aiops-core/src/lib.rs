//! AI Ops Core - plan, execute, verify pipeline
//!
//! This crate turns a free-text request into a verified answer:
//! - Planner: request + capability catalogue to a validated plan
//! - Executor: layered, concurrent tool dispatch and draft synthesis
//! - Verifier: coverage and coherence check against the plan
//! - Orchestrator: the bounded re-planning state machine
//! - Utils: retry with backoff

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod executor;
pub mod orchestrator;
pub mod plan;
pub mod planner;
pub mod request;
pub mod utils;
pub mod verifier;

mod stage;

#[cfg(test)]
mod testing;

pub use error::{
    format_error_for_cli, Error, FailureReason, PipelineFailure, Result, UserFriendlyError,
};
pub use executor::{
    apply_no_fabrication_guard, draft_schema, Draft, Executor, ExecutorConfig,
    SYNTHESIS_INSTRUCTIONS,
};
pub use orchestrator::{Answer, AnswerStatus, Orchestrator, OrchestratorConfig, RunState};
pub use plan::{
    is_reference, parse_reference, plan_schema, substitute, Plan, PlanError, PlanStep, StepKind,
    StepRef,
};
pub use planner::{Planner, PlannerConfig, PlanningFeedback, PLANNER_INSTRUCTIONS};
pub use request::Request;
pub use utils::{retry_with_backoff, RetryConfig, RetryError};
pub use verifier::{
    verdict_schema, Verdict, VerdictStatus, Verifier, VerifierConfig, VERIFIER_INSTRUCTIONS,
};
