//! Planner - request to plan conversion
//!
//! Submits the request and the capability catalogue to the reasoning
//! backend with the plan schema, then checks the result against the
//! catalogue. Structural problems are `InvalidPlan` (the orchestrator may
//! re-plan); arguments that violate a capability's input schema are a
//! terminal `SchemaViolation`.

use crate::error::{Error, FailureReason, Result};
use crate::plan::{plan_schema, Plan};
use crate::request::Request;
use crate::stage;
use crate::utils::RetryConfig;
use crate::verifier::Verdict;
use aiops_llm::{Prompt, ReasoningBackend};
use aiops_tools::CapabilityCatalogue;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

/// Default planner instructions
pub const PLANNER_INSTRUCTIONS: &str = r#"You are the planning stage of an assistant that answers questions with live data from external tools.
Return a plan as STRICT JSON that matches the output schema.

Rules:
- Use only the capabilities listed under "capabilities" in the context. Never invent a capability name.
- Step ids are unique integers starting at 1.
- A tool step sets "capability" to a capability name and "arguments" to an object that matches that capability's input_schema.
- A step that needs no external data (jokes, definitions, general knowledge) sets "capability" to null and has no arguments.
- "category" names the kind of data a step provides, for example "weather", "repositories" or "news".
- To pass a value from an earlier step, use the string {{steps.<id>.<field.path>}} as the argument and list <id> in "depends_on".
- Keep the plan minimal: one step per piece of data the request needs.
- If the context contains "previous_attempt", the earlier plan failed; fix the problems it describes."#;

/// Planner configuration
#[derive(Debug, Clone)]
pub struct PlannerConfig {
    /// System instructions
    pub instructions: String,
    /// Retry policy for transient backend failures
    pub retry: RetryConfig,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            instructions: PLANNER_INSTRUCTIONS.to_string(),
            retry: RetryConfig::default(),
        }
    }
}

impl PlannerConfig {
    /// Create a new planner configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the system instructions
    #[must_use]
    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = instructions.into();
        self
    }

    /// Set the backend retry policy
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
}

/// Why the previous attempt failed, injected as planning context
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanningFeedback {
    /// Failure code of the previous attempt
    pub reason: FailureReason,
    /// Human-readable detail
    pub detail: String,
    /// Categories the verifier found missing
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub missing_categories: Vec<String>,
    /// Issues the verifier raised
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<String>,
    /// The plan that was rejected
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_plan: Option<Plan>,
}

impl PlanningFeedback {
    /// Feedback after an unusable plan
    pub fn invalid_plan(detail: impl Into<String>) -> Self {
        Self {
            reason: FailureReason::InvalidPlan,
            detail: detail.into(),
            missing_categories: Vec::new(),
            issues: Vec::new(),
            previous_plan: None,
        }
    }

    /// Feedback after a failed verification
    pub fn from_verdict(verdict: &Verdict, plan: &Plan) -> Self {
        Self {
            reason: FailureReason::VerificationExhausted,
            detail: "the answer built from this plan failed verification".to_string(),
            missing_categories: verdict.missing_categories.clone(),
            issues: verdict.issues.clone(),
            previous_plan: Some(plan.clone()),
        }
    }
}

/// Converts a request into a validated plan
pub struct Planner {
    backend: Arc<dyn ReasoningBackend>,
    config: PlannerConfig,
}

impl Planner {
    /// Create a new planner
    pub fn new(backend: Arc<dyn ReasoningBackend>, config: PlannerConfig) -> Self {
        Self { backend, config }
    }

    /// Get the configuration
    #[must_use]
    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    /// Produce a plan for `request`
    #[instrument(skip_all, fields(request_id = %request.id, replan = feedback.is_some()))]
    pub async fn plan(
        &self,
        request: &Request,
        catalogue: &CapabilityCatalogue,
        feedback: Option<&PlanningFeedback>,
        cancel: &CancellationToken,
    ) -> Result<Plan> {
        let mut context = json!({ "capabilities": catalogue.to_prompt_json() });
        if let Some(feedback) = feedback {
            context["previous_attempt"] =
                serde_json::to_value(feedback).map_err(|e| Error::Internal(e.to_string()))?;
        }
        let prompt = Prompt::new(
            self.config.instructions.as_str(),
            format!("User request: {}", request.text),
        )
        .with_context(context);

        let plan: Plan = match stage::complete(
            self.backend.as_ref(),
            &prompt,
            &plan_schema(),
            &self.config.retry,
            cancel,
        )
        .await
        {
            Ok(plan) => plan,
            Err(Error::Backend(aiops_llm::Error::MalformedOutput(detail))) => {
                warn!(error = %detail, "Backend returned an unusable plan");
                return Err(Error::InvalidPlan(detail));
            }
            Err(e) => return Err(e),
        };

        if let Err(e) = plan.validate(catalogue) {
            warn!(error = %e, "Plan rejected");
            return Err(e.into());
        }
        plan.check_arguments(catalogue)?;

        debug!(
            steps = plan.steps.len(),
            tool_steps = plan.tool_steps().count(),
            "Plan accepted"
        );
        Ok(plan)
    }
}
