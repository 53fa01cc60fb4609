//! Verifier - checks a draft against the plan
//!
//! The plan is the checklist: every tool step's category must be either
//! answered or explicitly flagged unavailable, the draft must address the
//! request and must be internally coherent. The verifier never re-fetches
//! tool data.

use crate::error::Result;
use crate::executor::Draft;
use crate::plan::Plan;
use crate::request::Request;
use crate::stage;
use crate::utils::RetryConfig;
use aiops_llm::{OutputSchema, Prompt, ReasoningBackend};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

/// Default verifier instructions
pub const VERIFIER_INSTRUCTIONS: &str = r#"You are the verification stage of an assistant that answers questions with live tool data.
Judge the draft answer against the plan checklist and return STRICT JSON that matches the output schema.

Fail the draft only when:
- a checklist category is neither answered nor explicitly flagged as unavailable (list it in "missing_categories"),
- the draft does not address the user's request (describe it in "issues"),
- the draft contradicts itself (set "incoherent" to true).

A category the draft says is unavailable counts as covered. Do not ask for data the tools cannot provide and never invent data."#;

/// Pass or fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerdictStatus {
    /// Draft is acceptable
    Pass,
    /// Draft needs another attempt
    Fail,
}

/// Verifier judgment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Verdict {
    /// Pass or fail
    pub status: VerdictStatus,
    /// Plan categories the draft neither answers nor flags
    #[serde(default)]
    pub missing_categories: Vec<String>,
    /// Ways the draft fails to address the request
    #[serde(default)]
    pub issues: Vec<String>,
    /// Draft contradicts itself
    #[serde(default)]
    pub incoherent: bool,
}

impl Verdict {
    /// A clean pass
    #[must_use]
    pub fn pass() -> Self {
        Self {
            status: VerdictStatus::Pass,
            missing_categories: Vec::new(),
            issues: Vec::new(),
            incoherent: false,
        }
    }

    /// Whether the draft passed
    #[must_use]
    pub fn passed(&self) -> bool {
        self.status == VerdictStatus::Pass
    }

    /// Drop categories the plan does not contain and make the status agree
    /// with the remaining findings
    #[must_use]
    pub fn normalize(mut self, plan: &Plan) -> Self {
        let known: HashSet<&str> = plan.steps.iter().map(|s| s.category.as_str()).collect();
        let mut seen = HashSet::new();
        self.missing_categories
            .retain(|c| known.contains(c.as_str()) && seen.insert(c.clone()));
        if self.status == VerdictStatus::Pass
            && (!self.missing_categories.is_empty() || self.incoherent)
        {
            self.status = VerdictStatus::Fail;
        }
        self
    }
}

/// Output schema the verifier asks the backend to fill
#[must_use]
pub fn verdict_schema() -> OutputSchema {
    OutputSchema::new(
        "verdict",
        json!({
            "type": "object",
            "properties": {
                "status": {"type": "string", "enum": ["pass", "fail"]},
                "missing_categories": {"type": "array", "items": {"type": "string"}},
                "issues": {"type": "array", "items": {"type": "string"}},
                "incoherent": {"type": "boolean"}
            },
            "required": ["status"],
            "additionalProperties": false
        }),
    )
}

/// Verifier configuration
#[derive(Debug, Clone)]
pub struct VerifierConfig {
    /// System instructions
    pub instructions: String,
    /// Retry policy for transient backend failures
    pub retry: RetryConfig,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            instructions: VERIFIER_INSTRUCTIONS.to_string(),
            retry: RetryConfig::default(),
        }
    }
}

impl VerifierConfig {
    /// Set the backend retry policy
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
}

/// Judges drafts
pub struct Verifier {
    backend: Arc<dyn ReasoningBackend>,
    config: VerifierConfig,
}

impl Verifier {
    /// Create a new verifier
    pub fn new(backend: Arc<dyn ReasoningBackend>, config: VerifierConfig) -> Self {
        Self { backend, config }
    }

    /// Verify `draft` against `plan`
    #[instrument(skip_all, fields(request_id = %request.id))]
    pub async fn verify(
        &self,
        request: &Request,
        plan: &Plan,
        draft: &Draft,
        cancel: &CancellationToken,
    ) -> Result<Verdict> {
        let checklist: Vec<_> = plan
            .steps
            .iter()
            .map(|s| {
                json!({
                    "step_id": s.id,
                    "category": s.category,
                    "action": s.action,
                    "uses_tool": s.is_tool(),
                })
            })
            .collect();
        let prompt = Prompt::new(
            self.config.instructions.as_str(),
            format!("User request: {}", request.text),
        )
        .with_context(json!({
            "objective": plan.objective,
            "checklist": checklist,
            "draft": {
                "text": draft.text,
                "unavailable": draft.unavailable,
            },
        }));

        let verdict: Verdict = stage::complete(
            self.backend.as_ref(),
            &prompt,
            &verdict_schema(),
            &self.config.retry,
            cancel,
        )
        .await?;
        let verdict = verdict.normalize(plan);

        info!(
            passed = verdict.passed(),
            missing = ?verdict.missing_categories,
            issues = verdict.issues.len(),
            "Verification complete"
        );
        Ok(verdict)
    }
}
