//! Executor - runs plan steps and synthesizes the draft
//!
//! Steps are grouped into dependency layers. Each layer is dispatched
//! concurrently and fully awaited before the next one starts, so a step
//! never starts before everything it depends on has settled.
//!
//! Failed invocations are recorded as data and never abort the run. A
//! step whose dependency failed is recorded as `DependencyFailed` without
//! being invoked. Transient failures are retried here; adapters and the
//! runner make a single attempt.

use crate::error::Result;
use crate::plan::{substitute, Plan, PlanStep, StepKind};
use crate::request::Request;
use crate::stage;
use crate::utils::{retry_with_backoff, RetryConfig};
use aiops_llm::{OutputSchema, Prompt, ReasoningBackend};
use aiops_tools::{FailureKind, ToolFailure, ToolResult, ToolRunner};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Default synthesis instructions
pub const SYNTHESIS_INSTRUCTIONS: &str = r#"You are the answering stage of an assistant that answers questions with live tool data.
Write the final answer to the user's request using ONLY the tool results in the context, plus your own knowledge for steps that use no tool.
Return STRICT JSON that matches the output schema.

Rules:
- Never invent data a tool did not return. If a result has status "failure", say that this data is unavailable.
- List the category of every step whose data is missing or unusable in "unavailable".
- Quote concrete values (temperatures, names, counts) exactly as the tools returned them.
- Be concise and answer in the language of the request."#;

const UNAVAILABLE_MARKERS: &[&str] = &[
    "unavailable",
    "not available",
    "could not",
    "couldn't",
    "unable to",
    "failed",
];

/// Executor configuration
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Synthesis instructions
    pub instructions: String,
    /// Retry policy for transient tool failures
    pub tool_retry: RetryConfig,
    /// Retry policy for transient backend failures
    pub backend_retry: RetryConfig,
    /// Maximum concurrent invocations within a layer (0 = unbounded)
    pub max_concurrency: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            instructions: SYNTHESIS_INSTRUCTIONS.to_string(),
            tool_retry: RetryConfig::default(),
            backend_retry: RetryConfig::default(),
            max_concurrency: 0,
        }
    }
}

impl ExecutorConfig {
    /// Create a new executor configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the tool retry policy
    #[must_use]
    pub fn with_tool_retry(mut self, retry: RetryConfig) -> Self {
        self.tool_retry = retry;
        self
    }

    /// Set the backend retry policy
    #[must_use]
    pub fn with_backend_retry(mut self, retry: RetryConfig) -> Self {
        self.backend_retry = retry;
        self
    }

    /// Bound concurrent invocations per layer
    #[must_use]
    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = max;
        self
    }
}

/// Synthesized answer awaiting verification
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Draft {
    /// Answer text
    pub text: String,
    /// Categories explicitly flagged as unavailable
    pub unavailable: Vec<String>,
    /// Results the draft was built from, in plan order
    pub tool_results: Vec<ToolResult>,
}

impl Draft {
    /// Categories of tool steps that did not succeed
    #[must_use]
    pub fn failed_categories(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.tool_results
            .iter()
            .filter(|r| !r.is_success())
            .map(|r| r.category.as_str())
            .filter(|c| seen.insert(*c))
            .collect()
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SynthesizedDraft {
    text: String,
    #[serde(default)]
    unavailable: Vec<String>,
}

/// Output schema the synthesis step asks the backend to fill
#[must_use]
pub fn draft_schema() -> OutputSchema {
    OutputSchema::new(
        "draft",
        json!({
            "type": "object",
            "properties": {
                "text": {"type": "string", "minLength": 1},
                "unavailable": {"type": "array", "items": {"type": "string"}}
            },
            "required": ["text"],
            "additionalProperties": false
        }),
    )
}

/// Runs plans
pub struct Executor {
    backend: Arc<dyn ReasoningBackend>,
    runner: ToolRunner,
    config: ExecutorConfig,
}

impl Executor {
    /// Create a new executor
    pub fn new(backend: Arc<dyn ReasoningBackend>, runner: ToolRunner, config: ExecutorConfig) -> Self {
        Self {
            backend,
            runner,
            config,
        }
    }

    /// The tool runner
    #[must_use]
    pub fn runner(&self) -> &ToolRunner {
        &self.runner
    }

    /// Run every step, then synthesize the draft
    #[instrument(skip_all, fields(request_id = %request.id, steps = plan.steps.len()))]
    pub async fn execute(
        &self,
        request: &Request,
        plan: &Plan,
        cancel: &CancellationToken,
    ) -> Result<Draft> {
        let tool_results = self.run_steps(plan, cancel).await?;
        self.synthesize(request, plan, tool_results, cancel).await
    }

    /// Invoke all tool steps layer by layer
    pub async fn run_steps(
        &self,
        plan: &Plan,
        cancel: &CancellationToken,
    ) -> Result<Vec<ToolResult>> {
        let layers = plan.layers()?;
        let semaphore = (self.config.max_concurrency > 0)
            .then(|| Semaphore::new(self.config.max_concurrency));

        let mut payloads: HashMap<u32, Value> = HashMap::new();
        let mut failed: HashSet<u32> = HashSet::new();
        let mut results = Vec::new();

        for (index, layer) in layers.iter().enumerate() {
            let tasks = layer.iter().filter_map(|step| match &step.kind {
                StepKind::ToolInvocation {
                    capability,
                    arguments,
                } => Some(self.run_step(
                    step,
                    capability,
                    arguments,
                    &payloads,
                    &failed,
                    semaphore.as_ref(),
                    cancel,
                )),
                StepKind::DirectAnswer => None,
            });
            let settled = join_all(tasks).await;
            debug!(layer = index, dispatched = settled.len(), "Layer settled");

            for result in settled {
                match result.payload() {
                    Some(payload) => {
                        payloads.insert(result.step_id, payload.clone());
                    }
                    None => {
                        failed.insert(result.step_id);
                    }
                }
                results.push(result);
            }
        }

        let position: HashMap<u32, usize> = plan
            .steps
            .iter()
            .enumerate()
            .map(|(i, s)| (s.id, i))
            .collect();
        results.sort_by_key(|r: &ToolResult| position.get(&r.step_id).copied());
        Ok(results)
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_step(
        &self,
        step: &PlanStep,
        capability: &str,
        arguments: &Value,
        payloads: &HashMap<u32, Value>,
        failed: &HashSet<u32>,
        semaphore: Option<&Semaphore>,
        cancel: &CancellationToken,
    ) -> ToolResult {
        let start = Instant::now();

        let (arguments, result) = match step.dependencies().into_iter().find(|d| failed.contains(d)) {
            Some(dependency) => (
                arguments.clone(),
                Err(ToolFailure::new(
                    FailureKind::DependencyFailed,
                    format!("step {} did not succeed", dependency),
                )),
            ),
            None => match substitute(arguments, payloads) {
                Ok(resolved) => {
                    let result = self.invoke(capability, &resolved, semaphore, cancel).await;
                    (resolved, result)
                }
                Err(detail) => (
                    arguments.clone(),
                    Err(ToolFailure::new(FailureKind::SchemaViolation, detail)),
                ),
            },
        };

        let duration_ms = start.elapsed().as_millis() as u64;
        match &result {
            Ok(_) => info!(
                step = step.id,
                tool = %capability,
                duration_ms,
                success = true,
                "Step completed"
            ),
            Err(failure) => warn!(
                step = step.id,
                tool = %capability,
                duration_ms,
                success = false,
                kind = %failure.kind,
                error = %failure.message,
                "Step failed"
            ),
        }

        ToolResult {
            step_id: step.id,
            capability: capability.to_string(),
            category: step.category.clone(),
            arguments,
            outcome: result.into(),
            duration_ms,
        }
    }

    async fn invoke(
        &self,
        capability: &str,
        arguments: &Value,
        semaphore: Option<&Semaphore>,
        cancel: &CancellationToken,
    ) -> std::result::Result<Value, ToolFailure> {
        // Re-checked after substitution: references may resolve to the wrong type
        self.runner.validate(capability, arguments)?;

        let _permit = match semaphore {
            Some(s) => s.acquire().await.ok(),
            None => None,
        };

        let runner = &self.runner;
        retry_with_backoff(
            &self.config.tool_retry,
            cancel,
            move || {
                let arguments = arguments.clone();
                async move { runner.execute(capability, arguments, cancel).await }
            },
            ToolFailure::is_transient,
        )
        .await
        .map_err(|e| {
            if e.cancelled {
                ToolFailure::new(FailureKind::Cancelled, "run cancelled")
            } else {
                e.last_error
            }
        })
    }

    /// Ask the backend for the draft, then apply the no-fabrication guard
    pub async fn synthesize(
        &self,
        request: &Request,
        plan: &Plan,
        tool_results: Vec<ToolResult>,
        cancel: &CancellationToken,
    ) -> Result<Draft> {
        let prompt = Prompt::new(
            self.config.instructions.as_str(),
            format!("User request: {}", request.text),
        )
        .with_context(json!({
            "objective": plan.objective,
            "steps": plan.steps,
            "tool_results": tool_results,
        }));

        let synthesized: SynthesizedDraft = stage::complete(
            self.backend.as_ref(),
            &prompt,
            &draft_schema(),
            &self.config.backend_retry,
            cancel,
        )
        .await?;

        let (text, unavailable) = apply_no_fabrication_guard(
            plan,
            &tool_results,
            synthesized.text,
            synthesized.unavailable,
        );
        Ok(Draft {
            text,
            unavailable,
            tool_results,
        })
    }
}

/// Force every failed category into `unavailable` and into the text
///
/// Categories the model flagged that are not in the plan are dropped. A
/// failed category whose unavailability the text does not already state
/// gets an explicit note appended.
pub fn apply_no_fabrication_guard(
    plan: &Plan,
    tool_results: &[ToolResult],
    mut text: String,
    flagged: Vec<String>,
) -> (String, Vec<String>) {
    let known: HashSet<&str> = plan.steps.iter().map(|s| s.category.as_str()).collect();
    let mut unavailable: Vec<String> = Vec::new();
    for category in flagged {
        if known.contains(category.as_str()) && !unavailable.contains(&category) {
            unavailable.push(category);
        }
    }

    for result in tool_results.iter().filter(|r| !r.is_success()) {
        if !unavailable.contains(&result.category) {
            unavailable.push(result.category.clone());
        }
        if !states_unavailable(&text, &result.category) {
            let kind = result
                .failure()
                .map_or("unknown", |f| f.kind.as_str());
            text.push_str(&format!(
                "\n\nNote: {} data is unavailable ({}).",
                result.category, kind
            ));
        }
    }
    (text, unavailable)
}

/// True when one sentence names the category and states it is unavailable
fn states_unavailable(text: &str, category: &str) -> bool {
    let lower = text.to_lowercase();
    let category = category.to_lowercase().replace('_', " ");
    lower
        .split(['.', '!', '?', ';', '\n'])
        .map(|sentence| sentence.replace('_', " "))
        .any(|sentence| {
            sentence.contains(&category) && UNAVAILABLE_MARKERS.iter().any(|m| sentence.contains(m))
        })
}
