//! End-to-end pipeline tests with a scripted backend and stub capabilities

use aiops_core::{
    AnswerStatus, FailureReason, Orchestrator, OrchestratorConfig, RetryConfig, RunState,
};
use aiops_llm::{OutputSchema, Prompt, ReasoningBackend};
use aiops_tools::{CapabilityDescriptor, Tool, ToolFailure, ToolRegistry};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_test::assert_ok;

// ============================================================================
// Test doubles
// ============================================================================

type Reply = dyn Fn(&Value) -> Result<Value, ToolFailure> + Send + Sync;

struct LocationTool {
    descriptor: CapabilityDescriptor,
    reply: Box<Reply>,
    calls: AtomicU32,
}

impl LocationTool {
    fn new(
        name: &str,
        reply: impl Fn(&Value) -> Result<Value, ToolFailure> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            descriptor: CapabilityDescriptor::new(name, format!("{} lookup", name))
                .with_input_schema(json!({
                    "type": "object",
                    "properties": {"location": {"type": "string", "minLength": 1}},
                    "required": ["location"],
                    "additionalProperties": false
                })),
            reply: Box::new(reply),
            calls: AtomicU32::new(0),
        })
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Tool for LocationTool {
    fn descriptor(&self) -> &CapabilityDescriptor {
        &self.descriptor
    }

    async fn execute(&self, args: Value) -> Result<Value, ToolFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        (self.reply)(&args)
    }
}

/// Backend that plans from the request text, writes the draft from the tool
/// payloads it is shown and replays a verdict script
struct ScriptedBackend {
    plans: Vec<(&'static str, Value)>,
    verdicts: Vec<Value>,
    verdict_calls: AtomicU32,
    plan_prompts: Mutex<Vec<Prompt>>,
}

impl ScriptedBackend {
    fn new(plans: Vec<(&'static str, Value)>, verdicts: Vec<Value>) -> Arc<Self> {
        Arc::new(Self {
            plans,
            verdicts,
            verdict_calls: AtomicU32::new(0),
            plan_prompts: Mutex::new(Vec::new()),
        })
    }

    fn plan_prompts(&self) -> Vec<Prompt> {
        self.plan_prompts.lock().unwrap().clone()
    }

    fn draft(context: &Value) -> Value {
        let results = context["tool_results"].as_array().cloned().unwrap_or_default();
        if results.is_empty() {
            return json!({"text": "Why do programmers prefer dark mode? Because light attracts bugs."});
        }
        let facts: Vec<String> = results
            .iter()
            .filter_map(|r| {
                let payload = &r["outcome"]["payload"];
                payload.as_object()?;
                Some(format!(
                    "{}: {}, {}°C",
                    r["category"].as_str().unwrap_or_default(),
                    payload["condition"].as_str().unwrap_or_default(),
                    payload["tempC"]
                ))
            })
            .collect();
        json!({"text": facts.join("; ")})
    }
}

#[async_trait::async_trait]
impl ReasoningBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, prompt: &Prompt, schema: &OutputSchema) -> aiops_llm::Result<Value> {
        match schema.name.as_str() {
            "plan" => {
                self.plan_prompts.lock().unwrap().push(prompt.clone());
                let plan = self
                    .plans
                    .iter()
                    .find(|(keyword, _)| prompt.task.to_lowercase().contains(keyword))
                    .map(|(_, plan)| plan.clone())
                    .unwrap_or_else(|| self.plans[0].1.clone());
                Ok(plan)
            }
            "draft" => Ok(Self::draft(&prompt.context)),
            _ => {
                let i = self.verdict_calls.fetch_add(1, Ordering::SeqCst) as usize;
                Ok(self.verdicts[i.min(self.verdicts.len() - 1)].clone())
            }
        }
    }
}

// ============================================================================
// Fixtures
// ============================================================================

fn fast() -> RetryConfig {
    RetryConfig::new()
        .with_max_attempts(1)
        .with_initial_delay(Duration::from_millis(1))
        .with_jitter(false)
}

fn config(max_attempts: u32) -> OrchestratorConfig {
    OrchestratorConfig::new()
        .with_max_attempts(max_attempts)
        .with_timeout(Some(Duration::from_secs(10)))
        .with_backend_retry(fast())
        .with_tool_retry(fast())
}

fn mumbai_weather() -> Arc<LocationTool> {
    LocationTool::new("weather_current", |args| {
        assert_eq!(args["location"], "Mumbai");
        Ok(json!({"condition": "Rain", "tempC": 27}))
    })
}

fn registry(tools: Vec<Arc<LocationTool>>) -> Arc<ToolRegistry> {
    let mut registry = ToolRegistry::new();
    for tool in tools {
        registry.register(tool).unwrap();
    }
    Arc::new(registry)
}

fn weather_plan() -> Value {
    json!({
        "objective": "Report current weather in Mumbai",
        "steps": [{
            "id": 1,
            "action": "Fetch current weather for Mumbai",
            "category": "weather",
            "capability": "weather_current",
            "arguments": {"location": "Mumbai"}
        }]
    })
}

fn joke_plan() -> Value {
    json!({
        "objective": "Tell a programming joke",
        "steps": [{
            "id": 1,
            "action": "Write a short joke",
            "category": "humor"
        }]
    })
}

fn pass() -> Value {
    json!({"status": "pass"})
}

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test]
async fn test_weather_request_verified() {
    let tool = mumbai_weather();
    let backend = ScriptedBackend::new(vec![("weather", weather_plan())], vec![pass()]);
    let orchestrator = Orchestrator::new(backend, registry(vec![tool.clone()]), config(2));

    let answer = assert_ok!(
        orchestrator
            .answer("What's the weather in Mumbai?", None)
            .await
    );

    assert!(answer.verified);
    assert_eq!(answer.status, AnswerStatus::Verified);
    assert_eq!(answer.plan.steps.len(), 1);
    assert_eq!(answer.invocation_count(), 1);
    assert_eq!(tool.calls(), 1);
    assert!(answer.text.contains("Rain"));
    assert!(answer.text.contains("27"));
    assert!(answer.unavailable.is_empty());
    assert_eq!(answer.transitions.last(), Some(&RunState::Done));
}

#[tokio::test]
async fn test_direct_answer_needs_no_tools() {
    let tool = mumbai_weather();
    let backend = ScriptedBackend::new(vec![("joke", joke_plan())], vec![pass()]);
    let orchestrator = Orchestrator::new(backend, registry(vec![tool.clone()]), config(2));

    let answer = orchestrator
        .answer("Tell me a programming joke", None)
        .await
        .unwrap();

    assert!(answer.verified);
    assert_eq!(answer.invocation_count(), 0);
    assert!(answer.tool_results.is_empty());
    assert_eq!(tool.calls(), 0);
    assert!(!answer.text.is_empty());
}

#[tokio::test]
async fn test_verification_retries_are_bounded() {
    let tool = mumbai_weather();
    let backend = ScriptedBackend::new(
        vec![("weather", weather_plan())],
        vec![json!({"status": "fail", "missing_categories": ["weather"]})],
    );
    let orchestrator =
        Orchestrator::new(backend.clone(), registry(vec![tool.clone()]), config(3));

    let answer = orchestrator.answer("weather in Mumbai", None).await.unwrap();

    assert!(!answer.verified);
    assert_eq!(answer.status, AnswerStatus::Unverified);
    assert_eq!(answer.reason, Some(FailureReason::VerificationExhausted));
    assert_eq!(answer.attempts, 3);
    assert_eq!(tool.calls(), 3);
    assert_eq!(backend.plan_prompts().len(), 3);
    assert_eq!(
        answer.transitions.last(),
        Some(&RunState::Failed(FailureReason::VerificationExhausted))
    );
    // Later planning rounds see why the previous attempt failed
    let last = backend.plan_prompts().pop().unwrap();
    assert_eq!(
        last.context["previous_attempt"]["missing_categories"],
        json!(["weather"])
    );
}

#[tokio::test]
async fn test_partial_failure_is_reported_not_fabricated() {
    let weather = mumbai_weather();
    let air = LocationTool::new("air_quality", |_| {
        Err(ToolFailure::not_found("no station near Mumbai"))
    });
    let plan = json!({
        "objective": "Weather and air quality in Mumbai",
        "steps": [
            {
                "id": 1,
                "action": "Fetch weather",
                "category": "weather",
                "capability": "weather_current",
                "arguments": {"location": "Mumbai"}
            },
            {
                "id": 2,
                "action": "Fetch air quality",
                "category": "air_quality",
                "capability": "air_quality",
                "arguments": {"location": "Mumbai"}
            }
        ]
    });
    let backend = ScriptedBackend::new(vec![("mumbai", plan)], vec![pass()]);
    let orchestrator = Orchestrator::new(
        backend,
        registry(vec![weather.clone(), air.clone()]),
        config(2),
    );

    let answer = orchestrator
        .answer("Weather and air quality in Mumbai", None)
        .await
        .unwrap();

    assert_eq!(weather.calls(), 1);
    assert_eq!(air.calls(), 1);
    assert_eq!(answer.unavailable, vec!["air_quality".to_string()]);
    assert!(answer.text.contains("Rain"));
    assert!(answer.text.contains("air_quality data is unavailable"));
}

#[tokio::test]
async fn test_unknown_capability_is_invalid_plan() {
    let plan = json!({
        "objective": "Check stocks",
        "steps": [{
            "id": 1,
            "action": "Fetch quote",
            "category": "finance",
            "capability": "stock_quote",
            "arguments": {"location": "NYSE"}
        }]
    });
    let backend = ScriptedBackend::new(vec![("stock", plan)], vec![pass()]);
    let orchestrator = Orchestrator::new(backend.clone(), registry(vec![mumbai_weather()]), config(2));

    let failure = orchestrator
        .answer("What is the stock price of ACME?", None)
        .await
        .unwrap_err();

    assert_eq!(failure.reason, FailureReason::InvalidPlan);
    assert_eq!(failure.attempts, 2);
    assert_eq!(backend.plan_prompts().len(), 2);
}

#[tokio::test]
async fn test_same_inputs_same_answer() {
    let run = || async {
        let backend = ScriptedBackend::new(vec![("weather", weather_plan())], vec![pass()]);
        let orchestrator =
            Orchestrator::new(backend, registry(vec![mumbai_weather()]), config(2));
        orchestrator
            .answer("What's the weather in Mumbai?", None)
            .await
            .unwrap()
    };

    let first = run().await;
    let second = run().await;

    assert_eq!(first.text, second.text);
    assert_eq!(first.plan, second.plan);
    assert_eq!(first.status, second.status);
    assert_ne!(first.request_id, second.request_id);
}

#[tokio::test]
async fn test_plan_only_does_not_invoke_tools() {
    let tool = mumbai_weather();
    let backend = ScriptedBackend::new(vec![("weather", weather_plan())], vec![pass()]);
    let orchestrator = Orchestrator::new(backend, registry(vec![tool.clone()]), config(2));

    let plan = orchestrator
        .plan_only("What's the weather in Mumbai?")
        .await
        .unwrap();

    assert_eq!(plan.tool_categories(), vec!["weather"]);
    assert_eq!(tool.calls(), 0);
}
