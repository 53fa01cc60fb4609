//! Plan - steps, dependency layering and step references
//!
//! A plan is an ordered list of steps. Each step is either a tool invocation
//! (capability + argument object) or a direct-answer marker that the
//! synthesis stage answers from the model's own knowledge.
//!
//! Arguments may reference an earlier step's payload with a string of the
//! exact form `{{steps.<id>.<dotted.path>}}`. A reference implies a
//! dependency on that step and is replaced by the referenced value before
//! invocation.

use crate::error::Error;
use aiops_llm::{validate_with, OutputSchema};
use aiops_tools::CapabilityCatalogue;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;
use thiserror::Error;

static STEP_REF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\{\{\s*steps\.(\d+)((?:\.[A-Za-z0-9_-]+)*)\s*\}\}$")
        .expect("STEP_REF is a compile-time constant")
});

/// What a step does
#[derive(Debug, Clone, PartialEq)]
pub enum StepKind {
    /// Invoke a registered capability
    ToolInvocation {
        /// Capability name
        capability: String,
        /// Argument object (may contain step references)
        arguments: Value,
    },
    /// Answered during synthesis, no tool call
    DirectAnswer,
}

/// A single plan step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawStep", into = "RawStep")]
pub struct PlanStep {
    /// Positive, unique step id
    pub id: u32,
    /// What the step does
    pub action: String,
    /// Data category the result is filed under
    pub category: String,
    /// Explicit dependencies
    pub depends_on: Vec<u32>,
    /// Tool invocation or direct answer
    pub kind: StepKind,
}

/// Wire form of a step
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawStep {
    id: u32,
    action: String,
    category: String,
    #[serde(default)]
    depends_on: Vec<u32>,
    #[serde(default)]
    capability: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    arguments: Option<Value>,
}

impl TryFrom<RawStep> for PlanStep {
    type Error = String;

    fn try_from(raw: RawStep) -> Result<Self, Self::Error> {
        let kind = match raw.capability {
            Some(capability) if capability.trim().is_empty() => {
                return Err(format!("step {} names an empty capability", raw.id));
            }
            Some(capability) => StepKind::ToolInvocation {
                capability,
                arguments: match raw.arguments {
                    None | Some(Value::Null) => Value::Object(Map::new()),
                    Some(args) => args,
                },
            },
            None => match raw.arguments {
                None | Some(Value::Null) => StepKind::DirectAnswer,
                Some(Value::Object(map)) if map.is_empty() => StepKind::DirectAnswer,
                Some(_) => {
                    return Err(format!(
                        "direct-answer step {} must not carry arguments",
                        raw.id
                    ))
                }
            },
        };
        Ok(Self {
            id: raw.id,
            action: raw.action,
            category: raw.category,
            depends_on: raw.depends_on,
            kind,
        })
    }
}

impl From<PlanStep> for RawStep {
    fn from(step: PlanStep) -> Self {
        let (capability, arguments) = match step.kind {
            StepKind::ToolInvocation {
                capability,
                arguments,
            } => (Some(capability), Some(arguments)),
            StepKind::DirectAnswer => (None, None),
        };
        Self {
            id: step.id,
            action: step.action,
            category: step.category,
            depends_on: step.depends_on,
            capability,
            arguments,
        }
    }
}

impl PlanStep {
    /// Create a tool-invocation step
    pub fn tool(
        id: u32,
        action: impl Into<String>,
        category: impl Into<String>,
        capability: impl Into<String>,
        arguments: Value,
    ) -> Self {
        Self {
            id,
            action: action.into(),
            category: category.into(),
            depends_on: Vec::new(),
            kind: StepKind::ToolInvocation {
                capability: capability.into(),
                arguments,
            },
        }
    }

    /// Create a direct-answer step
    pub fn direct(id: u32, action: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            id,
            action: action.into(),
            category: category.into(),
            depends_on: Vec::new(),
            kind: StepKind::DirectAnswer,
        }
    }

    /// Set explicit dependencies
    #[must_use]
    pub fn with_depends_on(mut self, depends_on: Vec<u32>) -> Self {
        self.depends_on = depends_on;
        self
    }

    /// Capability name for tool steps
    #[must_use]
    pub fn capability(&self) -> Option<&str> {
        match &self.kind {
            StepKind::ToolInvocation { capability, .. } => Some(capability),
            StepKind::DirectAnswer => None,
        }
    }

    /// Argument object for tool steps
    #[must_use]
    pub fn arguments(&self) -> Option<&Value> {
        match &self.kind {
            StepKind::ToolInvocation { arguments, .. } => Some(arguments),
            StepKind::DirectAnswer => None,
        }
    }

    /// Whether this step invokes a tool
    #[must_use]
    pub fn is_tool(&self) -> bool {
        matches!(self.kind, StepKind::ToolInvocation { .. })
    }

    /// Step references found anywhere in the arguments
    #[must_use]
    pub fn references(&self) -> Vec<StepRef> {
        let mut refs = Vec::new();
        if let Some(args) = self.arguments() {
            collect_references(args, &mut refs);
        }
        refs
    }

    /// Explicit and implied dependencies, sorted and deduplicated
    #[must_use]
    pub fn dependencies(&self) -> Vec<u32> {
        let mut deps: Vec<u32> = self
            .depends_on
            .iter()
            .copied()
            .chain(self.references().into_iter().map(|r| r.step))
            .collect();
        deps.sort_unstable();
        deps.dedup();
        deps
    }
}

/// Ordered list of steps with an objective
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Plan {
    /// What the plan sets out to answer
    pub objective: String,
    /// Assumptions the planner made
    #[serde(default)]
    pub assumptions: Vec<String>,
    /// Steps in plan order
    pub steps: Vec<PlanStep>,
}

/// Reasons a plan is structurally unusable
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    /// No steps
    #[error("plan has no steps")]
    Empty,

    /// Step id zero
    #[error("step ids must be positive (got {0})")]
    NonPositiveId(u32),

    /// Step id used twice
    #[error("duplicate step id {0}")]
    DuplicateId(u32),

    /// Blank category
    #[error("step {0} has an empty category")]
    EmptyCategory(u32),

    /// Capability not in the catalogue
    #[error("step {step} uses unknown capability '{capability}'")]
    UnknownCapability {
        /// Step id
        step: u32,
        /// Capability name
        capability: String,
    },

    /// Step depends on itself
    #[error("step {0} depends on itself")]
    SelfDependency(u32),

    /// Dependency on a step that does not exist
    #[error("step {step} depends on unknown step {dependency}")]
    UnknownDependency {
        /// Step id
        step: u32,
        /// Missing dependency
        dependency: u32,
    },

    /// Argument reference to a step that is missing or has no payload
    #[error("step {step} references step {target}, which is not a tool step in this plan")]
    DanglingReference {
        /// Step id
        step: u32,
        /// Referenced id
        target: u32,
    },

    /// Dependencies form a cycle
    #[error("dependency cycle among steps {0:?}")]
    Cycle(Vec<u32>),
}

impl From<PlanError> for Error {
    fn from(e: PlanError) -> Self {
        Error::InvalidPlan(e.to_string())
    }
}

impl Plan {
    /// Create a plan
    pub fn new(objective: impl Into<String>, steps: Vec<PlanStep>) -> Self {
        Self {
            objective: objective.into(),
            assumptions: Vec::new(),
            steps,
        }
    }

    /// Set assumptions
    #[must_use]
    pub fn with_assumptions(mut self, assumptions: Vec<String>) -> Self {
        self.assumptions = assumptions;
        self
    }

    /// Look up a step by id
    #[must_use]
    pub fn step(&self, id: u32) -> Option<&PlanStep> {
        self.steps.iter().find(|s| s.id == id)
    }

    /// Tool-invocation steps in plan order
    pub fn tool_steps(&self) -> impl Iterator<Item = &PlanStep> {
        self.steps.iter().filter(|s| s.is_tool())
    }

    /// Categories of tool steps, deduplicated, in plan order
    #[must_use]
    pub fn tool_categories(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.tool_steps()
            .map(|s| s.category.as_str())
            .filter(|c| seen.insert(*c))
            .collect()
    }

    /// Check structure against the catalogue
    pub fn validate(&self, catalogue: &CapabilityCatalogue) -> Result<(), PlanError> {
        if self.steps.is_empty() {
            return Err(PlanError::Empty);
        }

        let mut ids = HashSet::new();
        for step in &self.steps {
            if step.id == 0 {
                return Err(PlanError::NonPositiveId(step.id));
            }
            if !ids.insert(step.id) {
                return Err(PlanError::DuplicateId(step.id));
            }
            if step.category.trim().is_empty() {
                return Err(PlanError::EmptyCategory(step.id));
            }
            if let Some(capability) = step.capability() {
                if !catalogue.contains(capability) {
                    return Err(PlanError::UnknownCapability {
                        step: step.id,
                        capability: capability.to_string(),
                    });
                }
            }
        }

        for step in &self.steps {
            for &dependency in &step.depends_on {
                if dependency == step.id {
                    return Err(PlanError::SelfDependency(step.id));
                }
                if !ids.contains(&dependency) {
                    return Err(PlanError::UnknownDependency {
                        step: step.id,
                        dependency,
                    });
                }
            }
            for reference in step.references() {
                if reference.step == step.id {
                    return Err(PlanError::SelfDependency(step.id));
                }
                if !self.step(reference.step).is_some_and(PlanStep::is_tool) {
                    return Err(PlanError::DanglingReference {
                        step: step.id,
                        target: reference.step,
                    });
                }
            }
        }

        self.layers().map(|_| ())
    }

    /// Group steps into dependency layers (Kahn's algorithm)
    ///
    /// Every step in layer `n` depends only on steps in layers `< n`. Steps
    /// keep plan order within a layer.
    pub fn layers(&self) -> Result<Vec<Vec<&PlanStep>>, PlanError> {
        let mut remaining: Vec<&PlanStep> = self.steps.iter().collect();
        let mut settled: HashSet<u32> = HashSet::new();
        let mut layers = Vec::new();

        while !remaining.is_empty() {
            let (ready, blocked): (Vec<&PlanStep>, Vec<&PlanStep>) = remaining
                .into_iter()
                .partition(|s| s.dependencies().iter().all(|d| settled.contains(d)));
            if ready.is_empty() {
                return Err(PlanError::Cycle(blocked.iter().map(|s| s.id).collect()));
            }
            settled.extend(ready.iter().map(|s| s.id));
            layers.push(ready);
            remaining = blocked;
        }
        Ok(layers)
    }

    /// Check tool arguments against input schemas
    ///
    /// Step references are accepted wherever a value is expected; they are
    /// checked again after substitution.
    pub fn check_arguments(&self, catalogue: &CapabilityCatalogue) -> crate::Result<()> {
        for step in self.tool_steps() {
            let (Some(capability), Some(arguments)) = (step.capability(), step.arguments())
            else {
                continue;
            };
            let Some(descriptor) = catalogue.get(capability) else {
                continue;
            };
            validate_with(&descriptor.input_schema, arguments, &is_reference).map_err(|e| {
                Error::SchemaViolation {
                    step: step.id,
                    detail: format!("{}: {}", capability, e),
                }
            })?;
        }
        Ok(())
    }
}

/// Output schema the planner asks the backend to fill
#[must_use]
pub fn plan_schema() -> OutputSchema {
    OutputSchema::new(
        "plan",
        json!({
            "type": "object",
            "properties": {
                "objective": {"type": "string", "minLength": 1},
                "assumptions": {"type": "array", "items": {"type": "string"}},
                "steps": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "id": {"type": "integer"},
                            "action": {"type": "string"},
                            "category": {"type": "string"},
                            "depends_on": {"type": "array", "items": {"type": "integer"}},
                            "capability": {"type": ["string", "null"]},
                            "arguments": {"type": ["object", "null"]}
                        },
                        "required": ["id", "action", "category", "capability"],
                        "additionalProperties": false
                    }
                }
            },
            "required": ["objective", "steps"],
            "additionalProperties": false
        }),
    )
}

/// A parsed `{{steps.<id>.<path>}}` reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepRef {
    /// Referenced step id
    pub step: u32,
    /// Path into the payload (empty = whole payload)
    pub path: Vec<String>,
}

impl StepRef {
    /// Look the reference up in settled payloads
    ///
    /// Numeric segments index into arrays.
    #[must_use]
    pub fn resolve<'a>(&self, payloads: &'a HashMap<u32, Value>) -> Option<&'a Value> {
        let mut current = payloads.get(&self.step)?;
        for segment in &self.path {
            current = match current {
                Value::Object(map) => map.get(segment)?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }
}

/// Parse a string that is exactly one step reference
#[must_use]
pub fn parse_reference(s: &str) -> Option<StepRef> {
    let caps = STEP_REF.captures(s)?;
    let step = caps.get(1)?.as_str().parse().ok()?;
    let path = caps
        .get(2)
        .map(|m| {
            m.as_str()
                .split('.')
                .filter(|seg| !seg.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    Some(StepRef { step, path })
}

/// Whether a JSON value is a step reference string
#[must_use]
pub fn is_reference(value: &Value) -> bool {
    value.as_str().is_some_and(|s| STEP_REF.is_match(s))
}

fn collect_references(value: &Value, out: &mut Vec<StepRef>) {
    match value {
        Value::String(s) => out.extend(parse_reference(s)),
        Value::Array(items) => items.iter().for_each(|v| collect_references(v, out)),
        Value::Object(map) => map.values().for_each(|v| collect_references(v, out)),
        _ => {}
    }
}

/// Replace every step reference in `arguments` with the referenced value
pub fn substitute(arguments: &Value, payloads: &HashMap<u32, Value>) -> Result<Value, String> {
    match arguments {
        Value::String(s) => match parse_reference(s) {
            Some(reference) => reference
                .resolve(payloads)
                .cloned()
                .ok_or_else(|| format!("reference {} could not be resolved", s)),
            None => Ok(arguments.clone()),
        },
        Value::Array(items) => items
            .iter()
            .map(|v| substitute(v, payloads))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Value::Object(map) => {
            let mut out = Map::with_capacity(map.len());
            for (key, value) in map {
                out.insert(key.clone(), substitute(value, payloads)?);
            }
            Ok(Value::Object(out))
        }
        other => Ok(other.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aiops_tools::CapabilityDescriptor;

    fn catalogue() -> CapabilityCatalogue {
        CapabilityCatalogue::new(vec![
            CapabilityDescriptor::new("weather_current", "Current weather").with_input_schema(
                json!({
                    "type": "object",
                    "properties": {"location": {"type": "string", "minLength": 1}},
                    "required": ["location"],
                    "additionalProperties": false
                }),
            ),
            CapabilityDescriptor::new("github_repo_search", "Search repositories")
                .with_input_schema(json!({
                    "type": "object",
                    "properties": {
                        "query": {"type": "string", "minLength": 1},
                        "top_n": {"type": "integer", "minimum": 1, "maximum": 20}
                    },
                    "required": ["query"],
                    "additionalProperties": false
                })),
        ])
    }

    fn weather(id: u32, location: &str) -> PlanStep {
        PlanStep::tool(
            id,
            "Look up weather",
            "weather",
            "weather_current",
            json!({"location": location}),
        )
    }

    #[test]
    fn test_parse_reference() {
        let r = parse_reference("{{steps.2.items.0.full_name}}").unwrap();
        assert_eq!(r.step, 2);
        assert_eq!(r.path, vec!["items", "0", "full_name"]);

        let whole = parse_reference("{{ steps.7 }}").unwrap();
        assert_eq!(whole.step, 7);
        assert!(whole.path.is_empty());

        assert!(parse_reference("weather in {{steps.1.location}}").is_none());
        assert!(parse_reference("{{step.1.location}}").is_none());
        assert!(parse_reference("Mumbai").is_none());
    }

    #[test]
    fn test_step_wire_format() {
        let step: PlanStep = serde_json::from_value(json!({
            "id": 1,
            "action": "Get weather",
            "category": "weather",
            "capability": "weather_current",
            "arguments": {"location": "Mumbai"}
        }))
        .unwrap();
        assert_eq!(step.capability(), Some("weather_current"));
        assert!(step.depends_on.is_empty());

        let direct: PlanStep = serde_json::from_value(json!({
            "id": 1,
            "action": "Tell a joke",
            "category": "joke",
            "capability": null
        }))
        .unwrap();
        assert_eq!(direct.kind, StepKind::DirectAnswer);

        let back = serde_json::to_value(&direct).unwrap();
        assert_eq!(back["capability"], Value::Null);
        assert!(back.get("arguments").is_none());
    }

    #[test]
    fn test_direct_answer_with_arguments_rejected() {
        let result: std::result::Result<PlanStep, _> = serde_json::from_value(json!({
            "id": 1,
            "action": "Tell a joke",
            "category": "joke",
            "capability": null,
            "arguments": {"topic": "cats"}
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_unknown_step_fields_rejected() {
        let result: std::result::Result<PlanStep, _> = serde_json::from_value(json!({
            "id": 1,
            "action": "x",
            "category": "weather",
            "capability": "weather_current",
            "tool_input": {}
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_ok() {
        let plan = Plan::new(
            "weather in two cities",
            vec![weather(1, "Mumbai"), weather(2, "Pune")],
        );
        assert!(plan.validate(&catalogue()).is_ok());
        assert_eq!(plan.tool_categories(), vec!["weather"]);
    }

    #[test]
    fn test_validate_rejections() {
        let cat = catalogue();

        assert_eq!(
            Plan::new("x", vec![]).validate(&cat),
            Err(PlanError::Empty)
        );
        assert_eq!(
            Plan::new("x", vec![weather(0, "Mumbai")]).validate(&cat),
            Err(PlanError::NonPositiveId(0))
        );
        assert_eq!(
            Plan::new("x", vec![weather(1, "A"), weather(1, "B")]).validate(&cat),
            Err(PlanError::DuplicateId(1))
        );
        assert_eq!(
            Plan::new(
                "x",
                vec![PlanStep::tool(1, "x", "stocks", "stock_quote", json!({}))]
            )
            .validate(&cat),
            Err(PlanError::UnknownCapability {
                step: 1,
                capability: "stock_quote".into()
            })
        );
        assert_eq!(
            Plan::new("x", vec![weather(1, "A").with_depends_on(vec![1])]).validate(&cat),
            Err(PlanError::SelfDependency(1))
        );
        assert_eq!(
            Plan::new("x", vec![weather(1, "A").with_depends_on(vec![9])]).validate(&cat),
            Err(PlanError::UnknownDependency {
                step: 1,
                dependency: 9
            })
        );
    }

    #[test]
    fn test_validate_cycle() {
        let plan = Plan::new(
            "x",
            vec![
                weather(1, "A").with_depends_on(vec![2]),
                weather(2, "B").with_depends_on(vec![1]),
            ],
        );
        assert!(matches!(
            plan.validate(&catalogue()),
            Err(PlanError::Cycle(ids)) if ids == vec![1, 2]
        ));
    }

    #[test]
    fn test_validate_dangling_reference() {
        let plan = Plan::new(
            "x",
            vec![
                PlanStep::direct(1, "Think", "notes"),
                weather(2, "{{steps.1.city}}"),
            ],
        );
        assert_eq!(
            plan.validate(&catalogue()),
            Err(PlanError::DanglingReference { step: 2, target: 1 })
        );

        let plan = Plan::new("x", vec![weather(1, "{{steps.4.city}}")]);
        assert_eq!(
            plan.validate(&catalogue()),
            Err(PlanError::DanglingReference { step: 1, target: 4 })
        );
    }

    #[test]
    fn test_layers_follow_references() {
        let plan = Plan::new(
            "x",
            vec![
                PlanStep::tool(
                    1,
                    "Find repo",
                    "repositories",
                    "github_repo_search",
                    json!({"query": "tokio"}),
                ),
                weather(2, "Mumbai"),
                weather(3, "{{steps.1.items.0.language}}"),
                PlanStep::direct(4, "Summarize", "summary").with_depends_on(vec![3]),
            ],
        );
        let layers = plan.layers().unwrap();
        let ids: Vec<Vec<u32>> = layers
            .iter()
            .map(|l| l.iter().map(|s| s.id).collect())
            .collect();
        assert_eq!(ids, vec![vec![1, 2], vec![3], vec![4]]);
    }

    #[test]
    fn test_check_arguments() {
        let cat = catalogue();
        let ok = Plan::new("x", vec![weather(1, "{{steps.2.name}}"), weather(2, "A")]);
        assert!(ok.check_arguments(&cat).is_ok());

        let bad = Plan::new(
            "x",
            vec![PlanStep::tool(
                1,
                "x",
                "weather",
                "weather_current",
                json!({"city": "Mumbai"}),
            )],
        );
        assert!(matches!(
            bad.check_arguments(&cat),
            Err(Error::SchemaViolation { step: 1, .. })
        ));
    }

    #[test]
    fn test_substitute() {
        let mut payloads = HashMap::new();
        payloads.insert(
            1,
            json!({"items": [{"full_name": "tokio-rs/tokio", "stars": 25000}]}),
        );

        let args = json!({
            "query": "{{steps.1.items.0.full_name}}",
            "top_n": "{{steps.1.items.0.stars}}",
            "note": "plain"
        });
        let out = substitute(&args, &payloads).unwrap();
        assert_eq!(out["query"], "tokio-rs/tokio");
        assert_eq!(out["top_n"], 25000);
        assert_eq!(out["note"], "plain");

        let missing = json!({"query": "{{steps.1.items.5.full_name}}"});
        assert!(substitute(&missing, &payloads).is_err());
    }

    #[test]
    fn test_plan_schema_accepts_wire_plan() {
        let value = json!({
            "objective": "Answer weather",
            "assumptions": [],
            "steps": [{
                "id": 1,
                "action": "Get weather",
                "category": "weather",
                "depends_on": [],
                "capability": "weather_current",
                "arguments": {"location": "Mumbai"}
            }]
        });
        assert!(aiops_llm::validate(&plan_schema().schema, &value).is_ok());
        let plan: Plan = serde_json::from_value(value).unwrap();
        assert_eq!(plan.steps.len(), 1);
    }
}
