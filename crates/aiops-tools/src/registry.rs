//! Registry - capability registration and invocation
//!
//! This module provides the registry for the external capabilities the
//! planner may name. Each capability is a [`Tool`] described by a
//! [`CapabilityDescriptor`] carrying input and output schemas. The registry
//! is built once at startup, then frozen behind an `Arc`; stages that only
//! need to read descriptors receive a [`CapabilityCatalogue`] instead.

use crate::error::{Error, FailureKind, Result, ToolFailure};
use aiops_llm::schema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Capability metadata and schemas
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilityDescriptor {
    /// Unique capability name
    pub name: String,
    /// What the capability fetches
    pub description: String,
    /// JSON schema for arguments
    pub input_schema: Value,
    /// JSON schema for the success payload
    pub output_schema: Value,
}

impl CapabilityDescriptor {
    /// Create a descriptor accepting an empty argument object
    #[must_use]
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {},
                "required": [],
                "additionalProperties": false
            }),
            output_schema: serde_json::json!({"type": "object"}),
        }
    }

    /// Set the input schema
    #[must_use]
    pub fn with_input_schema(mut self, input_schema: Value) -> Self {
        self.input_schema = input_schema;
        self
    }

    /// Set the output schema
    #[must_use]
    pub fn with_output_schema(mut self, output_schema: Value) -> Self {
        self.output_schema = output_schema;
        self
    }
}

/// Trait for capability implementations
///
/// Implementations perform exactly one external fetch per call and perform
/// no retries; arguments have already been validated against
/// [`CapabilityDescriptor::input_schema`].
#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    /// Get the capability descriptor
    fn descriptor(&self) -> &CapabilityDescriptor;

    /// Execute with validated arguments
    async fn execute(&self, args: Value) -> std::result::Result<Value, ToolFailure>;
}

/// Outcome of one invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    /// Normalized payload
    Success {
        /// Payload conforming to the output schema
        payload: Value,
    },
    /// Typed failure
    Failure {
        /// Failure detail
        failure: ToolFailure,
    },
}

impl From<std::result::Result<Value, ToolFailure>> for Outcome {
    fn from(result: std::result::Result<Value, ToolFailure>) -> Self {
        match result {
            Ok(payload) => Self::Success { payload },
            Err(failure) => Self::Failure { failure },
        }
    }
}

/// Result of a plan step's invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    /// Plan step id
    pub step_id: u32,
    /// Capability invoked
    pub capability: String,
    /// Category the result is filed under
    pub category: String,
    /// Arguments after reference substitution
    pub arguments: Value,
    /// Payload or failure
    pub outcome: Outcome,
    /// Execution duration in milliseconds (all attempts)
    pub duration_ms: u64,
}

impl ToolResult {
    /// Whether the invocation succeeded
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, Outcome::Success { .. })
    }

    /// The success payload, if any
    #[must_use]
    pub fn payload(&self) -> Option<&Value> {
        match &self.outcome {
            Outcome::Success { payload } => Some(payload),
            Outcome::Failure { .. } => None,
        }
    }

    /// The failure, if any
    #[must_use]
    pub fn failure(&self) -> Option<&ToolFailure> {
        match &self.outcome {
            Outcome::Success { .. } => None,
            Outcome::Failure { failure } => Some(failure),
        }
    }
}

/// Read-only view of the registered capabilities
#[derive(Debug, Clone, Default, Serialize)]
pub struct CapabilityCatalogue {
    descriptors: Vec<CapabilityDescriptor>,
}

impl CapabilityCatalogue {
    /// Build a catalogue from descriptors, ordered by name
    #[must_use]
    pub fn new(mut descriptors: Vec<CapabilityDescriptor>) -> Self {
        descriptors.sort_by(|a, b| a.name.cmp(&b.name));
        Self { descriptors }
    }

    /// All descriptors, ordered by name
    #[must_use]
    pub fn descriptors(&self) -> &[CapabilityDescriptor] {
        &self.descriptors
    }

    /// Look up a descriptor by name
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&CapabilityDescriptor> {
        self.descriptors.iter().find(|d| d.name == name)
    }

    /// Check if a capability exists
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Capability names, ordered
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.descriptors.iter().map(|d| d.name.as_str()).collect()
    }

    /// Compact JSON rendering for prompts (name, description, input schema)
    #[must_use]
    pub fn to_prompt_json(&self) -> Value {
        Value::Array(
            self.descriptors
                .iter()
                .map(|d| {
                    serde_json::json!({
                        "name": d.name,
                        "description": d.description,
                        "input_schema": d.input_schema,
                    })
                })
                .collect(),
        )
    }

    /// Number of capabilities
    #[must_use]
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    /// Check if the catalogue is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

/// Registry for managing capabilities
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    /// Create a new empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a capability
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Result<()> {
        let name = tool.descriptor().name.clone();
        if self.tools.contains_key(&name) {
            return Err(Error::DuplicateCapability(name));
        }
        debug!(tool = %name, "Registering capability");
        self.tools.insert(name, tool);
        Ok(())
    }

    /// Get a capability by name
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Check if a capability exists
    #[must_use]
    pub fn has(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// List all capability names, ordered
    #[must_use]
    pub fn list_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Snapshot of the descriptors
    #[must_use]
    pub fn catalogue(&self) -> CapabilityCatalogue {
        CapabilityCatalogue::new(
            self.tools
                .values()
                .map(|t| t.descriptor().clone())
                .collect(),
        )
    }

    /// Get capability count
    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Check if registry is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Check arguments against a capability's input schema
    pub fn validate_arguments(&self, name: &str, args: &Value) -> Result<()> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| Error::UnknownCapability(name.to_string()))?;
        check_arguments(tool.descriptor(), args)
    }

    /// Invoke a capability
    ///
    /// Contract violations (unknown name, invalid arguments) are errors; the
    /// adapter's own failures come back as [`Outcome::Failure`]. A success
    /// payload that does not match the output schema is turned into a
    /// `MalformedUpstreamResponse` failure.
    pub async fn invoke(&self, name: &str, args: Value) -> Result<Outcome> {
        let tool = self
            .get(name)
            .ok_or_else(|| Error::UnknownCapability(name.to_string()))?;
        let descriptor = tool.descriptor();
        check_arguments(descriptor, &args)?;

        let outcome = match tool.execute(args).await {
            Ok(payload) => match schema::validate(&descriptor.output_schema, &payload) {
                Ok(()) => Outcome::Success { payload },
                Err(e) => {
                    warn!(tool = %name, error = %e, "Payload does not match output schema");
                    Outcome::Failure {
                        failure: ToolFailure::new(
                            FailureKind::MalformedUpstreamResponse,
                            format!("payload does not match output schema: {}", e),
                        ),
                    }
                }
            },
            Err(failure) => Outcome::Failure { failure },
        };
        Ok(outcome)
    }
}

fn check_arguments(descriptor: &CapabilityDescriptor, args: &Value) -> Result<()> {
    if !args.is_object() {
        return Err(Error::SchemaViolation {
            capability: descriptor.name.clone(),
            detail: "arguments must be an object".to_string(),
        });
    }
    schema::validate(&descriptor.input_schema, args).map_err(|e| Error::SchemaViolation {
        capability: descriptor.name.clone(),
        detail: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct EchoTool {
        descriptor: CapabilityDescriptor,
        reply: std::result::Result<Value, ToolFailure>,
    }

    impl EchoTool {
        fn new(name: &str, reply: std::result::Result<Value, ToolFailure>) -> Self {
            Self {
                descriptor: CapabilityDescriptor::new(name, "test capability")
                    .with_input_schema(json!({
                        "type": "object",
                        "properties": {"location": {"type": "string", "minLength": 1}},
                        "required": ["location"],
                        "additionalProperties": false
                    }))
                    .with_output_schema(json!({
                        "type": "object",
                        "properties": {"condition": {"type": "string"}},
                        "required": ["condition"]
                    })),
                reply,
            }
        }
    }

    #[async_trait::async_trait]
    impl Tool for EchoTool {
        fn descriptor(&self) -> &CapabilityDescriptor {
            &self.descriptor
        }

        async fn execute(&self, _args: Value) -> std::result::Result<Value, ToolFailure> {
            self.reply.clone()
        }
    }

    fn registry_with(reply: std::result::Result<Value, ToolFailure>) -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry
            .register(Arc::new(EchoTool::new("weather_current", reply)))
            .unwrap();
        registry
    }

    #[test]
    fn test_registry_empty() {
        let registry = ToolRegistry::new();
        assert!(registry.is_empty());
        assert_eq!(registry.len(), 0);
        assert!(registry.catalogue().is_empty());
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let mut registry = registry_with(Ok(json!({"condition": "Rain"})));
        let err = registry
            .register(Arc::new(EchoTool::new("weather_current", Ok(json!({})))))
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateCapability(name) if name == "weather_current"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_catalogue_is_sorted_snapshot() {
        let mut registry = registry_with(Ok(json!({})));
        registry
            .register(Arc::new(EchoTool::new("github_repo_search", Ok(json!({})))))
            .unwrap();

        let catalogue = registry.catalogue();
        assert_eq!(catalogue.names(), vec!["github_repo_search", "weather_current"]);
        assert!(catalogue.contains("weather_current"));
        assert!(!catalogue.contains("stock_price"));
        assert_eq!(catalogue.to_prompt_json()[1]["name"], "weather_current");
        assert!(catalogue.to_prompt_json()[0].get("output_schema").is_none());
    }

    #[tokio::test]
    async fn test_invoke_success() {
        let registry = registry_with(Ok(json!({"condition": "Rain"})));
        let outcome = registry
            .invoke("weather_current", json!({"location": "Mumbai"}))
            .await
            .unwrap();
        assert_eq!(
            outcome,
            Outcome::Success {
                payload: json!({"condition": "Rain"})
            }
        );
    }

    #[tokio::test]
    async fn test_invoke_unknown_capability() {
        let registry = registry_with(Ok(json!({})));
        let err = registry.invoke("stock_price", json!({})).await.unwrap_err();
        assert!(matches!(err, Error::UnknownCapability(_)));
    }

    #[tokio::test]
    async fn test_invoke_schema_violation() {
        let registry = registry_with(Ok(json!({"condition": "Rain"})));
        let err = registry
            .invoke("weather_current", json!({"city": "Mumbai"}))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::SchemaViolation { .. }));

        let err = registry
            .invoke("weather_current", json!("Mumbai"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("must be an object"));
    }

    #[tokio::test]
    async fn test_invoke_output_mismatch_is_malformed() {
        let registry = registry_with(Ok(json!({"temp": 27})));
        let outcome = registry
            .invoke("weather_current", json!({"location": "Mumbai"}))
            .await
            .unwrap();
        match outcome {
            Outcome::Failure { failure } => {
                assert_eq!(failure.kind, FailureKind::MalformedUpstreamResponse)
            }
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_invoke_adapter_failure_passes_through() {
        let registry = registry_with(Err(ToolFailure::not_found("Atlantis")));
        let outcome = registry
            .invoke("weather_current", json!({"location": "Atlantis"}))
            .await
            .unwrap();
        assert!(matches!(
            outcome,
            Outcome::Failure { failure } if failure.kind == FailureKind::NotFound
        ));
    }

    #[test]
    fn test_tool_result_accessors() {
        let result = ToolResult {
            step_id: 1,
            capability: "weather_current".into(),
            category: "weather".into(),
            arguments: json!({"location": "Mumbai"}),
            outcome: Outcome::Success {
                payload: json!({"condition": "Rain"}),
            },
            duration_ms: 12,
        };
        assert!(result.is_success());
        assert_eq!(result.payload().unwrap()["condition"], "Rain");
        assert!(result.failure().is_none());

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["outcome"]["status"], "success");
    }
}
