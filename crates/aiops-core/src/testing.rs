//! Test doubles shared by unit tests

use aiops_llm::{OutputSchema, Prompt, ReasoningBackend};
use aiops_tools::{CapabilityDescriptor, Tool, ToolFailure};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

type Handler = dyn Fn(&Prompt, &OutputSchema) -> aiops_llm::Result<Value> + Send + Sync;

/// Backend driven by a closure; records every prompt it sees
pub(crate) struct FnBackend {
    handler: Box<Handler>,
    seen: Mutex<Vec<(String, Prompt)>>,
}

impl FnBackend {
    pub(crate) fn new(
        handler: impl Fn(&Prompt, &OutputSchema) -> aiops_llm::Result<Value> + Send + Sync + 'static,
    ) -> Self {
        Self {
            handler: Box::new(handler),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn call_count(&self) -> usize {
        self.seen.lock().unwrap().len()
    }

    /// Prompts seen for one output schema
    pub(crate) fn prompts(&self, schema: &str) -> Vec<Prompt> {
        self.seen
            .lock()
            .unwrap()
            .iter()
            .filter(|(name, _)| name == schema)
            .map(|(_, p)| p.clone())
            .collect()
    }
}

#[async_trait::async_trait]
impl ReasoningBackend for FnBackend {
    fn name(&self) -> &str {
        "fn"
    }

    async fn complete(&self, prompt: &Prompt, schema: &OutputSchema) -> aiops_llm::Result<Value> {
        self.seen
            .lock()
            .unwrap()
            .push((schema.name.clone(), prompt.clone()));
        (self.handler)(prompt, schema)
    }
}

/// Tool returning a canned result and counting calls
pub(crate) struct StubTool {
    descriptor: CapabilityDescriptor,
    result: Box<dyn Fn(&Value) -> Result<Value, ToolFailure> + Send + Sync>,
    calls: AtomicU32,
    seen: Mutex<Vec<Value>>,
}

impl StubTool {
    pub(crate) fn new(
        name: &str,
        result: impl Fn(&Value) -> Result<Value, ToolFailure> + Send + Sync + 'static,
    ) -> Self {
        Self {
            descriptor: CapabilityDescriptor::new(name, format!("stub {}", name))
                .with_input_schema(json!({
                    "type": "object",
                    "properties": {"query": {"type": "string", "minLength": 1}},
                    "required": ["query"],
                    "additionalProperties": false
                })),
            result: Box::new(result),
            calls: AtomicU32::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn seen(&self) -> Vec<Value> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Tool for StubTool {
    fn descriptor(&self) -> &CapabilityDescriptor {
        &self.descriptor
    }

    async fn execute(&self, args: Value) -> Result<Value, ToolFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(args.clone());
        (self.result)(&args)
    }
}
