//! Structured - schema-constrained completions
//!
//! The pipeline stages never read raw model text. They call a
//! [`ReasoningBackend`] with a [`Prompt`] and an [`OutputSchema`] and get back
//! a JSON value that has already been validated against that schema.
//! [`StructuredBackend`] implements the contract on top of any
//! [`LlmProvider`]: it requests JSON mode, tolerates prose or code fences
//! around the object, and asks the model to repair output that fails
//! validation before giving up with [`Error::MalformedOutput`].

use crate::completion::CompletionRequest;
use crate::error::{Error, Result};
use crate::message::Message;
use crate::provider::LlmProvider;
use crate::schema;
use crate::util::snippet;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::{Arc, LazyLock};
use tracing::{debug, instrument, warn};

static JSON_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)(\{.*\}|\[.*\])").expect("static regex compiles")
});

/// Expected output shape for a structured completion
#[derive(Debug, Clone)]
pub struct OutputSchema {
    /// Short identifier (`plan`, `draft`, `verdict`)
    pub name: String,
    /// JSON schema the output must satisfy
    pub schema: Value,
}

impl OutputSchema {
    /// Create a new output schema
    #[must_use]
    pub fn new(name: impl Into<String>, schema: Value) -> Self {
        Self {
            name: name.into(),
            schema,
        }
    }
}

/// Prompt for a structured completion
#[derive(Debug, Clone)]
pub struct Prompt {
    /// Role and rules for the model
    pub instructions: String,
    /// The task statement
    pub task: String,
    /// Structured inputs (request, plan, tool results, ...)
    pub context: Value,
}

impl Prompt {
    /// Create a prompt with empty context
    #[must_use]
    pub fn new(instructions: impl Into<String>, task: impl Into<String>) -> Self {
        Self {
            instructions: instructions.into(),
            task: task.into(),
            context: Value::Null,
        }
    }

    /// Attach structured context
    #[must_use]
    pub fn with_context(mut self, context: Value) -> Self {
        self.context = context;
        self
    }

    /// Render the user turn sent to a chat provider
    #[must_use]
    pub fn render(&self) -> String {
        if self.context.is_null() {
            return self.task.clone();
        }
        let context = serde_json::to_string_pretty(&self.context).unwrap_or_default();
        format!("{}\n\nContext JSON:\n{}", self.task, context)
    }
}

/// Given a prompt and an output schema, return a conforming value
#[async_trait::async_trait]
pub trait ReasoningBackend: Send + Sync {
    /// Backend identifier for logs
    fn name(&self) -> &str;

    /// Produce a value that satisfies `schema`
    async fn complete(&self, prompt: &Prompt, schema: &OutputSchema) -> Result<Value>;
}

/// Call `backend`, re-validate the value and deserialize it into `T`
///
/// Validation is repeated here so that every backend, including test doubles,
/// is held to the schema. Anything that does not conform fails closed.
pub async fn complete_as<T: DeserializeOwned>(
    backend: &dyn ReasoningBackend,
    prompt: &Prompt,
    output: &OutputSchema,
) -> Result<T> {
    let value = backend.complete(prompt, output).await?;
    schema::validate(&output.schema, &value)
        .map_err(|e| Error::MalformedOutput(format!("{} output: {}", output.name, e)))?;
    serde_json::from_value(value)
        .map_err(|e| Error::MalformedOutput(format!("{} output: {}", output.name, e)))
}

/// Extract the first JSON document from loosely formatted model text
pub fn extract_json(text: &str) -> Result<Value> {
    let trimmed = text.trim();
    if let Ok(value) = serde_json::from_str(trimmed) {
        return Ok(value);
    }
    if let Some(m) = JSON_BLOCK.find(trimmed) {
        if let Ok(value) = serde_json::from_str(m.as_str()) {
            return Ok(value);
        }
    }
    Err(Error::MalformedOutput(format!(
        "no JSON document in output: {}",
        snippet(trimmed, 120)
    )))
}

/// Settings for [`StructuredBackend`]
#[derive(Debug, Clone)]
pub struct StructuredConfig {
    /// Model override (empty = provider default)
    pub model: String,
    /// Sampling temperature
    pub temperature: f32,
    /// Maximum tokens per completion
    pub max_tokens: u32,
    /// Repair requests after the first invalid output
    pub max_repairs: usize,
}

impl Default for StructuredConfig {
    fn default() -> Self {
        Self {
            model: String::new(),
            temperature: 0.1,
            max_tokens: 1600,
            max_repairs: 2,
        }
    }
}

impl StructuredConfig {
    /// Set the model
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set the completion token limit
    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Set the temperature
    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Set the repair budget
    #[must_use]
    pub fn with_max_repairs(mut self, max_repairs: usize) -> Self {
        self.max_repairs = max_repairs;
        self
    }
}

/// Structured-output backend over a chat provider
pub struct StructuredBackend {
    provider: Arc<dyn LlmProvider>,
    config: StructuredConfig,
}

impl StructuredBackend {
    /// Create a new structured backend
    #[must_use]
    pub fn new(provider: Arc<dyn LlmProvider>, config: StructuredConfig) -> Self {
        Self { provider, config }
    }

    fn system_message(prompt: &Prompt, output: &OutputSchema) -> Message {
        let schema = serde_json::to_string_pretty(&output.schema).unwrap_or_default();
        Message::system(format!(
            "{}\n\nYou MUST output STRICT JSON only: no markdown, no commentary.\n\
             The JSON must satisfy this schema ({}):\n{}",
            prompt.instructions, output.name, schema
        ))
    }

    fn request(&self, messages: Vec<Message>) -> CompletionRequest {
        CompletionRequest::new(self.config.model.clone())
            .with_messages(messages)
            .with_temperature(self.config.temperature)
            .with_max_tokens(self.config.max_tokens)
            .json_mode()
    }

    fn parse(content: &str, output: &OutputSchema) -> Result<Value> {
        let value = extract_json(content)?;
        schema::validate(&output.schema, &value)
            .map_err(|e| Error::MalformedOutput(e.to_string()))?;
        Ok(value)
    }
}

#[async_trait::async_trait]
impl ReasoningBackend for StructuredBackend {
    fn name(&self) -> &str {
        self.provider.name()
    }

    #[instrument(skip(self, prompt, output), fields(provider = %self.provider.name(), schema = %output.name))]
    async fn complete(&self, prompt: &Prompt, output: &OutputSchema) -> Result<Value> {
        let system = Self::system_message(prompt, output);
        let mut messages = vec![system.clone(), Message::user(prompt.render())];
        let mut last_error = String::new();

        for attempt in 0..=self.config.max_repairs {
            let response = self.provider.complete(self.request(messages.clone())).await?;

            match Self::parse(&response.content, output) {
                Ok(value) => {
                    debug!(attempt, "Structured output accepted");
                    return Ok(value);
                }
                Err(e) => {
                    last_error = e.to_string();
                    warn!(attempt, error = %last_error, "Structured output rejected, requesting repair");
                    messages = vec![
                        system.clone(),
                        Message::user(format!(
                            "Your previous output was invalid JSON or did not match the schema. \
                             Fix it and output ONLY valid JSON.\nError: {}\nPrevious output:\n{}",
                            last_error, response.content
                        )),
                    ];
                }
            }
        }

        Err(Error::MalformedOutput(format!(
            "{} output still invalid after {} attempts: {}",
            output.name,
            self.config.max_repairs + 1,
            last_error
        )))
    }
}
