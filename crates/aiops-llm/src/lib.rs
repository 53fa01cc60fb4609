//! AI Ops LLM - reasoning backend abstraction
//!
//! This crate provides the model-facing side of the assistant:
//! - Provider: chat completion trait and message types
//! - Groq: OpenAI-compatible provider with JSON response mode
//! - Schema: JSON-schema subset validator shared with the tool registry
//! - Structured: schema-constrained completions with repair attempts

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod completion;
pub mod error;
pub mod groq;
pub mod message;
pub mod provider;
pub mod schema;
pub mod structured;
pub mod util;

pub use completion::{CompletionRequest, CompletionResponse, ResponseFormat, TokenUsage};
pub use error::{Error, Result};
pub use groq::{GroqConfig, GroqProvider};
pub use message::{Message, MessageRole};
pub use provider::LlmProvider;
pub use schema::{validate, validate_with, SchemaError};
pub use structured::{
    complete_as, extract_json, OutputSchema, Prompt, ReasoningBackend, StructuredBackend,
    StructuredConfig,
};
