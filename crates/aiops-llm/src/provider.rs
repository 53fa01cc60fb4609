//! Provider - chat completion provider abstraction

use crate::completion::{CompletionRequest, CompletionResponse};
use crate::error::Result;

/// Trait for chat completion providers
#[async_trait::async_trait]
pub trait LlmProvider: Send + Sync {
    /// Get the provider name
    fn name(&self) -> &str;

    /// Get the default model
    fn default_model(&self) -> &str;

    /// Complete a conversation
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse>;
}
