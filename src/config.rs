//! Application configuration
//!
//! Layers, lowest priority first:
//! 1. `config/default.toml` embedded in the binary
//! 2. `config/local.toml` (optional)
//! 3. `AIOPS_` environment variables (`AIOPS_PIPELINE__MAX_ATTEMPTS=3`)
//!
//! Secrets are never read from files here; adapters and the backend read
//! their keys from the environment.

use aiops_core::{ExecutorConfig, OrchestratorConfig, RetryConfig};
use aiops_llm::StructuredConfig;
use aiops_tools::{BuiltinsConfig, RunnerConfig};
use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Embedded default configuration (compiled into binary)
pub const DEFAULT_CONFIG: &str = include_str!("../config/default.toml");

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub llm: LlmSettings,
    #[serde(default)]
    pub pipeline: PipelineSettings,
    #[serde(default)]
    pub tools: ToolSettings,
}

/// Reasoning backend settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmSettings {
    /// Model id (`GROQ_MODEL` takes precedence when set)
    pub model: String,
    pub timeout_secs: u64,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Repair requests after an invalid structured output
    pub max_repairs: usize,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            model: aiops_llm::groq::DEFAULT_MODEL.to_string(),
            timeout_secs: 30,
            temperature: 0.1,
            max_tokens: 1600,
            max_repairs: 2,
        }
    }
}

/// Pipeline settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSettings {
    /// Planning cycles per request (1..=5)
    pub max_attempts: u32,
    /// Overall deadline per request
    pub timeout_secs: u64,
    /// Concurrent tool calls per layer (0 = unbounded)
    pub max_concurrency: usize,
    /// Attempts per backend call on transient errors
    pub backend_retry_attempts: u32,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            timeout_secs: 120,
            max_concurrency: 4,
            backend_retry_attempts: 3,
        }
    }
}

/// Tool adapter settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSettings {
    /// Per-invocation timeout
    pub timeout_secs: u64,
    /// Attempts per invocation on transient failures
    pub retry_attempts: u32,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 20,
            retry_attempts: 3,
        }
    }
}

/// Load configuration from embedded defaults, `config/local.toml` and the
/// environment
pub fn load_config() -> Result<AppConfig> {
    load_config_from(Path::new("config/local"))
}

/// Load configuration with a specific local override file (extension
/// optional)
pub fn load_config_from(local: &Path) -> Result<AppConfig> {
    let config = Config::builder()
        .add_source(File::from_str(DEFAULT_CONFIG, FileFormat::Toml))
        .add_source(File::with_name(&local.to_string_lossy()).required(false))
        // prefix_separator("_") so AIOPS_LLM__MODEL works (single _ after prefix)
        .add_source(
            Environment::with_prefix("AIOPS")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .context("Failed to build configuration")?;

    let config: AppConfig = config
        .try_deserialize()
        .context("Failed to deserialize configuration")?;
    config.validate()?;
    Ok(config)
}

fn invalid(field: &str, message: impl Into<String>) -> aiops_core::Error {
    aiops_core::Error::InvalidConfig {
        field: field.to_string(),
        message: message.into(),
    }
}

impl AppConfig {
    /// Reject out-of-range values
    pub fn validate(&self) -> std::result::Result<(), aiops_core::Error> {
        let attempts = aiops_core::orchestrator::MIN_ATTEMPTS..=aiops_core::orchestrator::MAX_ATTEMPTS;
        if !attempts.contains(&self.pipeline.max_attempts) {
            return Err(invalid(
                "pipeline.max_attempts",
                format!(
                    "must be between {} and {} (got {})",
                    attempts.start(),
                    attempts.end(),
                    self.pipeline.max_attempts
                ),
            ));
        }
        if self.pipeline.timeout_secs == 0 {
            return Err(invalid("pipeline.timeout_secs", "must be positive"));
        }
        if self.pipeline.backend_retry_attempts == 0 {
            return Err(invalid("pipeline.backend_retry_attempts", "must be at least 1"));
        }
        if self.llm.model.trim().is_empty() {
            return Err(invalid("llm.model", "must not be empty"));
        }
        if self.llm.timeout_secs == 0 {
            return Err(invalid("llm.timeout_secs", "must be positive"));
        }
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(invalid("llm.temperature", "must be between 0.0 and 2.0"));
        }
        if self.tools.timeout_secs == 0 {
            return Err(invalid("tools.timeout_secs", "must be positive"));
        }
        if self.tools.retry_attempts == 0 {
            return Err(invalid("tools.retry_attempts", "must be at least 1"));
        }
        Ok(())
    }

    /// Settings for the structured backend
    pub fn structured_config(&self) -> StructuredConfig {
        StructuredConfig::default()
            .with_model(self.llm.model.as_str())
            .with_temperature(self.llm.temperature)
            .with_max_tokens(self.llm.max_tokens)
            .with_max_repairs(self.llm.max_repairs)
    }

    /// Adapter settings (credentials from the environment)
    pub fn builtins_config(&self) -> BuiltinsConfig {
        BuiltinsConfig::from_env().with_http_timeout(Duration::from_secs(self.tools.timeout_secs))
    }

    /// Orchestrator settings
    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        let backend_retry =
            RetryConfig::new().with_max_attempts(self.pipeline.backend_retry_attempts);
        let tool_retry = RetryConfig::new().with_max_attempts(self.tools.retry_attempts);

        OrchestratorConfig::new()
            .with_max_attempts(self.pipeline.max_attempts)
            .with_timeout(Some(Duration::from_secs(self.pipeline.timeout_secs)))
            .with_runner_config(
                RunnerConfig::default()
                    .with_timeout(Duration::from_secs(self.tools.timeout_secs)),
            )
            .with_executor_config(
                ExecutorConfig::new().with_max_concurrency(self.pipeline.max_concurrency),
            )
            .with_backend_retry(backend_retry)
            .with_tool_retry(tool_retry)
    }
}
