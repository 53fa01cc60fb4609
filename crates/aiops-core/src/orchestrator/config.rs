//! Orchestrator configuration

use crate::executor::ExecutorConfig;
use crate::planner::PlannerConfig;
use crate::utils::RetryConfig;
use crate::verifier::VerifierConfig;
use aiops_tools::RunnerConfig;
use std::time::Duration;

/// Lower bound for planning cycles per request
pub const MIN_ATTEMPTS: u32 = 1;
/// Upper bound for planning cycles per request
pub const MAX_ATTEMPTS: u32 = 5;

/// Configuration for the orchestrator
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Planning cycles per request (plan, execute, verify)
    pub max_attempts: u32,
    /// Overall deadline for one request (None = no deadline)
    pub timeout: Option<Duration>,
    /// Planner configuration
    pub planner_config: PlannerConfig,
    /// Executor configuration
    pub executor_config: ExecutorConfig,
    /// Verifier configuration
    pub verifier_config: VerifierConfig,
    /// Tool runner configuration
    pub runner_config: RunnerConfig,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            timeout: Some(Duration::from_secs(120)),
            planner_config: PlannerConfig::default(),
            executor_config: ExecutorConfig::default(),
            verifier_config: VerifierConfig::default(),
            runner_config: RunnerConfig::default(),
        }
    }
}

impl OrchestratorConfig {
    /// Create a new configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set planning cycles, clamped to 1..=5
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.clamp(MIN_ATTEMPTS, MAX_ATTEMPTS);
        self
    }

    /// Set the overall deadline
    #[must_use]
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the planner configuration
    #[must_use]
    pub fn with_planner_config(mut self, config: PlannerConfig) -> Self {
        self.planner_config = config;
        self
    }

    /// Set the executor configuration
    #[must_use]
    pub fn with_executor_config(mut self, config: ExecutorConfig) -> Self {
        self.executor_config = config;
        self
    }

    /// Set the verifier configuration
    #[must_use]
    pub fn with_verifier_config(mut self, config: VerifierConfig) -> Self {
        self.verifier_config = config;
        self
    }

    /// Set the tool runner configuration
    #[must_use]
    pub fn with_runner_config(mut self, config: RunnerConfig) -> Self {
        self.runner_config = config;
        self
    }

    /// Use one retry policy for every backend call
    #[must_use]
    pub fn with_backend_retry(mut self, retry: RetryConfig) -> Self {
        self.planner_config.retry = retry.clone();
        self.executor_config.backend_retry = retry.clone();
        self.verifier_config.retry = retry;
        self
    }

    /// Set the retry policy for transient tool failures
    #[must_use]
    pub fn with_tool_retry(mut self, retry: RetryConfig) -> Self {
        self.executor_config.tool_retry = retry;
        self
    }
}
