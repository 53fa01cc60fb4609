//! Runner - capability execution engine
//!
//! This module provides the execution engine used by the executor stage:
//! - Timeout handling per invocation
//! - Cancellation through a shared token
//! - Logging of every invocation
//!
//! The runner performs a single attempt. Retry policy lives with the caller.

use crate::error::{FailureKind, ToolFailure};
use crate::registry::{CapabilityCatalogue, Outcome, ToolRegistry};
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

/// Configuration for the tool runner
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Timeout for a single invocation
    pub default_timeout: Duration,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_secs(20),
        }
    }
}

impl RunnerConfig {
    /// Set the default timeout
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }
}

/// Capability runner holding the frozen registry
#[derive(Clone)]
pub struct ToolRunner {
    registry: Arc<ToolRegistry>,
    config: RunnerConfig,
}

impl ToolRunner {
    /// Create a new tool runner
    #[must_use]
    pub fn new(registry: Arc<ToolRegistry>, config: RunnerConfig) -> Self {
        Self { registry, config }
    }

    /// Create with default configuration
    #[must_use]
    pub fn with_defaults(registry: Arc<ToolRegistry>) -> Self {
        Self::new(registry, RunnerConfig::default())
    }

    /// Get the configuration
    #[must_use]
    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Read-only catalogue of the registered capabilities
    #[must_use]
    pub fn catalogue(&self) -> CapabilityCatalogue {
        self.registry.catalogue()
    }

    /// Check arguments without invoking
    pub fn validate(&self, name: &str, args: &Value) -> Result<(), ToolFailure> {
        self.registry
            .validate_arguments(name, args)
            .map_err(ToolFailure::from)
    }

    /// Invoke a capability once
    #[instrument(skip(self, args, cancel), fields(tool = %name))]
    pub async fn execute(
        &self,
        name: &str,
        args: Value,
        cancel: &CancellationToken,
    ) -> Result<Value, ToolFailure> {
        if cancel.is_cancelled() {
            return Err(ToolFailure::new(FailureKind::Cancelled, "run cancelled"));
        }

        let start = Instant::now();
        let limit = self.config.default_timeout;
        debug!(timeout_ms = %limit.as_millis(), "Executing capability");

        let result = tokio::select! {
            _ = cancel.cancelled() => {
                Err(ToolFailure::new(FailureKind::Cancelled, "run cancelled"))
            }
            res = timeout(limit, self.registry.invoke(name, args)) => match res {
                Ok(Ok(Outcome::Success { payload })) => Ok(payload),
                Ok(Ok(Outcome::Failure { failure })) => Err(failure),
                Ok(Err(e)) => Err(ToolFailure::from(e)),
                Err(_) => Err(ToolFailure::new(
                    FailureKind::Timeout,
                    format!("no response within {}ms", limit.as_millis()),
                )),
            },
        };

        let duration_ms = start.elapsed().as_millis() as u64;
        match &result {
            Ok(_) => debug!(duration_ms, success = true, "Capability completed"),
            Err(failure) => warn!(
                duration_ms,
                success = false,
                kind = %failure.kind,
                error = %failure.message,
                "Capability failed"
            ),
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{CapabilityDescriptor, Tool};
    use serde_json::json;
    use tokio_test::{assert_err, assert_ok};

    struct SlowTool {
        descriptor: CapabilityDescriptor,
        delay: Duration,
    }

    #[async_trait::async_trait]
    impl Tool for SlowTool {
        fn descriptor(&self) -> &CapabilityDescriptor {
            &self.descriptor
        }

        async fn execute(&self, _args: Value) -> Result<Value, ToolFailure> {
            tokio::time::sleep(self.delay).await;
            Ok(json!({"done": true}))
        }
    }

    fn runner(delay: Duration, limit: Duration) -> ToolRunner {
        let mut registry = ToolRegistry::new();
        registry
            .register(Arc::new(SlowTool {
                descriptor: CapabilityDescriptor::new("slow", "sleeps"),
                delay,
            }))
            .unwrap();
        ToolRunner::new(
            Arc::new(registry),
            RunnerConfig::default().with_timeout(limit),
        )
    }

    #[test]
    fn test_runner_config() {
        let config = RunnerConfig::default().with_timeout(Duration::from_secs(5));
        assert_eq!(config.default_timeout, Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_execute_success() {
        let runner = runner(Duration::from_millis(1), Duration::from_secs(1));
        let payload = assert_ok!(
            runner
                .execute("slow", json!({}), &CancellationToken::new())
                .await
        );
        assert_eq!(payload, json!({"done": true}));
    }

    #[tokio::test]
    async fn test_execute_timeout() {
        let runner = runner(Duration::from_secs(5), Duration::from_millis(20));
        let failure = assert_err!(
            runner
                .execute("slow", json!({}), &CancellationToken::new())
                .await
        );
        assert_eq!(failure.kind, FailureKind::Timeout);
        assert!(failure.is_transient());
    }

    #[tokio::test]
    async fn test_execute_cancelled() {
        let runner = runner(Duration::from_secs(5), Duration::from_secs(10));
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let failure = runner.execute("slow", json!({}), &cancel).await.unwrap_err();
        assert_eq!(failure.kind, FailureKind::Cancelled);
    }

    #[tokio::test]
    async fn test_execute_unknown_and_invalid() {
        let runner = runner(Duration::from_millis(1), Duration::from_secs(1));
        let cancel = CancellationToken::new();

        let failure = runner.execute("missing", json!({}), &cancel).await.unwrap_err();
        assert_eq!(failure.kind, FailureKind::UnknownCapability);

        let failure = runner
            .execute("slow", json!({"extra": 1}), &cancel)
            .await
            .unwrap_err();
        assert_eq!(failure.kind, FailureKind::SchemaViolation);
        assert!(runner.validate("slow", &json!({})).is_ok());
    }
}
