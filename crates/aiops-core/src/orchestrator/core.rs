//! Orchestrator core structure
//!
//! Contains the main `Orchestrator` struct and its constructor.

use crate::executor::Executor;
use crate::planner::Planner;
use crate::verifier::Verifier;
use aiops_llm::ReasoningBackend;
use aiops_tools::{CapabilityCatalogue, ToolRegistry, ToolRunner};
use std::sync::Arc;
use tracing::info;

use super::config::OrchestratorConfig;

/// Drives planner, executor and verifier for one request at a time
///
/// Holds no per-request state; concurrent calls to
/// [`answer`](Orchestrator::answer) are independent runs.
pub struct Orchestrator {
    pub(crate) planner: Planner,
    pub(crate) executor: Executor,
    pub(crate) verifier: Verifier,
    pub(crate) config: OrchestratorConfig,
}

impl Orchestrator {
    /// Create a new orchestrator
    ///
    /// Only the executor gets the registry; planner and verifier see the
    /// catalogue.
    #[must_use]
    pub fn new(
        backend: Arc<dyn ReasoningBackend>,
        registry: Arc<ToolRegistry>,
        config: OrchestratorConfig,
    ) -> Self {
        let runner = ToolRunner::new(registry, config.runner_config.clone());
        let planner = Planner::new(backend.clone(), config.planner_config.clone());
        let executor = Executor::new(backend.clone(), runner, config.executor_config.clone());
        let verifier = Verifier::new(backend.clone(), config.verifier_config.clone());

        info!(
            backend = backend.name(),
            capabilities = executor.runner().catalogue().len(),
            max_attempts = config.max_attempts,
            "Orchestrator initialized"
        );

        Self {
            planner,
            executor,
            verifier,
            config,
        }
    }

    /// Get the configuration
    #[must_use]
    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Read-only view of the registered capabilities
    #[must_use]
    pub fn catalogue(&self) -> CapabilityCatalogue {
        self.executor.runner().catalogue()
    }
}
