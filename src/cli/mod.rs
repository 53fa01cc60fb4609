//! CLI module for aiops
//!
//! Commands:
//! - `ask`: run the full plan, execute, verify pipeline
//! - `plan`: run the planner only and print the plan
//! - `tools`: list the capability catalogue

use crate::config::{load_config, AppConfig};
use aiops_core::{format_error_for_cli, Orchestrator, OrchestratorConfig};
use aiops_llm::{GroqConfig, GroqProvider, StructuredBackend};
use aiops_tools::{register_builtins_with_config, ToolRegistry};
use clap::{Parser, Subcommand};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub mod ask;
pub mod plan;
pub mod tools;

/// AI Ops assistant CLI
#[derive(Parser, Debug)]
#[command(name = "aiops")]
#[command(about = "Answer questions with live data: plan, call tools, verify")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Answer a request with the full pipeline
    Ask {
        /// The request, e.g. "What's the weather in Mumbai?"
        task: String,
        /// Planning cycles (1-5), overrides pipeline.max_attempts
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..=5))]
        rounds: Option<u32>,
        /// Deadline in seconds, overrides pipeline.timeout_secs
        #[arg(long)]
        timeout: Option<u64>,
        /// Print the full run report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the plan for a request without executing it
    Plan {
        /// The request
        task: String,
    },
    /// List available capabilities
    Tools,
}

/// Run the CLI command
pub async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    match cli.command {
        Some(Commands::Ask {
            task,
            rounds,
            timeout,
            json,
        }) => ask::run(&task, rounds, timeout, json).await,
        Some(Commands::Plan { task }) => plan::run(&task).await,
        Some(Commands::Tools) => tools::run(),
        None => {
            let mut cmd = <Cli as clap::CommandFactory>::command();
            cmd.print_help()?;
            println!();
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Build the capability registry from configuration
pub(crate) fn build_registry(config: &AppConfig) -> anyhow::Result<ToolRegistry> {
    let mut registry = ToolRegistry::new();
    register_builtins_with_config(&mut registry, &config.builtins_config())?;
    Ok(registry)
}

/// Wire backend, registry and orchestrator
///
/// A missing `GROQ_API_KEY` is reported with a friendly message and
/// yields `Ok(None)`.
pub(crate) fn build_orchestrator(
    config: &AppConfig,
    orchestrator_config: OrchestratorConfig,
) -> anyhow::Result<Option<Orchestrator>> {
    let groq = match GroqConfig::from_env() {
        Ok(groq) => groq,
        Err(e) => {
            eprint!("{}", format_error_for_cli(&aiops_core::Error::Backend(e)));
            return Ok(None);
        }
    };
    let groq = if std::env::var("GROQ_MODEL").is_ok() {
        groq
    } else {
        groq.with_model(config.llm.model.as_str())
    };
    let groq = groq.with_timeout(Duration::from_secs(config.llm.timeout_secs));
    debug!(config = ?groq, "Reasoning backend configured");

    let provider = Arc::new(GroqProvider::new(groq)?);
    let backend = Arc::new(StructuredBackend::new(provider, config.structured_config()));
    let registry = Arc::new(build_registry(config)?);

    Ok(Some(Orchestrator::new(
        backend,
        registry,
        orchestrator_config,
    )))
}

/// Load configuration, printing validation errors the friendly way
pub(crate) fn load() -> anyhow::Result<Option<AppConfig>> {
    match load_config() {
        Ok(config) => Ok(Some(config)),
        Err(e) => match e.downcast_ref::<aiops_core::Error>() {
            Some(core) => {
                eprint!("{}", format_error_for_cli(core));
                Ok(None)
            }
            None => Err(e),
        },
    }
}
