//! `aiops plan` - planner only

use aiops_core::format_error_for_cli;
use std::process::ExitCode;

/// Run the plan command
pub async fn run(task: &str) -> anyhow::Result<ExitCode> {
    let Some(config) = super::load()? else {
        return Ok(ExitCode::FAILURE);
    };
    let Some(orchestrator) = super::build_orchestrator(&config, config.orchestrator_config())?
    else {
        return Ok(ExitCode::FAILURE);
    };

    match orchestrator.plan_only(task).await {
        Ok(plan) => {
            println!("{}", serde_json::to_string_pretty(&plan)?);
            Ok(ExitCode::SUCCESS)
        }
        Err(failure) => {
            eprint!("{}", format_error_for_cli(&failure));
            Ok(ExitCode::FAILURE)
        }
    }
}
