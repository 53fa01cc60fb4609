//! `aiops ask` - full pipeline

use aiops_core::{format_error_for_cli, Answer};
use std::process::ExitCode;
use std::time::Duration;

/// Run the ask command
pub async fn run(
    task: &str,
    rounds: Option<u32>,
    timeout: Option<u64>,
    json: bool,
) -> anyhow::Result<ExitCode> {
    let Some(config) = super::load()? else {
        return Ok(ExitCode::FAILURE);
    };

    let mut orchestrator_config = config.orchestrator_config();
    if let Some(rounds) = rounds {
        orchestrator_config = orchestrator_config.with_max_attempts(rounds);
    }
    let Some(orchestrator) = super::build_orchestrator(&config, orchestrator_config)? else {
        return Ok(ExitCode::FAILURE);
    };

    match orchestrator
        .answer(task, timeout.map(Duration::from_secs))
        .await
    {
        Ok(answer) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&answer)?);
            } else {
                print!("{}", render(&answer));
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(failure) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&failure)?);
            }
            eprint!("{}", format_error_for_cli(&failure));
            Ok(ExitCode::FAILURE)
        }
    }
}

fn render(answer: &Answer) -> String {
    let mut output = String::new();
    output.push_str(answer.text.trim_end());
    output.push('\n');

    if !answer.unavailable.is_empty() {
        output.push_str(&format!(
            "\n⚠️ Unavailable: {}\n",
            answer.unavailable.join(", ")
        ));
    }
    if !answer.verified {
        output.push_str(&format!(
            "\n🔍 Unverified after {} attempt(s)",
            answer.attempts
        ));
        if !answer.verdict.missing_categories.is_empty() {
            output.push_str(&format!(
                "; missing: {}",
                answer.verdict.missing_categories.join(", ")
            ));
        }
        output.push('\n');
    }
    output
}
