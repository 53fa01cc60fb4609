//! aiops - plan, execute and verify answers with live data
//!
//! CLI entry point.

#![forbid(unsafe_code)]

use anyhow::Result;
use clap::Parser;
use std::process::ExitCode;
use tracing::{debug, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod cli;
mod config;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "aiops=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = cli::Cli::parse();

    if cli.command.is_some() {
        debug!("Starting aiops v{}", env!("CARGO_PKG_VERSION"));
        if std::env::var("GROQ_API_KEY").is_err() && !std::path::Path::new(".env").exists() {
            warn!(".env file not found and GROQ_API_KEY is not set");
        }
    }

    cli::run(cli).await
}
