//! Orchestrator - plan, execute, verify loop
//!
//! This module ties together the planner, executor and verifier and
//! applies the bounded re-planning policy.
//!
//! # Module Structure
//!
//! - `config`: `OrchestratorConfig`
//! - `types`: `RunState`, `AnswerStatus`, `Answer`
//! - `core`: Orchestrator struct and constructor
//! - `process`: Main loop (`answer`, `plan_only`)

mod config;
mod core;
mod process;
mod types;


pub use config::{OrchestratorConfig, MAX_ATTEMPTS, MIN_ATTEMPTS};
pub use core::Orchestrator;
pub use types::{Answer, AnswerStatus, RunState};
