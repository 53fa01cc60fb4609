//! AI Ops Tools - capability registry and adapters
//!
//! This crate provides the tool system for the assistant:
//! - Registry: capability registration, schema validation and invocation
//! - Runner: single-attempt execution with timeout and cancellation
//! - Builtins: weather, GitHub and news adapters
//! - Http: shared client and upstream status mapping

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod builtins;
pub mod error;
pub mod http;
pub mod registry;
pub mod runner;

pub use builtins::{register_builtins, register_builtins_with_config, BuiltinsConfig};
pub use error::{Error, FailureKind, Result, ToolFailure};
pub use registry::{
    CapabilityCatalogue, CapabilityDescriptor, Outcome, Tool, ToolRegistry, ToolResult,
};
pub use runner::{RunnerConfig, ToolRunner};
