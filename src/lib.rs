//! pi-parallel - multi-agent orchestrator for the `pi` CLI.
//!
//! Schedules LLM agent subprocesses across five execution modes (single,
//! parallel, chain, race, team) with per-task overrides, shared context,
//! and streaming progress. The host tool-calling runtime drives the
//! [`services::Dispatcher`]; each agent runs as an isolated `pi` child
//! speaking a line-delimited JSON event protocol.

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

pub use domain::models::{ParallelParams, RunDetails, ToolResponse};
pub use services::{Dispatcher, RunnerConfig};
