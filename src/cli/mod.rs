//! Command-line front end.
//!
//! The primary consumer of this crate is a host tool-calling runtime using
//! the library API; this binary is the standalone path: read a params JSON
//! document, run the dispatcher against real `pi` children, print the
//! response text.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::adapters::PiProcessRunner;
use crate::domain::models::{AgentScope, ParallelParams};
use crate::infrastructure::{LogConfig, LogFormat, Logger};
use crate::services::{discover_agents, Dispatcher, RunnerConfig};

#[derive(Debug, Parser)]
#[command(name = "pi-parallel", about = "Multi-agent orchestrator for pi", version)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Emit JSON logs instead of human-readable ones.
    #[arg(long, global = true)]
    log_json: bool,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Execute a params document through the orchestrator.
    Run {
        /// Path to the JSON parameter object.
        #[arg(long)]
        params: PathBuf,

        /// Working directory for child agents (overrides the document).
        #[arg(long)]
        cwd: Option<PathBuf>,

        /// Runner configuration TOML.
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// List discovered agent definitions.
    Agents {
        /// Scope to consult: user, project, or both.
        #[arg(long, default_value = "both")]
        scope: String,
    },
}

pub async fn run(cli: Cli) -> Result<()> {
    let _logger = Logger::init(&LogConfig {
        level: cli.log_level.clone(),
        format: if cli.log_json {
            LogFormat::Json
        } else {
            LogFormat::Pretty
        },
        log_dir: None,
    })?;

    match cli.command {
        Commands::Run { params, cwd, config } => run_params(params, cwd, config).await,
        Commands::Agents { scope } => list_agents(&scope),
    }
}

async fn run_params(
    params_path: PathBuf,
    cwd: Option<PathBuf>,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let raw = std::fs::read_to_string(&params_path)
        .with_context(|| format!("reading params file {}", params_path.display()))?;
    let mut params: ParallelParams =
        serde_json::from_str(&raw).context("parsing params document")?;
    if cwd.is_some() {
        params.cwd = cwd;
    }

    let config = match config_path {
        Some(path) => RunnerConfig::load(&path)?,
        None => RunnerConfig::default(),
    };

    let effective_cwd = params
        .cwd
        .clone()
        .unwrap_or(std::env::current_dir().context("resolving working directory")?);
    let scope = params.agent_scope.unwrap_or_default();
    let agents = discover_agents(scope, &effective_cwd);

    let runner = Arc::new(PiProcessRunner::new(config.clone()));
    let dispatcher = Dispatcher::new(runner)
        .with_agents(agents)
        .with_config(config);

    // First Ctrl-C cancels the run; children escalate soft -> hard.
    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, cancelling run");
            signal_token.cancel();
        }
    });

    let response = dispatcher.dispatch(params, cancel).await;
    println!("{}", response.text_content());

    if response.is_error {
        std::process::exit(1);
    }
    Ok(())
}

fn list_agents(scope: &str) -> Result<()> {
    let scope = match scope {
        "user" => AgentScope::User,
        "project" => AgentScope::Project,
        "both" => AgentScope::Both,
        other => anyhow::bail!("Unknown scope: {other} (expected user, project, or both)"),
    };
    let cwd = std::env::current_dir()?;
    let mut agents: Vec<_> = discover_agents(scope, &cwd).into_values().collect();
    agents.sort_by(|a, b| a.name.cmp(&b.name));

    if agents.is_empty() {
        println!("No agent definitions found.");
        return Ok(());
    }
    for agent in agents {
        let model = agent.model.as_deref().unwrap_or("-");
        let tools = agent
            .tools
            .as_ref()
            .map(|t| t.join(","))
            .unwrap_or_else(|| "-".to_string());
        println!("{:<20} model={:<20} tools={}", agent.name, model, tools);
    }
    Ok(())
}
