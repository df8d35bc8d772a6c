//! Parameter object accepted by the `parallel` tool entry point.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::team::TeamSpec;

/// Which agent-definition scope to consult when resolving `agent` names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentScope {
    #[default]
    User,
    Project,
    Both,
}

/// One entry of the parallel-mode task list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSpec {
    pub task: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking: Option<String>,
}

/// One step of a chain. `{previous}` in the task text is replaced with the
/// prior step's output.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainStep {
    pub task: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking: Option<String>,
}

/// Race-mode parameters: the same task across several models.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RaceSpec {
    pub task: String,
    pub models: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking: Option<String>,
}

/// Git-derived shared context selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GitContextOpt {
    /// `true` means `{branch, status}`; `false` disables.
    Flag(bool),
    Options(GitContextSpec),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitContextSpec {
    #[serde(default)]
    pub branch: bool,
    #[serde(default)]
    pub diff: bool,
    #[serde(default)]
    pub diff_stats: bool,
    /// Number of `git log --oneline` entries to include.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log: Option<u32>,
    #[serde(default)]
    pub status: bool,
}

impl GitContextOpt {
    /// Normalize to a concrete selection; `None` when disabled.
    pub fn resolve(&self) -> Option<GitContextSpec> {
        match self {
            Self::Flag(false) => None,
            Self::Flag(true) => Some(GitContextSpec {
                branch: true,
                status: true,
                ..Default::default()
            }),
            Self::Options(spec) => Some(spec.clone()),
        }
    }
}

/// The single parameter object of the `parallel` tool. Exactly one of
/// `task`, `tasks`, `chain`, `race`, `team` selects the execution mode.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParallelParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_scope: Option<AgentScope>,

    // Single mode and its overrides.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tasks: Option<Vec<TaskSpec>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_files: Option<Vec<PathBuf>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_context: Option<GitContextOpt>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_concurrency: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain: Option<Vec<ChainStep>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub race: Option<RaceSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team: Option<TeamSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<PathBuf>,
}

impl ParallelParams {
    /// Count of mode selectors present. Valid invocations have exactly one.
    pub fn mode_count(&self) -> usize {
        [
            self.task.is_some(),
            self.tasks.is_some(),
            self.chain.is_some(),
            self.race.is_some(),
            self.team.is_some(),
        ]
        .iter()
        .filter(|present| **present)
        .count()
    }
}
