//! Team-mode specifications: members, tasks, and review configuration.

use serde::{Deserialize, Serialize};

/// A named member of a team. Roles are referenced by task `assignee` and
/// review `assignee` fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamMember {
    pub role: String,
    /// Optional agent definition supplying defaults for this member.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Restriction set; `None` leaves the child's default tool set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking: Option<String>,
    /// Inline task text. Only consulted when the team supplies no explicit
    /// task list: each member with a task gets one auto-generated node.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task: Option<String>,
}

/// Reviewer loop configuration attached to a team task.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewConfig {
    /// Role of the reviewing member.
    pub assignee: String,
    /// Custom review prompt template; `{output}` and `{task}` are
    /// substituted. A default template is used when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_iterations: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<String>>,
}

/// Default cap on worker/reviewer refinement iterations.
pub const DEFAULT_REVIEW_ITERATIONS: u32 = 3;

impl ReviewConfig {
    pub fn iteration_cap(&self) -> u32 {
        self.max_iterations
            .unwrap_or(DEFAULT_REVIEW_ITERATIONS)
            .max(1)
    }
}

/// One task in a team dependency graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamTask {
    pub id: String,
    /// Task text; may contain `{task:id}` placeholders resolved against
    /// completed dependency outputs.
    pub task: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depends: Option<Vec<String>>,
    /// Gate the task behind a human approval of its first (read-only) pass.
    #[serde(default)]
    pub requires_approval: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review: Option<ReviewConfig>,
}

impl TeamTask {
    pub fn new(id: impl Into<String>, task: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            task: task.into(),
            assignee: None,
            depends: None,
            requires_approval: false,
            review: None,
        }
    }

    #[must_use]
    pub fn with_assignee(mut self, role: impl Into<String>) -> Self {
        self.assignee = Some(role.into());
        self
    }

    #[must_use]
    pub fn with_depends(mut self, deps: Vec<String>) -> Self {
        self.depends = Some(deps);
        self
    }

    pub fn depends_on(&self) -> &[String] {
        self.depends.as_deref().unwrap_or(&[])
    }
}

/// Team-mode parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamSpec {
    #[serde(default)]
    pub objective: String,
    pub members: Vec<TeamMember>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tasks: Option<Vec<TeamTask>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_concurrency: Option<usize>,
}
