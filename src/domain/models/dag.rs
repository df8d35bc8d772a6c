//! Team dependency-graph node model.
//!
//! Nodes are owned and mutated exclusively by the graph executor for the
//! duration of one run; everything handed outward is a copy.

use serde::{Deserialize, Serialize};

use super::task::TaskResult;
use super::team::{TeamMember, TeamTask};

/// Per-node scheduling state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Pending,
    /// A dependency failed or was itself blocked; terminal.
    Blocked,
    Ready,
    Running,
    Completed,
    Failed,
    /// Successful first pass, waiting on the approval gate.
    AwaitingApproval,
    /// Worker output handed to the reviewer.
    Reviewing,
    /// Reviewer asked for changes; worker rerun in flight.
    Revising,
}

impl NodeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Blocked => "blocked",
            Self::Ready => "ready",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::AwaitingApproval => "awaiting_approval",
            Self::Reviewing => "reviewing",
            Self::Revising => "revising",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Blocked)
    }
}

/// One worker/reviewer exchange in a refinement loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewRecord {
    /// 1-based iteration this exchange belongs to.
    pub iteration: u32,
    pub worker_output: String,
    pub reviewer_output: String,
    pub approved: bool,
}

/// A task node with resolved assignee and edge lists.
#[derive(Debug, Clone)]
pub struct DagNode {
    pub task: TeamTask,
    /// Resolved member, `None` for unassigned tasks.
    pub assignee: Option<TeamMember>,
    pub depends_on: Vec<String>,
    pub depended_by: Vec<String>,
    pub status: NodeStatus,
    pub result: Option<TaskResult>,
    /// 1-based review iteration, set once a review loop starts.
    pub iteration: Option<u32>,
    pub review_history: Vec<ReviewRecord>,
    /// Every intermediate worker/reviewer result, in execution order.
    pub iteration_results: Vec<TaskResult>,
    /// Set after the approval gate rejects once; the rerun then skips the
    /// read-only tool restriction.
    pub approval_rejected: bool,
}

impl DagNode {
    pub fn new(task: TeamTask, assignee: Option<TeamMember>) -> Self {
        let depends_on = task.depends_on().to_vec();
        Self {
            task,
            assignee,
            depends_on,
            depended_by: Vec::new(),
            status: NodeStatus::Pending,
            result: None,
            iteration: None,
            review_history: Vec::new(),
            iteration_results: Vec::new(),
            approval_rejected: false,
        }
    }

    pub fn id(&self) -> &str {
        &self.task.id
    }

    /// Display label used in prerequisite-context headings: the assignee
    /// role with the id, or the bare id for unassigned tasks.
    pub fn label(&self) -> String {
        match &self.assignee {
            Some(member) => format!("{} ({})", member.role, self.task.id),
            None => self.task.id.clone(),
        }
    }

    /// Output of the node's accepted result, empty if none.
    pub fn output(&self) -> &str {
        self.result.as_ref().map(|r| r.output.as_str()).unwrap_or("")
    }
}
