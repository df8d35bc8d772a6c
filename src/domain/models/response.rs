//! Structured response returned to the host tool-calling runtime.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::dag::NodeStatus;
use super::task::{TaskProgress, TaskResult};
use super::usage::UsageStats;

/// Which execution mode a dispatcher invocation ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    Single,
    Parallel,
    Chain,
    Race,
    Team,
}

impl RunMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Single => "single",
            Self::Parallel => "parallel",
            Self::Chain => "chain",
            Self::Race => "race",
            Self::Team => "team",
        }
    }
}

/// Content block in the tool response payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text { text: String },
}

/// Per-task view of the dependency graph included in team responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DagTaskInfo {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,
    pub depends: Vec<String>,
    pub status: NodeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iteration: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_iterations: Option<u32>,
}

/// Graph summary for team mode, in declared task order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DagInfo {
    pub objective: String,
    pub members: Vec<String>,
    pub tasks: Vec<DagTaskInfo>,
    /// Task still waiting on an approval decision when the run returned.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_approval: Option<String>,
}

/// Machine-readable details accompanying the response text.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunDetails {
    pub run_id: Uuid,
    pub mode: RunMode,
    pub results: Vec<TaskResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<Vec<TaskProgress>>,
    pub total_duration_ms: u64,
    pub usage: UsageStats,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub aborted: bool,
    /// Winning model for race mode.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub winner: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dag_info: Option<DagInfo>,
}

/// Response envelope handed back to the host runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResponse {
    pub content: Vec<ContentBlock>,
    pub details: RunDetails,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_error: bool,
}

impl ToolResponse {
    pub fn text(mode: RunMode, text: impl Into<String>, details: RunDetails) -> Self {
        debug_assert_eq!(mode, details.mode);
        Self {
            content: vec![ContentBlock::Text { text: text.into() }],
            details,
            is_error: false,
        }
    }

    /// Validation failure: descriptive text, nothing executed.
    pub fn validation_error(mode: RunMode, text: impl Into<String>) -> Self {
        Self {
            content: vec![ContentBlock::Text { text: text.into() }],
            details: RunDetails {
                run_id: Uuid::new_v4(),
                mode,
                results: Vec::new(),
                progress: None,
                total_duration_ms: 0,
                usage: UsageStats::default(),
                aborted: false,
                winner: None,
                dag_info: None,
            },
            is_error: true,
        }
    }

    /// The first text block, for callers that only render text.
    pub fn text_content(&self) -> &str {
        self.content
            .iter()
            .map(|ContentBlock::Text { text }| text.as_str())
            .next()
            .unwrap_or("")
    }
}
