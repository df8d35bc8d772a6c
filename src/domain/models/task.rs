//! Task result and progress models.
//!
//! A `TaskResult` is the immutable record of one child agent run. A
//! `TaskProgress` is the mutable view published through a progress sink
//! while the child is streaming events.

use std::collections::VecDeque;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::usage::UsageStats;

/// Bounded window of recent tool invocations kept on a progress entry.
pub const RECENT_TOOLS_WINDOW: usize = 10;
/// Bounded window of recent output previews kept on a progress entry.
pub const RECENT_OUTPUT_WINDOW: usize = 5;

/// Lifecycle state of a single task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Pending,
    Running,
    Completed,
    Failed,
    Aborted,
}

impl TaskState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Aborted => "aborted",
        }
    }

    pub fn glyph(&self) -> &'static str {
        match self {
            Self::Pending => "…",
            Self::Running => "▶",
            Self::Completed => "✅",
            Self::Failed => "❌",
            Self::Aborted => "🛑",
        }
    }
}

/// Final record of one child agent run. Immutable once returned.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskResult {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub task: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub exit_code: i32,
    /// Final assistant text, already passed through output shaping.
    pub output: String,
    /// Set only when the full output was spilled to a file.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_output_path: Option<PathBuf>,
    pub stderr: String,
    pub truncated: bool,
    pub duration_ms: u64,
    pub usage: UsageStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub aborted: bool,
    /// Chain step index, when the task ran as part of a chain.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<usize>,
}

impl TaskResult {
    /// A result that never reached the child process.
    pub fn spawn_failure(id: impl Into<String>, task: impl Into<String>, error: String) -> Self {
        Self {
            id: id.into(),
            name: None,
            task: task.into(),
            model: None,
            exit_code: 1,
            output: String::new(),
            full_output_path: None,
            stderr: String::new(),
            truncated: false,
            duration_ms: 0,
            usage: UsageStats::default(),
            error: Some(error),
            aborted: false,
            step: None,
        }
    }

    /// Did the run finish cleanly (exit 0, no error, not aborted)?
    pub fn succeeded(&self) -> bool {
        self.exit_code == 0 && self.error.is_none() && !self.aborted
    }

    pub fn state(&self) -> TaskState {
        if self.aborted {
            TaskState::Aborted
        } else if self.succeeded() {
            TaskState::Completed
        } else {
            TaskState::Failed
        }
    }
}

/// One completed tool invocation, kept in the recent-tools window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub tool: String,
    /// Preview of the arguments, already formatted and length-capped.
    pub args: String,
}

/// Live view of one task, published through the progress sink on every
/// observed child event. Consumers receive defensive copies.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskProgress {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub status: TaskState,
    pub task: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_tool: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_tool_args: Option<String>,
    pub recent_tools: VecDeque<ToolCall>,
    pub recent_output: VecDeque<String>,
    pub tool_count: u32,
    pub usage: UsageStats,
    pub duration_ms: u64,
}

impl TaskProgress {
    pub fn new(id: impl Into<String>, task: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            status: TaskState::Pending,
            task: task.into(),
            model: None,
            current_tool: None,
            current_tool_args: None,
            recent_tools: VecDeque::new(),
            recent_output: VecDeque::new(),
            tool_count: 0,
            usage: UsageStats::default(),
            duration_ms: 0,
        }
    }

    #[must_use]
    pub fn with_name(mut self, name: Option<String>) -> Self {
        self.name = name;
        self
    }

    #[must_use]
    pub fn with_model(mut self, model: Option<String>) -> Self {
        self.model = model;
        self
    }

    /// Append a finished tool call, dropping the oldest beyond the window.
    pub fn push_tool(&mut self, call: ToolCall) {
        if self.recent_tools.len() == RECENT_TOOLS_WINDOW {
            self.recent_tools.pop_front();
        }
        self.recent_tools.push_back(call);
        self.tool_count += 1;
        self.current_tool = None;
        self.current_tool_args = None;
    }

    /// Append an output preview, dropping the oldest beyond the window.
    pub fn push_output(&mut self, preview: String) {
        if self.recent_output.len() == RECENT_OUTPUT_WINDOW {
            self.recent_output.pop_front();
        }
        self.recent_output.push_back(preview);
    }
}
