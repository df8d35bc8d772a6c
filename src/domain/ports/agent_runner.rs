//! Port for executing one child agent.
//!
//! The production implementation spawns the `pi` CLI; tests plug in a
//! scriptable mock. Runners never raise: every failure mode is expressed
//! on the returned `TaskResult` (`exit_code`, `error`, `aborted`).

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::domain::models::{TaskProgress, TaskResult};

/// Callback receiving progress snapshots. Invoked from concurrent child
/// watchers; implementations serialize their own state updates.
pub type ProgressSink = Arc<dyn Fn(TaskProgress) + Send + Sync>;

/// A no-op sink for callers that do not observe progress.
pub fn null_progress_sink() -> ProgressSink {
    Arc::new(|_| {})
}

/// Everything needed to run one agent task.
#[derive(Debug, Clone)]
pub struct AgentInvocation {
    /// Stable identifier; also keys progress entries.
    pub id: String,
    pub name: Option<String>,
    /// Chain step index, if any.
    pub step: Option<usize>,
    /// Task text (without the `Task:` framing; the runner adds it).
    pub task: String,
    /// Shared context prepended to the prompt.
    pub context: Option<String>,
    pub cwd: PathBuf,
    pub provider: Option<String>,
    pub model: Option<String>,
    pub tools: Option<Vec<String>>,
    pub system_prompt: Option<String>,
    pub thinking: Option<String>,
}

impl AgentInvocation {
    pub fn new(id: impl Into<String>, task: impl Into<String>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            name: None,
            step: None,
            task: task.into(),
            context: None,
            cwd: cwd.into(),
            provider: None,
            model: None,
            tools: None,
            system_prompt: None,
            thinking: None,
        }
    }

    /// The composite prompt handed to the child.
    pub fn prompt(&self) -> String {
        match self.context.as_deref().filter(|c| !c.is_empty()) {
            Some(context) => format!("{}\n\nTask: {}", context, self.task),
            None => format!("Task: {}", self.task),
        }
    }
}

/// Executes one agent task to completion.
#[async_trait]
pub trait AgentRunner: Send + Sync {
    /// Run the invocation, publishing progress through `sink`. Cancellation
    /// must produce a result with `aborted = true` rather than an error.
    async fn run(
        &self,
        invocation: AgentInvocation,
        cancel: CancellationToken,
        sink: ProgressSink,
    ) -> TaskResult;
}
