//! Port for human-in-the-loop approval of gated tasks.

use async_trait::async_trait;

/// Outcome of an approval request.
#[derive(Debug, Clone)]
pub struct ApprovalDecision {
    pub approved: bool,
    /// Reviewer feedback, appended to the task text on rejection.
    pub feedback: Option<String>,
}

impl ApprovalDecision {
    pub fn approve() -> Self {
        Self {
            approved: true,
            feedback: None,
        }
    }

    pub fn reject(feedback: impl Into<String>) -> Self {
        Self {
            approved: false,
            feedback: Some(feedback.into()),
        }
    }
}

/// Asynchronous approval callback. The gate may suspend indefinitely; the
/// executor races it against the run's cancellation token.
#[async_trait]
pub trait ApprovalGate: Send + Sync {
    async fn review_plan(&self, task_id: &str, plan: &str) -> ApprovalDecision;
}

/// Gate used when the caller supplies none: everything passes.
pub struct AutoApprove;

#[async_trait]
impl ApprovalGate for AutoApprove {
    async fn review_plan(&self, _task_id: &str, _plan: &str) -> ApprovalDecision {
        ApprovalDecision::approve()
    }
}
