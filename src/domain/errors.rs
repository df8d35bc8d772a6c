//! Domain error types.
//!
//! Graph-validation errors are the only errors the engines throw; the
//! dispatcher converts them into validation responses before any child
//! process is spawned.

use thiserror::Error;

/// Errors raised while validating and building a team task graph.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("Duplicate task id: {0}")]
    DuplicateTask(String),

    #[error("Task \"{task}\" depends on unknown task \"{dependency}\"")]
    UnknownDependency { task: String, dependency: String },

    #[error("Task \"{task}\" is assigned to unknown member \"{assignee}\"")]
    UnknownAssignee { task: String, assignee: String },

    #[error("Task \"{task}\" names unknown reviewer \"{assignee}\"")]
    UnknownReviewer { task: String, assignee: String },

    #[error("Dependency cycle detected involving tasks: {}", .0.join(", "))]
    CycleDetected(Vec<String>),
}
