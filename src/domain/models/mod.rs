//! Domain models for the orchestrator.

pub mod agent;
pub mod dag;
pub mod params;
pub mod response;
pub mod task;
pub mod team;
pub mod usage;

pub use agent::AgentDefinition;
pub use dag::{DagNode, NodeStatus, ReviewRecord};
pub use params::{
    AgentScope, ChainStep, GitContextOpt, GitContextSpec, ParallelParams, RaceSpec, TaskSpec,
};
pub use response::{ContentBlock, DagInfo, DagTaskInfo, RunDetails, RunMode, ToolResponse};
pub use task::{TaskProgress, TaskResult, TaskState, ToolCall};
pub use team::{ReviewConfig, TeamMember, TeamSpec, TeamTask, DEFAULT_REVIEW_ITERATIONS};
pub use usage::UsageStats;
