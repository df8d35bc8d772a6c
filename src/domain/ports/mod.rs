//! Trait seams between the engines and the outside world.

pub mod agent_runner;
pub mod approval;

pub use agent_runner::{null_progress_sink, AgentInvocation, AgentRunner, ProgressSink};
pub use approval::{ApprovalDecision, ApprovalGate, AutoApprove};
