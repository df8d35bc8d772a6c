//! Team graph execution.
//!
//! A serialized scheduler over a validated `TaskGraph`: collects ready
//! nodes, runs them as a parallel batch of child agents, then re-evaluates
//! readiness. Approval gates and worker/reviewer refinement loops are
//! driven between batches, so graph bookkeeping never races with child
//! completions.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::domain::models::{
    DagNode, NodeStatus, ReviewRecord, TaskResult, TeamMember,
};
use crate::domain::ports::{
    AgentInvocation, AgentRunner, ApprovalDecision, ApprovalGate, ProgressSink,
};
use crate::services::context::{resolve_task_refs, SECTION_SEPARATOR};
use crate::services::dag_builder::TaskGraph;
use crate::services::review::{
    build_review_prompt, build_revision_prompt, parse_decision, REVIEW_PROTOCOL,
};
use crate::services::worker_pool::MAX_CONCURRENCY;

/// Tool subset for the first pass of approval-gated tasks. The plan is
/// produced without write access; the gate decides whether it proceeds.
pub const READ_ONLY_TOOLS: [&str; 5] = ["read", "bash", "grep", "find", "mcp"];

/// Outcome of one graph run.
#[derive(Debug)]
pub struct GraphRunOutcome {
    /// Every task, review, and revision result, in completion order.
    pub results: Vec<TaskResult>,
    pub aborted: bool,
    /// Node still waiting on an approval decision when the run returned.
    pub pending_approval: Option<String>,
}

/// Executes a team task graph against an agent runner.
pub struct GraphExecutor {
    runner: Arc<dyn AgentRunner>,
    members: HashMap<String, TeamMember>,
    approval: Option<Arc<dyn ApprovalGate>>,
    sink: ProgressSink,
    cwd: PathBuf,
    objective: String,
    shared_context: Option<String>,
    workspace_path: Option<PathBuf>,
    max_concurrency: usize,
}

impl GraphExecutor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        runner: Arc<dyn AgentRunner>,
        members: HashMap<String, TeamMember>,
        approval: Option<Arc<dyn ApprovalGate>>,
        sink: ProgressSink,
        cwd: PathBuf,
        objective: String,
        shared_context: Option<String>,
        workspace_path: Option<PathBuf>,
        max_concurrency: usize,
    ) -> Self {
        Self {
            runner,
            members,
            approval,
            sink,
            cwd,
            objective,
            shared_context,
            workspace_path,
            max_concurrency: max_concurrency.clamp(1, MAX_CONCURRENCY),
        }
    }

    /// Run the graph to quiescence: every node terminal, an approval left
    /// hanging by cancellation, or the token fired.
    pub async fn execute(
        &self,
        graph: &mut TaskGraph,
        cancel: &CancellationToken,
    ) -> GraphRunOutcome {
        let mut results: Vec<TaskResult> = Vec::new();

        loop {
            if cancel.is_cancelled() {
                return GraphRunOutcome {
                    results,
                    aborted: true,
                    pending_approval: graph.awaiting_approval(),
                };
            }

            if let Some(id) = graph.awaiting_approval() {
                match self.drive_approval(graph, &id, cancel).await {
                    Ok(()) => {
                        graph.refresh_readiness();
                        continue;
                    }
                    Err(Interrupted) => {
                        return GraphRunOutcome {
                            results,
                            aborted: true,
                            pending_approval: Some(id),
                        };
                    }
                }
            }

            let ready = graph.ready_ids();
            if ready.is_empty() {
                // Serialized scheduler: nothing is in flight here, so an
                // empty ready set means the graph cannot make progress.
                graph.block_unreachable();
                break;
            }

            let batch: Vec<String> = ready.into_iter().take(self.max_concurrency).collect();
            debug!(batch = ?batch, "starting graph batch");
            for id in &batch {
                if let Some(node) = graph.get_mut(id) {
                    node.status = NodeStatus::Running;
                }
            }

            let outputs = graph.completed_outputs();
            let invocations: Vec<(String, AgentInvocation)> = batch
                .iter()
                .map(|id| (id.clone(), self.build_invocation(graph, id, &outputs)))
                .collect();

            let batch_results = futures::future::join_all(invocations.into_iter().map(
                |(id, invocation)| {
                    let runner = Arc::clone(&self.runner);
                    let cancel = cancel.clone();
                    let sink = Arc::clone(&self.sink);
                    async move { (id, runner.run(invocation, cancel, sink).await) }
                },
            ))
            .await;

            let mut reviewing: Vec<String> = Vec::new();
            for (id, result) in batch_results {
                results.push(result.clone());
                let node = graph.get_mut(&id).expect("batch ids come from the graph");
                if !result.succeeded() {
                    info!(task_id = %id, error = ?result.error, "graph task failed");
                    node.result = Some(result);
                    node.status = NodeStatus::Failed;
                    continue;
                }
                node.result = Some(result);
                if node.task.requires_approval {
                    node.status = NodeStatus::AwaitingApproval;
                } else if node.task.review.is_some() {
                    node.status = NodeStatus::Reviewing;
                    reviewing.push(id);
                } else {
                    node.status = NodeStatus::Completed;
                }
            }

            for id in reviewing {
                self.run_review_cycle(graph, &id, cancel, &mut results).await;
            }

            graph.refresh_readiness();
        }

        GraphRunOutcome {
            results,
            aborted: false,
            pending_approval: None,
        }
    }

    /// Ask the approval gate about a node's plan and apply the decision.
    /// Without a gate, plans auto-approve.
    async fn drive_approval(
        &self,
        graph: &mut TaskGraph,
        id: &str,
        cancel: &CancellationToken,
    ) -> Result<(), Interrupted> {
        let plan = graph
            .get(id)
            .map(|node| node.output().to_string())
            .unwrap_or_default();

        let decision = match &self.approval {
            Some(gate) => {
                tokio::select! {
                    _ = cancel.cancelled() => return Err(Interrupted),
                    decision = gate.review_plan(id, &plan) => decision,
                }
            }
            None => ApprovalDecision::approve(),
        };

        let node = graph.get_mut(id).expect("approval id from the graph");
        if decision.approved {
            info!(task_id = %id, "plan approved");
            node.status = NodeStatus::Completed;
        } else {
            info!(task_id = %id, "plan rejected, rescheduling");
            node.approval_rejected = true;
            if let Some(feedback) = decision.feedback.filter(|f| !f.is_empty()) {
                node.task.task = format!(
                    "{}\n\n## Approval Feedback\n{}\n\nRevise your approach accordingly.",
                    node.task.task, feedback
                );
            }
            node.status = NodeStatus::Ready;
        }
        Ok(())
    }

    /// Build the invocation for one ready node: placeholder resolution,
    /// layered context, member settings, and the read-only restriction for
    /// un-rejected approval-gated first passes.
    fn build_invocation(
        &self,
        graph: &TaskGraph,
        id: &str,
        outputs: &HashMap<String, String>,
    ) -> AgentInvocation {
        let node = graph.get(id).expect("ready id from the graph");
        let task_text = resolve_task_refs(&node.task.task, outputs);
        let member = node.assignee.as_ref();

        let tools = if node.task.requires_approval && !node.approval_rejected {
            Some(READ_ONLY_TOOLS.iter().map(|t| t.to_string()).collect())
        } else {
            member.and_then(|m| m.tools.clone())
        };

        AgentInvocation {
            id: id.to_string(),
            name: member.map(|m| m.role.clone()),
            step: None,
            task: task_text,
            context: self.build_node_context(graph, node),
            cwd: self.cwd.clone(),
            provider: member.and_then(|m| m.provider.clone()),
            model: member.and_then(|m| m.model.clone()),
            tools,
            system_prompt: member.and_then(|m| m.system_prompt.clone()),
            thinking: member.and_then(|m| m.thinking.clone()),
        }
    }

    /// Layered context: objective, caller context, workspace path, then one
    /// section per completed dependency.
    fn build_node_context(&self, graph: &TaskGraph, node: &DagNode) -> Option<String> {
        let mut sections: Vec<String> = Vec::new();

        if !self.objective.is_empty() {
            sections.push(format!("## Team Objective\n{}", self.objective));
        }
        if let Some(shared) = self.shared_context.as_deref().filter(|c| !c.is_empty()) {
            sections.push(shared.to_string());
        }
        if let Some(path) = &self.workspace_path {
            sections.push(format!("## Shared Workspace\n{}", path.display()));
        }
        for dep_id in &node.depends_on {
            let Some(dep) = graph.get(dep_id) else { continue };
            if dep.status == NodeStatus::Completed {
                sections.push(format!(
                    "## Output from prerequisite task \"{}\"\n{}",
                    dep.label(),
                    dep.output()
                ));
            }
        }

        if sections.is_empty() {
            None
        } else {
            Some(sections.join(SECTION_SEPARATOR))
        }
    }

    /// Worker/reviewer refinement loop for one node whose worker just
    /// succeeded. Runs synchronously within the scheduling step.
    async fn run_review_cycle(
        &self,
        graph: &mut TaskGraph,
        id: &str,
        cancel: &CancellationToken,
        results: &mut Vec<TaskResult>,
    ) {
        let (review, original_task, initial_result, node_context) = {
            let node = graph.get(id).expect("review id from the graph");
            (
                node.task.review.clone().expect("node entered review"),
                node.task.task.clone(),
                node.result.clone().expect("worker result present"),
                self.build_node_context(graph, node),
            )
        };
        let max_iterations = review.iteration_cap();
        let reviewer_member = self.members.get(&review.assignee).cloned();

        if let Some(node) = graph.get_mut(id) {
            node.iteration_results.push(initial_result);
        }

        let mut previous_feedback: Option<String> = None;
        let mut iteration = 1u32;

        loop {
            let worker_output = graph
                .get(id)
                .map(|node| node.output().to_string())
                .unwrap_or_default();
            if let Some(node) = graph.get_mut(id) {
                node.iteration = Some(iteration);
                node.status = NodeStatus::Reviewing;
            }

            let review_prompt = build_review_prompt(
                &review,
                &original_task,
                &worker_output,
                iteration,
                max_iterations,
                previous_feedback.as_deref(),
            );
            let reviewer_system_prompt = match reviewer_member
                .as_ref()
                .and_then(|m| m.system_prompt.as_deref())
            {
                Some(base) => format!("{base}{REVIEW_PROTOCOL}"),
                None => REVIEW_PROTOCOL.trim_start().to_string(),
            };

            let reviewer_invocation = AgentInvocation {
                id: format!("{id}:review:{iteration}"),
                name: Some(format!("{} (review)", review.assignee)),
                step: None,
                task: review_prompt,
                context: None,
                cwd: self.cwd.clone(),
                provider: review
                    .provider
                    .clone()
                    .or_else(|| reviewer_member.as_ref().and_then(|m| m.provider.clone())),
                model: review
                    .model
                    .clone()
                    .or_else(|| reviewer_member.as_ref().and_then(|m| m.model.clone())),
                tools: review
                    .tools
                    .clone()
                    .or_else(|| reviewer_member.as_ref().and_then(|m| m.tools.clone())),
                system_prompt: Some(reviewer_system_prompt),
                thinking: reviewer_member.as_ref().and_then(|m| m.thinking.clone()),
            };

            let reviewer_result = self
                .runner
                .run(reviewer_invocation, cancel.clone(), Arc::clone(&self.sink))
                .await;
            results.push(reviewer_result.clone());

            if !reviewer_result.succeeded() {
                // A broken reviewer never sinks accepted work.
                warn!(task_id = %id, iteration, "reviewer failed, accepting worker output");
                if let Some(node) = graph.get_mut(id) {
                    node.iteration_results.push(reviewer_result);
                    node.status = NodeStatus::Completed;
                }
                return;
            }

            let decision = parse_decision(&reviewer_result.output);
            let reviewer_output = reviewer_result.output.clone();
            if let Some(node) = graph.get_mut(id) {
                node.iteration_results.push(reviewer_result);
                node.review_history.push(ReviewRecord {
                    iteration,
                    worker_output: worker_output.clone(),
                    reviewer_output: reviewer_output.clone(),
                    approved: decision.approved,
                });
            }

            if decision.approved || iteration >= max_iterations {
                if decision.approved {
                    info!(task_id = %id, iteration, "review approved");
                } else {
                    info!(task_id = %id, iteration, "iteration cap reached, accepting work");
                }
                if let Some(node) = graph.get_mut(id) {
                    node.status = NodeStatus::Completed;
                }
                return;
            }

            // Revision pass: rerun the worker with the reviewer's feedback.
            if let Some(node) = graph.get_mut(id) {
                node.status = NodeStatus::Revising;
            }
            let revision_prompt =
                build_revision_prompt(&original_task, &worker_output, &decision.feedback);
            let node_member = graph.get(id).and_then(|node| node.assignee.clone());

            let revision_invocation = AgentInvocation {
                id: format!("{id}:revision:{iteration}"),
                name: node_member.as_ref().map(|m| format!("{} (revision)", m.role)),
                step: None,
                task: revision_prompt,
                context: node_context.clone(),
                cwd: self.cwd.clone(),
                provider: node_member.as_ref().and_then(|m| m.provider.clone()),
                model: node_member.as_ref().and_then(|m| m.model.clone()),
                tools: node_member.as_ref().and_then(|m| m.tools.clone()),
                system_prompt: node_member.as_ref().and_then(|m| m.system_prompt.clone()),
                thinking: node_member.as_ref().and_then(|m| m.thinking.clone()),
            };

            let revision_result = self
                .runner
                .run(revision_invocation, cancel.clone(), Arc::clone(&self.sink))
                .await;
            results.push(revision_result.clone());

            if !revision_result.succeeded() {
                warn!(task_id = %id, iteration, "revision worker failed");
                if let Some(node) = graph.get_mut(id) {
                    node.iteration_results.push(revision_result.clone());
                    node.result = Some(revision_result);
                    node.status = NodeStatus::Failed;
                }
                return;
            }

            if let Some(node) = graph.get_mut(id) {
                node.iteration_results.push(revision_result.clone());
                node.result = Some(revision_result);
            }
            previous_feedback = Some(reviewer_output);
            iteration += 1;
        }
    }
}

/// Marker for an approval wait interrupted by cancellation.
struct Interrupted;
