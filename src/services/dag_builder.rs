//! Team task-graph construction and validation.
//!
//! Validates a task list into a `TaskGraph`: unique ids, known dependency
//! references, known assignees, and acyclicity (verified by Kahn
//! traversal). Build failures carry descriptive errors; the dispatcher
//! surfaces them before any child process is spawned.

use std::collections::{HashMap, VecDeque};

use tracing::instrument;

use crate::domain::errors::GraphError;
use crate::domain::models::{DagNode, NodeStatus, TeamMember, TeamTask};

/// A validated dependency graph with declared task order preserved.
#[derive(Debug, Clone)]
pub struct TaskGraph {
    nodes: HashMap<String, DagNode>,
    order: Vec<String>,
}

/// Build and validate the graph for a team run.
#[instrument(skip_all, fields(tasks = tasks.len(), members = members.len()))]
pub fn build_graph(
    tasks: Vec<TeamTask>,
    members: &HashMap<String, TeamMember>,
) -> Result<TaskGraph, GraphError> {
    let mut nodes: HashMap<String, DagNode> = HashMap::with_capacity(tasks.len());
    let mut order: Vec<String> = Vec::with_capacity(tasks.len());

    for task in tasks {
        if nodes.contains_key(&task.id) {
            return Err(GraphError::DuplicateTask(task.id));
        }
        if let Some(assignee) = &task.assignee {
            if !members.contains_key(assignee) {
                return Err(GraphError::UnknownAssignee {
                    task: task.id.clone(),
                    assignee: assignee.clone(),
                });
            }
        }
        if let Some(review) = &task.review {
            if !members.contains_key(&review.assignee) {
                return Err(GraphError::UnknownReviewer {
                    task: task.id.clone(),
                    assignee: review.assignee.clone(),
                });
            }
        }
        let assignee = task
            .assignee
            .as_ref()
            .and_then(|role| members.get(role))
            .cloned();
        order.push(task.id.clone());
        nodes.insert(task.id.clone(), DagNode::new(task, assignee));
    }

    // Wire reverse edges, rejecting references to unknown tasks.
    for id in &order {
        let depends_on = nodes[id].depends_on.clone();
        for dependency in depends_on {
            if !nodes.contains_key(&dependency) {
                return Err(GraphError::UnknownDependency {
                    task: id.clone(),
                    dependency,
                });
            }
            nodes
                .get_mut(&dependency)
                .expect("dependency checked above")
                .depended_by
                .push(id.clone());
        }
    }

    let mut graph = TaskGraph { nodes, order };
    graph.verify_acyclic()?;
    graph.refresh_readiness();
    Ok(graph)
}

impl TaskGraph {
    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Task ids in declared order.
    pub fn ids(&self) -> &[String] {
        &self.order
    }

    pub fn get(&self, id: &str) -> Option<&DagNode> {
        self.nodes.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut DagNode> {
        self.nodes.get_mut(id)
    }

    /// Nodes in declared order.
    pub fn nodes_in_order(&self) -> impl Iterator<Item = &DagNode> {
        self.order.iter().filter_map(|id| self.nodes.get(id))
    }

    /// Kahn traversal over dependency counts. If any node is unreachable,
    /// the nodes with residual in-degree form the reported cycle.
    fn verify_acyclic(&self) -> Result<(), GraphError> {
        let mut in_degree: HashMap<&str, usize> = self
            .nodes
            .values()
            .map(|node| (node.id(), node.depends_on.len()))
            .collect();

        let mut queue: VecDeque<&str> = self
            .order
            .iter()
            .filter(|id| in_degree[id.as_str()] == 0)
            .map(String::as_str)
            .collect();

        let mut visited = 0usize;
        while let Some(id) = queue.pop_front() {
            visited += 1;
            for dependent in &self.nodes[id].depended_by {
                let degree = in_degree
                    .get_mut(dependent.as_str())
                    .expect("edges reference validated nodes");
                *degree -= 1;
                if *degree == 0 {
                    queue.push_back(dependent);
                }
            }
        }

        if visited < self.nodes.len() {
            let mut cyclic: Vec<String> = self
                .order
                .iter()
                .filter(|id| in_degree[id.as_str()] > 0)
                .cloned()
                .collect();
            cyclic.sort();
            return Err(GraphError::CycleDetected(cyclic));
        }
        Ok(())
    }

    /// Update pending nodes: any failed or blocked dependency blocks the
    /// node; all dependencies completed makes it ready. Any other
    /// dependency state leaves it pending. Runs to fixpoint so blocking
    /// cascades through dependency chains in one call.
    pub fn refresh_readiness(&mut self) {
        loop {
            let mut changed = false;
            let pending: Vec<String> = self
                .order
                .iter()
                .filter(|id| self.nodes[id.as_str()].status == NodeStatus::Pending)
                .cloned()
                .collect();

            for id in pending {
                let deps = self.nodes[&id].depends_on.clone();
                let any_dead = deps.iter().any(|dep| {
                    matches!(
                        self.nodes[dep.as_str()].status,
                        NodeStatus::Failed | NodeStatus::Blocked
                    )
                });
                let all_done = deps
                    .iter()
                    .all(|dep| self.nodes[dep.as_str()].status == NodeStatus::Completed);

                let node = self.nodes.get_mut(&id).expect("id from order");
                if any_dead {
                    node.status = NodeStatus::Blocked;
                    changed = true;
                } else if all_done {
                    node.status = NodeStatus::Ready;
                    changed = true;
                }
            }

            if !changed {
                break;
            }
        }
    }

    /// Ids of ready nodes, declared order.
    pub fn ready_ids(&self) -> Vec<String> {
        self.order
            .iter()
            .filter(|id| self.nodes[id.as_str()].status == NodeStatus::Ready)
            .cloned()
            .collect()
    }

    /// Id of the first node awaiting approval, if any.
    pub fn awaiting_approval(&self) -> Option<String> {
        self.order
            .iter()
            .find(|id| self.nodes[id.as_str()].status == NodeStatus::AwaitingApproval)
            .cloned()
    }

    /// Outputs of completed nodes, for `{task:id}` resolution.
    pub fn completed_outputs(&self) -> HashMap<String, String> {
        self.nodes
            .values()
            .filter(|node| node.status == NodeStatus::Completed)
            .map(|node| (node.id().to_string(), node.output().to_string()))
            .collect()
    }

    /// Mark every node that can no longer run as blocked. Called when the
    /// scheduler finds nothing ready and nothing in flight.
    pub fn block_unreachable(&mut self) {
        for node in self.nodes.values_mut() {
            if matches!(node.status, NodeStatus::Pending | NodeStatus::Ready) {
                node.status = NodeStatus::Blocked;
            }
        }
    }
}
