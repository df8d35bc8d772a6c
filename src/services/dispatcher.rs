//! Mode dispatch: validate parameters, resolve per-task settings, run the
//! selected engine, and assemble the structured response.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::domain::models::{
    AgentDefinition, ChainStep, DagInfo, DagTaskInfo, NodeStatus, ParallelParams, RaceSpec,
    RunDetails, RunMode, TaskProgress, TaskResult, TaskSpec, TeamMember, TeamSpec, TeamTask,
    ToolResponse, UsageStats,
};
use crate::domain::ports::{AgentInvocation, AgentRunner, ApprovalGate, ProgressSink};
use crate::services::config::RunnerConfig;
use crate::services::context::{build_shared_context, has_cross_refs, resolve_cross_refs};
use crate::services::dag_builder::{build_graph, TaskGraph};
use crate::services::dag_executor::GraphExecutor;
use crate::services::output::summarize_output;
use crate::services::progress::ProgressTracker;
use crate::services::race::{race_to_success, RaceOutcome};
use crate::services::worker_pool::{clamp_concurrency, map_bounded};
use crate::services::workspace::TeamWorkspace;

/// Settings for one child after merging agent defaults with inline
/// overrides. `provider` is never sourced from an agent definition.
#[derive(Debug, Clone, Default)]
struct EffectiveSettings {
    provider: Option<String>,
    model: Option<String>,
    tools: Option<Vec<String>>,
    system_prompt: Option<String>,
    thinking: Option<String>,
}

/// Single entry point for the `parallel` tool.
pub struct Dispatcher {
    runner: Arc<dyn AgentRunner>,
    agents: HashMap<String, AgentDefinition>,
    approval: Option<Arc<dyn ApprovalGate>>,
    observer: Option<ProgressSink>,
    config: RunnerConfig,
}

impl Dispatcher {
    pub fn new(runner: Arc<dyn AgentRunner>) -> Self {
        Self {
            runner,
            agents: HashMap::new(),
            approval: None,
            observer: None,
            config: RunnerConfig::default(),
        }
    }

    /// Supply discovered agent definitions for name resolution.
    #[must_use]
    pub fn with_agents(mut self, agents: HashMap<String, AgentDefinition>) -> Self {
        self.agents = agents;
        self
    }

    /// Install a human-in-the-loop approval gate for team mode.
    #[must_use]
    pub fn with_approval_gate(mut self, gate: Arc<dyn ApprovalGate>) -> Self {
        self.approval = Some(gate);
        self
    }

    /// Observe every progress update in addition to the run's registry.
    #[must_use]
    pub fn with_observer(mut self, observer: ProgressSink) -> Self {
        self.observer = Some(observer);
        self
    }

    #[must_use]
    pub fn with_config(mut self, config: RunnerConfig) -> Self {
        self.config = config;
        self
    }

    /// Validate the parameter object, run exactly one mode, and return the
    /// structured response. Never raises; every failure is materialized in
    /// the response.
    #[instrument(skip_all, fields(run_id))]
    pub async fn dispatch(&self, params: ParallelParams, cancel: CancellationToken) -> ToolResponse {
        let run_id = Uuid::new_v4();
        tracing::Span::current().record("run_id", tracing::field::display(run_id));

        if params.mode_count() != 1 {
            return ToolResponse::validation_error(
                RunMode::Single,
                format!(
                    "Specify exactly one of `task`, `tasks`, `chain`, `race`, or `team` \
                     ({} provided).",
                    params.mode_count()
                ),
            );
        }

        if let Some(message) = self.unknown_agent_error(&params) {
            return ToolResponse::validation_error(self.selected_mode(&params), message);
        }

        let cwd = params
            .cwd
            .clone()
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

        let tracker = match &self.observer {
            Some(observer) => ProgressTracker::with_observer(Arc::clone(observer)),
            None => ProgressTracker::new(),
        };

        let started = Instant::now();
        let mode = self.selected_mode(&params);
        info!(mode = mode.as_str(), "dispatching run");

        let mut response = match mode {
            RunMode::Single => self.run_single(&params, &cwd, &tracker, &cancel).await,
            RunMode::Parallel => self.run_parallel(&params, &cwd, &tracker, &cancel).await,
            RunMode::Chain => self.run_chain(&params, &cwd, &tracker, &cancel).await,
            RunMode::Race => self.run_race(&params, &cwd, &tracker, &cancel).await,
            RunMode::Team => self.run_team(&params, &cwd, &tracker, &cancel).await,
        };

        response.details.run_id = run_id;
        response.details.total_duration_ms = started.elapsed().as_millis() as u64;
        response.details.usage = roll_up_usage(&response.details.results);
        response
    }

    fn selected_mode(&self, params: &ParallelParams) -> RunMode {
        if params.tasks.is_some() {
            RunMode::Parallel
        } else if params.chain.is_some() {
            RunMode::Chain
        } else if params.race.is_some() {
            RunMode::Race
        } else if params.team.is_some() {
            RunMode::Team
        } else {
            RunMode::Single
        }
    }

    /// Collect unknown agent references across all modes; `None` when every
    /// reference resolves.
    fn unknown_agent_error(&self, params: &ParallelParams) -> Option<String> {
        let mut referenced: Vec<&str> = Vec::new();
        if let Some(agent) = params.agent.as_deref() {
            referenced.push(agent);
        }
        for task in params.tasks.as_deref().unwrap_or(&[]) {
            referenced.extend(task.agent.as_deref());
        }
        for step in params.chain.as_deref().unwrap_or(&[]) {
            referenced.extend(step.agent.as_deref());
        }
        if let Some(team) = &params.team {
            for member in &team.members {
                referenced.extend(member.agent.as_deref());
            }
        }

        let mut unknown: Vec<&str> = referenced
            .into_iter()
            .filter(|name| !self.agents.contains_key(*name))
            .collect();
        if unknown.is_empty() {
            return None;
        }
        unknown.sort_unstable();
        unknown.dedup();

        let mut available: Vec<&str> = self.agents.keys().map(String::as_str).collect();
        available.sort_unstable();
        let preview: Vec<&str> = available.into_iter().take(5).collect();
        let available_note = if preview.is_empty() {
            "no agent definitions discovered".to_string()
        } else {
            format!("available: {}", preview.join(", "))
        };
        Some(format!(
            "Unknown agent(s): {} ({})",
            unknown.join(", "),
            available_note
        ))
    }

    /// Merge agent-definition defaults under inline overrides.
    fn resolve_settings(
        &self,
        agent: Option<&str>,
        provider: Option<&str>,
        model: Option<&str>,
        tools: Option<&[String]>,
        system_prompt: Option<&str>,
        thinking: Option<&str>,
    ) -> EffectiveSettings {
        let definition = agent.and_then(|name| self.agents.get(name));
        EffectiveSettings {
            provider: provider.map(str::to_string),
            model: model
                .map(str::to_string)
                .or_else(|| definition.and_then(|d| d.model.clone())),
            tools: tools
                .map(<[String]>::to_vec)
                .or_else(|| definition.and_then(|d| d.tools.clone())),
            system_prompt: system_prompt
                .map(str::to_string)
                .or_else(|| definition.and_then(|d| d.system_prompt.clone())),
            thinking: thinking
                .map(str::to_string)
                .or_else(|| definition.and_then(|d| d.thinking.clone())),
        }
    }

    fn invocation(
        &self,
        id: String,
        name: Option<String>,
        task: String,
        context: Option<String>,
        cwd: PathBuf,
        settings: EffectiveSettings,
    ) -> AgentInvocation {
        AgentInvocation {
            id,
            name,
            step: None,
            task,
            context,
            cwd,
            provider: settings.provider,
            model: settings.model,
            tools: settings.tools,
            system_prompt: settings.system_prompt,
            thinking: settings.thinking,
        }
    }

    // ------------------------------------------------------------------
    // Single
    // ------------------------------------------------------------------

    async fn run_single(
        &self,
        params: &ParallelParams,
        cwd: &PathBuf,
        tracker: &ProgressTracker,
        cancel: &CancellationToken,
    ) -> ToolResponse {
        let task = params.task.clone().expect("single mode requires task");
        let context = build_shared_context(params, cwd).await;
        let settings = self.resolve_settings(
            params.agent.as_deref(),
            params.provider.as_deref(),
            params.model.as_deref(),
            params.tools.as_deref(),
            params.system_prompt.as_deref(),
            params.thinking.as_deref(),
        );

        let invocation =
            self.invocation("task-1".into(), None, task, context, cwd.clone(), settings);
        let result = self
            .runner
            .run(invocation, cancel.clone(), tracker.sink())
            .await;

        let text = if result.succeeded() {
            result.output.clone()
        } else if result.aborted {
            "Task aborted.".to_string()
        } else {
            format!(
                "Task failed (exit {}): {}",
                result.exit_code,
                result.error.as_deref().unwrap_or("unknown error")
            )
        };

        let aborted = result.aborted;
        ToolResponse::text(
            RunMode::Single,
            text,
            RunDetails {
                run_id: Uuid::nil(),
                mode: RunMode::Single,
                results: vec![result],
                progress: Some(tracker.snapshot()),
                total_duration_ms: 0,
                usage: UsageStats::default(),
                aborted,
                winner: None,
                dag_info: None,
            },
        )
    }

    // ------------------------------------------------------------------
    // Chain
    // ------------------------------------------------------------------

    async fn run_chain(
        &self,
        params: &ParallelParams,
        cwd: &PathBuf,
        tracker: &ProgressTracker,
        cancel: &CancellationToken,
    ) -> ToolResponse {
        let steps: &[ChainStep] = params.chain.as_deref().expect("chain mode requires steps");
        if steps.is_empty() {
            return ToolResponse::validation_error(RunMode::Chain, "Chain has no steps.");
        }

        let context = build_shared_context(params, cwd).await;
        let mut results: Vec<TaskResult> = Vec::with_capacity(steps.len());
        let mut previous_output = String::new();
        let mut halted_at: Option<usize> = None;

        for (index, step) in steps.iter().enumerate() {
            if cancel.is_cancelled() {
                halted_at = Some(index);
                break;
            }

            let task = step.task.replace("{previous}", &previous_output);
            let settings = self.resolve_settings(
                step.agent.as_deref(),
                step.provider.as_deref(),
                step.model.as_deref(),
                step.tools.as_deref(),
                step.system_prompt.as_deref(),
                step.thinking.as_deref(),
            );
            let mut invocation = self.invocation(
                format!("step-{}", index + 1),
                step.name.clone(),
                task,
                context.clone(),
                cwd.clone(),
                settings,
            );
            invocation.step = Some(index);

            let result = self
                .runner
                .run(invocation, cancel.clone(), tracker.sink())
                .await;
            let ok = result.succeeded();
            previous_output = result.output.clone();
            results.push(result);

            if !ok {
                halted_at = Some(index);
                break;
            }
        }

        let aborted = cancel.is_cancelled();
        let text = match halted_at {
            Some(index) => format!(
                "{}\n\nChain stopped at step {} of {}.",
                chain_summary(&results),
                index + 1,
                steps.len()
            ),
            None => previous_output.clone(),
        };

        ToolResponse::text(
            RunMode::Chain,
            text,
            RunDetails {
                run_id: Uuid::nil(),
                mode: RunMode::Chain,
                results,
                progress: Some(tracker.snapshot()),
                total_duration_ms: 0,
                usage: UsageStats::default(),
                aborted,
                winner: None,
                dag_info: None,
            },
        )
    }

    // ------------------------------------------------------------------
    // Race
    // ------------------------------------------------------------------

    async fn run_race(
        &self,
        params: &ParallelParams,
        cwd: &PathBuf,
        tracker: &ProgressTracker,
        cancel: &CancellationToken,
    ) -> ToolResponse {
        let race: &RaceSpec = params.race.as_ref().expect("race mode requires spec");
        if race.models.is_empty() {
            return ToolResponse::validation_error(RunMode::Race, "Race has no models.");
        }

        let context = build_shared_context(params, cwd).await;
        for model in &race.models {
            tracker.register(
                TaskProgress::new(format!("race-{model}"), race.task.clone())
                    .with_model(Some(model.clone())),
            );
        }

        let entries: Vec<_> = race
            .models
            .iter()
            .map(|model| {
                let invocation = self.invocation(
                    format!("race-{model}"),
                    Some(model.clone()),
                    race.task.clone(),
                    context.clone(),
                    cwd.clone(),
                    EffectiveSettings {
                        provider: race.provider.clone(),
                        model: Some(model.clone()),
                        tools: race.tools.clone(),
                        system_prompt: race.system_prompt.clone(),
                        thinking: race.thinking.clone(),
                    },
                );
                let runner = Arc::clone(&self.runner);
                let sink = tracker.sink();
                move |token: CancellationToken| -> futures::future::BoxFuture<'static, TaskResult> {
                    Box::pin(async move { runner.run(invocation, token, sink).await })
                }
            })
            .collect();

        match race_to_success(entries, cancel).await {
            RaceOutcome::Winner {
                index,
                result,
                mut finished,
            } => {
                let winner_model = race.models[index].clone();
                let text = result.output.clone();
                finished.push(result);
                ToolResponse::text(
                    RunMode::Race,
                    text,
                    RunDetails {
                        run_id: Uuid::nil(),
                        mode: RunMode::Race,
                        results: finished,
                        progress: Some(tracker.snapshot()),
                        total_duration_ms: 0,
                        usage: UsageStats::default(),
                        aborted: false,
                        winner: Some(winner_model),
                        dag_info: None,
                    },
                )
            }
            RaceOutcome::Aborted { finished } => {
                let aborted = cancel.is_cancelled();
                let text = if aborted {
                    "Race aborted before any model succeeded.".to_string()
                } else {
                    "No model produced a successful result.".to_string()
                };
                ToolResponse::text(
                    RunMode::Race,
                    text,
                    RunDetails {
                        run_id: Uuid::nil(),
                        mode: RunMode::Race,
                        results: finished,
                        progress: Some(tracker.snapshot()),
                        total_duration_ms: 0,
                        usage: UsageStats::default(),
                        aborted,
                        winner: None,
                        dag_info: None,
                    },
                )
            }
        }
    }

    // ------------------------------------------------------------------
    // Parallel
    // ------------------------------------------------------------------

    async fn run_parallel(
        &self,
        params: &ParallelParams,
        cwd: &PathBuf,
        tracker: &ProgressTracker,
        cancel: &CancellationToken,
    ) -> ToolResponse {
        let tasks: &[TaskSpec] = params.tasks.as_deref().expect("parallel mode requires tasks");
        if tasks.is_empty() {
            return ToolResponse::validation_error(RunMode::Parallel, "Task list is empty.");
        }

        let texts: Vec<&str> = tasks.iter().map(|t| t.task.as_str()).collect();
        let cross_refs = has_cross_refs(&texts);
        let concurrency = if cross_refs {
            // Cross-referenced tasks read earlier outputs; forward
            // references only resolve when execution is serial.
            1
        } else {
            clamp_concurrency(
                params
                    .max_concurrency
                    .or(Some(self.config.default_max_concurrency)),
                tasks.len(),
            )
        };

        let shared_context = build_shared_context(params, cwd).await;
        let outputs: Arc<Mutex<Vec<Option<String>>>> =
            Arc::new(Mutex::new(vec![None; tasks.len()]));

        let runner = Arc::clone(&self.runner);
        let outcome = map_bounded(
            tasks.to_vec(),
            concurrency,
            cancel,
            |index, spec: TaskSpec| {
                let runner = Arc::clone(&runner);
                let sink = tracker.sink();
                let cancel = cancel.clone();
                let outputs = Arc::clone(&outputs);
                let shared_context = shared_context.clone();
                let settings = self.resolve_settings(
                    spec.agent.as_deref(),
                    spec.provider.as_deref(),
                    spec.model.as_deref(),
                    spec.tools.as_deref(),
                    spec.system_prompt.as_deref(),
                    spec.thinking.as_deref(),
                );
                let task_cwd = spec.cwd.clone().unwrap_or_else(|| cwd.clone());
                async move {
                    let task_text = if cross_refs {
                        let resolved = outputs.lock().expect("outputs lock poisoned").clone();
                        resolve_cross_refs(&spec.task, &resolved)
                    } else {
                        spec.task.clone()
                    };
                    let invocation = AgentInvocation {
                        id: format!("task-{}", index + 1),
                        name: spec.name.clone(),
                        step: None,
                        task: task_text,
                        context: shared_context,
                        cwd: task_cwd,
                        provider: settings.provider,
                        model: settings.model,
                        tools: settings.tools,
                        system_prompt: settings.system_prompt,
                        thinking: settings.thinking,
                    };
                    let result = runner.run(invocation, cancel, sink).await;
                    if result.succeeded() {
                        outputs.lock().expect("outputs lock poisoned")[index] =
                            Some(result.output.clone());
                    }
                    result
                }
            },
        )
        .await;

        let results: Vec<TaskResult> = outcome.results.into_iter().flatten().collect();
        let progress = tracker.snapshot();
        let text = parallel_summary(&results, &progress, outcome.aborted);

        ToolResponse::text(
            RunMode::Parallel,
            text,
            RunDetails {
                run_id: Uuid::nil(),
                mode: RunMode::Parallel,
                results,
                progress: Some(progress),
                total_duration_ms: 0,
                usage: UsageStats::default(),
                aborted: outcome.aborted,
                winner: None,
                dag_info: None,
            },
        )
    }

    // ------------------------------------------------------------------
    // Team
    // ------------------------------------------------------------------

    async fn run_team(
        &self,
        params: &ParallelParams,
        cwd: &PathBuf,
        tracker: &ProgressTracker,
        cancel: &CancellationToken,
    ) -> ToolResponse {
        let team: &TeamSpec = params.team.as_ref().expect("team mode requires spec");
        if team.members.is_empty() {
            return ToolResponse::validation_error(RunMode::Team, "Team has no members.");
        }

        let members = self.resolve_members(&team.members);
        let tasks = match &team.tasks {
            Some(tasks) => tasks.clone(),
            None => auto_tasks(&team.members),
        };
        if tasks.is_empty() {
            return ToolResponse::validation_error(
                RunMode::Team,
                "Team has no tasks: supply `tasks` or give members inline `task` fields.",
            );
        }

        let mut graph = match build_graph(tasks, &members) {
            Ok(graph) => graph,
            Err(e) => return ToolResponse::validation_error(RunMode::Team, e.to_string()),
        };

        let workspace = match TeamWorkspace::create(&team.objective) {
            Ok(workspace) => Some(workspace),
            Err(e) => {
                warn!(error = %e, "team workspace unavailable, continuing without");
                None
            }
        };

        let shared_context = build_shared_context(params, cwd).await;
        let concurrency = clamp_concurrency(
            team.max_concurrency
                .or(params.max_concurrency)
                .or(Some(self.config.default_max_concurrency)),
            graph.len(),
        );

        let executor = GraphExecutor::new(
            Arc::clone(&self.runner),
            members,
            self.approval.clone(),
            tracker.sink(),
            cwd.clone(),
            team.objective.clone(),
            shared_context,
            workspace.as_ref().map(|w| w.path().to_path_buf()),
            concurrency,
        );

        let outcome = executor.execute(&mut graph, cancel).await;

        if let Some(workspace) = &workspace {
            for result in &outcome.results {
                if let Err(e) =
                    workspace.write_task_result(&result.id, &result.output, result.state())
                {
                    warn!(task_id = %result.id, error = %e, "failed to persist task result");
                }
            }
        }

        let dag_info = dag_info_for(team, &graph, outcome.pending_approval.clone());
        let text = team_summary(&graph, &outcome.results, outcome.aborted);

        if let Some(workspace) = workspace {
            workspace.teardown();
        }

        ToolResponse::text(
            RunMode::Team,
            text,
            RunDetails {
                run_id: Uuid::nil(),
                mode: RunMode::Team,
                results: outcome.results,
                progress: Some(tracker.snapshot()),
                total_duration_ms: 0,
                usage: UsageStats::default(),
                aborted: outcome.aborted,
                winner: None,
                dag_info: Some(dag_info),
            },
        )
    }

    /// Merge each member's agent defaults into a role-keyed map.
    fn resolve_members(&self, members: &[TeamMember]) -> HashMap<String, TeamMember> {
        members
            .iter()
            .map(|member| {
                let settings = self.resolve_settings(
                    member.agent.as_deref(),
                    member.provider.as_deref(),
                    member.model.as_deref(),
                    member.tools.as_deref(),
                    member.system_prompt.as_deref(),
                    member.thinking.as_deref(),
                );
                let resolved = TeamMember {
                    role: member.role.clone(),
                    agent: member.agent.clone(),
                    provider: settings.provider,
                    model: settings.model,
                    tools: settings.tools,
                    system_prompt: settings.system_prompt,
                    thinking: settings.thinking,
                    task: member.task.clone(),
                };
                (member.role.clone(), resolved)
            })
            .collect()
    }
}

/// One auto-generated node per member that carries an inline task.
fn auto_tasks(members: &[TeamMember]) -> Vec<TeamTask> {
    members
        .iter()
        .filter_map(|member| {
            member.task.as_ref().map(|task| {
                TeamTask::new(member.role.clone(), task.clone()).with_assignee(member.role.clone())
            })
        })
        .collect()
}

/// Componentwise roll-up of every result's usage.
fn roll_up_usage(results: &[TaskResult]) -> UsageStats {
    let mut total = UsageStats::default();
    for result in results {
        total.merge(&result.usage);
    }
    total
}

fn result_heading(result: &TaskResult) -> String {
    let label = result.name.as_deref().unwrap_or(&result.id);
    format!("## {} {}", result.state().glyph(), label)
}

/// Tool roll-up line for one task, derived from its progress entry.
fn tool_usage_line(progress: &[TaskProgress], id: &str) -> Option<String> {
    let entry = progress.iter().find(|p| p.id == id)?;
    if entry.tool_count == 0 {
        return None;
    }
    let mut names: Vec<&str> = entry.recent_tools.iter().map(|t| t.tool.as_str()).collect();
    names.dedup();
    Some(format!(
        "- Tools: {} calls (recent: {})",
        entry.tool_count,
        names.join(", ")
    ))
}

fn chain_summary(results: &[TaskResult]) -> String {
    let mut lines: Vec<String> = Vec::new();
    for result in results {
        let label = result.name.as_deref().unwrap_or(&result.id);
        lines.push(format!(
            "{} step {} ({}): {}",
            result.state().glyph(),
            result.step.map(|s| s + 1).unwrap_or_default(),
            label,
            if result.succeeded() {
                truncate_line(&result.output, 120)
            } else {
                result.error.clone().unwrap_or_else(|| "failed".into())
            }
        ));
    }
    lines.join("\n")
}

fn parallel_summary(results: &[TaskResult], progress: &[TaskProgress], aborted: bool) -> String {
    let mut sections: Vec<String> = Vec::new();
    if aborted {
        sections.push("**Run aborted; partial results below.**".to_string());
    }

    for result in results {
        let mut section = vec![result_heading(result)];
        section.push(format!("- Usage: {}", result.usage.summary()));
        if let Some(tools) = tool_usage_line(progress, &result.id) {
            section.push(tools);
        }
        if let Some(error) = &result.error {
            section.push(format!("- Error: {error}"));
        }

        let spill_name = result.name.as_deref().unwrap_or(&result.id);
        let (excerpt, spill_path) = summarize_output("parallel", spill_name, &result.output);
        section.push(String::new());
        section.push(excerpt);
        if let Some(path) = spill_path {
            section.push(format!("\n*Full output: {}*", path.display()));
        }
        sections.push(section.join("\n"));
    }
    sections.join("\n\n")
}

fn team_summary(graph: &TaskGraph, results: &[TaskResult], aborted: bool) -> String {
    let primary_ids: Vec<&str> = graph.ids().iter().map(String::as_str).collect();
    let mut sections: Vec<String> = Vec::new();

    if aborted {
        sections.push("**Team run aborted; partial results below.**".to_string());
    }

    let mut primary_sections: Vec<String> = Vec::new();
    for result in results {
        if !primary_ids.contains(&result.id.as_str()) {
            continue;
        }
        let mut section = vec![result_heading(result)];
        section.push(format!("- Usage: {}", result.usage.summary()));
        if let Some(error) = &result.error {
            section.push(format!("- Error: {error}"));
        }
        let (excerpt, spill_path) = summarize_output("team", &result.id, &result.output);
        section.push(String::new());
        section.push(excerpt);
        if let Some(path) = spill_path {
            section.push(format!("\n*Full output: {}*", path.display()));
        }
        primary_sections.push(section.join("\n"));
    }
    sections.push(format!("# Task Results\n\n{}", primary_sections.join("\n\n")));

    let sub_results: Vec<&TaskResult> = results
        .iter()
        .filter(|r| r.id.contains(":review:") || r.id.contains(":revision:"))
        .collect();
    if !sub_results.is_empty() {
        let lines: Vec<String> = sub_results
            .iter()
            .map(|r| {
                format!(
                    "- {} {}: {}",
                    r.state().glyph(),
                    r.id,
                    truncate_line(&r.output, 100)
                )
            })
            .collect();
        sections.push(format!("# Review & Revision Runs\n\n{}", lines.join("\n")));
    }

    let blocked: Vec<&str> = graph
        .nodes_in_order()
        .filter(|node| node.status == NodeStatus::Blocked)
        .map(|node| node.id())
        .collect();
    if !blocked.is_empty() {
        sections.push(format!("# Blocked Tasks\n\n{}", blocked.join(", ")));
    }

    sections.join("\n\n")
}

fn dag_info_for(team: &TeamSpec, graph: &TaskGraph, pending_approval: Option<String>) -> DagInfo {
    DagInfo {
        objective: team.objective.clone(),
        members: team.members.iter().map(|m| m.role.clone()).collect(),
        tasks: graph
            .nodes_in_order()
            .map(|node| DagTaskInfo {
                id: node.id().to_string(),
                assignee: node.assignee.as_ref().map(|m| m.role.clone()),
                depends: node.depends_on.clone(),
                status: node.status,
                iteration: node.iteration,
                max_iterations: node.task.review.as_ref().map(|r| r.iteration_cap()),
            })
            .collect(),
        pending_approval,
    }
}

fn truncate_line(text: &str, max_chars: usize) -> String {
    let first_line = text.lines().next().unwrap_or("");
    let mut preview: String = first_line.chars().take(max_chars).collect();
    if preview.len() < first_line.len() || text.lines().nth(1).is_some() {
        preview.push('…');
    }
    preview
}
