//! Team-mode integration tests: graph scheduling, approval gates, and the
//! review/revision loop, driven through the mock runner.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use pi_parallel::adapters::{MockResponse, MockRunner};
use pi_parallel::domain::models::{
    NodeStatus, ParallelParams, ReviewConfig, RunMode, TeamMember, TeamSpec, TeamTask,
};
use pi_parallel::domain::ports::{ApprovalDecision, ApprovalGate};
use pi_parallel::services::{Dispatcher, READ_ONLY_TOOLS};

fn member(role: &str) -> TeamMember {
    TeamMember {
        role: role.into(),
        agent: None,
        provider: None,
        model: None,
        tools: None,
        system_prompt: None,
        thinking: None,
        task: None,
    }
}

fn team_params(team: TeamSpec) -> ParallelParams {
    ParallelParams {
        cwd: Some(std::env::temp_dir()),
        team: Some(team),
        ..Default::default()
    }
}

fn review_by(role: &str) -> ReviewConfig {
    ReviewConfig {
        assignee: role.into(),
        task: None,
        max_iterations: None,
        provider: None,
        model: None,
        tools: None,
    }
}

#[tokio::test]
async fn test_parallel_layer_then_join() {
    let runner = Arc::new(MockRunner::scripted(|_| {
        MockResponse::echo().with_delay(Duration::from_millis(40))
    }));
    let dispatcher = Dispatcher::new(Arc::clone(&runner) as Arc<dyn pi_parallel::domain::ports::AgentRunner>);

    let team = TeamSpec {
        objective: "build the report".into(),
        members: vec![member("analyst")],
        tasks: Some(vec![
            TeamTask::new("a", "part a").with_assignee("analyst"),
            TeamTask::new("b", "part b").with_assignee("analyst"),
            TeamTask::new("c", "part c").with_assignee("analyst"),
            TeamTask::new("d", "merge everything")
                .with_assignee("analyst")
                .with_depends(vec!["a".into(), "b".into(), "c".into()]),
        ]),
        max_concurrency: Some(4),
    };

    let response = dispatcher
        .dispatch(team_params(team), CancellationToken::new())
        .await;

    assert!(!response.is_error);
    assert_eq!(response.details.mode, RunMode::Team);
    // The independent layer ran concurrently.
    assert!(runner.peak_concurrency() >= 3);

    // d started only after a, b, and c completed: its context carries all
    // three prerequisite outputs.
    let invocations = runner.invocations();
    assert_eq!(invocations.len(), 4);
    let join = invocations.iter().find(|i| i.id == "d").unwrap();
    let context = join.context.as_deref().unwrap();
    assert!(context.contains("## Team Objective\nbuild the report"));
    assert!(context.contains("## Shared Workspace"));
    for output in ["part a", "part b", "part c"] {
        assert!(context.contains(output), "missing prerequisite output {output}");
    }
    assert!(context.contains("Output from prerequisite task \"analyst (a)\""));

    // Results reflect completion order (d last); dagInfo keeps declared
    // order regardless.
    assert_eq!(response.details.results.last().unwrap().id, "d");
    let dag_info = response.details.dag_info.unwrap();
    let ids: Vec<&str> = dag_info.tasks.iter().map(|t| t.id.as_str()).collect();
    assert_eq!(ids, ["a", "b", "c", "d"]);
    assert!(dag_info.tasks.iter().all(|t| t.status == NodeStatus::Completed));
}

#[tokio::test]
async fn test_cycle_is_rejected_before_spawning() {
    let runner = Arc::new(MockRunner::echo());
    let dispatcher = Dispatcher::new(Arc::clone(&runner) as Arc<dyn pi_parallel::domain::ports::AgentRunner>);

    let team = TeamSpec {
        objective: String::new(),
        members: vec![member("worker")],
        tasks: Some(vec![
            TeamTask::new("x", "first").with_depends(vec!["y".into()]),
            TeamTask::new("y", "second").with_depends(vec!["x".into()]),
        ]),
        max_concurrency: None,
    };

    let response = dispatcher
        .dispatch(team_params(team), CancellationToken::new())
        .await;

    assert!(response.is_error);
    assert!(response.text_content().contains("cycle"));
    assert!(response.text_content().contains('x'));
    assert!(response.text_content().contains('y'));
    assert_eq!(runner.run_count(), 0);
}

#[tokio::test]
async fn test_failed_dependency_blocks_descendants() {
    let runner = Arc::new(MockRunner::scripted(|invocation| {
        if invocation.id == "a" {
            MockResponse::failure("broke")
        } else {
            MockResponse::echo()
        }
    }));
    let dispatcher = Dispatcher::new(Arc::clone(&runner) as Arc<dyn pi_parallel::domain::ports::AgentRunner>);

    let team = TeamSpec {
        objective: String::new(),
        members: vec![member("worker")],
        tasks: Some(vec![
            TeamTask::new("a", "will fail").with_assignee("worker"),
            TeamTask::new("b", "needs a")
                .with_assignee("worker")
                .with_depends(vec!["a".into()]),
            TeamTask::new("c", "needs b")
                .with_assignee("worker")
                .with_depends(vec!["b".into()]),
        ]),
        max_concurrency: None,
    };

    let response = dispatcher
        .dispatch(team_params(team), CancellationToken::new())
        .await;

    assert!(!response.is_error);
    // Only the failing task ever ran.
    assert_eq!(runner.run_count(), 1);
    assert!(response.text_content().contains("Blocked Tasks"));
    let dag_info = response.details.dag_info.unwrap();
    let status_of = |id: &str| {
        dag_info
            .tasks
            .iter()
            .find(|t| t.id == id)
            .unwrap()
            .status
    };
    assert_eq!(status_of("a"), NodeStatus::Failed);
    assert_eq!(status_of("b"), NodeStatus::Blocked);
    assert_eq!(status_of("c"), NodeStatus::Blocked);
}

#[tokio::test]
async fn test_review_approves_on_second_iteration() {
    let runner = Arc::new(MockRunner::scripted(|invocation| {
        if invocation.id == "work" {
            MockResponse::success("v1")
        } else if invocation.id.contains(":revision:") {
            MockResponse::success("v2")
        } else if invocation.task.contains("v1") {
            MockResponse::success("REVISION_NEEDED")
        } else {
            MockResponse::success("APPROVED")
        }
    }));
    let dispatcher = Dispatcher::new(Arc::clone(&runner) as Arc<dyn pi_parallel::domain::ports::AgentRunner>);

    let mut task = TeamTask::new("work", "produce the widget").with_assignee("maker");
    task.review = Some(review_by("checker"));
    let team = TeamSpec {
        objective: String::new(),
        members: vec![member("maker"), member("checker")],
        tasks: Some(vec![task]),
        max_concurrency: None,
    };

    let response = dispatcher
        .dispatch(team_params(team), CancellationToken::new())
        .await;

    assert!(!response.is_error);
    let ids: Vec<&str> = response
        .details
        .results
        .iter()
        .map(|r| r.id.as_str())
        .collect();
    assert_eq!(ids, ["work", "work:review:1", "work:revision:1", "work:review:2"]);

    let dag_info = response.details.dag_info.unwrap();
    let node = &dag_info.tasks[0];
    assert_eq!(node.status, NodeStatus::Completed);
    assert_eq!(node.iteration, Some(2));
    assert_eq!(node.max_iterations, Some(3));

    // The reviewer runs under the review protocol system prompt.
    let reviewer = runner
        .invocations()
        .into_iter()
        .find(|i| i.id == "work:review:1")
        .unwrap();
    assert!(reviewer
        .system_prompt
        .as_deref()
        .unwrap()
        .contains("Review Protocol"));
}

#[tokio::test]
async fn test_review_cap_accepts_work_after_final_iteration() {
    let reviews = Arc::new(AtomicUsize::new(0));
    let reviews_ref = Arc::clone(&reviews);
    let runner = Arc::new(MockRunner::scripted(move |invocation| {
        if invocation.id.contains(":review:") {
            reviews_ref.fetch_add(1, Ordering::SeqCst);
            MockResponse::success("REVISION_NEEDED")
        } else {
            MockResponse::success("attempt")
        }
    }));
    let dispatcher = Dispatcher::new(runner);

    let mut task = TeamTask::new("stubborn", "never good enough").with_assignee("maker");
    let mut review = review_by("checker");
    review.max_iterations = Some(2);
    task.review = Some(review);
    let team = TeamSpec {
        objective: String::new(),
        members: vec![member("maker"), member("checker")],
        tasks: Some(vec![task]),
        max_concurrency: None,
    };

    let response = dispatcher
        .dispatch(team_params(team), CancellationToken::new())
        .await;

    // The iteration cap, not an approval, completed the node.
    assert_eq!(reviews.load(Ordering::SeqCst), 2);
    let dag_info = response.details.dag_info.unwrap();
    assert_eq!(dag_info.tasks[0].status, NodeStatus::Completed);
    assert_eq!(dag_info.tasks[0].iteration, Some(2));
}

#[tokio::test]
async fn test_reviewer_failure_accepts_worker_output() {
    let runner = Arc::new(MockRunner::scripted(|invocation| {
        if invocation.id.contains(":review:") {
            MockResponse::failure("reviewer crashed")
        } else {
            MockResponse::success("good work")
        }
    }));
    let dispatcher = Dispatcher::new(runner);

    let mut task = TeamTask::new("t", "do it").with_assignee("maker");
    task.review = Some(review_by("checker"));
    let team = TeamSpec {
        objective: String::new(),
        members: vec![member("maker"), member("checker")],
        tasks: Some(vec![task]),
        max_concurrency: None,
    };

    let response = dispatcher
        .dispatch(team_params(team), CancellationToken::new())
        .await;

    assert!(!response.is_error);
    let dag_info = response.details.dag_info.unwrap();
    assert_eq!(dag_info.tasks[0].status, NodeStatus::Completed);
}

/// Gate that rejects the first plan with feedback, then approves.
struct RejectOnce {
    calls: AtomicUsize,
}

#[async_trait]
impl ApprovalGate for RejectOnce {
    async fn review_plan(&self, _task_id: &str, _plan: &str) -> ApprovalDecision {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            ApprovalDecision::reject("narrow scope")
        } else {
            ApprovalDecision::approve()
        }
    }
}

#[tokio::test]
async fn test_approval_rejection_feeds_back_and_reruns() {
    let runner = Arc::new(MockRunner::echo());
    let gate = Arc::new(RejectOnce {
        calls: AtomicUsize::new(0),
    });
    let gate_handle: Arc<dyn ApprovalGate> = Arc::clone(&gate) as Arc<dyn ApprovalGate>;
    let dispatcher = Dispatcher::new(Arc::clone(&runner) as Arc<dyn pi_parallel::domain::ports::AgentRunner>).with_approval_gate(gate_handle);

    let mut task = TeamTask::new("plan", "plan the rollout").with_assignee("planner");
    task.requires_approval = true;
    let team = TeamSpec {
        objective: String::new(),
        members: vec![member("planner")],
        tasks: Some(vec![task]),
        max_concurrency: None,
    };

    let response = dispatcher
        .dispatch(team_params(team), CancellationToken::new())
        .await;

    assert!(!response.is_error);
    assert_eq!(gate.calls.load(Ordering::SeqCst), 2);

    let invocations = runner.invocations();
    assert_eq!(invocations.len(), 2);

    // First pass is restricted to the read-only tool set.
    let first_tools = invocations[0].tools.as_deref().unwrap();
    let expected: Vec<String> = READ_ONLY_TOOLS.iter().map(|t| t.to_string()).collect();
    assert_eq!(first_tools, expected.as_slice());

    // The rerun carries the gate's feedback and drops the restriction.
    assert!(invocations[1].task.contains("narrow scope"));
    assert!(invocations[1].tools.is_none());

    let dag_info = response.details.dag_info.unwrap();
    assert_eq!(dag_info.tasks[0].status, NodeStatus::Completed);
    assert!(dag_info.pending_approval.is_none());
}

#[tokio::test]
async fn test_auto_tasks_from_member_task_fields() {
    let runner = Arc::new(MockRunner::echo());
    let dispatcher = Dispatcher::new(Arc::clone(&runner) as Arc<dyn pi_parallel::domain::ports::AgentRunner>);

    let mut writer = member("writer");
    writer.task = Some("draft the announcement".into());
    let mut editor = member("editor");
    editor.task = Some("polish the draft".into());
    let team = TeamSpec {
        objective: "announce the launch".into(),
        members: vec![writer, editor],
        tasks: None,
        max_concurrency: None,
    };

    let response = dispatcher
        .dispatch(team_params(team), CancellationToken::new())
        .await;

    assert!(!response.is_error);
    assert_eq!(runner.run_count(), 2);
    let dag_info = response.details.dag_info.unwrap();
    let ids: Vec<&str> = dag_info.tasks.iter().map(|t| t.id.as_str()).collect();
    assert_eq!(ids, ["writer", "editor"]);
    assert_eq!(dag_info.tasks[0].assignee.as_deref(), Some("writer"));
}

#[tokio::test]
async fn test_team_summary_separates_primary_and_sub_results() {
    let runner = Arc::new(MockRunner::scripted(|invocation| {
        if invocation.id.contains(":review:") {
            MockResponse::success("APPROVED")
        } else {
            MockResponse::success("fine work")
        }
    }));
    let dispatcher = Dispatcher::new(runner);

    let mut task = TeamTask::new("main", "do the thing").with_assignee("maker");
    task.review = Some(review_by("checker"));
    let team = TeamSpec {
        objective: String::new(),
        members: vec![member("maker"), member("checker")],
        tasks: Some(vec![task]),
        max_concurrency: None,
    };

    let response = dispatcher
        .dispatch(team_params(team), CancellationToken::new())
        .await;

    let text = response.text_content();
    assert!(text.contains("# Task Results"));
    assert!(text.contains("# Review & Revision Runs"));
    assert!(text.contains("main:review:1"));
}
