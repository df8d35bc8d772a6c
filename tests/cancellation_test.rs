//! Cancellation propagation across modes.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use pi_parallel::adapters::{MockResponse, MockRunner};
use pi_parallel::domain::models::{ChainStep, ParallelParams, TaskSpec, TeamMember, TeamSpec, TeamTask};
use pi_parallel::services::Dispatcher;

fn slow_runner(millis: u64) -> Arc<MockRunner> {
    Arc::new(MockRunner::scripted(move |_| {
        MockResponse::echo().with_delay(Duration::from_millis(millis))
    }))
}

fn task_spec(task: &str) -> TaskSpec {
    TaskSpec {
        task: task.into(),
        name: None,
        agent: None,
        provider: None,
        model: None,
        tools: None,
        system_prompt: None,
        cwd: None,
        thinking: None,
    }
}

#[tokio::test]
async fn test_pre_cancelled_parallel_run_starts_nothing() {
    let runner = slow_runner(50);
    let dispatcher = Dispatcher::new(Arc::clone(&runner) as Arc<dyn pi_parallel::domain::ports::AgentRunner>);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let params = ParallelParams {
        cwd: Some(std::env::temp_dir()),
        tasks: Some(vec![task_spec("a"), task_spec("b")]),
        ..Default::default()
    };
    let response = dispatcher.dispatch(params, cancel).await;

    assert!(response.details.aborted);
    assert!(response.details.results.is_empty());
    assert_eq!(runner.run_count(), 0);
}

#[tokio::test]
async fn test_mid_run_cancellation_stops_remaining_parallel_tasks() {
    let runner = slow_runner(60);
    let dispatcher = Dispatcher::new(Arc::clone(&runner) as Arc<dyn pi_parallel::domain::ports::AgentRunner>);
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(30)).await;
        trigger.cancel();
    });

    let params = ParallelParams {
        cwd: Some(std::env::temp_dir()),
        tasks: Some((0..6).map(|i| task_spec(&format!("t{i}"))).collect()),
        max_concurrency: Some(1),
        ..Default::default()
    };
    let response = dispatcher.dispatch(params, cancel).await;

    assert!(response.details.aborted);
    assert!(
        runner.run_count() < 6,
        "cancellation should prevent later workers from starting"
    );
}

#[tokio::test]
async fn test_chain_halts_before_next_step_on_cancellation() {
    let runner = slow_runner(60);
    let dispatcher = Dispatcher::new(Arc::clone(&runner) as Arc<dyn pi_parallel::domain::ports::AgentRunner>);
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(30)).await;
        trigger.cancel();
    });

    let step = |task: &str| ChainStep {
        task: task.into(),
        name: None,
        agent: None,
        provider: None,
        model: None,
        tools: None,
        system_prompt: None,
        thinking: None,
    };
    let params = ParallelParams {
        cwd: Some(std::env::temp_dir()),
        chain: Some(vec![step("one"), step("two"), step("three")]),
        ..Default::default()
    };
    let response = dispatcher.dispatch(params, cancel).await;

    assert!(response.details.aborted);
    assert!(runner.run_count() < 3);
    assert!(response.text_content().contains("Chain stopped"));
}

#[tokio::test]
async fn test_team_cancellation_returns_partial_results() {
    let runner = slow_runner(60);
    let dispatcher = Dispatcher::new(Arc::clone(&runner) as Arc<dyn pi_parallel::domain::ports::AgentRunner>);
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });

    let team = TeamSpec {
        objective: String::new(),
        members: vec![TeamMember {
            role: "w".into(),
            agent: None,
            provider: None,
            model: None,
            tools: None,
            system_prompt: None,
            thinking: None,
            task: None,
        }],
        tasks: Some(vec![
            TeamTask::new("first", "start").with_assignee("w"),
            TeamTask::new("second", "follow")
                .with_assignee("w")
                .with_depends(vec!["first".into()]),
        ]),
        max_concurrency: None,
    };
    let params = ParallelParams {
        cwd: Some(std::env::temp_dir()),
        team: Some(team),
        ..Default::default()
    };
    let response = dispatcher.dispatch(params, cancel).await;

    assert!(response.details.aborted);
    // The dependent task never started.
    assert_eq!(runner.run_count(), 1);
    let results = &response.details.results;
    assert!(results.len() <= 1);
    if let Some(first) = results.first() {
        assert!(first.aborted);
    }
}
