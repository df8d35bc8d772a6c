//! Race-mode integration tests: first success wins, losers are aborted.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use pi_parallel::adapters::{MockResponse, MockRunner};
use pi_parallel::domain::models::{ParallelParams, RaceSpec, RunMode};
use pi_parallel::services::Dispatcher;

fn race_params(task: &str, models: &[&str]) -> ParallelParams {
    ParallelParams {
        cwd: Some(std::env::temp_dir()),
        race: Some(RaceSpec {
            task: task.into(),
            models: models.iter().map(|m| m.to_string()).collect(),
            provider: None,
            tools: None,
            system_prompt: None,
            thinking: None,
        }),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_first_success_wins() {
    let runner = Arc::new(MockRunner::scripted(|invocation| {
        match invocation.model.as_deref() {
            Some("fast") => MockResponse::success("A").with_delay(Duration::from_millis(50)),
            _ => MockResponse::success("B").with_delay(Duration::from_millis(200)),
        }
    }));
    let dispatcher = Dispatcher::new(Arc::clone(&runner) as Arc<dyn pi_parallel::domain::ports::AgentRunner>);

    let response = dispatcher
        .dispatch(race_params("pick one", &["fast", "slow"]), CancellationToken::new())
        .await;

    assert!(!response.is_error);
    assert_eq!(response.details.mode, RunMode::Race);
    assert_eq!(response.details.winner.as_deref(), Some("fast"));
    assert_eq!(response.text_content(), "A");
    // Both candidates were launched together.
    assert_eq!(runner.run_count(), 2);
    // Progress has one entry per candidate model.
    let progress = response.details.progress.unwrap();
    assert_eq!(progress.len(), 2);
}

#[tokio::test]
async fn test_early_failure_does_not_end_race() {
    let runner = Arc::new(MockRunner::scripted(|invocation| {
        match invocation.model.as_deref() {
            Some("flaky") => MockResponse::failure("immediate error"),
            _ => MockResponse::success("steady wins").with_delay(Duration::from_millis(60)),
        }
    }));
    let dispatcher = Dispatcher::new(runner);

    let response = dispatcher
        .dispatch(
            race_params("endure", &["flaky", "steady"]),
            CancellationToken::new(),
        )
        .await;

    assert!(!response.is_error);
    assert_eq!(response.details.winner.as_deref(), Some("steady"));
    assert_eq!(response.text_content(), "steady wins");
    // The flaky candidate's failed result is retained.
    assert!(response
        .details
        .results
        .iter()
        .any(|r| r.exit_code != 0 && r.model.as_deref() == Some("flaky")));
}

#[tokio::test]
async fn test_all_failures_yield_no_winner() {
    let runner = Arc::new(MockRunner::scripted(|_| MockResponse::failure("down")));
    let dispatcher = Dispatcher::new(runner);

    let response = dispatcher
        .dispatch(race_params("hopeless", &["a", "b"]), CancellationToken::new())
        .await;

    assert!(!response.is_error);
    assert!(response.details.winner.is_none());
    assert!(response.text_content().contains("No model produced"));
    assert_eq!(response.details.results.len(), 2);
}

#[tokio::test]
async fn test_caller_cancellation_aborts_race() {
    let runner = Arc::new(MockRunner::scripted(|_| {
        MockResponse::success("late").with_delay(Duration::from_millis(500))
    }));
    let dispatcher = Dispatcher::new(runner);
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(30)).await;
        trigger.cancel();
    });

    let response = dispatcher
        .dispatch(race_params("slow burn", &["m1", "m2"]), cancel)
        .await;

    assert!(response.details.aborted);
    assert!(response.details.winner.is_none());
}
