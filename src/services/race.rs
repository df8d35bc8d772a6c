//! Race selector: first successful task wins, the rest are aborted.

use std::future::Future;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::domain::models::TaskResult;

/// Outcome of a race.
#[derive(Debug)]
pub enum RaceOutcome {
    Winner {
        /// Index of the winning entry in the input order.
        index: usize,
        result: TaskResult,
        /// Results of racers that finished (unsuccessfully) before the win.
        finished: Vec<TaskResult>,
    },
    /// The caller's token fired first, or every racer finished without a
    /// success.
    Aborted { finished: Vec<TaskResult> },
}

/// Run every entry concurrently; the first result that `succeeded()` wins
/// and the derived tokens of all other racers fire immediately.
///
/// Each entry receives its own child token of `cancel`. Losing racers keep
/// winding down in the background after the winner returns; their runner
/// observes the child token and reaps the subprocess. Racers that fail
/// before a winner emerges are collected but do not end the race.
pub async fn race_to_success<F, Fut>(entries: Vec<F>, cancel: &CancellationToken) -> RaceOutcome
where
    F: FnOnce(CancellationToken) -> Fut,
    Fut: Future<Output = TaskResult> + Send + 'static,
{
    let total = entries.len();
    let (tx, mut rx) = mpsc::channel::<(usize, TaskResult)>(total.max(1));
    let mut racer_tokens = Vec::with_capacity(total);

    for (index, entry) in entries.into_iter().enumerate() {
        let racer_token = cancel.child_token();
        racer_tokens.push(racer_token.clone());
        let tx = tx.clone();
        let future = entry(racer_token);
        tokio::spawn(async move {
            let result = future.await;
            let _ = tx.send((index, result)).await;
        });
    }
    drop(tx);

    let mut finished = Vec::new();
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("race aborted by caller");
                return RaceOutcome::Aborted { finished };
            }
            received = rx.recv() => match received {
                Some((index, result)) if result.succeeded() => {
                    debug!(winner = index, "race decided");
                    for (i, token) in racer_tokens.iter().enumerate() {
                        if i != index {
                            token.cancel();
                        }
                    }
                    return RaceOutcome::Winner { index, result, finished };
                }
                Some((_, result)) => finished.push(result),
                // Every racer returned without a success.
                None => return RaceOutcome::Aborted { finished },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::Future;
    use std::pin::Pin;
    use std::time::Duration;

    type RacerFuture = Pin<Box<dyn Future<Output = TaskResult> + Send>>;
    type Racer = Box<dyn FnOnce(CancellationToken) -> RacerFuture>;

    fn ok(id: &str, output: &str) -> TaskResult {
        let mut result = TaskResult::spawn_failure(id, "race task", String::new());
        result.exit_code = 0;
        result.error = None;
        result.output = output.to_string();
        result
    }

    fn failed(id: &str) -> TaskResult {
        TaskResult::spawn_failure(id, "race task", "boom".into())
    }

    #[tokio::test]
    async fn test_first_success_wins() {
        let cancel = CancellationToken::new();
        let entries: Vec<Racer> = vec![
            Box::new(|_t: CancellationToken| {
                Box::pin(async {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    ok("a", "A")
                })
            }),
            Box::new(|_t: CancellationToken| {
                Box::pin(async {
                    tokio::time::sleep(Duration::from_millis(200)).await;
                    ok("b", "B")
                })
            }),
        ];

        match race_to_success(entries, &cancel).await {
            RaceOutcome::Winner { index, result, .. } => {
                assert_eq!(index, 0);
                assert_eq!(result.output, "A");
            }
            RaceOutcome::Aborted { .. } => panic!("expected a winner"),
        }
    }

    #[tokio::test]
    async fn test_loser_token_fires_on_win() {
        let cancel = CancellationToken::new();
        let entries: Vec<Racer> = vec![
            Box::new(|_t: CancellationToken| Box::pin(async { ok("fast", "F") })),
            Box::new(|token: CancellationToken| {
                Box::pin(async move {
                    token.cancelled().await;
                    let mut result = failed("slow");
                    result.aborted = true;
                    result
                })
            }),
        ];

        match race_to_success(entries, &cancel).await {
            RaceOutcome::Winner { index, .. } => assert_eq!(index, 0),
            RaceOutcome::Aborted { .. } => panic!("expected a winner"),
        }
    }

    #[tokio::test]
    async fn test_failures_do_not_end_race() {
        let cancel = CancellationToken::new();
        let entries: Vec<Racer> = vec![
            Box::new(|_t: CancellationToken| Box::pin(async { failed("x") })),
            Box::new(|_t: CancellationToken| {
                Box::pin(async {
                    tokio::time::sleep(Duration::from_millis(40)).await;
                    ok("y", "late but right")
                })
            }),
        ];

        match race_to_success(entries, &cancel).await {
            RaceOutcome::Winner { index, finished, .. } => {
                assert_eq!(index, 1);
                assert_eq!(finished.len(), 1);
                assert_eq!(finished[0].id, "x");
            }
            RaceOutcome::Aborted { .. } => panic!("expected a winner"),
        }
    }

    #[tokio::test]
    async fn test_all_failures_is_aborted() {
        let cancel = CancellationToken::new();
        let entries: Vec<Racer> = vec![
            Box::new(|_t: CancellationToken| Box::pin(async { failed("x") })),
            Box::new(|_t: CancellationToken| Box::pin(async { failed("y") })),
        ];

        match race_to_success(entries, &cancel).await {
            RaceOutcome::Aborted { finished } => assert_eq!(finished.len(), 2),
            RaceOutcome::Winner { .. } => panic!("no racer should win"),
        }
    }

    #[tokio::test]
    async fn test_caller_cancellation_aborts_race() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let entries: Vec<Racer> =
            vec![Box::new(|_t: CancellationToken| {
                Box::pin(async {
                    tokio::time::sleep(Duration::from_millis(500)).await;
                    ok("slow", "S")
                })
            })];

        match race_to_success(entries, &cancel).await {
            RaceOutcome::Aborted { finished } => assert!(finished.is_empty()),
            RaceOutcome::Winner { .. } => panic!("race should abort"),
        }
    }
}
