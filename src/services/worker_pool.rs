//! Bounded-concurrency mapping with cooperative cancellation.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Global ceiling on concurrently running children, across every mode.
pub const MAX_CONCURRENCY: usize = 8;
/// Concurrency used when the caller does not ask for a specific cap.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Clamp a requested cap to `1..=min(MAX_CONCURRENCY, item_count)`.
pub fn clamp_concurrency(requested: Option<usize>, item_count: usize) -> usize {
    requested
        .unwrap_or(DEFAULT_CONCURRENCY)
        .max(1)
        .min(MAX_CONCURRENCY)
        .min(item_count.max(1))
}

/// Outcome of a pooled map. `results[i]` corresponds to `items[i]`; `None`
/// marks a worker that never started because cancellation won the race.
#[derive(Debug)]
pub struct PoolOutcome<T> {
    pub results: Vec<Option<T>>,
    pub aborted: bool,
}

/// Map `worker` over `items` with at most `limit` invocations in flight.
///
/// Result order matches input order regardless of completion order. Once
/// `cancel` fires no new workers start; workers already running observe the
/// same token through their own futures and are awaited to completion.
pub async fn map_bounded<I, T, F, Fut>(
    items: Vec<I>,
    limit: usize,
    cancel: &CancellationToken,
    worker: F,
) -> PoolOutcome<T>
where
    F: Fn(usize, I) -> Fut,
    Fut: Future<Output = T>,
{
    let permits = clamp_concurrency(Some(limit), items.len());
    let semaphore = Arc::new(Semaphore::new(permits));
    debug!(items = items.len(), permits, "starting bounded map");

    let tasks = items.into_iter().enumerate().map(|(index, item)| {
        let semaphore = Arc::clone(&semaphore);
        let cancel = cancel.clone();
        let future = worker(index, item);
        async move {
            let _permit = tokio::select! {
                _ = cancel.cancelled() => return None,
                permit = semaphore.acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => return None,
                },
            };
            if cancel.is_cancelled() {
                return None;
            }
            Some(future.await)
        }
    });

    let results = futures::future::join_all(tasks).await;
    PoolOutcome {
        results,
        aborted: cancel.is_cancelled(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_results_preserve_input_order() {
        let cancel = CancellationToken::new();
        // Later items finish first; order must still match the input.
        let outcome = map_bounded(vec![30u64, 20, 10], 3, &cancel, |index, delay| async move {
            tokio::time::sleep(Duration::from_millis(delay)).await;
            index
        })
        .await;

        assert!(!outcome.aborted);
        let values: Vec<usize> = outcome.results.into_iter().flatten().collect();
        assert_eq!(values, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_concurrency_never_exceeds_limit() {
        let cancel = CancellationToken::new();
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let active_ref = Arc::clone(&active);
        let peak_ref = Arc::clone(&peak);
        let outcome = map_bounded(vec![(); 12], 3, &cancel, move |_, ()| {
            let active = Arc::clone(&active_ref);
            let peak = Arc::clone(&peak_ref);
            async move {
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                active.fetch_sub(1, Ordering::SeqCst);
            }
        })
        .await;

        assert_eq!(outcome.results.len(), 12);
        assert!(peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn test_limit_clamped_to_global_ceiling() {
        assert_eq!(clamp_concurrency(Some(50), 100), MAX_CONCURRENCY);
        assert_eq!(clamp_concurrency(Some(50), 2), 2);
        assert_eq!(clamp_concurrency(Some(0), 5), 1);
        assert_eq!(clamp_concurrency(None, 100), DEFAULT_CONCURRENCY);
    }

    #[tokio::test]
    async fn test_cancellation_stops_new_workers() {
        let cancel = CancellationToken::new();
        let started = Arc::new(AtomicUsize::new(0));

        let cancel_trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            cancel_trigger.cancel();
        });

        let started_ref = Arc::clone(&started);
        let outcome = map_bounded(vec![(); 10], 1, &cancel, move |index, ()| {
            let started = Arc::clone(&started_ref);
            async move {
                started.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(25)).await;
                index
            }
        })
        .await;

        assert!(outcome.aborted);
        let completed = outcome.results.iter().flatten().count();
        assert!(completed < 10, "cancellation should skip some workers");
        assert_eq!(started.load(Ordering::SeqCst), completed);
    }
}
