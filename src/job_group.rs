// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT
//! First-success concurrent runner: given N futures each returning
//! `Result<Option<T>, E>`, run them concurrently and resolve on the first
//! definitive hit (`Ok(Some(_))`), cancelling the rest. If every future
//! reports a clean miss (`Ok(None)`), the group result is a miss. If any
//! future errors and none hit, the errors are aggregated and returned.

use std::future::Future;

use tokio_util::sync::CancellationToken;

pub enum JobOutcome<T, E> {
    Hit(T),
    Miss,
    AllFailed(Vec<E>),
}

/// Runs `jobs` concurrently to completion or first hit, at most
/// `max_concurrency` at a time. Each job receives a child [`CancellationToken`]
/// it should observe at its own suspension points; the group cancels every
/// other child (including ones still waiting for a concurrency slot) as soon
/// as one job reports a hit.
pub async fn run<T, E, F, Fut>(
    parent: &CancellationToken,
    jobs: Vec<F>,
    max_concurrency: usize,
) -> JobOutcome<T, E>
where
    F: FnOnce(CancellationToken) -> Fut + Send + 'static,
    Fut: Future<Output = Result<Option<T>, E>> + Send + 'static,
    T: Send + 'static,
    E: Send + 'static,
{
    if jobs.is_empty() {
        return JobOutcome::Miss;
    }

    let group_token = parent.child_token();
    let semaphore = std::sync::Arc::new(tokio::sync::Semaphore::new(max_concurrency.max(1)));
    let mut set = tokio::task::JoinSet::new();
    for job in jobs {
        let child = group_token.child_token();
        let permit = semaphore.clone();
        set.spawn(async move {
            let Ok(_permit) = permit.acquire_owned().await else {
                return Ok(None);
            };
            job(child).await
        });
    }

    let mut errors = Vec::new();

    while let Some(joined) = set.join_next().await {
        match joined {
            Ok(Ok(Some(value))) => {
                group_token.cancel();
                set.abort_all();
                return JobOutcome::Hit(value);
            }
            Ok(Ok(None)) => {}
            Ok(Err(e)) => errors.push(e),
            Err(join_err) if join_err.is_cancelled() => {}
            Err(_) => {}
        }
    }

    if !errors.is_empty() {
        JobOutcome::AllFailed(errors)
    } else {
        JobOutcome::Miss
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn first_hit_wins_and_cancels_the_rest() {
        let token = CancellationToken::new();
        let jobs: Vec<Box<dyn FnOnce(CancellationToken) -> _ + Send>> = Vec::new();
        drop(jobs);

        let outcome = run::<u32, (), _, _>(
            &token,
            vec![
                |_c: CancellationToken| async move { Ok(Some(1u32)) },
                |c: CancellationToken| async move {
                    tokio::select! {
                        _ = c.cancelled() => Ok(None),
                        _ = tokio::time::sleep(std::time::Duration::from_secs(30)) => Ok(Some(2u32)),
                    }
                },
            ],
            8,
        )
        .await;

        assert!(matches!(outcome, JobOutcome::Hit(1)));
    }

    #[tokio::test]
    async fn all_miss_is_a_miss() {
        let token = CancellationToken::new();
        let outcome = run::<u32, (), _, _>(
            &token,
            vec![
                |_: CancellationToken| async move { Ok(None) },
                |_: CancellationToken| async move { Ok(None) },
            ],
            8,
        )
        .await;
        assert!(matches!(outcome, JobOutcome::Miss));
    }

    #[tokio::test]
    async fn all_failing_is_reported() {
        let token = CancellationToken::new();
        let outcome = run::<u32, &'static str, _, _>(
            &token,
            vec![
                |_: CancellationToken| async move { Err("boom-1") },
                |_: CancellationToken| async move { Err("boom-2") },
            ],
            8,
        )
        .await;
        match outcome {
            JobOutcome::AllFailed(errs) => assert_eq!(errs.len(), 2),
            _ => panic!("expected AllFailed"),
        }
    }

    #[tokio::test]
    async fn one_error_among_misses_is_still_reported() {
        let token = CancellationToken::new();
        let outcome = run::<u32, &'static str, _, _>(
            &token,
            vec![
                |_: CancellationToken| async move { Ok(None) },
                |_: CancellationToken| async move { Err("boom") },
            ],
            8,
        )
        .await;
        match outcome {
            JobOutcome::AllFailed(errs) => assert_eq!(errs, vec!["boom"]),
            _ => panic!("expected AllFailed, a real error must not be downgraded to a miss"),
        }
    }

    #[tokio::test]
    async fn max_concurrency_bounds_in_flight_jobs() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        let token = CancellationToken::new();
        let concurrent = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let jobs: Vec<_> = (0..6)
            .map(|_| {
                let concurrent = concurrent.clone();
                let peak = peak.clone();
                move |_: CancellationToken| async move {
                    let now = concurrent.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                    concurrent.fetch_sub(1, Ordering::SeqCst);
                    Ok::<Option<u32>, ()>(None)
                }
            })
            .collect();

        let outcome = run::<u32, (), _, _>(&token, jobs, 2).await;
        assert!(matches!(outcome, JobOutcome::Miss));
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }
}
