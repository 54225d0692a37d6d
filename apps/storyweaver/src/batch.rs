//! Batch Executor: bounded-concurrency fan-out for asset jobs.
//!
//! Arguments are cut into consecutive chunks of `max_concurrent`; each chunk runs
//! concurrently and the executor sleeps `inter_batch_delay` between chunks.
//! A failing job yields its own `Err` and never cancels its siblings.

use std::future::Future;
use std::time::Duration;

use futures::future::join_all;
use tracing::debug;

#[derive(Debug, Clone, Copy)]
pub struct BatchConfig {
    pub max_concurrent: usize,
    pub inter_batch_delay: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 4,
            inter_batch_delay: Duration::from_millis(1000),
        }
    }
}

/// Runs `job` over every argument and returns the results in input order.
pub async fn run_batched<A, R, F, Fut>(args: Vec<A>, config: BatchConfig, job: F) -> Vec<R>
where
    F: Fn(A) -> Fut,
    Fut: Future<Output = R>,
{
    let chunk_size = config.max_concurrent.max(1);
    let total = args.len();
    let mut results = Vec::with_capacity(total);
    let mut pending = args.into_iter().peekable();
    let mut batch = 0usize;

    while pending.peek().is_some() {
        let chunk: Vec<A> = pending.by_ref().take(chunk_size).collect();
        batch += 1;
        debug!(batch, size = chunk.len(), total, "Running batch");

        results.extend(join_all(chunk.into_iter().map(&job)).await);

        if pending.peek().is_some() && !config.inter_batch_delay.is_zero() {
            tokio::time::sleep(config.inter_batch_delay).await;
        }
    }

    results
}
