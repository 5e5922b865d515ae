//! Settled batch execution.
//!
//! Runs one async task per item with bounded parallelism and collects every
//! outcome. A failing task never cancels its siblings.

use std::future::Future;

use futures::{stream, StreamExt};

/// Outcome of a single batch item, paired with the item it ran for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settled<T, E> {
    pub item: T,
    pub result: Result<(), E>,
}

impl<T, E> Settled<T, E> {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
}

impl BatchSummary {
    pub fn from_outcomes<T, E>(outcomes: &[Settled<T, E>]) -> Self {
        let succeeded = outcomes.iter().filter(|o| o.is_ok()).count();
        Self {
            attempted: outcomes.len(),
            succeeded,
            failed: outcomes.len() - succeeded,
        }
    }
}

/// Run `task` for every item, at most `concurrency` at a time.
///
/// Outcomes are returned in input order regardless of completion order.
/// A `concurrency` of zero is treated as one.
pub async fn run_settled<T, E, F, Fut>(
    items: Vec<T>,
    concurrency: usize,
    task: F,
) -> Vec<Settled<T, E>>
where
    T: Clone,
    F: Fn(T) -> Fut,
    Fut: Future<Output = Result<(), E>>,
{
    stream::iter(items)
        .map(|item| {
            let fut = task(item.clone());
            async move {
                Settled {
                    item,
                    result: fut.await,
                }
            }
        })
        .buffered(concurrency.max(1))
        .collect()
        .await
}
