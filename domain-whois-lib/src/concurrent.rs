//! Concurrent processing utilities for bulk lookups.
//!
//! Bulk lookups are many independent futures. [`ConcurrentProcessor`] bounds
//! how many run at once and optionally paces how fast new ones start, so a
//! large batch neither floods upstream registries nor lets one slow domain
//! hold up the rest.

use futures::stream::{self, Stream, StreamExt};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tracing::debug;

/// Bounded, optionally paced runner for independent futures.
#[derive(Debug, Clone, Copy)]
pub struct ConcurrentProcessor {
    max_concurrency: usize,
    pacing: Duration,
}

impl ConcurrentProcessor {
    /// Create a processor running at most `max_concurrency` futures at once.
    pub fn new(max_concurrency: usize) -> Self {
        Self {
            max_concurrency: max_concurrency.max(1),
            pacing: Duration::ZERO,
        }
    }

    /// Wait `pacing` before starting each item.
    pub fn with_pacing(mut self, pacing: Duration) -> Self {
        self.pacing = pacing;
        self
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    pub fn pacing(&self) -> Duration {
        self.pacing
    }

    /// Run `task` over every item and return the outputs in input order.
    pub async fn run<I, T, F, Fut>(&self, items: Vec<I>, task: F) -> Vec<T>
    where
        F: FnMut(I) -> Fut,
        Fut: Future<Output = T>,
    {
        debug!(
            total = items.len(),
            concurrency = self.max_concurrency,
            pacing_ms = self.pacing.as_millis() as u64,
            "starting bulk run"
        );

        let pacing = self.pacing;
        stream::iter(items)
            .then(move |item| async move {
                if !pacing.is_zero() {
                    tokio::time::sleep(pacing).await;
                }
                item
            })
            .map(task)
            .buffered(self.max_concurrency)
            .collect()
            .await
    }

    /// Like [`run`](Self::run), but yields outputs as they complete.
    pub fn stream<'a, I, T, F, Fut>(
        &self,
        items: Vec<I>,
        task: F,
    ) -> Pin<Box<dyn Stream<Item = T> + Send + 'a>>
    where
        I: Send + 'a,
        T: Send + 'a,
        F: FnMut(I) -> Fut + Send + 'a,
        Fut: Future<Output = T> + Send + 'a,
    {
        let pacing = self.pacing;
        let stream = stream::iter(items)
            .then(move |item| async move {
                if !pacing.is_zero() {
                    tokio::time::sleep(pacing).await;
                }
                item
            })
            .map(task)
            .buffer_unordered(self.max_concurrency);

        Box::pin(stream)
    }
}

impl Default for ConcurrentProcessor {
    fn default() -> Self {
        Self::new(10)
    }
}
