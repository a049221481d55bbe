//! Batch image acquisition.
//!
//! A batch fans its identifiers out to at most [`WORKER_COUNT`] workers that
//! drain a shared queue. The first failure cancels the batch token; workers
//! check it before taking the next identifier and race it against the load in
//! flight. The call joins every worker before returning, so nothing from a
//! batch outlives it.

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use memo_providers::ImageProvider;
use memo_types::{ImageSize, LoadedImage};

use crate::error::AcquireError;

/// Parallel image loads per batch.
pub const WORKER_COUNT: usize = 3;

type WorkQueue = Arc<Mutex<VecDeque<String>>>;

#[derive(Clone)]
pub struct ImagePipeline {
    provider: Arc<dyn ImageProvider>,
}

impl std::fmt::Debug for ImagePipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImagePipeline").finish_non_exhaustive()
    }
}

impl ImagePipeline {
    #[must_use]
    pub fn new(provider: Arc<dyn ImageProvider>) -> Self {
        Self { provider }
    }

    /// Asks the provider for `count` identifiers, then loads them all.
    pub async fn search_and_acquire(
        &self,
        count: usize,
        size: ImageSize,
        cancel: &CancellationToken,
    ) -> Result<Vec<LoadedImage>, AcquireError> {
        let identifiers = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(AcquireError::Cancelled),
            result = self.provider.search(count) => result.map_err(AcquireError::Search)?,
        };

        let distinct = identifiers.iter().collect::<HashSet<_>>().len();
        if identifiers.len() != count || distinct != count {
            return Err(AcquireError::ShortResult {
                requested: count,
                received: distinct,
            });
        }
        debug!(count, "Search returned identifiers");

        self.acquire(identifiers, size, cancel).await
    }

    /// Loads every identifier. Output order is unspecified; each input appears
    /// exactly once on success.
    pub async fn acquire(
        &self,
        identifiers: Vec<String>,
        size: ImageSize,
        cancel: &CancellationToken,
    ) -> Result<Vec<LoadedImage>, AcquireError> {
        if cancel.is_cancelled() {
            return Err(AcquireError::Cancelled);
        }
        if identifiers.is_empty() {
            return Ok(Vec::new());
        }

        let total = identifiers.len();
        let batch = cancel.child_token();
        let queue: WorkQueue = Arc::new(Mutex::new(VecDeque::from(identifiers)));

        let mut workers = JoinSet::new();
        for worker in 0..WORKER_COUNT.min(total) {
            workers.spawn(run_worker(
                worker,
                Arc::clone(&self.provider),
                Arc::clone(&queue),
                size,
                batch.clone(),
            ));
        }
        debug!(total, workers = workers.len(), %size, "Acquiring images");

        let mut loaded = Vec::with_capacity(total);
        let mut failure: Option<AcquireError> = None;
        while let Some(joined) = workers.join_next().await {
            let error = match joined {
                Ok(Ok(images)) => {
                    loaded.extend(images);
                    continue;
                }
                Ok(Err(e)) => e,
                Err(e) => AcquireError::WorkerPanicked(e.to_string()),
            };
            batch.cancel();
            keep_first_cause(&mut failure, error);
        }

        if let Some(error) = failure {
            warn!(total, "Image batch failed: {error}");
            return Err(error);
        }
        debug!(total, "Image batch complete");
        Ok(loaded)
    }
}

/// Workers that stopped because of another worker's failure report
/// `Cancelled`; the failure that triggered the cancel wins.
fn keep_first_cause(slot: &mut Option<AcquireError>, error: AcquireError) {
    match slot {
        None => *slot = Some(error),
        Some(AcquireError::Cancelled) if !matches!(error, AcquireError::Cancelled) => {
            *slot = Some(error);
        }
        Some(_) => {}
    }
}

fn next_identifier(queue: &WorkQueue) -> Option<String> {
    queue
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .pop_front()
}

async fn run_worker(
    worker: usize,
    provider: Arc<dyn ImageProvider>,
    queue: WorkQueue,
    size: ImageSize,
    cancel: CancellationToken,
) -> Result<Vec<LoadedImage>, AcquireError> {
    let mut loaded = Vec::new();
    loop {
        if cancel.is_cancelled() {
            return Err(AcquireError::Cancelled);
        }
        let Some(identifier) = next_identifier(&queue) else {
            return Ok(loaded);
        };

        trace!(worker, %identifier, "Loading image");
        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(AcquireError::Cancelled),
            result = provider.load(&identifier, size) => result,
        };

        match result {
            Ok(image) => loaded.push(LoadedImage::new(identifier, image)),
            Err(source) => {
                cancel.cancel();
                return Err(AcquireError::ImageLoad { identifier, source });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    use super::*;
    use crate::test_support::StubProvider;

    fn pipeline(stub: &Arc<StubProvider>) -> ImagePipeline {
        ImagePipeline::new(Arc::clone(stub) as Arc<dyn ImageProvider>)
    }

    fn names(count: usize) -> Vec<String> {
        (0..count).map(|i| format!("photo-{i}")).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn every_identifier_is_loaded_exactly_once() {
        let stub = Arc::new(StubProvider::new().with_delay(Duration::from_millis(20)));
        let images = pipeline(&stub)
            .acquire(names(10), ImageSize::new(50, 50), &CancellationToken::new())
            .await
            .unwrap();

        let loaded: Vec<_> = images.iter().map(|i| i.identifier.clone()).collect();
        let unique: BTreeSet<_> = loaded.iter().cloned().collect();
        assert_eq!(loaded.len(), 10);
        assert_eq!(unique, names(10).into_iter().collect());
        assert_eq!(stub.started.load(Ordering::SeqCst), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn never_more_than_three_loads_in_flight() {
        let stub = Arc::new(StubProvider::new().with_delay(Duration::from_millis(50)));
        pipeline(&stub)
            .acquire(names(12), ImageSize::new(10, 10), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(stub.max_in_flight.load(Ordering::SeqCst), WORKER_COUNT);
    }

    #[tokio::test(start_paused = true)]
    async fn first_failure_fails_the_batch() {
        let stub = Arc::new(
            StubProvider::new()
                .with_delay(Duration::from_millis(100))
                .failing_on("photo-1"),
        );
        let err = pipeline(&stub)
            .acquire(names(9), ImageSize::new(10, 10), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(
            matches!(err, AcquireError::ImageLoad { ref identifier, .. } if identifier == "photo-1"),
            "unexpected error: {err}"
        );
        // Loads already in flight were dropped and no further ones started.
        assert_eq!(stub.finished.load(Ordering::SeqCst), 0);
        assert!(stub.started.load(Ordering::SeqCst) <= WORKER_COUNT);
    }

    #[tokio::test]
    async fn empty_batch_spawns_no_workers() {
        let stub = Arc::new(StubProvider::new());
        let images = pipeline(&stub)
            .acquire(Vec::new(), ImageSize::new(10, 10), &CancellationToken::new())
            .await
            .unwrap();

        assert!(images.is_empty());
        assert_eq!(stub.started.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn cancelled_token_short_circuits() {
        let stub = Arc::new(StubProvider::new());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = pipeline(&stub)
            .acquire(names(4), ImageSize::new(10, 10), &cancel)
            .await
            .unwrap_err();

        assert!(matches!(err, AcquireError::Cancelled));
        assert_eq!(stub.started.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelling_mid_batch_stops_workers() {
        let stub = Arc::new(StubProvider::new().with_delay(Duration::from_secs(1)));
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.cancel();
        });

        let err = pipeline(&stub)
            .acquire(names(6), ImageSize::new(10, 10), &cancel)
            .await
            .unwrap_err();

        assert!(matches!(err, AcquireError::Cancelled));
        assert_eq!(stub.finished.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn search_and_acquire_loads_search_results() {
        let stub = Arc::new(StubProvider::new());
        let images = pipeline(&stub)
            .search_and_acquire(4, ImageSize::new(10, 10), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(images.len(), 4);
        assert_eq!(stub.searches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn search_failure_is_reported() {
        let stub = Arc::new(StubProvider::new().failing_search());
        let err = pipeline(&stub)
            .search_and_acquire(4, ImageSize::new(10, 10), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, AcquireError::Search(_)));
        assert_eq!(stub.started.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn short_search_result_is_rejected() {
        let stub = Arc::new(StubProvider::new().with_search_limit(3));
        let err = pipeline(&stub)
            .search_and_acquire(5, ImageSize::new(10, 10), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            AcquireError::ShortResult {
                requested: 5,
                received: 3
            }
        ));
    }
}
