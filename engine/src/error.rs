use thiserror::Error;

use memo_providers::ProviderError;

use crate::storage::StorageError;

/// Failure of one acquisition batch. A batch never yields partial results.
#[derive(Debug, Error)]
pub enum AcquireError {
    #[error("image search failed: {0}")]
    Search(#[source] ProviderError),
    #[error("failed to load image {identifier}: {source}")]
    ImageLoad {
        identifier: String,
        #[source]
        source: ProviderError,
    },
    #[error("provider returned {received} distinct images, {requested} were requested")]
    ShortResult { requested: usize, received: usize },
    #[error("image acquisition was cancelled")]
    Cancelled,
    #[error("image worker panicked: {0}")]
    WorkerPanicked(String),
}

#[derive(Debug, Error)]
pub enum RestoreError {
    #[error("cannot read saved game: {0}")]
    Storage(#[from] StorageError),
    #[error("cannot reload saved images: {0}")]
    Acquire(#[from] AcquireError),
    #[error("saved game is corrupt: {0}")]
    StateCorruption(String),
}

/// What the view is told when a restart or restore fails.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Acquire(#[from] AcquireError),
    #[error(transparent)]
    Restore(#[from] RestoreError),
    #[error("loading task failed: {0}")]
    TaskFailed(String),
}
