//! Memo engine: the game session and everything it drives.
//!
//! - [`pipeline`] - bounded, fail-fast batch image acquisition
//! - [`board`] - pairing and shuffling images into a board
//! - [`session`] - the [`GameSession`] state machine
//! - [`serializer`] - saving and restoring a game through [`Storage`]
//! - [`storage`] - the key/value store and its memory and file backends
//! - [`view`] - the callbacks a front-end implements
//!
//! Logging goes through `tracing`; the engine never installs a subscriber.

#![allow(clippy::missing_errors_doc)]

pub mod board;
pub mod error;
pub mod pipeline;
pub mod serializer;
pub mod session;
pub mod storage;
pub mod view;

#[cfg(test)]
mod test_support;

pub use board::{build_board, build_board_with_rng};
pub use error::{AcquireError, RestoreError, SessionError};
pub use pipeline::{ImagePipeline, WORKER_COUNT};
pub use serializer::{SavedGame, StateSerializer};
pub use session::{GameSession, SessionParts, SessionPhase, UNFLIP_DELAY};
pub use storage::{FileStorage, MemoryStorage, Storage, StorageError};
pub use view::{FlipCompletion, GameView};

pub use memo_providers::{ImageProvider, ProviderError};
pub use memo_types::{
    Bitmap, Board, BoardSize, Card, GameState, ImageRef, ImageSize, LoadedImage,
};
