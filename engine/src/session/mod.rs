//! The game session state machine.
//!
//! [`GameSession`] owns the board and move counter and is driven from a single
//! control flow: view input arrives through its methods, and background work
//! (image loading, the delayed unflip) reports back through a task handle and
//! an event channel that are only drained by [`GameSession::tick`] or
//! [`GameSession::step`]. Board state is never touched from another task.
//!
//! # Phases
//!
//! | Phase | Meaning |
//! |-------|---------|
//! | `Idle` | No board. Initial state, and after a failed load |
//! | `Loading` | A restart or restore is acquiring images |
//! | `Ready` | A board is displayed and clicks are accepted |
//!
//! Restarting or restoring while `Loading` is ignored: the running load is left
//! alone and the request is not queued.
//!
//! Methods that start background work spawn tokio tasks and must be called
//! from within a runtime.


use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use memo_providers::ImageProvider;
use memo_types::{BoardSize, GameState, ImageRef, ImageSize};

use crate::board::build_board;
use crate::error::SessionError;
use crate::pipeline::ImagePipeline;
use crate::serializer::StateSerializer;
use crate::storage::Storage;
use crate::view::{FlipCompletion, GameView, SessionEvent};

/// How long a mismatched pair stays face up.
pub const UNFLIP_DELAY: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Idle,
    Loading,
    Ready,
}

/// Collaborators a session is assembled from.
pub struct SessionParts<V> {
    pub view: V,
    pub provider: Arc<dyn ImageProvider>,
    pub grid: BoardSize,
    /// Shown on every face-down card.
    pub back: ImageRef,
}

type LoadResult = Result<GameState, SessionError>;

struct LoadTask {
    handle: JoinHandle<LoadResult>,
    cancel: CancellationToken,
}

enum Step {
    Loaded(Result<LoadResult, JoinError>),
    Event(SessionEvent),
    Closed,
}

pub struct GameSession<V: GameView> {
    view: V,
    pipeline: ImagePipeline,
    serializer: StateSerializer,
    grid: BoardSize,
    back: ImageRef,
    state: Option<GameState>,
    load: Option<LoadTask>,
    unflip: Option<JoinHandle<()>>,
    events_tx: mpsc::UnboundedSender<SessionEvent>,
    events_rx: mpsc::UnboundedReceiver<SessionEvent>,
    /// Bumped whenever the board is replaced; events carry the value they were
    /// issued under and are dropped on mismatch.
    generation: u64,
    destroyed: bool,
}

impl<V: GameView> GameSession<V> {
    pub fn new(parts: SessionParts<V>) -> Self {
        let SessionParts {
            view,
            provider,
            grid,
            back,
        } = parts;
        let pipeline = ImagePipeline::new(provider);
        let serializer = StateSerializer::new(pipeline.clone(), back.clone());
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        Self {
            view,
            pipeline,
            serializer,
            grid,
            back,
            state: None,
            load: None,
            unflip: None,
            events_tx,
            events_rx,
            generation: 0,
            destroyed: false,
        }
    }

    #[must_use]
    pub fn phase(&self) -> SessionPhase {
        if self.load.is_some() {
            SessionPhase::Loading
        } else if self.state.is_some() {
            SessionPhase::Ready
        } else {
            SessionPhase::Idle
        }
    }

    #[must_use]
    pub fn state(&self) -> Option<&GameState> {
        self.state.as_ref()
    }

    #[must_use]
    pub fn grid(&self) -> BoardSize {
        self.grid
    }

    #[must_use]
    pub fn view(&self) -> &V {
        &self.view
    }

    pub fn view_mut(&mut self) -> &mut V {
        &mut self.view
    }

    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    /// Per-card image size for a view of the given pixel dimensions.
    #[must_use]
    pub fn card_size(&self, view_width: u32, view_height: u32) -> ImageSize {
        ImageSize::new(
            view_width / self.grid.columns(),
            view_height / self.grid.rows(),
        )
    }

    fn can_start_load(&self, operation: &str) -> bool {
        if self.destroyed {
            debug!(operation, "Session destroyed, ignoring");
            return false;
        }
        if self.load.is_some() {
            debug!(operation, "Game is already loading, ignoring");
            return false;
        }
        true
    }

    /// Starts a new game with freshly searched images.
    pub fn restart_game(&mut self, view_width: u32, view_height: u32) {
        if !self.can_start_load("restart") {
            return;
        }

        let size = self.card_size(view_width, view_height);
        let count = self.grid.pairs();
        let pipeline = self.pipeline.clone();
        let back = self.back.clone();
        info!(grid = %self.grid, %size, "Restarting game");

        self.start_load(move |cancel| async move {
            let images = pipeline.search_and_acquire(count, size, &cancel).await?;
            Ok(GameState::new(build_board(images, back)))
        });
    }

    /// Restores the game saved in `storage`, or starts a new one when there is
    /// none.
    pub fn restore_game(&mut self, storage: &dyn Storage, view_width: u32, view_height: u32) {
        if !self.can_start_load("restore") {
            return;
        }

        let saved = match self.serializer.read_saved(storage) {
            Ok(Some(saved)) => saved,
            Ok(None) => {
                info!("No saved game, starting a new one");
                self.restart_game(view_width, view_height);
                return;
            }
            Err(e) => {
                self.fail(e.into());
                return;
            }
        };
        if let Err(e) = saved.fits(self.grid.total()) {
            self.fail(e.into());
            return;
        }

        let size = self.card_size(view_width, view_height);
        let serializer = self.serializer.clone();
        info!(cards = saved.unique_ids.len(), %size, "Restoring saved game");

        self.start_load(move |cancel| async move {
            serializer
                .restore(saved, size, &cancel)
                .await
                .map_err(SessionError::from)
        });
    }

    fn start_load<F, Fut>(&mut self, load: F)
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = LoadResult> + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(load(cancel.clone()));
        self.load = Some(LoadTask { handle, cancel });
        self.view.show_loading();
    }

    /// Saves the current game. Does nothing before the first board is loaded.
    pub fn save_state(&self, storage: &mut dyn Storage) {
        match &self.state {
            Some(state) => self.serializer.serialize(state, storage),
            None => debug!("No game to save"),
        }
    }

    /// Applies a click on the card at `position`.
    ///
    /// # Panics
    ///
    /// When `position` is outside the board.
    pub fn on_card_clicked(&mut self, position: usize) {
        if self.destroyed || self.phase() != SessionPhase::Ready {
            debug!(position, phase = ?self.phase(), "Ignoring click, no board");
            return;
        }
        let Some(state) = self.state.as_mut() else {
            return;
        };
        let board = &mut state.board;
        assert!(
            position < board.len(),
            "clicked position {position} is outside a board of {} cards",
            board.len()
        );

        if board.flipped().contains(&position) {
            debug!(position, "Clicked an already matched card");
            return;
        }
        if board.candidate1() == Some(position) {
            debug!(position, "Clicked the pending candidate");
            return;
        }
        if board.candidate2().is_some() {
            debug!(position, "Waiting for cards to flip back");
            return;
        }

        if board.candidate1().is_none() {
            trace!(position, "First candidate");
            board.select_first(position);
            self.view.flip(position, &board.card(position).front, None);
            return;
        }

        board.select_second(position);
        state.moves += 1;
        trace!(position, moves = state.moves, "Second candidate");
        self.view.display_moves(state.moves);
        let completion = FlipCompletion::new(self.events_tx.clone(), self.generation);
        self.view
            .flip(position, &state.board.card(position).front, Some(completion));
    }

    /// Applies finished background work without waiting.
    pub fn tick(&mut self) {
        if self.destroyed {
            return;
        }
        self.poll_load();
        while let Ok(event) = self.events_rx.try_recv() {
            self.handle_event(event);
        }
    }

    /// Waits for the next piece of background work and applies it.
    ///
    /// Returns `false` when nothing is pending: no load in flight, no unflip
    /// scheduled and no queued event.
    pub async fn step(&mut self) -> bool {
        if self.destroyed {
            return false;
        }
        if let Ok(event) = self.events_rx.try_recv() {
            self.handle_event(event);
            return true;
        }

        let step = if let Some(task) = self.load.as_mut() {
            tokio::select! {
                joined = &mut task.handle => Step::Loaded(joined),
                event = self.events_rx.recv() => event.map_or(Step::Closed, Step::Event),
            }
        } else if self.unflip.is_some() {
            self.events_rx
                .recv()
                .await
                .map_or(Step::Closed, Step::Event)
        } else {
            return false;
        };

        match step {
            Step::Loaded(joined) => {
                self.load = None;
                self.finish_load(joined);
            }
            Step::Event(event) => self.handle_event(event),
            Step::Closed => return false,
        }
        true
    }

    /// Cancels background work. No view callback fires after this returns.
    pub fn destroy(&mut self) {
        if let Some(task) = self.load.take() {
            debug!("Cancelling in-flight load");
            task.cancel.cancel();
            task.handle.abort();
        }
        self.cancel_unflip();
        self.events_rx.close();
        while self.events_rx.try_recv().is_ok() {}
        self.destroyed = true;
    }

    fn poll_load(&mut self) {
        use futures_util::future::FutureExt;

        let finished = self
            .load
            .as_ref()
            .is_some_and(|task| task.handle.is_finished());
        if !finished {
            return;
        }
        let Some(mut task) = self.load.take() else {
            return;
        };

        match (&mut task.handle).now_or_never() {
            Some(joined) => self.finish_load(joined),
            // is_finished() raced the join handle; retry next tick.
            None => self.load = Some(task),
        }
    }

    fn finish_load(&mut self, joined: Result<LoadResult, JoinError>) {
        match joined {
            Ok(Ok(state)) => self.install(state),
            Ok(Err(e)) => self.fail(e),
            Err(e) if e.is_cancelled() => debug!("Load task cancelled"),
            Err(e) => self.fail(SessionError::TaskFailed(e.to_string())),
        }
    }

    fn install(&mut self, state: GameState) {
        self.replace_board();
        let pending = state.board.candidate2().is_some();
        info!(
            cards = state.board.len(),
            moves = state.moves,
            "Board ready"
        );
        self.state = Some(state);
        // A restored pair that was awaiting its flip-back resolves as if the
        // mismatch had just happened.
        if pending {
            self.schedule_unflip();
        }
        if let Some(state) = &self.state {
            self.view.display_board(&state.board);
            self.view.display_moves(state.moves);
        }
    }

    fn fail(&mut self, error: SessionError) {
        error!("Failed to load game: {error}");
        self.replace_board();
        self.state = None;
        self.view.display_error(&error);
    }

    /// Invalidates everything issued for the current board.
    fn replace_board(&mut self) {
        self.cancel_unflip();
        self.generation += 1;
    }

    fn handle_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::FlipFinished { generation } if generation == self.generation => {
                self.resolve_candidates();
            }
            SessionEvent::UnflipDue { generation } if generation == self.generation => {
                self.unflip = None;
                self.flip_back();
            }
            stale => trace!(?stale, "Dropping stale session event"),
        }
    }

    fn resolve_candidates(&mut self) {
        let Some(state) = self.state.as_mut() else {
            return;
        };
        let board = &mut state.board;
        let (Some(first), Some(second)) = (board.candidate1(), board.candidate2()) else {
            warn!("Flip finished without two candidates");
            return;
        };

        if board.is_match(first, second) {
            board.mark_matched();
            debug!(first, second, "Cards match");
            if board.is_complete() {
                info!(moves = state.moves, "Board cleared");
            }
        } else {
            debug!(first, second, "Cards do not match");
            self.schedule_unflip();
        }
    }

    fn schedule_unflip(&mut self) {
        self.cancel_unflip();
        let events = self.events_tx.clone();
        let generation = self.generation;
        self.unflip = Some(tokio::spawn(async move {
            tokio::time::sleep(UNFLIP_DELAY).await;
            let _ = events.send(SessionEvent::UnflipDue { generation });
        }));
    }

    fn cancel_unflip(&mut self) {
        if let Some(handle) = self.unflip.take() {
            handle.abort();
        }
    }

    fn flip_back(&mut self) {
        let Some(state) = self.state.as_mut() else {
            return;
        };
        let board = &mut state.board;
        let (Some(first), Some(second)) = (board.candidate1(), board.candidate2()) else {
            return;
        };
        self.view.flip(first, board.back(), None);
        self.view.flip(second, board.back(), None);
        board.clear_candidates();
    }
}

impl<V: GameView> Drop for GameSession<V> {
    fn drop(&mut self) {
        if let Some(task) = self.load.take() {
            task.cancel.cancel();
            task.handle.abort();
        }
        self.cancel_unflip();
    }
}
