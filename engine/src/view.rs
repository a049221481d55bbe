//! The presentation contract driven by [`crate::GameSession`].

use std::fmt;

use tokio::sync::mpsc;

use memo_types::{Board, ImageRef};

use crate::error::SessionError;

/// Callbacks from the session to whatever draws the board.
///
/// Calls arrive in the order the session issues them, on the thread that owns
/// the session.
pub trait GameView {
    fn show_loading(&mut self);
    fn display_board(&mut self, board: &Board);
    fn display_moves(&mut self, moves: u32);
    fn display_error(&mut self, error: &SessionError);

    /// Turn the card at `position` to show `image`. When `on_complete` is
    /// present the view must call [`FlipCompletion::complete`] once the flip
    /// has finished; the session evaluates the pair only then.
    fn flip(&mut self, position: usize, image: &ImageRef, on_complete: Option<FlipCompletion>);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SessionEvent {
    FlipFinished { generation: u64 },
    UnflipDue { generation: u64 },
}

/// Continuation handed to [`GameView::flip`] for the second card of a move.
///
/// Completing it queues the match check on the owning session; the session
/// applies it on its next `tick` or `step`. Completing after the session was
/// destroyed or reloaded does nothing.
pub struct FlipCompletion {
    events: mpsc::UnboundedSender<SessionEvent>,
    generation: u64,
}

impl FlipCompletion {
    pub(crate) fn new(events: mpsc::UnboundedSender<SessionEvent>, generation: u64) -> Self {
        Self { events, generation }
    }

    pub fn complete(self) {
        let _ = self.events.send(SessionEvent::FlipFinished {
            generation: self.generation,
        });
    }
}

impl fmt::Debug for FlipCompletion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlipCompletion")
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}
