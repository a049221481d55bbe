//! Scripted provider and recording view shared by the engine tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use memo_providers::{ImageProvider, ProviderError, ProviderFut};
use memo_types::{Bitmap, Board, ImageRef, ImageSize};

use crate::error::SessionError;
use crate::view::{FlipCompletion, GameView};

pub(crate) const BACK: ImageRef = ImageRef::Resource(7);

/// Provider whose search yields `img-<search>-<n>` and whose loads succeed
/// after `delay` unless the identifier was marked as failing.
#[derive(Default)]
pub(crate) struct StubProvider {
    delay: Duration,
    failing: Option<String>,
    fail_search: bool,
    search_limit: Option<usize>,
    pub searches: AtomicUsize,
    pub started: AtomicUsize,
    pub finished: AtomicUsize,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl StubProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn failing_on(mut self, identifier: &str) -> Self {
        self.failing = Some(identifier.to_string());
        self
    }

    pub fn failing_search(mut self) -> Self {
        self.fail_search = true;
        self
    }

    pub fn with_search_limit(mut self, limit: usize) -> Self {
        self.search_limit = Some(limit);
        self
    }
}

impl ImageProvider for StubProvider {
    fn search(&self, count: usize) -> ProviderFut<'_, Vec<String>> {
        Box::pin(async move {
            let search = self.searches.fetch_add(1, Ordering::SeqCst);
            if self.fail_search {
                return Err(ProviderError::Status {
                    target: "search".to_string(),
                    status: 500,
                });
            }
            let count = self.search_limit.map_or(count, |limit| limit.min(count));
            Ok((0..count).map(|n| format!("img-{search}-{n}")).collect())
        })
    }

    fn load<'a>(&'a self, identifier: &'a str, size: ImageSize) -> ProviderFut<'a, ImageRef> {
        Box::pin(async move {
            self.started.fetch_add(1, Ordering::SeqCst);
            if self.failing.as_deref() == Some(identifier) {
                return Err(ProviderError::Status {
                    target: identifier.to_string(),
                    status: 404,
                });
            }

            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.finished.fetch_add(1, Ordering::SeqCst);

            Ok(ImageRef::bitmap(Bitmap::new(
                size,
                identifier.as_bytes().to_vec(),
            )))
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ViewCall {
    ShowLoading,
    DisplayBoard(usize),
    DisplayMoves(u32),
    DisplayError(String),
    Flip { position: usize, to_back: bool },
}

/// Records every callback; flip completions are parked until the test runs them.
#[derive(Debug, Default)]
pub(crate) struct RecordingView {
    pub calls: Vec<ViewCall>,
    pub completions: Vec<FlipCompletion>,
}

impl RecordingView {
    pub fn flips_of(&self, position: usize) -> usize {
        self.calls
            .iter()
            .filter(|call| matches!(call, ViewCall::Flip { position: p, .. } if *p == position))
            .count()
    }

    pub fn flips_back(&self) -> Vec<usize> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                ViewCall::Flip {
                    position,
                    to_back: true,
                } => Some(*position),
                _ => None,
            })
            .collect()
    }

    pub fn boards_shown(&self) -> usize {
        self.calls
            .iter()
            .filter(|call| matches!(call, ViewCall::DisplayBoard(_)))
            .count()
    }

    /// Runs every parked flip completion, as a view would when animations end.
    pub fn finish_flips(&mut self) {
        for completion in self.completions.drain(..) {
            completion.complete();
        }
    }
}

impl GameView for RecordingView {
    fn show_loading(&mut self) {
        self.calls.push(ViewCall::ShowLoading);
    }

    fn display_board(&mut self, board: &Board) {
        self.calls.push(ViewCall::DisplayBoard(board.len()));
    }

    fn display_moves(&mut self, moves: u32) {
        self.calls.push(ViewCall::DisplayMoves(moves));
    }

    fn display_error(&mut self, error: &SessionError) {
        self.calls.push(ViewCall::DisplayError(error.to_string()));
    }

    fn flip(&mut self, position: usize, image: &ImageRef, on_complete: Option<FlipCompletion>) {
        self.calls.push(ViewCall::Flip {
            position,
            to_back: image.same_image(&BACK),
        });
        if let Some(completion) = on_complete {
            self.completions.push(completion);
        }
    }
}
