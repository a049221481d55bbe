use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ImageRef;

// ============================================================================
// Cards
// ============================================================================

/// One face-down card on the board.
///
/// Cards `2n` and `2n + 1` share an image and form a pair.
#[derive(Debug, Clone)]
pub struct Card {
    pub unique_id: usize,
    pub front: ImageRef,
}

impl Card {
    #[must_use]
    pub fn new(unique_id: usize, front: ImageRef) -> Self {
        Self { unique_id, front }
    }

    #[must_use]
    pub fn pairs_with(&self, other: &Card) -> bool {
        self.unique_id != other.unique_id && self.unique_id / 2 == other.unique_id / 2
    }
}

/// An image fetched for a given identifier (a URL or file path).
#[derive(Debug, Clone)]
pub struct LoadedImage {
    pub identifier: String,
    pub image: ImageRef,
}

impl LoadedImage {
    #[must_use]
    pub fn new(identifier: impl Into<String>, image: ImageRef) -> Self {
        Self {
            identifier: identifier.into(),
            image,
        }
    }
}

// ============================================================================
// Grid dimensions
// ============================================================================

/// Fixed grid of `columns x rows` cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawBoardSize", into = "RawBoardSize")]
pub struct BoardSize {
    columns: u32,
    rows: u32,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BoardSizeError {
    #[error("board must have at least one row and one column (got {columns}x{rows})")]
    Empty { columns: u32, rows: u32 },
    #[error("board of {columns}x{rows} has an odd number of cells")]
    OddCells { columns: u32, rows: u32 },
}

impl BoardSize {
    pub fn new(columns: u32, rows: u32) -> Result<Self, BoardSizeError> {
        if columns == 0 || rows == 0 {
            return Err(BoardSizeError::Empty { columns, rows });
        }
        if (columns * rows) % 2 != 0 {
            return Err(BoardSizeError::OddCells { columns, rows });
        }
        Ok(Self { columns, rows })
    }

    #[must_use]
    pub fn columns(self) -> u32 {
        self.columns
    }

    #[must_use]
    pub fn rows(self) -> u32 {
        self.rows
    }

    #[must_use]
    pub fn total(self) -> usize {
        (self.columns * self.rows) as usize
    }

    #[must_use]
    pub fn pairs(self) -> usize {
        self.total() / 2
    }
}

impl Default for BoardSize {
    fn default() -> Self {
        Self {
            columns: 5,
            rows: 4,
        }
    }
}

impl fmt::Display for BoardSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.columns, self.rows)
    }
}

#[derive(Serialize, Deserialize)]
struct RawBoardSize {
    columns: u32,
    rows: u32,
}

impl TryFrom<RawBoardSize> for BoardSize {
    type Error = BoardSizeError;

    fn try_from(raw: RawBoardSize) -> Result<Self, Self::Error> {
        Self::new(raw.columns, raw.rows)
    }
}

impl From<BoardSize> for RawBoardSize {
    fn from(size: BoardSize) -> Self {
        Self {
            columns: size.columns,
            rows: size.rows,
        }
    }
}

// ============================================================================
// Board
// ============================================================================

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BoardError {
    #[error("board has an odd number of cards ({0})")]
    OddCardCount(usize),
    #[error("{cards} cards but {urls} card identifiers")]
    UrlCountMismatch { cards: usize, urls: usize },
    #[error("position {position} is outside a board of {len} cards")]
    PositionOutOfRange { position: usize, len: usize },
    #[error("second candidate {0} is set without a first candidate")]
    OrphanSecondCandidate(usize),
    #[error("position {0} is both matched and a pending candidate")]
    CandidateAlreadyFlipped(usize),
    #[error("both candidate slots point at position {0}")]
    DuplicateCandidate(usize),
}

/// Everything needed to rebuild a board that was saved mid-game.
#[derive(Debug, Clone)]
pub struct BoardParts {
    pub cards: Vec<Card>,
    pub back: ImageRef,
    pub card_urls: Vec<String>,
    pub flipped: Vec<usize>,
    pub candidate1: Option<usize>,
    pub candidate2: Option<usize>,
}

/// The playing surface: cards in display order plus the reveal bookkeeping.
///
/// Invariants:
/// - `cards.len()` is even and equals `card_urls.len()`
/// - `candidate2` is only set while `candidate1` is set
/// - a matched (flipped) position is never a candidate
/// - `flipped` only grows
#[derive(Debug, Clone)]
pub struct Board {
    cards: Vec<Card>,
    back: ImageRef,
    card_urls: Vec<String>,
    flipped: BTreeSet<usize>,
    candidate1: Option<usize>,
    candidate2: Option<usize>,
}

impl Board {
    /// Fresh board with nothing revealed. `entries` is already in display order.
    #[must_use]
    pub fn fresh(entries: Vec<(Card, String)>, back: ImageRef) -> Self {
        assert!(
            entries.len() % 2 == 0,
            "a fresh board needs whole pairs, got {} cards",
            entries.len()
        );
        let (cards, card_urls) = entries.into_iter().unzip();
        Self {
            cards,
            back,
            card_urls,
            flipped: BTreeSet::new(),
            candidate1: None,
            candidate2: None,
        }
    }

    pub fn from_parts(parts: BoardParts) -> Result<Self, BoardError> {
        let BoardParts {
            cards,
            back,
            card_urls,
            flipped,
            candidate1,
            candidate2,
        } = parts;

        let len = cards.len();
        if len % 2 != 0 {
            return Err(BoardError::OddCardCount(len));
        }
        if card_urls.len() != len {
            return Err(BoardError::UrlCountMismatch {
                cards: len,
                urls: card_urls.len(),
            });
        }

        let in_range = |position: usize| {
            if position < len {
                Ok(position)
            } else {
                Err(BoardError::PositionOutOfRange { position, len })
            }
        };

        let flipped = flipped
            .into_iter()
            .map(in_range)
            .collect::<Result<BTreeSet<_>, _>>()?;

        match (candidate1, candidate2) {
            (None, Some(second)) => return Err(BoardError::OrphanSecondCandidate(second)),
            (Some(first), Some(second)) if first == second => {
                return Err(BoardError::DuplicateCandidate(first));
            }
            _ => {}
        }
        for candidate in [candidate1, candidate2].into_iter().flatten() {
            in_range(candidate)?;
            if flipped.contains(&candidate) {
                return Err(BoardError::CandidateAlreadyFlipped(candidate));
            }
        }

        Ok(Self {
            cards,
            back,
            card_urls,
            flipped,
            candidate1,
            candidate2,
        })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.cards.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    #[must_use]
    pub fn cards(&self) -> &[Card] {
        &self.cards
    }

    #[must_use]
    pub fn card(&self, position: usize) -> &Card {
        &self.cards[position]
    }

    #[must_use]
    pub fn back(&self) -> &ImageRef {
        &self.back
    }

    #[must_use]
    pub fn card_urls(&self) -> &[String] {
        &self.card_urls
    }

    #[must_use]
    pub fn flipped(&self) -> &BTreeSet<usize> {
        &self.flipped
    }

    #[must_use]
    pub fn candidate1(&self) -> Option<usize> {
        self.candidate1
    }

    #[must_use]
    pub fn candidate2(&self) -> Option<usize> {
        self.candidate2
    }

    #[must_use]
    pub fn is_match(&self, first: usize, second: usize) -> bool {
        // Distinct positions always carry distinct ids; the id check only
        // guards against a card being compared with itself.
        self.cards[first].pairs_with(&self.cards[second])
    }

    /// Whether the card at `position` currently shows its front.
    #[must_use]
    pub fn is_revealed(&self, position: usize) -> bool {
        self.flipped.contains(&position)
            || self.candidate1 == Some(position)
            || self.candidate2 == Some(position)
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.flipped.len() == self.cards.len()
    }

    pub fn select_first(&mut self, position: usize) {
        debug_assert!(self.candidate1.is_none() && self.candidate2.is_none());
        debug_assert!(!self.flipped.contains(&position));
        self.candidate1 = Some(position);
    }

    pub fn select_second(&mut self, position: usize) {
        debug_assert!(self.candidate1.is_some() && self.candidate2.is_none());
        debug_assert!(!self.flipped.contains(&position));
        self.candidate2 = Some(position);
    }

    /// Moves both candidates into the matched set.
    pub fn mark_matched(&mut self) -> Option<(usize, usize)> {
        let pair = self.clear_candidates()?;
        self.flipped.insert(pair.0);
        self.flipped.insert(pair.1);
        Some(pair)
    }

    /// Empties both candidate slots, returning them if both were set.
    pub fn clear_candidates(&mut self) -> Option<(usize, usize)> {
        let first = self.candidate1.take();
        let second = self.candidate2.take();
        first.zip(second)
    }
}

/// A live session: the board plus the move counter.
#[derive(Debug, Clone)]
pub struct GameState {
    pub board: Board,
    pub moves: u32,
}

impl GameState {
    #[must_use]
    pub fn new(board: Board) -> Self {
        Self { board, moves: 0 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Bitmap, ImageSize};

    fn image(tag: u8) -> ImageRef {
        ImageRef::bitmap(Bitmap::new(ImageSize::new(1, 1), vec![tag]))
    }

    fn parts(len: usize) -> BoardParts {
        let images: Vec<ImageRef> = (0..len / 2).map(|i| image(i as u8)).collect();
        BoardParts {
            cards: (0..len).map(|id| Card::new(id, images[id / 2].clone())).collect(),
            back: ImageRef::Resource(0),
            card_urls: (0..len).map(|id| format!("url-{}", id / 2)).collect(),
            flipped: Vec::new(),
            candidate1: None,
            candidate2: None,
        }
    }

    #[test]
    fn board_size_rejects_odd_and_empty_grids() {
        assert_eq!(
            BoardSize::new(3, 3),
            Err(BoardSizeError::OddCells {
                columns: 3,
                rows: 3
            })
        );
        assert!(matches!(
            BoardSize::new(0, 4),
            Err(BoardSizeError::Empty { .. })
        ));
        let size = BoardSize::new(5, 4).unwrap();
        assert_eq!(size.total(), 20);
        assert_eq!(size.pairs(), 10);
    }

    #[test]
    fn board_size_deserializes_through_validation() {
        let size: BoardSize = serde_json::from_str(r#"{"columns":4,"rows":4}"#).unwrap();
        assert_eq!(size.total(), 16);
        assert!(serde_json::from_str::<BoardSize>(r#"{"columns":3,"rows":1}"#).is_err());
    }

    #[test]
    fn pairs_share_half_id() {
        let board = Board::from_parts(parts(4)).unwrap();
        assert!(board.is_match(0, 1));
        assert!(board.is_match(3, 2));
        assert!(!board.is_match(1, 2));
        assert!(!board.is_match(2, 2));
    }

    #[test]
    fn from_parts_checks_lengths() {
        let mut odd = parts(4);
        odd.cards.pop();
        odd.card_urls.pop();
        assert_eq!(Board::from_parts(odd).unwrap_err(), BoardError::OddCardCount(3));

        let mut short_urls = parts(4);
        short_urls.card_urls.pop();
        assert_eq!(
            Board::from_parts(short_urls).unwrap_err(),
            BoardError::UrlCountMismatch { cards: 4, urls: 3 }
        );
    }

    #[test]
    fn from_parts_checks_candidates() {
        let mut orphan = parts(4);
        orphan.candidate2 = Some(1);
        assert_eq!(
            Board::from_parts(orphan).unwrap_err(),
            BoardError::OrphanSecondCandidate(1)
        );

        let mut overlap = parts(4);
        overlap.flipped = vec![0, 1];
        overlap.candidate1 = Some(1);
        assert_eq!(
            Board::from_parts(overlap).unwrap_err(),
            BoardError::CandidateAlreadyFlipped(1)
        );

        let mut out_of_range = parts(4);
        out_of_range.flipped = vec![9];
        assert_eq!(
            Board::from_parts(out_of_range).unwrap_err(),
            BoardError::PositionOutOfRange {
                position: 9,
                len: 4
            }
        );
    }

    #[test]
    fn matched_candidates_move_to_flipped() {
        let mut board = Board::from_parts(parts(4)).unwrap();
        board.select_first(0);
        board.select_second(1);
        assert!(board.is_revealed(0));
        assert!(board.is_revealed(1));

        assert_eq!(board.mark_matched(), Some((0, 1)));
        assert_eq!(board.candidate1(), None);
        assert_eq!(board.candidate2(), None);
        assert!(board.flipped().contains(&0));
        assert!(board.flipped().contains(&1));
        assert!(!board.is_complete());
    }

    #[test]
    fn clearing_candidates_hides_them() {
        let mut board = Board::from_parts(parts(4)).unwrap();
        board.select_first(0);
        board.select_second(2);
        assert_eq!(board.clear_candidates(), Some((0, 2)));
        assert!(!board.is_revealed(0));
        assert!(board.flipped().is_empty());
    }

    #[test]
    #[should_panic(expected = "whole pairs")]
    fn fresh_board_rejects_odd_entries() {
        let _ = Board::fresh(
            vec![(Card::new(0, ImageRef::Resource(1)), "a".to_string())],
            ImageRef::Resource(0),
        );
    }
}
