//! Saving and restoring a [`GameState`] through [`Storage`].
//!
//! Only identifiers are stored, never image bytes. Restoring re-acquires the
//! saved identifiers as one batch and puts every card back at its saved
//! position with its saved id.

use std::collections::{BTreeSet, HashMap, HashSet};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use memo_types::{Board, BoardParts, Card, GameState, ImageRef, ImageSize, LoadedImage};

use crate::error::RestoreError;
use crate::pipeline::ImagePipeline;
use crate::storage::Storage;

pub const CARDS_KEY: &str = "cards";
pub const URLS_KEY: &str = "card_urls";
pub const FLIPPED_KEY: &str = "flipped";
pub const CANDIDATE1_KEY: &str = "candidate1";
pub const CANDIDATE2_KEY: &str = "candidate2";
pub const MOVES_KEY: &str = "moves";

/// Stored in a candidate slot that holds no card.
const NO_CANDIDATE: i64 = -1;

/// A saved session as read back from storage, before its images are loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedGame {
    pub unique_ids: Vec<usize>,
    pub card_urls: Vec<String>,
    pub flipped: Vec<usize>,
    pub candidate1: Option<usize>,
    pub candidate2: Option<usize>,
    pub moves: u32,
}

impl SavedGame {
    /// Identifiers to fetch, first occurrence order, each once.
    #[must_use]
    pub fn unique_identifiers(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.card_urls
            .iter()
            .filter(|url| seen.insert(url.as_str()))
            .cloned()
            .collect()
    }

    /// Fails unless the saved board has exactly `cards` cards.
    pub fn fits(&self, cards: usize) -> Result<(), RestoreError> {
        let saved = self.unique_ids.len();
        if saved == cards {
            Ok(())
        } else {
            Err(corrupt(format!(
                "saved board has {saved} cards but the grid has {cards} spots"
            )))
        }
    }

    /// Rebuilds the saved board in its saved order from freshly loaded images.
    pub fn rebuild(
        self,
        images: Vec<LoadedImage>,
        back: ImageRef,
    ) -> Result<GameState, RestoreError> {
        let len = self.unique_ids.len();
        if self.card_urls.len() != len {
            return Err(corrupt(format!(
                "{len} card ids but {} card identifiers",
                self.card_urls.len()
            )));
        }
        check_pairs(&self.unique_ids, &self.card_urls)?;

        let by_identifier: HashMap<String, ImageRef> = images
            .into_iter()
            .map(|loaded| (loaded.identifier, loaded.image))
            .collect();

        let cards = self
            .unique_ids
            .iter()
            .zip(&self.card_urls)
            .map(|(&unique_id, url)| {
                by_identifier
                    .get(url)
                    .map(|image| Card::new(unique_id, image.clone()))
                    .ok_or_else(|| corrupt(format!("no loaded image for {url}")))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let board = Board::from_parts(BoardParts {
            cards,
            back,
            card_urls: self.card_urls,
            flipped: self.flipped,
            candidate1: self.candidate1,
            candidate2: self.candidate2,
        })
        .map_err(|e| corrupt(e.to_string()))?;

        Ok(GameState {
            board,
            moves: self.moves,
        })
    }
}

/// Ids must be a permutation of `0..len`, and both cards of a pair must name
/// the same identifier.
fn check_pairs(unique_ids: &[usize], card_urls: &[String]) -> Result<(), RestoreError> {
    let len = unique_ids.len();
    let mut url_by_id: Vec<Option<&str>> = vec![None; len];
    for (&unique_id, url) in unique_ids.iter().zip(card_urls) {
        let slot = url_by_id
            .get_mut(unique_id)
            .ok_or_else(|| corrupt(format!("card id {unique_id} out of range for {len} cards")))?;
        if slot.replace(url.as_str()).is_some() {
            return Err(corrupt(format!("card id {unique_id} appears twice")));
        }
    }
    for pair in url_by_id.chunks(2) {
        if let [first, second] = pair
            && first != second
        {
            return Err(corrupt(format!(
                "pair split across identifiers {first:?} and {second:?}"
            )));
        }
    }
    Ok(())
}

fn corrupt(message: String) -> RestoreError {
    RestoreError::StateCorruption(message)
}

fn position(key: &str, value: i64) -> Result<usize, RestoreError> {
    usize::try_from(value).map_err(|_| corrupt(format!("{key} holds invalid position {value}")))
}

fn candidate(storage: &dyn Storage, key: &str) -> Result<Option<usize>, RestoreError> {
    match storage.get_int(key)? {
        NO_CANDIDATE => Ok(None),
        value => position(key, value).map(Some),
    }
}

fn stored(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

#[derive(Debug, Clone)]
pub struct StateSerializer {
    pipeline: ImagePipeline,
    back: ImageRef,
}

impl StateSerializer {
    #[must_use]
    pub fn new(pipeline: ImagePipeline, back: ImageRef) -> Self {
        Self { pipeline, back }
    }

    pub fn serialize(&self, state: &GameState, storage: &mut dyn Storage) {
        let board = &state.board;
        let ids: Vec<i64> = board
            .cards()
            .iter()
            .map(|card| stored(card.unique_id))
            .collect();
        let flipped: Vec<i64> = board.flipped().iter().copied().map(stored).collect();

        storage.put_int_list(CARDS_KEY, &ids);
        storage.put_string_list(URLS_KEY, board.card_urls());
        storage.put_int_list(FLIPPED_KEY, &flipped);
        storage.put_int(CANDIDATE1_KEY, board.candidate1().map_or(NO_CANDIDATE, stored));
        storage.put_int(CANDIDATE2_KEY, board.candidate2().map_or(NO_CANDIDATE, stored));
        storage.put_int(MOVES_KEY, i64::from(state.moves));

        debug!(
            cards = ids.len(),
            flipped = flipped.len(),
            moves = state.moves,
            "Serialized game state"
        );
    }

    /// `None` when storage holds no saved game.
    pub fn read_saved(&self, storage: &dyn Storage) -> Result<Option<SavedGame>, RestoreError> {
        if !storage.contains_key(CARDS_KEY) {
            return Ok(None);
        }

        let unique_ids = storage
            .get_int_list(CARDS_KEY)?
            .into_iter()
            .map(|id| position(CARDS_KEY, id))
            .collect::<Result<Vec<_>, _>>()?;
        let card_urls = storage.get_string_list(URLS_KEY)?;
        let flipped = storage
            .get_int_list(FLIPPED_KEY)?
            .into_iter()
            .map(|pos| position(FLIPPED_KEY, pos))
            .collect::<Result<BTreeSet<_>, _>>()?
            .into_iter()
            .collect();
        let candidate1 = candidate(storage, CANDIDATE1_KEY)?;
        let candidate2 = candidate(storage, CANDIDATE2_KEY)?;
        let moves = storage.get_int(MOVES_KEY)?;
        let moves = u32::try_from(moves)
            .map_err(|_| corrupt(format!("{MOVES_KEY} holds invalid count {moves}")))?;

        Ok(Some(SavedGame {
            unique_ids,
            card_urls,
            flipped,
            candidate1,
            candidate2,
            moves,
        }))
    }

    /// Loads the saved images and rebuilds the game.
    pub async fn restore(
        &self,
        saved: SavedGame,
        size: ImageSize,
        cancel: &CancellationToken,
    ) -> Result<GameState, RestoreError> {
        let identifiers = saved.unique_identifiers();
        let images = self.pipeline.acquire(identifiers, size, cancel).await?;
        let state = saved.rebuild(images, self.back.clone())?;
        info!(
            cards = state.board.len(),
            moves = state.moves,
            "Restored saved game"
        );
        Ok(state)
    }

    pub async fn deserialize(
        &self,
        storage: &dyn Storage,
        size: ImageSize,
        cancel: &CancellationToken,
    ) -> Result<Option<GameState>, RestoreError> {
        let Some(saved) = self.read_saved(storage)? else {
            return Ok(None);
        };
        self.restore(saved, size, cancel).await.map(Some)
    }
}
