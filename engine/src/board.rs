//! Pairing and shuffling loaded images into a fresh board.

use rand::Rng;
use rand::seq::SliceRandom;

use memo_types::{Board, Card, ImageRef, LoadedImage};

/// Two cards per image, uniformly shuffled.
#[must_use]
pub fn build_board(images: Vec<LoadedImage>, back: ImageRef) -> Board {
    build_board_with_rng(images, back, &mut rand::rng())
}

/// Image `i` becomes cards `2i` and `2i + 1`; `card_urls` follows the shuffled
/// card order.
pub fn build_board_with_rng<R: Rng + ?Sized>(
    images: Vec<LoadedImage>,
    back: ImageRef,
    rng: &mut R,
) -> Board {
    let mut entries = Vec::with_capacity(images.len() * 2);
    for (index, LoadedImage { identifier, image }) in images.into_iter().enumerate() {
        entries.push((Card::new(2 * index, image.clone()), identifier.clone()));
        entries.push((Card::new(2 * index + 1, image), identifier));
    }
    entries.shuffle(rng);

    Board::fresh(entries, back)
}
