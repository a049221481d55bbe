//! Plain-text rendering of the board.

use std::io::Write;

use memo_engine::{Board, BoardSize, FlipCompletion, GameView, ImageRef, SessionError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Face {
    Down,
    Up,
}

/// Draws the grid as rows of cells: `[ 7]` for a face-down card (its position)
/// and `< C>` for a face-up one (a letter per image).
///
/// Flips finish immediately, so completions fire from inside [`GameView::flip`].
pub struct TextView<W: Write> {
    out: W,
    grid: BoardSize,
    back: ImageRef,
    labels: Vec<char>,
    faces: Vec<Face>,
    moves: u32,
}

impl<W: Write> TextView<W> {
    pub fn new(out: W, grid: BoardSize, back: ImageRef) -> Self {
        Self {
            out,
            grid,
            back,
            labels: Vec::new(),
            faces: Vec::new(),
            moves: 0,
        }
    }

    /// Cards on the displayed board.
    pub fn card_count(&self) -> usize {
        self.faces.len()
    }

    pub fn render(&mut self) {
        let columns = self.grid.columns() as usize;
        let mut text = String::new();
        for (row, faces) in self.faces.chunks(columns).enumerate() {
            for (column, face) in faces.iter().enumerate() {
                let position = row * columns + column;
                match face {
                    Face::Down => text.push_str(&format!("[{position:>2}]")),
                    Face::Up => text.push_str(&format!("< {}>", self.labels[position])),
                }
            }
            text.push('\n');
        }
        text.push_str(&format!("Moves: {}\n", self.moves));
        if !self.faces.is_empty() && self.faces.iter().all(|face| *face == Face::Up) {
            text.push_str(&format!("All pairs found in {} moves!\n", self.moves));
        }
        self.write(&text);
    }

    fn write(&mut self, text: &str) {
        if let Err(e) = self
            .out
            .write_all(text.as_bytes())
            .and_then(|()| self.out.flush())
        {
            tracing::warn!("Failed to write to terminal: {e}");
        }
    }
}

fn label_for(unique_id: usize) -> char {
    const LABELS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";
    LABELS.get(unique_id / 2).map_or('?', |&b| char::from(b))
}

impl<W: Write> GameView for TextView<W> {
    fn show_loading(&mut self) {
        self.write("Loading images...\n");
    }

    fn display_board(&mut self, board: &Board) {
        self.labels = board
            .cards()
            .iter()
            .map(|card| label_for(card.unique_id))
            .collect();
        self.faces = (0..board.len())
            .map(|position| {
                if board.is_revealed(position) {
                    Face::Up
                } else {
                    Face::Down
                }
            })
            .collect();
        self.render();
    }

    fn display_moves(&mut self, moves: u32) {
        self.moves = moves;
    }

    fn display_error(&mut self, error: &SessionError) {
        self.write(&format!("Error: {error}\nType 'r' to try again.\n"));
    }

    fn flip(&mut self, position: usize, image: &ImageRef, on_complete: Option<FlipCompletion>) {
        if let Some(face) = self.faces.get_mut(position) {
            *face = if image.same_image(&self.back) {
                Face::Down
            } else {
                Face::Up
            };
        }
        if let Some(completion) = on_complete {
            completion.complete();
        }
        self.render();
    }
}
