//! Memo CLI - terminal front-end for the memory game.
//!
//! ```text
//! main() -> init_tracing() -> MemoConfig::load() -> select_provider()
//!        -> GameSession::restore_game(saved session) -> run() -> save on quit
//! ```
//!
//! # Event Loop
//!
//! A fixed 16ms cadence drives the session:
//!
//! 1. Wait for a frame tick or a line of input
//! 2. Apply input (`<position>`, `r` restart, `s` save, `q` quit)
//! 3. Advance the session (`session.tick()`) so loads and the delayed unflip land
//!
//! Logs go to `~/.memo/logs/memo.log`, never to the terminal.

mod view;

use anyhow::{Context, Result, bail};
use std::{
    fs::{self, OpenOptions},
    io::{Write, stdout},
    path::PathBuf,
    sync::{Arc, Mutex},
    time::Duration,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use memo_config::{MemoConfig, memo_dir};
use memo_engine::{FileStorage, GameSession, ImageProvider, ImageRef, SessionParts, SessionPhase};
use memo_providers::{DirectoryProvider, FlickrProvider};

use crate::view::TextView;

const FRAME_DURATION: Duration = Duration::from_millis(16);
const CARD_BACK: ImageRef = ImageRef::Resource(0);

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let (log_file, init_warnings) = open_memo_log_file();

    if let Some((log_path, file)) = log_file {
        tracing_subscriber::registry()
            .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
            .with(env_filter)
            .init();

        tracing::info!(path = %log_path.display(), "Logging initialized");
        for warning in init_warnings {
            tracing::warn!("{warning}");
        }
        return;
    }

    // Without a log file, drop logs rather than interleave them with the board.
    tracing_subscriber::registry().with(env_filter).init();
}

fn open_memo_log_file() -> (Option<(PathBuf, std::fs::File)>, Vec<String>) {
    let mut warnings = Vec::new();

    for candidate in memo_log_file_candidates() {
        if let Some(parent) = candidate.parent()
            && let Err(e) = fs::create_dir_all(parent)
        {
            warnings.push(format!(
                "Failed to create log dir {}: {e}",
                parent.display()
            ));
            continue;
        }

        match OpenOptions::new()
            .create(true)
            .append(true)
            .open(&candidate)
        {
            Ok(file) => return (Some((candidate, file)), warnings),
            Err(e) => {
                warnings.push(format!(
                    "Failed to open log file {}: {e}",
                    candidate.display()
                ));
            }
        }
    }

    (None, warnings)
}

fn memo_log_file_candidates() -> Vec<PathBuf> {
    let mut candidates = Vec::new();

    // Primary: ~/.memo/logs/memo.log
    if let Some(dir) = memo_dir() {
        candidates.push(dir.join("logs").join("memo.log"));
    }

    // Fallback: ./.memo/logs/memo.log
    candidates.push(PathBuf::from(".memo").join("logs").join("memo.log"));

    candidates
}

/// A local picture folder wins over Flickr so the game works offline.
fn select_provider(config: &MemoConfig) -> Result<Arc<dyn ImageProvider>> {
    if let Some(directory) = config.local_directory() {
        tracing::info!(directory = %directory.display(), "Using local pictures");
        return Ok(Arc::new(DirectoryProvider::new(directory)));
    }

    if let Some(api_key) = config.flickr_api_key() {
        let mut provider = FlickrProvider::new(api_key);
        if let Some(flickr) = &config.flickr {
            if let Some(tags) = &flickr.tags {
                provider = provider.with_tags(tags.clone());
            }
            if let Some(base_url) = &flickr.base_url {
                provider = provider.with_base_url(base_url.clone());
            }
        }
        tracing::info!(?provider, "Using Flickr");
        return Ok(Arc::new(provider));
    }

    bail!(
        "no image source configured: set [local].directory or [flickr].api_key in {}, \
         or export {}",
        MemoConfig::path().map_or_else(
            || "~/.memo/config.toml".to_string(),
            |p| p.display().to_string()
        ),
        memo_config::FLICKR_API_KEY_ENV
    )
}

enum Command {
    Click(usize),
    Restart,
    Save,
    Quit,
    Help,
}

fn parse_command(line: &str) -> Option<Command> {
    match line.trim() {
        "q" | "quit" | "exit" => Some(Command::Quit),
        "r" | "restart" => Some(Command::Restart),
        "s" | "save" => Some(Command::Save),
        "h" | "help" | "?" => Some(Command::Help),
        other => other.parse().ok().map(Command::Click),
    }
}

const HELP: &str = "Enter a card number to flip it, 'r' to restart, 's' to save, 'q' to quit.\n";

type Session = GameSession<TextView<std::io::Stdout>>;

async fn run(
    session: &mut Session,
    storage: &mut FileStorage,
    view_size: (u32, u32),
) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut frames = tokio::time::interval(FRAME_DURATION);
    frames.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = frames.tick() => {}
            line = lines.next_line() => {
                let Some(line) = line.context("failed to read input")? else {
                    return Ok(());
                };
                match parse_command(&line) {
                    Some(Command::Quit) => return Ok(()),
                    Some(Command::Restart) => session.restart_game(view_size.0, view_size.1),
                    Some(Command::Save) => save(session, storage),
                    Some(Command::Click(position)) => click(session, position),
                    Some(Command::Help) | None => print!("{HELP}"),
                }
                stdout().flush().ok();
            }
        }
        session.tick();
    }
}

fn click(session: &mut Session, position: usize) {
    if session.phase() != SessionPhase::Ready {
        println!("No board yet.");
        return;
    }
    let cards = session.view().card_count();
    if position >= cards {
        println!("Pick a card between 0 and {}.", cards.saturating_sub(1));
        return;
    }
    session.on_card_clicked(position);
}

fn save(session: &Session, storage: &mut FileStorage) {
    session.save_state(storage);
    match storage.flush() {
        Ok(()) => println!("Saved to {}.", storage.path().display()),
        Err(e) => {
            tracing::error!("Failed to save session: {e}");
            println!("Failed to save: {e}");
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = match MemoConfig::load() {
        Ok(config) => config.unwrap_or_default(),
        Err(e) => {
            eprintln!("Ignoring config: {e}");
            MemoConfig::default()
        }
    };
    let grid = config.board_size().context("invalid [board] size")?;
    let view_size = config.view_size();
    let provider = select_provider(&config)?;

    let save_path = config
        .save_path()
        .context("cannot determine where to save the session")?;
    let mut storage = match FileStorage::open(&save_path) {
        Ok(storage) => storage,
        Err(e) => {
            tracing::warn!("Discarding unreadable save: {e}");
            eprintln!("Could not read saved game ({e}); starting fresh.");
            FileStorage::create(&save_path)
        }
    };

    let mut session = GameSession::new(SessionParts {
        view: TextView::new(stdout(), grid, CARD_BACK),
        provider,
        grid,
        back: CARD_BACK,
    });
    print!("{HELP}");
    session.restore_game(&storage, view_size.0, view_size.1);

    let result = run(&mut session, &mut storage, view_size).await;

    if let Some(state) = session.state() {
        if state.board.is_complete() {
            // A finished board is not worth restoring.
            storage.clear();
        } else {
            session.save_state(&mut storage);
        }
        if let Err(e) = storage.flush() {
            eprintln!("Failed to save session: {e}");
        }
    }
    session.destroy();

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use memo_config::LocalConfig;

    #[test]
    fn parses_commands() {
        assert!(matches!(parse_command(" 12 "), Some(Command::Click(12))));
        assert!(matches!(parse_command("q"), Some(Command::Quit)));
        assert!(matches!(parse_command("restart"), Some(Command::Restart)));
        assert!(matches!(parse_command("s"), Some(Command::Save)));
        assert!(parse_command("flip").is_none());
        assert!(parse_command("-1").is_none());
    }

    #[test]
    fn local_directory_is_enough() {
        let config = MemoConfig {
            local: Some(LocalConfig {
                directory: Some(PathBuf::from("/tmp/pictures")),
            }),
            ..MemoConfig::default()
        };
        assert!(select_provider(&config).is_ok());
    }

    #[test]
    fn missing_image_source_is_an_error() {
        if std::env::var(memo_config::FLICKR_API_KEY_ENV).is_ok() {
            return;
        }
        let err = select_provider(&MemoConfig::default())
            .err()
            .expect("expected select_provider to fail");
        assert!(err.to_string().contains("no image source"));
    }
}
