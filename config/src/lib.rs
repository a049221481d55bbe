//! Configuration loading for Memo.
//!
//! Settings live in `~/.memo/config.toml`. Every section and field is optional;
//! the accessors on [`MemoConfig`] fill in defaults.

use serde::Deserialize;
use std::{env, fs, path::Path, path::PathBuf};
use thiserror::Error;

use memo_types::{BoardSize, BoardSizeError};

/// Environment override for `[flickr].api_key`.
pub const FLICKR_API_KEY_ENV: &str = "MEMO_FLICKR_API_KEY";

pub const DEFAULT_VIEW_WIDTH: u32 = 500;
pub const DEFAULT_VIEW_HEIGHT: u32 = 400;

#[derive(Debug, Default, Deserialize)]
pub struct MemoConfig {
    pub board: Option<BoardConfig>,
    pub view: Option<ViewConfig>,
    pub flickr: Option<FlickrConfig>,
    pub local: Option<LocalConfig>,
    pub save: Option<SaveConfig>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config at {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config at {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

impl ConfigError {
    pub fn path(&self) -> &PathBuf {
        match self {
            ConfigError::Read { path, .. } | ConfigError::Parse { path, .. } => path,
        }
    }
}

/// Grid dimensions. Both default to the classic 5x4 layout.
#[derive(Debug, Default, Deserialize)]
pub struct BoardConfig {
    pub columns: Option<u32>,
    pub rows: Option<u32>,
}

/// Size of the area the board is drawn into; each card gets `width / columns`
/// by `height / rows`.
#[derive(Debug, Default, Deserialize)]
pub struct ViewConfig {
    pub width: Option<u32>,
    pub height: Option<u32>,
}

#[derive(Default, Deserialize)]
pub struct FlickrConfig {
    /// Supports `${ENV_VAR}` expansion.
    pub api_key: Option<String>,
    pub tags: Option<String>,
    pub base_url: Option<String>,
}

// Manual Debug impl to prevent leaking API keys in logs.
impl std::fmt::Debug for FlickrConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlickrConfig")
            .field(
                "api_key",
                &if self.api_key.is_some() {
                    "[REDACTED]"
                } else {
                    "None"
                },
            )
            .field("tags", &self.tags)
            .field("base_url", &self.base_url)
            .finish()
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct LocalConfig {
    /// Folder of pictures used instead of Flickr.
    pub directory: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SaveConfig {
    pub path: Option<PathBuf>,
}

/// Replace `${VAR}` references with environment values (missing vars become empty).
pub fn expand_env_vars(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(start) = rest.find("${") {
        let Some(len) = rest[start + 2..].find('}') else {
            break;
        };
        out.push_str(&rest[..start]);
        let var = &rest[start + 2..start + 2 + len];
        if !var.is_empty() {
            out.push_str(&env::var(var).unwrap_or_default());
        }
        rest = &rest[start + 2 + len + 1..];
    }

    out.push_str(rest);
    out
}

impl MemoConfig {
    /// Load `~/.memo/config.toml`. `Ok(None)` when there is no config file.
    pub fn load() -> Result<Option<Self>, ConfigError> {
        let Some(path) = config_path() else {
            return Ok(None);
        };
        if !path.exists() {
            return Ok(None);
        }
        Self::load_from(&path).map(Some)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| {
            tracing::warn!("Failed to read config at {:?}: {}", path, source);
            ConfigError::Read {
                path: path.to_path_buf(),
                source,
            }
        })?;

        toml::from_str(&content).map_err(|source| {
            tracing::warn!("Failed to parse config at {:?}: {}", path, source);
            ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            }
        })
    }

    #[must_use]
    pub fn path() -> Option<PathBuf> {
        config_path()
    }

    pub fn board_size(&self) -> Result<BoardSize, BoardSizeError> {
        let defaults = BoardSize::default();
        let board = self.board.as_ref();
        BoardSize::new(
            board
                .and_then(|b| b.columns)
                .unwrap_or(defaults.columns()),
            board.and_then(|b| b.rows).unwrap_or(defaults.rows()),
        )
    }

    /// View `(width, height)` in pixels.
    #[must_use]
    pub fn view_size(&self) -> (u32, u32) {
        let view = self.view.as_ref();
        (
            view.and_then(|v| v.width).unwrap_or(DEFAULT_VIEW_WIDTH),
            view.and_then(|v| v.height).unwrap_or(DEFAULT_VIEW_HEIGHT),
        )
    }

    /// Flickr API key from the environment, falling back to the config file.
    #[must_use]
    pub fn flickr_api_key(&self) -> Option<String> {
        if let Ok(key) = env::var(FLICKR_API_KEY_ENV)
            && !key.trim().is_empty()
        {
            return Some(key);
        }
        self.flickr
            .as_ref()
            .and_then(|flickr| flickr.api_key.as_deref())
            .map(expand_env_vars)
            .filter(|key| !key.trim().is_empty())
    }

    #[must_use]
    pub fn local_directory(&self) -> Option<&Path> {
        self.local.as_ref()?.directory.as_deref()
    }

    /// Where the session is saved on exit. Defaults to `~/.memo/session.json`.
    #[must_use]
    pub fn save_path(&self) -> Option<PathBuf> {
        self.save
            .as_ref()
            .and_then(|save| save.path.clone())
            .or_else(|| memo_dir().map(|dir| dir.join("session.json")))
    }
}

/// `~/.memo`, the home of config, logs and saves.
#[must_use]
pub fn memo_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".memo"))
}

#[must_use]
pub fn config_path() -> Option<PathBuf> {
    memo_dir().map(|dir| dir.join("config.toml"))
}
