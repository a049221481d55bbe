//! Image providers with a unified async interface.
//!
//! # Architecture
//!
//! The engine only sees [`ImageProvider`], a two-call contract:
//!
//! | Call | Description |
//! |------|-------------|
//! | `search(count)` | Pick `count` image identifiers (URLs, file paths) for a new board |
//! | `load(identifier, size)` | Fetch one image for a card face of the given size |
//!
//! Two implementations ship with the crate:
//!
//! - [`flickr`] - Flickr REST search plus plain HTTP downloads
//! - [`directory`] - pictures from a local folder, for offline play
//!
//! # Error Handling
//!
//! Every failure is a [`ProviderError`]. Providers never retry on their own; the
//! caller decides whether a failed batch is worth another attempt.

pub mod directory;
pub mod flickr;

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::OnceLock;
use std::time::Duration;

use thiserror::Error;

pub use memo_types;
use memo_types::{Bitmap, ImageRef, ImageSize};

pub use directory::DirectoryProvider;
pub use flickr::FlickrProvider;

const CONNECT_TIMEOUT_SECS: u64 = 15;
const REQUEST_TIMEOUT_SECS: u64 = 10;

/// Boxed future returned by provider calls.
pub type ProviderFut<'a, T> = Pin<Box<dyn Future<Output = Result<T, ProviderError>> + Send + 'a>>;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("request to {target} failed: {source}")]
    Http {
        target: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{target} returned HTTP {status}")]
    Status { target: String, status: u16 },
    #[error("unexpected response from {target}: {message}")]
    Decode { target: String, message: String },
    #[error("Flickr rejected {method}: {message}")]
    Api { method: String, message: String },
    #[error("photo {photo_id} has no {label} size")]
    MissingSize {
        photo_id: String,
        label: &'static str,
    },
    #[error("cannot read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("not enough images: wanted {wanted}, found {found}")]
    NotEnoughImages { wanted: usize, found: usize },
}

/// Source of card images.
pub trait ImageProvider: Send + Sync {
    /// Returns `count` identifiers suitable for [`ImageProvider::load`].
    fn search(&self, count: usize) -> ProviderFut<'_, Vec<String>>;

    /// Loads the image behind `identifier`, sized for one card.
    fn load<'a>(&'a self, identifier: &'a str, size: ImageSize) -> ProviderFut<'a, ImageRef>;
}

/// Shared HTTP client with the connect/read timeouts used for every provider request.
pub fn http_client() -> &'static reqwest::Client {
    static CLIENT: OnceLock<reqwest::Client> = OnceLock::new();
    CLIENT.get_or_init(|| {
        reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .unwrap_or_else(|e| {
                tracing::error!("Failed to build HTTP client with timeouts: {e}. Using defaults.");
                reqwest::Client::new()
            })
    })
}

/// Downloads `url` and wraps the body as a bitmap of the requested size.
pub(crate) async fn download_image(
    client: &reqwest::Client,
    url: &str,
    size: ImageSize,
) -> Result<ImageRef, ProviderError> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|source| ProviderError::Http {
            target: url.to_string(),
            source,
        })?;

    let status = response.status();
    if !status.is_success() {
        return Err(ProviderError::Status {
            target: url.to_string(),
            status: status.as_u16(),
        });
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|source| ProviderError::Http {
            target: url.to_string(),
            source,
        })?;
    tracing::trace!(url, bytes = bytes.len(), %size, "Downloaded image");

    Ok(ImageRef::bitmap(Bitmap::new(size, bytes.to_vec())))
}
