//! Pictures from a local folder.
//!
//! Identifiers are absolute file paths. `search` picks a random subset of the
//! image files directly inside the folder (no recursion).

use std::path::{Path, PathBuf};

use rand::seq::SliceRandom;

use memo_types::{Bitmap, ImageRef, ImageSize};

use crate::{ImageProvider, ProviderError, ProviderFut};

const IMAGE_EXTENSIONS: &[&str] = &["bmp", "gif", "jpeg", "jpg", "png", "webp"];

#[derive(Debug, Clone)]
pub struct DirectoryProvider {
    root: PathBuf,
}

impl DirectoryProvider {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    async fn image_files(&self) -> Result<Vec<PathBuf>, ProviderError> {
        let io_error = |source| ProviderError::Io {
            path: self.root.clone(),
            source,
        };

        let mut entries = tokio::fs::read_dir(&self.root).await.map_err(io_error)?;
        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(io_error)? {
            let path = entry.path();
            if is_image_file(&path) && entry.file_type().await.is_ok_and(|t| t.is_file()) {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }
}

fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            IMAGE_EXTENSIONS
                .iter()
                .any(|known| known.eq_ignore_ascii_case(ext))
        })
}

impl ImageProvider for DirectoryProvider {
    fn search(&self, count: usize) -> ProviderFut<'_, Vec<String>> {
        Box::pin(async move {
            let mut files = self.image_files().await?;
            if files.len() < count {
                return Err(ProviderError::NotEnoughImages {
                    wanted: count,
                    found: files.len(),
                });
            }

            files.shuffle(&mut rand::rng());
            files.truncate(count);
            tracing::debug!(root = %self.root.display(), count, "Picked local images");
            Ok(files
                .into_iter()
                .map(|path| path.to_string_lossy().into_owned())
                .collect())
        })
    }

    fn load<'a>(&'a self, identifier: &'a str, size: ImageSize) -> ProviderFut<'a, ImageRef> {
        Box::pin(async move {
            let bytes = tokio::fs::read(identifier)
                .await
                .map_err(|source| ProviderError::Io {
                    path: PathBuf::from(identifier),
                    source,
                })?;
            Ok(ImageRef::bitmap(Bitmap::new(size, bytes)))
        })
    }
}
