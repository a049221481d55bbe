//! Crash-safe file replacement for saved sessions.
//!
//! Writes go to a temp file in the destination directory and are renamed into
//! place. Where rename-over-existing fails (Windows), the old file is parked as
//! `<name>.bak` for the duration of the swap and restored on failure.

use std::fs;
use std::io::{self, Write};
use std::path::Path;

use tempfile::NamedTempFile;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncPolicy {
    /// fsync the temp file before it is renamed into place.
    #[default]
    Durable,
    /// Skip fsync; for tests and scratch files.
    Fast,
}

/// Restore `<path>.bak` left behind by an interrupted swap.
///
/// Returns true when a backup was moved back into place.
pub fn recover_bak_file(path: &Path) -> bool {
    let backup = path.with_extension("bak");
    if path.exists() || !backup.exists() {
        return false;
    }
    match fs::rename(&backup, path) {
        Ok(()) => {
            tracing::warn!(
                path = %path.display(),
                "Recovered .bak file from interrupted atomic write"
            );
            true
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), "Failed to recover .bak file: {e}");
            false
        }
    }
}

pub fn atomic_write(path: impl AsRef<Path>, bytes: &[u8]) -> io::Result<()> {
    atomic_write_with(path, bytes, SyncPolicy::default())
}

pub fn atomic_write_with(path: impl AsRef<Path>, bytes: &[u8], sync: SyncPolicy) -> io::Result<()> {
    let path = path.as_ref();
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)?;

    let mut tmp = NamedTempFile::new_in(parent)?;
    tmp.write_all(bytes)?;
    if sync == SyncPolicy::Durable {
        tmp.as_file().sync_all()?;
    }

    let Err(err) = tmp.persist(path) else {
        debug!(path = %path.display(), bytes = bytes.len(), "Atomic write complete");
        return Ok(());
    };
    if !path.exists() {
        return Err(err.error);
    }

    let backup = path.with_extension("bak");
    let _ = fs::remove_file(&backup);
    fs::rename(path, &backup)?;
    if let Err(rename_err) = err.file.persist(path) {
        let _ = fs::rename(&backup, path);
        return Err(rename_err.error);
    }
    if let Err(e) = fs::remove_file(&backup) {
        tracing::warn!(
            path = %backup.display(),
            "Failed to remove .bak after atomic write: {e}"
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::{SyncPolicy, atomic_write_with, recover_bak_file};

    #[test]
    fn overwrites_existing_and_cleans_backup() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("session.json");

        atomic_write_with(&path, b"one", SyncPolicy::Fast).expect("write one");
        atomic_write_with(&path, b"two", SyncPolicy::Fast).expect("write two");

        assert_eq!(fs::read_to_string(&path).expect("read"), "two");
        assert!(!path.with_extension("bak").exists());
    }

    #[test]
    fn creates_missing_parent_directories() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("deeper").join("session.json");

        atomic_write_with(&path, b"{}", SyncPolicy::Durable).expect("write");

        assert_eq!(fs::read(&path).expect("read"), b"{}");
    }

    #[test]
    fn recovers_orphaned_backup() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("session.json");
        fs::write(path.with_extension("bak"), b"saved").expect("write bak");

        assert!(recover_bak_file(&path));
        assert_eq!(fs::read(&path).expect("read"), b"saved");
        assert!(!recover_bak_file(&path));
    }
}
