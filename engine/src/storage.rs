//! Key/value storage for saved sessions.
//!
//! [`Storage`] is what the serializer talks to. [`MemoryStorage`] keeps values
//! in a map for the life of the process; [`FileStorage`] is the same map backed
//! by a JSON file that is replaced atomically on [`FileStorage::flush`].

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use memo_utils::{atomic_write, recover_bak_file};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("no value stored under {0:?}")]
    Missing(String),
    #[error("value under {key:?} is not {expected}")]
    WrongType { key: String, expected: &'static str },
    #[error("cannot access {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot decode {path:?}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("cannot encode {path:?}: {source}")]
    Encode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

pub trait Storage {
    fn contains_key(&self, key: &str) -> bool;

    fn get_int(&self, key: &str) -> Result<i64, StorageError>;
    fn put_int(&mut self, key: &str, value: i64);

    fn get_bool(&self, key: &str) -> Result<bool, StorageError>;
    fn put_bool(&mut self, key: &str, value: bool);

    fn get_int_list(&self, key: &str) -> Result<Vec<i64>, StorageError>;
    fn put_int_list(&mut self, key: &str, values: &[i64]);

    fn get_string_list(&self, key: &str) -> Result<Vec<String>, StorageError>;
    fn put_string_list(&mut self, key: &str, values: &[String]);

    fn get_int_map(&self, key: &str) -> Result<BTreeMap<i64, i64>, StorageError>;
    fn put_int_map(&mut self, key: &str, values: &BTreeMap<i64, i64>);
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
enum StoredValue {
    Int(i64),
    Bool(bool),
    IntList(Vec<i64>),
    StringList(Vec<String>),
    IntMap(BTreeMap<i64, i64>),
}

/// Transient in-process storage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemoryStorage {
    values: BTreeMap<String, StoredValue>,
}

impl MemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }

    fn get<T>(
        &self,
        key: &str,
        expected: &'static str,
        extract: impl FnOnce(&StoredValue) -> Option<T>,
    ) -> Result<T, StorageError> {
        let value = self
            .values
            .get(key)
            .ok_or_else(|| StorageError::Missing(key.to_string()))?;
        extract(value).ok_or_else(|| StorageError::WrongType {
            key: key.to_string(),
            expected,
        })
    }

    fn put(&mut self, key: &str, value: StoredValue) {
        self.values.insert(key.to_string(), value);
    }
}

impl Storage for MemoryStorage {
    fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    fn get_int(&self, key: &str) -> Result<i64, StorageError> {
        self.get(key, "an integer", |value| match value {
            StoredValue::Int(v) => Some(*v),
            _ => None,
        })
    }

    fn put_int(&mut self, key: &str, value: i64) {
        self.put(key, StoredValue::Int(value));
    }

    fn get_bool(&self, key: &str) -> Result<bool, StorageError> {
        self.get(key, "a boolean", |value| match value {
            StoredValue::Bool(v) => Some(*v),
            _ => None,
        })
    }

    fn put_bool(&mut self, key: &str, value: bool) {
        self.put(key, StoredValue::Bool(value));
    }

    fn get_int_list(&self, key: &str) -> Result<Vec<i64>, StorageError> {
        self.get(key, "an integer list", |value| match value {
            StoredValue::IntList(v) => Some(v.clone()),
            _ => None,
        })
    }

    fn put_int_list(&mut self, key: &str, values: &[i64]) {
        self.put(key, StoredValue::IntList(values.to_vec()));
    }

    fn get_string_list(&self, key: &str) -> Result<Vec<String>, StorageError> {
        self.get(key, "a string list", |value| match value {
            StoredValue::StringList(v) => Some(v.clone()),
            _ => None,
        })
    }

    fn put_string_list(&mut self, key: &str, values: &[String]) {
        self.put(key, StoredValue::StringList(values.to_vec()));
    }

    fn get_int_map(&self, key: &str) -> Result<BTreeMap<i64, i64>, StorageError> {
        self.get(key, "an integer map", |value| match value {
            StoredValue::IntMap(v) => Some(v.clone()),
            _ => None,
        })
    }

    fn put_int_map(&mut self, key: &str, values: &BTreeMap<i64, i64>) {
        self.put(key, StoredValue::IntMap(values.clone()));
    }
}

/// [`MemoryStorage`] persisted as JSON at `path`.
///
/// Writes stay in memory until [`FileStorage::flush`].
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    values: MemoryStorage,
}

impl FileStorage {
    /// Opens `path`, starting empty when the file does not exist.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();
        recover_bak_file(&path);

        let values = match std::fs::read(&path) {
            Ok(bytes) => {
                serde_json::from_slice(&bytes).map_err(|source| StorageError::Decode {
                    path: path.clone(),
                    source,
                })?
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No saved session file");
                MemoryStorage::new()
            }
            Err(source) => return Err(StorageError::Io { path, source }),
        };

        Ok(Self { path, values })
    }

    /// Empty storage that replaces whatever is at `path` on the next flush.
    #[must_use]
    pub fn create(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            values: MemoryStorage::new(),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }

    pub fn flush(&self) -> Result<(), StorageError> {
        let json = serde_json::to_vec_pretty(&self.values).map_err(|source| {
            StorageError::Encode {
                path: self.path.clone(),
                source,
            }
        })?;
        atomic_write(&self.path, &json).map_err(|source| StorageError::Io {
            path: self.path.clone(),
            source,
        })?;
        info!(path = %self.path.display(), keys = self.values.len(), "Saved session");
        Ok(())
    }
}

impl Storage for FileStorage {
    fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    fn get_int(&self, key: &str) -> Result<i64, StorageError> {
        self.values.get_int(key)
    }

    fn put_int(&mut self, key: &str, value: i64) {
        self.values.put_int(key, value);
    }

    fn get_bool(&self, key: &str) -> Result<bool, StorageError> {
        self.values.get_bool(key)
    }

    fn put_bool(&mut self, key: &str, value: bool) {
        self.values.put_bool(key, value);
    }

    fn get_int_list(&self, key: &str) -> Result<Vec<i64>, StorageError> {
        self.values.get_int_list(key)
    }

    fn put_int_list(&mut self, key: &str, values: &[i64]) {
        self.values.put_int_list(key, values);
    }

    fn get_string_list(&self, key: &str) -> Result<Vec<String>, StorageError> {
        self.values.get_string_list(key)
    }

    fn put_string_list(&mut self, key: &str, values: &[String]) {
        self.values.put_string_list(key, values);
    }

    fn get_int_map(&self, key: &str) -> Result<BTreeMap<i64, i64>, StorageError> {
        self.values.get_int_map(key)
    }

    fn put_int_map(&mut self, key: &str, values: &BTreeMap<i64, i64>) {
        self.values.put_int_map(key, values);
    }
}
