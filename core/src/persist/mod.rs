//! Keyed blob persistence
//!
//! Each key is stored as one file, `<key>.sav`, in the save directory.
//! Writes go to `<key>.tmp`, are synced, and then renamed over the target,
//! so a crash mid-save leaves either the old blob or the new one.
//!
//! All operations are async. File I/O runs on tokio's blocking pool, and
//! operations on the same key are serialized by a per-key lock; different
//! keys proceed concurrently.

mod format;

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use hashbrown::HashMap;
use tokio::sync::Mutex;

pub use format::{BLOB_MAGIC, BLOB_VERSION, FormatError, MAX_BLOB_SIZE};

/// Longest accepted key
pub const MAX_KEY_LEN: usize = 128;

const SAVE_EXT: &str = "sav";
const TMP_EXT: &str = "tmp";

#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error("invalid save key '{0}'")]
    InvalidKey(String),

    #[error("blob is {size} bytes, maximum is {limit}")]
    TooLarge { size: usize, limit: usize },

    #[error("save '{key}' is corrupt: {source}")]
    Corrupt {
        key: String,
        #[source]
        source: FormatError,
    },

    #[error("I/O error on save '{key}': {source}")]
    Io {
        key: String,
        #[source]
        source: io::Error,
    },

    #[error("persistence task failed: {0}")]
    Task(String),
}

/// Check a key against `[A-Za-z0-9._-]{1,128}` with no leading dot
pub fn validate_key(key: &str) -> Result<(), PersistError> {
    let valid = !key.is_empty()
        && key.len() <= MAX_KEY_LEN
        && !key.starts_with('.')
        && key
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'-'));

    if valid {
        Ok(())
    } else {
        Err(PersistError::InvalidKey(key.to_string()))
    }
}

struct Inner {
    dir: PathBuf,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

/// Async key/blob store backed by a directory. Cheap to clone.
#[derive(Clone)]
pub struct SaveStore {
    inner: Arc<Inner>,
}

impl SaveStore {
    /// Store rooted at `dir`. The directory is created on first save.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            inner: Arc::new(Inner {
                dir: dir.into(),
                locks: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.inner.dir
    }

    /// Create or overwrite the blob under `key`
    pub async fn save(&self, key: &str, blob: Vec<u8>) -> Result<(), PersistError> {
        validate_key(key)?;
        if blob.len() > MAX_BLOB_SIZE {
            return Err(PersistError::TooLarge {
                size: blob.len(),
                limit: MAX_BLOB_SIZE,
            });
        }

        let lock = self.key_lock(key).await;
        let _guard = lock.lock().await;

        let dir = self.inner.dir.clone();
        let owned_key = key.to_string();
        let len = blob.len();
        self.blocking(key, move || write_atomic(&dir, &owned_key, &format::encode(&blob)))
            .await?;

        tracing::debug!("Saved '{}' ({} bytes)", key, len);
        Ok(())
    }

    /// Read the blob under `key`; `None` if it was never saved or was deleted
    pub async fn load(&self, key: &str) -> Result<Option<Vec<u8>>, PersistError> {
        validate_key(key)?;

        let lock = self.key_lock(key).await;
        let _guard = lock.lock().await;

        let path = self.path_for(key, SAVE_EXT);
        let Some(bytes) = self.blocking(key, move || read_if_exists(&path)).await? else {
            return Ok(None);
        };

        let payload = format::decode(&bytes).map_err(|source| PersistError::Corrupt {
            key: key.to_string(),
            source,
        })?;
        Ok(Some(payload.to_vec()))
    }

    /// Remove the blob under `key`. Deleting an absent key succeeds.
    pub async fn delete(&self, key: &str) -> Result<(), PersistError> {
        validate_key(key)?;

        let lock = self.key_lock(key).await;
        let _guard = lock.lock().await;

        let path = self.path_for(key, SAVE_EXT);
        self.blocking(key, move || match fs::remove_file(&path) {
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            other => other,
        })
        .await?;

        tracing::debug!("Deleted '{}'", key);
        Ok(())
    }

    /// Keys currently stored, sorted
    pub async fn list(&self) -> Result<Vec<String>, PersistError> {
        let dir = self.inner.dir.clone();
        self.blocking("*", move || list_keys(&dir)).await
    }

    fn path_for(&self, key: &str, ext: &str) -> PathBuf {
        self.inner.dir.join(format!("{}.{}", key, ext))
    }

    async fn key_lock(&self, key: &str) -> Arc<Mutex<()>> {
        let mut locks = self.inner.locks.lock().await;
        locks.entry_ref(key).or_default().clone()
    }

    /// Run blocking file I/O off the async workers
    async fn blocking<T, F>(&self, key: &str, op: F) -> Result<T, PersistError>
    where
        T: Send + 'static,
        F: FnOnce() -> io::Result<T> + Send + 'static,
    {
        tokio::task::spawn_blocking(op)
            .await
            .map_err(|e| PersistError::Task(e.to_string()))?
            .map_err(|source| PersistError::Io {
                key: key.to_string(),
                source,
            })
    }
}

fn write_atomic(dir: &Path, key: &str, bytes: &[u8]) -> io::Result<()> {
    fs::create_dir_all(dir)?;

    let path = dir.join(format!("{}.{}", key, SAVE_EXT));
    let tmp_path = dir.join(format!("{}.{}", key, TMP_EXT));

    {
        let mut f = fs::File::create(&tmp_path)?;
        f.write_all(bytes)?;
        f.sync_all()?;
    }

    #[cfg(windows)]
    {
        if path.exists() {
            // Windows rename fails if destination exists.
            fs::remove_file(&path)?;
        }
    }

    fs::rename(&tmp_path, &path)
}

fn read_if_exists(path: &Path) -> io::Result<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

fn list_keys(dir: &Path) -> io::Result<Vec<String>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut keys = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if path.extension().is_some_and(|ext| ext == SAVE_EXT)
            && let Some(key) = path.file_stem().and_then(|s| s.to_str())
            && validate_key(key).is_ok()
        {
            keys.push(key.to_string());
        }
    }
    keys.sort();
    Ok(keys)
}
