//! ROM images handed to the core loader

use std::path::{Path, PathBuf};
use std::sync::Arc;

use xxhash_rust::xxh3::xxh3_64;

/// Largest ROM accepted (64 MiB)
pub const MAX_ROM_SIZE: usize = 64 * 1024 * 1024;

/// Longest name part of a ROM id
const MAX_NAME_LEN: usize = 64;

#[derive(Debug, thiserror::Error)]
pub enum RomError {
    #[error("failed to read ROM {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("ROM is empty")]
    Empty,

    #[error("ROM is {size} bytes, maximum is {limit}")]
    TooLarge { size: usize, limit: usize },
}

/// An opaque ROM blob plus a stable identifier.
///
/// The id is derived from the file name and a hash of the contents, so it is
/// safe to use as a save-key prefix and differs between two ROMs that share
/// a name.
#[derive(Debug, Clone)]
pub struct RomImage {
    id: String,
    bytes: Arc<[u8]>,
    path: Option<PathBuf>,
}

impl RomImage {
    /// Read a ROM file from disk
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, RomError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|source| RomError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        let mut rom = Self::from_bytes(&name, bytes)?;
        rom.path = Some(path.to_path_buf());
        Ok(rom)
    }

    /// Wrap an in-memory ROM; `name` seeds the id
    pub fn from_bytes(name: &str, bytes: impl Into<Vec<u8>>) -> Result<Self, RomError> {
        let bytes = bytes.into();
        if bytes.is_empty() {
            return Err(RomError::Empty);
        }
        if bytes.len() > MAX_ROM_SIZE {
            return Err(RomError::TooLarge {
                size: bytes.len(),
                limit: MAX_ROM_SIZE,
            });
        }

        let id = format!("{}-{:08x}", sanitize_name(name), xxh3_64(&bytes) as u32);
        Ok(Self {
            id,
            bytes: bytes.into(),
            path: None,
        })
    }

    /// Stable identifier, `[A-Za-z0-9_-]` only
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// File the ROM was read from, if any
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

fn sanitize_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .take(MAX_NAME_LEN)
        .collect();

    if cleaned.is_empty() {
        "rom".to_string()
    } else {
        cleaned
    }
}
