//! On-disk blob format
//!
//! ```text
//! offset  size  field
//! 0       4     magic "RBSV"
//! 4       4     version (u32 LE)
//! 8       8     payload length (u64 LE)
//! 16      8     xxh3-64 of payload (u64 LE)
//! 24      len   payload
//! ```

use xxhash_rust::xxh3::xxh3_64;

pub const BLOB_MAGIC: [u8; 4] = *b"RBSV";
pub const BLOB_VERSION: u32 = 1;
pub const HEADER_LEN: usize = 24;

/// Largest payload accepted by save and load (64 MiB)
pub const MAX_BLOB_SIZE: usize = 64 * 1024 * 1024;

/// Why a stored blob could not be decoded
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FormatError {
    #[error("file is shorter than the header")]
    Truncated,

    #[error("bad magic")]
    BadMagic,

    #[error("unsupported version {0}")]
    UnsupportedVersion(u32),

    #[error("header says {declared} bytes, file holds {actual}")]
    LengthMismatch { declared: u64, actual: u64 },

    #[error("declared length {0} exceeds the blob size limit")]
    TooLarge(u64),

    #[error("checksum mismatch")]
    ChecksumMismatch,
}

/// Frame a payload for storage. Caller checks the size limit.
pub fn encode(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
    out.extend_from_slice(&BLOB_MAGIC);
    out.extend_from_slice(&BLOB_VERSION.to_le_bytes());
    out.extend_from_slice(&(payload.len() as u64).to_le_bytes());
    out.extend_from_slice(&xxh3_64(payload).to_le_bytes());
    out.extend_from_slice(payload);
    out
}

/// Validate a stored file and return its payload
pub fn decode(bytes: &[u8]) -> Result<&[u8], FormatError> {
    let (header, payload) = bytes
        .split_first_chunk::<HEADER_LEN>()
        .ok_or(FormatError::Truncated)?;

    let (magic, rest) = header.split_at(4);
    if magic != BLOB_MAGIC {
        return Err(FormatError::BadMagic);
    }

    let field = |range: std::ops::Range<usize>| {
        let mut buf = [0u8; 8];
        buf[..range.len()].copy_from_slice(&rest[range]);
        u64::from_le_bytes(buf)
    };
    let version = field(0..4) as u32;
    let declared = field(4..12);
    let checksum = field(12..20);

    if version != BLOB_VERSION {
        return Err(FormatError::UnsupportedVersion(version));
    }
    if declared > MAX_BLOB_SIZE as u64 {
        return Err(FormatError::TooLarge(declared));
    }
    if declared != payload.len() as u64 {
        return Err(FormatError::LengthMismatch {
            declared,
            actual: payload.len() as u64,
        });
    }
    if xxh3_64(payload) != checksum {
        return Err(FormatError::ChecksumMismatch);
    }
    Ok(payload)
}
