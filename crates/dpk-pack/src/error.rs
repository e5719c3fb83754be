use thiserror::Error;

use dpk_store::StoreError;
use dpk_types::Key;

#[derive(Debug, Error)]
pub enum PackError {
    #[error("invalid {file} magic: expected {expected}, got {actual}")]
    InvalidMagic {
        file: &'static str,
        expected: String,
        actual: String,
    },

    #[error("unsupported {file} version: {version}")]
    UnsupportedVersion { file: &'static str, version: u32 },

    #[error("pack checksum mismatch")]
    ChecksumMismatch,

    #[error("corrupt pack entry at offset {offset}: {reason}")]
    CorruptEntry { offset: u64, reason: String },

    #[error("CRC32 mismatch for {key}")]
    CrcMismatch { key: Key },

    #[error("entry at offset {offset} holds {found}, not the requested key")]
    KeyMismatch { offset: u64, found: Key },

    #[error("decompression failed: {0}")]
    DecompressionFailed(String),

    #[error("compression failed: {0}")]
    CompressionFailed(String),

    #[error("cannot pack {key}: {reason}")]
    InvalidEntry { key: Key, reason: String },

    #[error("index corrupted: {0}")]
    IndexCorrupted(String),

    #[error("duplicate entry for {0}")]
    DuplicateEntry(Key),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PackError {
    /// Translate into the store taxonomy.
    ///
    /// I/O failures make the whole pack unavailable; everything else means
    /// the bytes on disk cannot be trusted.
    pub fn into_store_error(self, store: &str, key: Option<&Key>) -> StoreError {
        match self {
            Self::Io(err) => StoreError::Unavailable {
                store: store.to_string(),
                reason: err.to_string(),
            },
            other => StoreError::Corrupt {
                key: key.cloned(),
                reason: format!("{store}: {other}"),
            },
        }
    }
}

pub type PackResult<T> = Result<T, PackError>;

#[cfg(test)]
mod tests {
    use super::*;
    use dpk_types::Node;

    #[test]
    fn io_errors_become_unavailable() {
        let err = PackError::Io(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"));
        assert!(matches!(
            err.into_store_error("pack-1", None),
            StoreError::Unavailable { .. }
        ));
    }

    #[test]
    fn format_errors_become_corrupt() {
        let key = Key::new("f", Node::for_content(b"x"));
        let err = PackError::CrcMismatch { key: key.clone() };
        match err.into_store_error("pack-1", Some(&key)) {
            StoreError::Corrupt { key: Some(k), reason } => {
                assert_eq!(k, key);
                assert!(reason.starts_with("pack-1: CRC32 mismatch"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
