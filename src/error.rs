//! Error types for the remap engine and document stores

use std::path::PathBuf;

use thiserror::Error;

use crate::DocId;

pub type Result<T> = std::result::Result<T, SortError>;

#[derive(Error, Debug)]
pub enum SortError {
    #[error("Permutation lookup failed for old id {old_id}: {reason}")]
    Lookup { old_id: DocId, reason: String },

    #[error("Truncated record in {path:?}: declared {declared} bytes, found {available}")]
    TruncatedRecord {
        path: PathBuf,
        declared: u64,
        available: u64,
    },

    #[error("Store I/O error: {0}")]
    StoreIo(#[from] std::io::Error),

    #[error("Source store is empty")]
    EmptySource,

    #[error("Stale group file from a previous run: {0:?}")]
    StaleGroupFile(PathBuf),

    #[error("Destination store already exists: {0:?}")]
    StoreExists(PathBuf),

    #[error("Invalid file format: {0}")]
    InvalidFormat(String),

    #[error("Checksum mismatch for {0:?}")]
    ChecksumMismatch(PathBuf),

    #[error("Invalid permutation: {0}")]
    InvalidPermutation(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SortError {
    /// Stable error code for scripts driving the CLI
    pub fn code(&self) -> &'static str {
        match self {
            SortError::Lookup { .. } => "LOOKUP_FAILED",
            SortError::TruncatedRecord { .. } => "TRUNCATED_RECORD",
            SortError::StoreIo(_) => "STORE_IO",
            SortError::EmptySource => "EMPTY_SOURCE",
            SortError::StaleGroupFile(_) => "STALE_GROUP_FILE",
            SortError::StoreExists(_) => "STORE_EXISTS",
            SortError::ChecksumMismatch(_) => "CHECKSUM_MISMATCH",
            SortError::InvalidPermutation(_) => "INVALID_PERMUTATION",
            SortError::Config(_) => "INVALID_CONFIG",
            _ => "INTERNAL_ERROR",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err = SortError::Lookup { old_id: 7, reason: "eof".into() };
        assert_eq!(err.code(), "LOOKUP_FAILED");
        assert!(err.to_string().contains("old id 7"));

        let err = SortError::TruncatedRecord {
            path: PathBuf::from("/tmp/group_3"),
            declared: 10,
            available: 4,
        };
        assert_eq!(err.code(), "TRUNCATED_RECORD");
        assert!(err.to_string().contains("declared 10 bytes"));

        assert_eq!(SortError::EmptySource.code(), "EMPTY_SOURCE");
        assert_eq!(SortError::InvalidFormat("x".into()).code(), "INTERNAL_ERROR");
    }

    #[test]
    fn test_io_error_converts() {
        fn fails() -> Result<()> {
            Err(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"))?;
            Ok(())
        }
        let err = fails().unwrap_err();
        assert!(matches!(err, SortError::StoreIo(_)));
        assert_eq!(err.code(), "STORE_IO");
    }
}
