//! On-disk document store format: constants, header and index types.
//!
//! A store is a directory:
//!
//! ```text
//! docs.dat       [Header 32 bytes][frame][frame]...
//!                frame = [id: u32 LE][length: u32 LE][payload]
//! docs.idx       bincode StoreIndex (id -> payload location, checksum)
//! metadata.json  StoreMetadata sidecar
//! ```
//!
//! `docs.dat` is append-only. Replacing a document appends a new frame; the
//! index written at commit points at the newest frame for each id. Bytes past
//! `StoreIndex::data_len` belong to no commit and are ignored on open.

use std::io::Write;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SortError};
use crate::DocId;

// ── Constants ──────────────────────────────────────────────────────

/// Magic bytes at the start of `docs.dat`
pub const MAGIC: [u8; 4] = *b"DSRT";

/// Data and index format version
pub const FORMAT_VERSION: u16 = 1;

/// Header size in bytes
pub const HEADER_SIZE: usize = 32;

/// `[id][length]` prefix of every data frame
pub const FRAME_PREFIX_SIZE: usize = 8;

pub const DATA_FILE: &str = "docs.dat";
pub const INDEX_FILE: &str = "docs.idx";
pub const METADATA_FILE: &str = "metadata.json";

// ── Header ─────────────────────────────────────────────────────────

/// Data file header, exactly 32 bytes on disk.
///
/// ```text
/// Offset  Size  Field
/// 0       4     magic: b"DSRT"
/// 4       2     version: u16 = 1
/// 6       26    reserved: 0x00
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreHeader {
    pub magic: [u8; 4],
    pub version: u16,
}

impl StoreHeader {
    pub fn new() -> Self {
        Self {
            magic: MAGIC,
            version: FORMAT_VERSION,
        }
    }

    /// Parse and validate a header from the first `HEADER_SIZE` bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(SortError::InvalidFormat(
                "File too small for a document store".into(),
            ));
        }
        let mut magic = [0u8; 4];
        magic.copy_from_slice(&bytes[0..4]);
        if magic != MAGIC {
            return Err(SortError::InvalidFormat(format!(
                "Not a document store: expected DSRT, got {:?}",
                magic
            )));
        }
        let version = u16::from_le_bytes([bytes[4], bytes[5]]);
        if version != FORMAT_VERSION {
            return Err(SortError::InvalidFormat(format!(
                "Unsupported store version: {}",
                version
            )));
        }
        Ok(Self { magic, version })
    }

    /// Write header (exactly HEADER_SIZE bytes).
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&self.magic)?;
        writer.write_all(&self.version.to_le_bytes())?;
        writer.write_all(&[0u8; HEADER_SIZE - 6])?;
        Ok(())
    }

    /// Header bytes, for checksumming.
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        out[0..4].copy_from_slice(&self.magic);
        out[4..6].copy_from_slice(&self.version.to_le_bytes());
        out
    }
}

impl Default for StoreHeader {
    fn default() -> Self {
        Self::new()
    }
}

// ── Index ──────────────────────────────────────────────────────────

/// Location of one document's payload in `docs.dat`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub id: DocId,
    /// Offset of the payload (past the frame prefix)
    pub offset: u64,
    pub len: u32,
}

/// Contents of `docs.idx`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreIndex {
    pub version: u16,
    /// Committed length of `docs.dat`
    pub data_len: u64,
    /// blake3 of `docs.dat[..data_len]`
    pub checksum: [u8; 32],
    /// One entry per live id, strictly ascending by id
    pub entries: Vec<IndexEntry>,
}

impl StoreIndex {
    /// Check version, id order and that every payload lies inside `data_len`.
    pub fn validate(&self) -> Result<()> {
        if self.version != FORMAT_VERSION {
            return Err(SortError::InvalidFormat(format!(
                "Unsupported index version: {}",
                self.version
            )));
        }
        let mut prev: Option<DocId> = None;
        for entry in &self.entries {
            if entry.id == 0 {
                return Err(SortError::InvalidFormat("index contains id 0".into()));
            }
            if prev.is_some_and(|p| p >= entry.id) {
                return Err(SortError::InvalidFormat(format!(
                    "index ids not ascending at {}",
                    entry.id
                )));
            }
            let start = entry.offset;
            let end = start + entry.len as u64;
            if start < (HEADER_SIZE + FRAME_PREFIX_SIZE) as u64 || end > self.data_len {
                return Err(SortError::InvalidFormat(format!(
                    "payload of id {} at {}..{} outside data ({} bytes)",
                    entry.id, start, end, self.data_len
                )));
            }
            prev = Some(entry.id);
        }
        Ok(())
    }

    /// Sum of payload lengths.
    pub fn total_payload_bytes(&self) -> u64 {
        self.entries.iter().map(|e| e.len as u64).sum()
    }
}

// ── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn index(entries: Vec<IndexEntry>, data_len: u64) -> StoreIndex {
        StoreIndex {
            version: FORMAT_VERSION,
            data_len,
            checksum: [0; 32],
            entries,
        }
    }

    #[test]
    fn test_header_roundtrip() {
        let mut buf = Vec::new();
        StoreHeader::new().write_to(&mut buf).unwrap();
        assert_eq!(buf.len(), HEADER_SIZE);
        assert_eq!(&buf[0..4], b"DSRT");
        assert_eq!(buf, StoreHeader::new().to_bytes());
        assert_eq!(StoreHeader::from_bytes(&buf).unwrap(), StoreHeader::new());
    }

    #[test]
    fn test_header_rejects_bad_magic_and_version() {
        let mut buf = StoreHeader::new().to_bytes();
        buf[0] = b'X';
        assert!(matches!(StoreHeader::from_bytes(&buf), Err(SortError::InvalidFormat(_))));

        let mut buf = StoreHeader::new().to_bytes();
        buf[4] = 9;
        assert!(matches!(StoreHeader::from_bytes(&buf), Err(SortError::InvalidFormat(_))));

        assert!(StoreHeader::from_bytes(&[0u8; 8]).is_err());
    }

    #[test]
    fn test_index_validate() {
        let first = (HEADER_SIZE + FRAME_PREFIX_SIZE) as u64;
        let ok = index(
            vec![
                IndexEntry { id: 1, offset: first, len: 3 },
                IndexEntry { id: 5, offset: first + 11, len: 2 },
            ],
            first + 13,
        );
        assert!(ok.validate().is_ok());
        assert_eq!(ok.total_payload_bytes(), 5);

        let unordered = index(
            vec![
                IndexEntry { id: 5, offset: first, len: 1 },
                IndexEntry { id: 1, offset: first, len: 1 },
            ],
            first + 1,
        );
        assert!(unordered.validate().is_err());

        let out_of_bounds = index(vec![IndexEntry { id: 1, offset: first, len: 10 }], first + 5);
        assert!(out_of_bounds.validate().is_err());

        let zero = index(vec![IndexEntry { id: 0, offset: first, len: 0 }], first);
        assert!(zero.validate().is_err());
    }
}
