//! Read side of the on-disk document store.
//!
//! Opens `docs.idx`, validates it against the memory-mapped `docs.dat`, and
//! serves payloads as zero-copy slices of the mapping.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use memmap2::Mmap;
use tracing::debug;

use crate::error::{Result, SortError};
use crate::store::types::*;
use crate::store::{Document, SourceStore, StoreMetadata};
use crate::DocId;

/// Read helper: little-endian u32 at byte offset.
#[inline]
fn read_u32_at(data: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes(data[offset..offset + 4].try_into().unwrap())
}

/// A committed document store, opened read-only.
pub struct DocStore {
    dir: PathBuf,
    mmap: Mmap,
    index: StoreIndex,
    metadata: StoreMetadata,
}

impl DocStore {
    /// Open the store in `dir`.
    ///
    /// Checks the header and that every indexed payload lies inside the
    /// committed data range. Use `verify()` for a full checksum pass.
    pub fn open(dir: &Path) -> Result<Self> {
        let index_file = File::open(dir.join(INDEX_FILE))?;
        let index: StoreIndex = bincode::deserialize_from(BufReader::new(index_file))?;
        index.validate()?;

        let data_file = File::open(dir.join(DATA_FILE))?;
        // SAFETY: the data file is append-only; committed bytes never change.
        let mmap = unsafe { Mmap::map(&data_file) }?;
        StoreHeader::from_bytes(&mmap)?;
        if (mmap.len() as u64) < index.data_len {
            return Err(SortError::InvalidFormat(format!(
                "data file holds {} bytes, index expects {}",
                mmap.len(),
                index.data_len
            )));
        }

        let metadata = StoreMetadata::load(&dir.join(METADATA_FILE))?;

        debug!(
            dir = %dir.display(),
            docs = index.entries.len(),
            data_len = index.data_len,
            "opened document store"
        );

        Ok(Self {
            dir: dir.to_path_buf(),
            mmap,
            index,
            metadata,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn len(&self) -> usize {
        self.index.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.entries.is_empty()
    }

    /// Highest stored id.
    pub fn last_id(&self) -> Option<DocId> {
        self.index.entries.last().map(|e| e.id)
    }

    pub fn get(&self, id: DocId) -> Option<&[u8]> {
        let pos = self
            .index
            .entries
            .binary_search_by_key(&id, |e| e.id)
            .ok()?;
        Some(self.payload(&self.index.entries[pos]))
    }

    /// `(id, payload)` in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = (DocId, &[u8])> + '_ {
        self.index.entries.iter().map(|e| (e.id, self.payload(e)))
    }

    /// Recompute the data checksum and check every frame prefix.
    pub fn verify(&self) -> Result<()> {
        let committed = &self.mmap[..self.index.data_len as usize];
        if blake3::hash(committed).as_bytes() != &self.index.checksum {
            return Err(SortError::ChecksumMismatch(self.dir.join(DATA_FILE)));
        }
        for entry in &self.index.entries {
            let prefix = entry.offset as usize - FRAME_PREFIX_SIZE;
            let id = read_u32_at(committed, prefix);
            let len = read_u32_at(committed, prefix + 4);
            if id != entry.id || len != entry.len {
                return Err(SortError::InvalidFormat(format!(
                    "frame at {} holds id {} ({} bytes), index says id {} ({} bytes)",
                    prefix, id, len, entry.id, entry.len
                )));
            }
        }
        Ok(())
    }

    fn payload(&self, entry: &IndexEntry) -> &[u8] {
        let start = entry.offset as usize;
        &self.mmap[start..start + entry.len as usize]
    }
}

impl SourceStore for DocStore {
    fn doc_count(&self) -> u64 {
        self.index.entries.len() as u64
    }

    fn total_payload_bytes(&self) -> Option<u64> {
        Some(self.index.total_payload_bytes())
    }

    fn scan(&self) -> Box<dyn Iterator<Item = Result<Document>> + '_> {
        // Hint only; ignore failure.
        #[cfg(unix)]
        let _ = self.mmap.advise(memmap2::Advice::Sequential);

        Box::new(self.iter().map(|(id, payload)| {
            Ok(Document {
                id,
                payload: payload.to_vec(),
            })
        }))
    }

    fn metadata(&self) -> &StoreMetadata {
        &self.metadata
    }
}

// ── Tests ──────────────────────────────────────────────────────────
