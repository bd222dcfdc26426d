//! Write side of the on-disk document store.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{Result, SortError};
use crate::store::types::*;
use crate::store::{DestinationStore, StoreMetadata};
use crate::DocId;

/// Uncommitted frames that trigger an automatic commit (default).
pub const DEFAULT_AUTOCOMMIT_FRAMES: usize = 10_000;

// ── DocStoreWriter ─────────────────────────────────────────────────

/// Creates a new store and appends documents to it.
///
/// Every `replace` appends a frame to `docs.dat` and moves the id's location
/// to the new frame. Readers see what the last commit wrote to `docs.idx`.
/// The data file is hashed as it is written, so commit never re-reads it.
///
/// The store is readable from the moment `create` returns:
/// - `create` commits the empty store
/// - `replace` commits on its own once enough frames are pending
/// - dropping the writer commits whatever is still pending
///
/// A killed process therefore loses at most the frames since the last
/// automatic commit.
pub struct DocStoreWriter {
    dir: PathBuf,
    data: BufWriter<File>,
    data_len: u64,
    hasher: blake3::Hasher,
    locations: BTreeMap<DocId, (u64, u32)>,
    metadata: StoreMetadata,
    commits: u32,

    /// Frames or metadata edits not yet in `docs.idx`.
    pending: usize,
    dirty: bool,
    autocommit_frames: Option<usize>,
}

impl DocStoreWriter {
    /// Create a store in `dir` (created if missing) and commit it empty.
    ///
    /// Fails with `StoreExists` if `dir` already holds a store. A data file
    /// holding nothing but a header and no index (a create that never
    /// committed) is reclaimed.
    pub fn create(dir: &Path) -> Result<Self> {
        let data_path = dir.join(DATA_FILE);
        if dir.join(INDEX_FILE).exists() {
            return Err(SortError::StoreExists(dir.to_path_buf()));
        }
        if data_path.exists() {
            if fs::metadata(&data_path)?.len() > HEADER_SIZE as u64 {
                return Err(SortError::StoreExists(dir.to_path_buf()));
            }
            warn!(dir = %dir.display(), "reclaiming uncommitted empty store");
            fs::remove_file(&data_path)?;
        }
        fs::create_dir_all(dir)?;

        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&data_path)
            .map_err(|e| match e.kind() {
                io::ErrorKind::AlreadyExists => SortError::StoreExists(dir.to_path_buf()),
                _ => SortError::StoreIo(e),
            })?;

        let header = StoreHeader::new();
        let mut data = BufWriter::new(file);
        header.write_to(&mut data)?;
        let mut hasher = blake3::Hasher::new();
        hasher.update(&header.to_bytes());

        let mut writer = Self {
            dir: dir.to_path_buf(),
            data,
            data_len: HEADER_SIZE as u64,
            hasher,
            locations: BTreeMap::new(),
            metadata: StoreMetadata::default(),
            commits: 0,
            pending: 0,
            dirty: false,
            autocommit_frames: Some(DEFAULT_AUTOCOMMIT_FRAMES),
        };
        writer.commit()?;

        debug!(dir = %dir.display(), "created document store");
        Ok(writer)
    }

    /// Commit automatically after `frames` pending frames; `None` disables.
    ///
    /// The effective interval never drops below a quarter of the live
    /// document count, so the index bytes written stay linear in the store
    /// size.
    pub fn with_autocommit(mut self, frames: Option<usize>) -> Self {
        self.autocommit_frames = frames.map(|n| n.max(1));
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Live documents (distinct ids written so far).
    pub fn doc_count(&self) -> usize {
        self.locations.len()
    }

    /// Bytes appended to `docs.dat`, header included.
    pub fn data_len(&self) -> u64 {
        self.data_len
    }

    /// Commits so far, including the one made by `create`.
    pub fn commit_count(&self) -> u32 {
        self.commits
    }

    /// Frames written since the last commit.
    pub fn pending(&self) -> usize {
        self.pending
    }

    pub fn metadata(&self) -> &StoreMetadata {
        &self.metadata
    }

    fn autocommit_due(&self) -> bool {
        match self.autocommit_frames {
            Some(frames) => self.pending >= frames.max(self.locations.len() / 4),
            None => false,
        }
    }

    fn build_index(&self) -> StoreIndex {
        let entries = self
            .locations
            .iter()
            .map(|(&id, &(offset, len))| IndexEntry { id, offset, len })
            .collect();
        StoreIndex {
            version: FORMAT_VERSION,
            data_len: self.data_len,
            checksum: *self.hasher.finalize().as_bytes(),
            entries,
        }
    }

    fn write_index(&self, index: &StoreIndex) -> Result<()> {
        let path = self.dir.join(INDEX_FILE);
        let tmp = self.dir.join(format!("{}.tmp", INDEX_FILE));
        {
            let mut writer = BufWriter::new(File::create(&tmp)?);
            bincode::serialize_into(&mut writer, index)?;
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }
        fs::rename(&tmp, &path)?;
        Ok(())
    }
}

impl DestinationStore for DocStoreWriter {
    fn replace(&mut self, id: DocId, payload: Vec<u8>) -> Result<()> {
        if id == 0 {
            return Err(SortError::InvalidFormat("document id 0 is reserved".into()));
        }
        let len: u32 = payload.len().try_into().map_err(|_| {
            SortError::InvalidFormat(format!(
                "payload of document {} too large: {} bytes",
                id,
                payload.len()
            ))
        })?;

        let mut prefix = [0u8; FRAME_PREFIX_SIZE];
        prefix[0..4].copy_from_slice(&id.to_le_bytes());
        prefix[4..8].copy_from_slice(&len.to_le_bytes());
        self.data.write_all(&prefix)?;
        self.data.write_all(&payload)?;
        self.hasher.update(&prefix);
        self.hasher.update(&payload);

        let offset = self.data_len + FRAME_PREFIX_SIZE as u64;
        self.locations.insert(id, (offset, len));
        self.data_len = offset + len as u64;
        self.pending += 1;
        self.dirty = true;

        if self.autocommit_due() {
            self.commit()?;
        }
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        self.data.flush()?;
        self.data.get_ref().sync_data()?;

        let index = self.build_index();
        self.write_index(&index)?;
        self.metadata.save(&self.dir.join(METADATA_FILE))?;
        self.commits += 1;
        self.pending = 0;
        self.dirty = false;

        debug!(
            dir = %self.dir.display(),
            docs = index.entries.len(),
            data_len = index.data_len,
            "committed document store"
        );
        Ok(())
    }

    fn metadata_mut(&mut self) -> &mut StoreMetadata {
        self.dirty = true;
        &mut self.metadata
    }
}

impl Drop for DocStoreWriter {
    fn drop(&mut self) {
        if !self.dirty {
            return;
        }
        if let Err(e) = self.commit() {
            warn!(dir = %self.dir.display(), error = %e, "commit on drop failed");
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────────
