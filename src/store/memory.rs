//! In-memory document store.

use std::collections::BTreeMap;

use crate::error::{Result, SortError};
use crate::store::{DestinationStore, Document, SourceStore, StoreMetadata};
use crate::DocId;

/// `BTreeMap`-backed store implementing both sides of a remap.
///
/// Records the order of `replace` calls and the number of commits so tests
/// can assert on write order.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    docs: BTreeMap<DocId, Vec<u8>>,
    metadata: StoreMetadata,
    write_log: Vec<DocId>,
    commits: u32,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a store from `(id, payload)` pairs. Later duplicates win.
    pub fn from_documents<I>(docs: I) -> Self
    where
        I: IntoIterator<Item = (DocId, Vec<u8>)>,
    {
        Self {
            docs: docs.into_iter().collect(),
            ..Self::default()
        }
    }

    /// Insert without touching the write log.
    pub fn insert(&mut self, id: DocId, payload: impl Into<Vec<u8>>) {
        self.docs.insert(id, payload.into());
    }

    pub fn get(&self, id: DocId) -> Option<&[u8]> {
        self.docs.get(&id).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = DocId> + '_ {
        self.docs.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (DocId, &[u8])> + '_ {
        self.docs.iter().map(|(&id, payload)| (id, payload.as_slice()))
    }

    /// Ids passed to `replace`, in call order.
    pub fn write_log(&self) -> &[DocId] {
        &self.write_log
    }

    pub fn commit_count(&self) -> u32 {
        self.commits
    }
}

impl SourceStore for MemoryStore {
    fn doc_count(&self) -> u64 {
        self.docs.len() as u64
    }

    fn total_payload_bytes(&self) -> Option<u64> {
        Some(self.docs.values().map(|p| p.len() as u64).sum())
    }

    fn scan(&self) -> Box<dyn Iterator<Item = Result<Document>> + '_> {
        Box::new(self.docs.iter().map(|(&id, payload)| {
            Ok(Document {
                id,
                payload: payload.clone(),
            })
        }))
    }

    fn metadata(&self) -> &StoreMetadata {
        &self.metadata
    }
}

impl DestinationStore for MemoryStore {
    fn replace(&mut self, id: DocId, payload: Vec<u8>) -> Result<()> {
        if id == 0 {
            return Err(SortError::InvalidFormat("document id 0 is reserved".into()));
        }
        self.docs.insert(id, payload);
        self.write_log.push(id);
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        self.commits += 1;
        Ok(())
    }

    fn metadata_mut(&mut self) -> &mut StoreMetadata {
        &mut self.metadata
    }
}
