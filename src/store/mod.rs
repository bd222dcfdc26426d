//! Document stores: the source a remap reads and the destination it writes.
//!
//! Two implementations:
//! - `DocStore` / `DocStoreWriter`: on-disk store (mmap'd data file, bincode
//!   index, JSON metadata sidecar)
//! - `MemoryStore`: `BTreeMap`-backed, for tests and small inputs

pub mod memory;
pub mod metadata;
pub mod reader;
pub mod types;
pub mod writer;

pub use memory::MemoryStore;
pub use metadata::{MetadataCopy, StoreMetadata};
pub use reader::DocStore;
pub use types::{IndexEntry, StoreHeader, StoreIndex};
pub use writer::DocStoreWriter;

use crate::error::Result;
use crate::DocId;

/// One stored document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub id: DocId,
    pub payload: Vec<u8>,
}

/// Read side of a remap.
pub trait SourceStore {
    /// Number of documents `scan()` yields.
    fn doc_count(&self) -> u64;

    /// Sum of payload sizes, if known without a scan.
    fn total_payload_bytes(&self) -> Option<u64> {
        None
    }

    /// Mean payload size, if known. Used for auto tuning.
    fn average_payload_bytes(&self) -> Option<u64> {
        let count = self.doc_count();
        if count == 0 {
            return None;
        }
        self.total_payload_bytes().map(|total| total / count)
    }

    /// Every document exactly once, in increasing id order.
    fn scan(&self) -> Box<dyn Iterator<Item = Result<Document>> + '_>;

    fn metadata(&self) -> &StoreMetadata;
}

/// Write side of a remap.
pub trait DestinationStore {
    /// Put a document, replacing any earlier payload under `id`.
    fn replace(&mut self, id: DocId, payload: Vec<u8>) -> Result<()>;

    /// Make everything written so far durable.
    fn commit(&mut self) -> Result<()>;

    fn metadata_mut(&mut self) -> &mut StoreMetadata;
}
