//! docsort: rewrite a document store into a caller-chosen id order.
//!
//! Reads a source store once, maps every old id to its target id through a
//! fixed-width permutation file, spills records into per-bucket group files
//! and replays each bucket in ascending target-id order into the destination.
//! Peak memory is bounded by the staging buffer and the largest bucket, not by
//! the size of the collection.

pub mod error;
pub mod remap;
pub mod store;

/// Document identifier. Dense, starting at 1.
pub type DocId = u32;

pub use error::{Result, SortError};
pub use remap::{
    remap_store, BucketReplay, BucketingWriter, ConsoleProgress, FlushSummary, NoopObserver,
    PermutationReader, PermutationReport, PermutationWriter, RemapConfig, RemapObserver,
    RemapStats, SpilledBuckets, SystemResources, TracingObserver, TuningProfile,
};
pub use store::{
    DestinationStore, DocStore, DocStoreWriter, Document, MemoryStore, SourceStore, StoreMetadata,
};
