//! External bucket sort that remaps a document store.
//!
//! Two strictly separated phases:
//! 1. scan + bucket: every source record is resolved through the permutation
//!    and spilled to the group file of its target bucket
//! 2. merge-replay: each group file is loaded, ordered by target id and
//!    written to the destination, buckets in ascending order

pub mod types;
pub mod permutation;
pub mod group_file;
pub mod bucketing;
pub mod replay;
pub mod observer;
pub mod resource;
pub mod driver;

pub use types::*;
pub use permutation::{PermutationReader, PermutationReport, PermutationWriter};
pub use group_file::{group_file_path, GroupFileReader, GroupFileWriter, GroupRecord};
pub use bucketing::{BucketingWriter, SpilledBuckets};
pub use replay::replay_bucket;
pub use observer::{ConsoleProgress, NoopObserver, RemapObserver, TracingObserver};
pub use resource::{SystemResources, TuningProfile};
pub use driver::remap_store;
