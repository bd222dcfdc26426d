//! Merge-replay of one bucket.
//!
//! Loads a group file into an ordered map keyed by target id, then writes the
//! map to the destination in ascending key order. Used by
//! `SpilledBuckets::replay_into`, one bucket at a time, lowest bucket first.

use std::collections::BTreeMap;
use std::path::Path;

use tracing::debug;

use crate::error::Result;
use crate::remap::group_file::{group_file_path, GroupFileReader};
use crate::remap::types::BucketReplay;
use crate::store::DestinationStore;
use crate::DocId;

/// Contents of one group file, ordered by target id.
#[derive(Debug, Default)]
pub struct LoadedBucket {
    pub records: BTreeMap<DocId, Vec<u8>>,
    /// Triples read from the file
    pub records_read: u64,
    /// Triples that replaced an earlier payload for the same target id
    pub duplicates_overwritten: u64,
}

/// Read a group file into an ordered map.
///
/// Algorithm:
/// 1. Read triples in arrival order
/// 2. Insert into a BTreeMap by target id (later insert wins)
///
/// A missing file is an empty bucket: `Ok(None)`.
///
/// Complexity: O(R log R) time, O(total payload) space where R = records in the bucket
pub fn load_bucket(path: &Path) -> Result<Option<LoadedBucket>> {
    let Some(reader) = GroupFileReader::open(path)? else {
        return Ok(None);
    };

    let mut loaded = LoadedBucket::default();
    for record in reader {
        let record = record?;
        loaded.records_read += 1;
        if loaded.records.insert(record.target_id, record.payload).is_some() {
            loaded.duplicates_overwritten += 1;
        }
    }
    Ok(Some(loaded))
}

/// Replay bucket `bucket` from `dir` into `dest`.
///
/// Calls `on_written` after every successful put. Returns `Ok(None)` if the
/// bucket has no group file.
pub fn replay_bucket<D, F>(
    dir: &Path,
    bucket: u32,
    dest: &mut D,
    mut on_written: F,
) -> Result<Option<BucketReplay>>
where
    D: DestinationStore + ?Sized,
    F: FnMut(DocId),
{
    let path = group_file_path(dir, bucket);
    let Some(loaded) = load_bucket(&path)? else {
        return Ok(None);
    };

    let mut replay = BucketReplay::empty(bucket);
    replay.records_read = loaded.records_read;
    replay.duplicates_overwritten = loaded.duplicates_overwritten;

    for (target_id, payload) in loaded.records {
        dest.replace(target_id, payload)?;
        replay.records_written += 1;
        on_written(target_id);
    }

    debug!(
        bucket,
        records_read = replay.records_read,
        records_written = replay.records_written,
        duplicates = replay.duplicates_overwritten,
        "replayed bucket"
    );
    Ok(Some(replay))
}

// ── Tests ──────────────────────────────────────────────────────────
