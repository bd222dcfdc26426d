//! Configuration and result types for a remap run.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SortError};

/// Default number of staged records before an implicit flush.
pub const DEFAULT_FLUSH_SIZE: usize = 100_000;

/// Default width of the target-id range covered by one bucket.
pub const DEFAULT_GROUP_SIZE: u32 = 100_000;

/// Configuration for a remap run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemapConfig {
    /// Staged record count that triggers a flush to group files (default: 100_000)
    pub flush_size: usize,
    /// Target ids per bucket (default: 100_000)
    pub group_size: u32,
    /// Leave group files on disk after their bucket is replayed
    pub keep_group_files: bool,
    /// Remove leftover group files instead of refusing to start
    pub clean_stale_groups: bool,
    /// Reject permutations with zero or duplicate targets before scanning
    pub validate_permutation: bool,
}

impl RemapConfig {
    /// Reject sizes that would make bucketing meaningless.
    pub fn validate(&self) -> Result<()> {
        if self.flush_size == 0 {
            return Err(SortError::Config("flush_size must be > 0".into()));
        }
        if self.group_size == 0 {
            return Err(SortError::Config("group_size must be > 0".into()));
        }
        Ok(())
    }

    /// Bucket index for a target id.
    #[inline]
    pub fn bucket_of(&self, target_id: u32) -> u32 {
        target_id / self.group_size
    }
}

impl Default for RemapConfig {
    fn default() -> Self {
        Self {
            flush_size: DEFAULT_FLUSH_SIZE,
            group_size: DEFAULT_GROUP_SIZE,
            keep_group_files: false,
            clean_stale_groups: false,
            validate_permutation: false,
        }
    }
}

/// Outcome of one flush of the staging buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlushSummary {
    /// Records written to group files by this flush
    pub records: usize,
    /// Payload bytes written by this flush (excluding frame prefixes)
    pub payload_bytes: usize,
    /// Distinct buckets touched
    pub buckets_touched: usize,
    /// Highest bucket index touched
    pub max_bucket: u32,
}

/// Outcome of replaying one bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketReplay {
    pub bucket: u32,
    /// Triples read from the group file
    pub records_read: u64,
    /// Records handed to the destination (distinct target ids)
    pub records_written: u64,
    /// Triples whose target id was already present in the bucket
    pub duplicates_overwritten: u64,
}

impl BucketReplay {
    pub(crate) fn empty(bucket: u32) -> Self {
        Self {
            bucket,
            records_read: 0,
            records_written: 0,
            duplicates_overwritten: 0,
        }
    }
}

/// Totals for a complete remap run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemapStats {
    pub records_read: u64,
    pub records_grouped: u64,
    pub records_written: u64,
    /// Buckets that had a group file and were replayed
    pub buckets_replayed: u32,
    /// Highest bucket index observed (None when nothing was grouped)
    pub max_bucket: Option<u32>,
    pub flushes: u32,
    pub duplicates_overwritten: u64,
    pub elapsed: Duration,
}

// ── Tests ──────────────────────────────────────────────────────────
