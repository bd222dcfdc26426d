//! Staging buffer that spills records into per-bucket group files.
//!
//! Analogous to an LSM memtable, except a flush does not produce one sorted
//! run: staged pairs are partitioned by `target_id / group_size` and each
//! partition is appended to its bucket's group file. Arrival order is kept
//! within a bucket; ordering by target id is replay's job.
//!
//! Single owner, no interior mutability. `finish()` consumes the writer and
//! hands back `SpilledBuckets`, the only entry point to replay, so no group
//! file can be read while it is still being written.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{Result, SortError};
use crate::remap::group_file::{group_file_path, parse_group_file_name, GroupFileWriter};
use crate::remap::replay::replay_bucket;
use crate::remap::types::{BucketReplay, FlushSummary, RemapConfig};
use crate::remap::observer::RemapObserver;
use crate::store::DestinationStore;
use crate::DocId;

/// Write phase: owns the staging buffer and every group file.
pub struct BucketingWriter {
    dir: PathBuf,
    config: RemapConfig,

    /// Staged (target_id, payload) pairs in arrival order.
    staged: Vec<(DocId, Vec<u8>)>,

    /// Payload bytes currently staged.
    buffered_bytes: usize,

    records_staged: u64,
    records_grouped: u64,
    flush_count: u32,

    /// Buckets that have a group file.
    buckets: BTreeSet<u32>,
}

impl BucketingWriter {
    // -- Constructors ---------------------------------------------------------

    /// Prepare `dir` for a new run.
    ///
    /// Group files are opened in append mode, so leftovers from an earlier
    /// run would be merged into this one. They are rejected with
    /// `SortError::StaleGroupFile`, or removed when
    /// `config.clean_stale_groups` is set.
    pub fn new(dir: &Path, config: RemapConfig) -> Result<Self> {
        config.validate()?;
        fs::create_dir_all(dir)?;

        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let is_group = name.to_str().and_then(parse_group_file_name).is_some();
            if !is_group {
                continue;
            }
            if config.clean_stale_groups {
                warn!("removing stale group file {:?}", entry.path());
                fs::remove_file(entry.path())?;
            } else {
                return Err(SortError::StaleGroupFile(entry.path()));
            }
        }

        Ok(Self {
            dir: dir.to_path_buf(),
            staged: Vec::with_capacity(config.flush_size.min(1 << 20)),
            config,
            buffered_bytes: 0,
            records_staged: 0,
            records_grouped: 0,
            flush_count: 0,
            buckets: BTreeSet::new(),
        })
    }

    // -- Write Operations -----------------------------------------------------

    /// Stage one record. Flushes when the buffer reaches `flush_size`.
    ///
    /// Returns the flush summary when this call triggered a flush.
    pub fn add(&mut self, target_id: DocId, payload: Vec<u8>) -> Result<Option<FlushSummary>> {
        self.buffered_bytes += payload.len();
        self.staged.push((target_id, payload));
        self.records_staged += 1;

        if self.staged.len() >= self.config.flush_size {
            return self.flush();
        }
        Ok(None)
    }

    /// Partition the staged records by bucket and append them to group files.
    ///
    /// No-op returning `None` when nothing is staged: no file is created.
    pub fn flush(&mut self) -> Result<Option<FlushSummary>> {
        if self.staged.is_empty() {
            return Ok(None);
        }

        let staged = std::mem::take(&mut self.staged);
        let payload_bytes = std::mem::take(&mut self.buffered_bytes);
        let records = staged.len();

        // Stable partition: pairs keep arrival order within a bucket.
        let mut partitions: BTreeMap<u32, Vec<(DocId, Vec<u8>)>> = BTreeMap::new();
        for (target_id, payload) in staged {
            partitions
                .entry(self.config.bucket_of(target_id))
                .or_default()
                .push((target_id, payload));
        }

        let buckets_touched = partitions.len();
        let mut max_bucket = 0;
        for (bucket, members) in partitions {
            let mut writer = GroupFileWriter::open_append(&group_file_path(&self.dir, bucket))?;
            for (target_id, payload) in &members {
                writer.append(*target_id, payload)?;
            }
            writer.finish()?;
            self.buckets.insert(bucket);
            max_bucket = bucket;
        }

        self.records_grouped += records as u64;
        self.flush_count += 1;
        self.staged.reserve(self.config.flush_size.min(1 << 20));

        debug!(
            records,
            payload_bytes,
            buckets_touched,
            max_bucket,
            "flushed staging buffer to group files"
        );

        Ok(Some(FlushSummary {
            records,
            payload_bytes,
            buckets_touched,
            max_bucket,
        }))
    }

    /// Final flush; ends the write phase.
    pub fn finish(mut self) -> Result<(SpilledBuckets, Option<FlushSummary>)> {
        let last = self.flush()?;
        let spilled = SpilledBuckets {
            dir: self.dir,
            max_bucket: self.buckets.iter().next_back().copied(),
            buckets: self.buckets,
            records_grouped: self.records_grouped,
            flushes: self.flush_count,
            keep_group_files: self.config.keep_group_files,
        };
        Ok((spilled, last))
    }

    // -- Buffer State ---------------------------------------------------------

    /// Records currently staged.
    pub fn staged_len(&self) -> usize {
        self.staged.len()
    }

    /// Payload bytes currently staged.
    pub fn buffered_bytes(&self) -> usize {
        self.buffered_bytes
    }

    /// Records passed to `add` so far.
    pub fn records_staged(&self) -> u64 {
        self.records_staged
    }

    /// Records already written to group files.
    pub fn records_grouped(&self) -> u64 {
        self.records_grouped
    }

    /// Non-empty flushes so far.
    pub fn flush_count(&self) -> u32 {
        self.flush_count
    }

    /// Highest bucket index with a group file.
    pub fn max_bucket(&self) -> Option<u32> {
        self.buckets.iter().next_back().copied()
    }
}

// ── SpilledBuckets ─────────────────────────────────────────────────

/// Read phase: the group files left by a finished `BucketingWriter`.
#[derive(Debug)]
pub struct SpilledBuckets {
    dir: PathBuf,
    buckets: BTreeSet<u32>,
    max_bucket: Option<u32>,
    records_grouped: u64,
    flushes: u32,
    keep_group_files: bool,
}

impl SpilledBuckets {
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Highest bucket index observed, `None` if nothing was grouped.
    pub fn max_bucket(&self) -> Option<u32> {
        self.max_bucket
    }

    /// Number of buckets that received at least one record.
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    pub fn records_grouped(&self) -> u64 {
        self.records_grouped
    }

    pub fn flushes(&self) -> u32 {
        self.flushes
    }

    /// Replay every bucket that received records, in ascending order.
    ///
    /// Only spilled buckets are opened, so sparse target ids cost nothing.
    /// A failing bucket aborts the run; buckets replayed before it stay in
    /// the destination.
    pub fn replay_into<D, O>(self, dest: &mut D, observer: &mut O) -> Result<Vec<BucketReplay>>
    where
        D: DestinationStore + ?Sized,
        O: RemapObserver + ?Sized,
    {
        let mut replays = Vec::with_capacity(self.buckets.len());
        let mut written: u64 = 0;
        for &bucket in &self.buckets {
            let replay = replay_bucket(&self.dir, bucket, dest, |_| {
                written += 1;
                observer.on_record_written(written);
            })?;
            let Some(replay) = replay else {
                continue;
            };

            if !self.keep_group_files {
                fs::remove_file(group_file_path(&self.dir, bucket))?;
            }
            observer.on_bucket_replayed(&replay);
            replays.push(replay);
        }
        Ok(replays)
    }
}

// -- Tests --------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remap::group_file::GroupFileReader;
    use crate::remap::observer::NoopObserver;
    use crate::store::MemoryStore;
    use tempfile::TempDir;

    fn config(flush_size: usize, group_size: u32) -> RemapConfig {
        RemapConfig {
            flush_size,
            group_size,
            ..RemapConfig::default()
        }
    }

    fn read_group(dir: &Path, bucket: u32) -> Vec<(DocId, Vec<u8>)> {
        GroupFileReader::open(&group_file_path(dir, bucket))
            .unwrap()
            .unwrap()
            .map(|r| {
                let r = r.unwrap();
                (r.target_id, r.payload)
            })
            .collect()
    }

    #[test]
    fn test_empty_flush_creates_nothing() {
        let dir = TempDir::new().unwrap();
        let mut writer = BucketingWriter::new(dir.path(), config(10, 10)).unwrap();

        assert!(writer.flush().unwrap().is_none());
        assert_eq!(writer.flush_count(), 0);
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);

        let (spilled, last) = writer.finish().unwrap();
        assert!(last.is_none());
        assert_eq!(spilled.max_bucket(), None);
        assert_eq!(spilled.bucket_count(), 0);
    }

    #[test]
    fn test_add_triggers_flush_at_flush_size() {
        let dir = TempDir::new().unwrap();
        let mut writer = BucketingWriter::new(dir.path(), config(2, 10)).unwrap();

        assert!(writer.add(30, b"a".to_vec()).unwrap().is_none());
        assert_eq!(writer.staged_len(), 1);
        assert_eq!(writer.buffered_bytes(), 1);

        let summary = writer.add(10, b"b".to_vec()).unwrap().unwrap();
        assert_eq!(summary.records, 2);
        assert_eq!(summary.buckets_touched, 2);
        assert_eq!(summary.max_bucket, 3);
        assert_eq!(writer.staged_len(), 0);
        assert_eq!(writer.buffered_bytes(), 0);

        assert!(writer.add(20, b"c".to_vec()).unwrap().is_none());
        let (spilled, last) = writer.finish().unwrap();
        let last = last.unwrap();
        assert_eq!(last.records, 1);
        assert_eq!(last.max_bucket, 2);

        assert_eq!(spilled.flushes(), 2);
        assert_eq!(spilled.records_grouped(), 3);
        assert_eq!(spilled.max_bucket(), Some(3));
        assert_eq!(spilled.bucket_count(), 3);
    }

    #[test]
    fn test_partition_keeps_arrival_order_within_bucket() {
        let dir = TempDir::new().unwrap();
        let mut writer = BucketingWriter::new(dir.path(), config(100, 10)).unwrap();

        writer.add(15, b"x1".to_vec()).unwrap();
        writer.add(3, b"y".to_vec()).unwrap();
        writer.add(12, b"x2".to_vec()).unwrap();
        writer.add(15, b"x3".to_vec()).unwrap();
        writer.flush().unwrap();

        assert_eq!(
            read_group(dir.path(), 1),
            vec![(15, b"x1".to_vec()), (12, b"x2".to_vec()), (15, b"x3".to_vec())]
        );
        assert_eq!(read_group(dir.path(), 0), vec![(3, b"y".to_vec())]);
    }

    #[test]
    fn test_flushes_append_to_existing_group_files() {
        let dir = TempDir::new().unwrap();
        let mut writer = BucketingWriter::new(dir.path(), config(1, 100)).unwrap();

        writer.add(5, b"first".to_vec()).unwrap();
        writer.add(6, b"second".to_vec()).unwrap();
        assert_eq!(writer.flush_count(), 2);

        assert_eq!(
            read_group(dir.path(), 0),
            vec![(5, b"first".to_vec()), (6, b"second".to_vec())]
        );
    }

    #[test]
    fn test_stale_group_file_rejected() {
        let dir = TempDir::new().unwrap();
        fs::write(group_file_path(dir.path(), 4), b"junk").unwrap();
        fs::write(dir.path().join("unrelated.txt"), b"keep").unwrap();

        let err = BucketingWriter::new(dir.path(), config(10, 10)).err().unwrap();
        assert!(matches!(err, SortError::StaleGroupFile(_)));
    }

    #[test]
    fn test_stale_group_file_cleaned_when_enabled() {
        let dir = TempDir::new().unwrap();
        fs::write(group_file_path(dir.path(), 4), b"junk").unwrap();
        fs::write(dir.path().join("unrelated.txt"), b"keep").unwrap();

        let cfg = RemapConfig {
            clean_stale_groups: true,
            ..config(10, 10)
        };
        BucketingWriter::new(dir.path(), cfg).unwrap();
        assert!(!group_file_path(dir.path(), 4).exists());
        assert!(dir.path().join("unrelated.txt").exists());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            BucketingWriter::new(dir.path(), config(0, 10)),
            Err(SortError::Config(_))
        ));
    }

    #[test]
    fn test_replay_into_orders_and_removes_group_files() {
        let dir = TempDir::new().unwrap();
        let mut writer = BucketingWriter::new(dir.path(), config(2, 10)).unwrap();
        writer.add(30, b"a".to_vec()).unwrap();
        writer.add(10, b"b".to_vec()).unwrap();
        writer.add(20, b"c".to_vec()).unwrap();
        let (spilled, _) = writer.finish().unwrap();

        let mut dest = MemoryStore::new();
        let replays = spilled.replay_into(&mut dest, &mut NoopObserver).unwrap();

        // bucket 0 had no records and is skipped
        let buckets: Vec<u32> = replays.iter().map(|r| r.bucket).collect();
        assert_eq!(buckets, vec![1, 2, 3]);
        assert_eq!(dest.get(10), Some(&b"b"[..]));
        assert_eq!(dest.get(20), Some(&b"c"[..]));
        assert_eq!(dest.get(30), Some(&b"a"[..]));
        assert_eq!(dest.write_log(), &[10, 20, 30]);

        for bucket in 0..=3 {
            assert!(!group_file_path(dir.path(), bucket).exists());
        }
    }

    #[test]
    fn test_replay_into_keeps_group_files_when_asked() {
        let dir = TempDir::new().unwrap();
        let cfg = RemapConfig {
            keep_group_files: true,
            ..config(10, 10)
        };
        let mut writer = BucketingWriter::new(dir.path(), cfg).unwrap();
        writer.add(1, b"a".to_vec()).unwrap();
        let (spilled, _) = writer.finish().unwrap();

        let mut dest = MemoryStore::new();
        spilled.replay_into(&mut dest, &mut NoopObserver).unwrap();
        assert!(group_file_path(dir.path(), 0).exists());
    }

    #[test]
    fn test_replay_into_opens_only_spilled_buckets() {
        let dir = TempDir::new().unwrap();
        let mut writer = BucketingWriter::new(dir.path(), config(10, 1)).unwrap();
        writer.add(4_000_000_000, b"far".to_vec()).unwrap();
        writer.add(1, b"near".to_vec()).unwrap();
        let (spilled, _) = writer.finish().unwrap();
        assert_eq!(spilled.max_bucket(), Some(4_000_000_000));

        let started = std::time::Instant::now();
        let mut dest = MemoryStore::new();
        let replays = spilled.replay_into(&mut dest, &mut NoopObserver).unwrap();

        let buckets: Vec<u32> = replays.iter().map(|r| r.bucket).collect();
        assert_eq!(buckets, vec![1, 4_000_000_000]);
        assert_eq!(dest.write_log(), &[1, 4_000_000_000]);
        assert!(started.elapsed() < std::time::Duration::from_secs(5));
    }
}
