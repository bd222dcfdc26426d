//! End-to-end remap: scan, bucket, replay, commit.

use std::path::Path;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::error::{Result, SortError};
use crate::remap::bucketing::BucketingWriter;
use crate::remap::observer::RemapObserver;
use crate::remap::permutation::PermutationReader;
use crate::remap::types::{RemapConfig, RemapStats};
use crate::store::{DestinationStore, SourceStore};
use crate::DocId;

/// Rewrite `source` into `dest`, moving every document from its old id to
/// the target id the permutation assigns it.
///
/// Steps:
/// 1. Reject an empty source before touching `temp_dir`
/// 2. Optionally validate the permutation over `1..=doc_count`
/// 3. Scan the source once, resolve each id, stage into the bucketing writer
/// 4. Final flush, then replay buckets `0..=max_bucket` in ascending order
/// 5. Commit, copy the metadata sidecar, commit again
///
/// A failure during replay leaves every earlier bucket in `dest`. Duplicate
/// target ids are not an error: the last record to arrive wins.
pub fn remap_store<S, D, O>(
    source: &S,
    permutation: &PermutationReader,
    temp_dir: &Path,
    dest: &mut D,
    config: RemapConfig,
    observer: &mut O,
) -> Result<RemapStats>
where
    S: SourceStore + ?Sized,
    D: DestinationStore + ?Sized,
    O: RemapObserver + ?Sized,
{
    let started = Instant::now();
    let total = source.doc_count();
    if total == 0 {
        return Err(SortError::EmptySource);
    }

    if config.validate_permutation {
        // Source ids are dense, so the highest old id is the count.
        let max_old_id = DocId::try_from(total).map_err(|_| {
            SortError::InvalidPermutation(format!("{} documents exceed the id space", total))
        })?;
        let report = permutation.validate(max_old_id)?;
        if !report.is_injective() {
            return Err(SortError::InvalidPermutation(format!(
                "{} zero targets, {} duplicate targets among {} old ids",
                report.zero_targets, report.duplicate_targets, report.checked
            )));
        }
        debug!(
            checked = report.checked,
            max_target = report.max_target,
            sparse = report.out_of_range_targets,
            "permutation valid"
        );
    }

    info!(
        total,
        flush_size = config.flush_size,
        group_size = config.group_size,
        temp_dir = %temp_dir.display(),
        "remapping store"
    );

    // -- Write phase --

    let mut writer = BucketingWriter::new(temp_dir, config.clone())?;
    observer.on_start(total);

    let mut records_read: u64 = 0;
    for doc in source.scan() {
        let doc = doc?;
        let target_id = permutation.resolve(doc.id)?;
        records_read += 1;
        if let Some(summary) = writer.add(target_id, doc.payload)? {
            observer.on_flush(&summary);
        }
        observer.on_record_read(records_read, writer.buffered_bytes());
    }

    if records_read != total {
        warn!(expected = total, scanned = records_read, "source count mismatch");
    }

    let (spilled, last_flush) = writer.finish()?;
    if let Some(summary) = last_flush {
        observer.on_flush(&summary);
    }
    observer.on_grouping_complete(spilled.records_grouped(), spilled.max_bucket());

    let mut stats = RemapStats {
        records_read,
        records_grouped: spilled.records_grouped(),
        max_bucket: spilled.max_bucket(),
        flushes: spilled.flushes(),
        ..RemapStats::default()
    };

    // -- Read phase --

    let replays = spilled.replay_into(dest, observer)?;
    for replay in &replays {
        stats.records_written += replay.records_written;
        stats.duplicates_overwritten += replay.duplicates_overwritten;
    }
    stats.buckets_replayed = replays.len() as u32;

    dest.commit()?;
    let copied = source.metadata().copy_into(dest.metadata_mut());
    dest.commit()?;
    debug!(
        spellings = copied.spellings,
        synonyms = copied.synonyms,
        user = copied.user,
        "metadata copied"
    );

    stats.elapsed = started.elapsed();
    observer.on_finish(&stats);
    Ok(stats)
}

// ── Tests ──────────────────────────────────────────────────────────
