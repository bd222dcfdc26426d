//! Permutation files: old id -> target id lookup.
//!
//! Flat array of u32 little-endian values, no header. The target id for
//! old id `k` lives at byte offset `k * 4`, so slot 0 is never consulted
//! by a store whose ids start at 1. Writers emit a zero there.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

use crate::error::{Result, SortError};
use crate::DocId;

/// Width of one permutation entry in bytes.
pub const ENTRY_SIZE: u64 = 4;

// ── Positioned reads ───────────────────────────────────────────────

#[cfg(unix)]
fn read_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    use std::os::unix::fs::FileExt;
    file.read_at(buf, offset)
}

#[cfg(windows)]
fn read_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    use std::os::windows::fs::FileExt;
    file.seek_read(buf, offset)
}

/// Fill `buf` from `offset`, retrying interrupted reads.
///
/// Returns the number of bytes read; less than `buf.len()` only at EOF.
fn read_full_at(file: &File, buf: &mut [u8], mut offset: u64) -> io::Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        match read_at(file, &mut buf[total..], offset) {
            Ok(0) => break,
            Ok(n) => {
                total += n;
                offset += n as u64;
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(total)
}

// ── PermutationReader ──────────────────────────────────────────────

/// Random-access reader over a permutation file.
///
/// No caching: old ids arrive in source order, and each lookup is a single
/// positioned read of 4 bytes.
#[derive(Debug)]
pub struct PermutationReader {
    file: File,
    path: PathBuf,
    file_len: u64,
}

/// Result of a validation pass over a permutation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PermutationReport {
    /// Old ids checked (1..=max_old_id)
    pub checked: u64,
    /// Old ids mapped to target 0
    pub zero_targets: u64,
    /// Old ids whose target was already claimed by a smaller old id
    pub duplicate_targets: u64,
    /// Old ids mapped past `max_old_id` (sparse targets; still injective)
    pub out_of_range_targets: u64,
    /// Largest target id seen
    pub max_target: DocId,
}

impl PermutationReport {
    /// True when every checked old id has a distinct, non-zero target.
    pub fn is_injective(&self) -> bool {
        self.zero_targets == 0 && self.duplicate_targets == 0
    }
}

impl PermutationReader {
    /// Open a permutation file for lookups.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let file_len = file.metadata()?.len();
        Ok(Self {
            file,
            path: path.to_path_buf(),
            file_len,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of addressable old ids (slot 0 excluded).
    pub fn len(&self) -> u64 {
        (self.file_len / ENTRY_SIZE).saturating_sub(1)
    }

    /// Whether the file addresses no old ids at all.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resolve an old id to its target id.
    ///
    /// Fails with `SortError::Lookup` when the file ends before the entry
    /// or the read fails for a reason other than interruption.
    pub fn resolve(&self, old_id: DocId) -> Result<DocId> {
        let offset = old_id as u64 * ENTRY_SIZE;
        let mut buf = [0u8; 4];
        let n = read_full_at(&self.file, &mut buf, offset).map_err(|e| SortError::Lookup {
            old_id,
            reason: e.to_string(),
        })?;
        if n != buf.len() {
            return Err(SortError::Lookup {
                old_id,
                reason: format!(
                    "permutation file {:?} too short: entry needs bytes {}..{}, file has {}",
                    self.path,
                    offset,
                    offset + ENTRY_SIZE,
                    self.file_len
                ),
            });
        }
        Ok(u32::from_le_bytes(buf))
    }

    /// Scan old ids `1..=max_old_id` for zero and duplicate targets.
    ///
    /// Sequential pass over a second handle. Targets up to `max_old_id` are
    /// tracked in a bitset of `max_old_id` bits; larger targets go to a hash
    /// set. Memory is bounded by `max_old_id`, whatever the target values.
    pub fn validate(&self, max_old_id: DocId) -> Result<PermutationReport> {
        let needed = (max_old_id as u64 + 1) * ENTRY_SIZE;
        if self.file_len < needed {
            return Err(SortError::Lookup {
                old_id: max_old_id,
                reason: format!(
                    "permutation file {:?} too short: needs {} bytes, has {}",
                    self.path, needed, self.file_len
                ),
            });
        }

        let mut reader = BufReader::new(File::open(&self.path)?);
        let mut slot = [0u8; 4];
        reader.read_exact(&mut slot)?; // reserved slot 0

        let mut report = PermutationReport::default();
        let mut seen = vec![0u64; max_old_id as usize / 64 + 1];
        let mut seen_sparse: HashSet<DocId> = HashSet::new();
        for _ in 1..=max_old_id {
            reader.read_exact(&mut slot)?;
            let target = u32::from_le_bytes(slot);
            report.checked += 1;
            if target == 0 {
                report.zero_targets += 1;
                continue;
            }
            report.max_target = report.max_target.max(target);

            let fresh = if target > max_old_id {
                report.out_of_range_targets += 1;
                seen_sparse.insert(target)
            } else {
                let word = (target / 64) as usize;
                let bit = 1u64 << (target % 64);
                let fresh = seen[word] & bit == 0;
                seen[word] |= bit;
                fresh
            };
            if !fresh {
                report.duplicate_targets += 1;
            }
        }
        Ok(report)
    }
}

// ── PermutationWriter ──────────────────────────────────────────────

/// Builds permutation files.
///
/// `targets[i]` is the target id of old id `i + 1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermutationWriter {
    targets: Vec<DocId>,
}

impl PermutationWriter {
    /// Map every old id in `1..=count` to itself.
    pub fn identity(count: DocId) -> Self {
        Self {
            targets: (1..=count).collect(),
        }
    }

    /// Explicit targets; index `i` is old id `i + 1`.
    pub fn from_mapping(targets: Vec<DocId>) -> Self {
        Self { targets }
    }

    /// Rank old ids by score and assign target ids in rank order.
    ///
    /// `scores[i]` is the score of old id `i + 1`. Ties keep old-id order;
    /// NaN scores rank after every number in either direction.
    pub fn from_scores(scores: &[f32], descending: bool) -> Self {
        let mut order: Vec<usize> = (0..scores.len()).collect();
        order.sort_by(|&a, &b| {
            let (x, y) = (scores[a], scores[b]);
            match (x.is_nan(), y.is_nan()) {
                (true, true) => Ordering::Equal,
                (true, false) => Ordering::Greater,
                (false, true) => Ordering::Less,
                (false, false) => {
                    let ord = x.partial_cmp(&y).unwrap_or(Ordering::Equal);
                    if descending {
                        ord.reverse()
                    } else {
                        ord
                    }
                }
            }
        });

        let mut targets = vec![0; scores.len()];
        for (rank, old_index) in order.into_iter().enumerate() {
            targets[old_index] = rank as DocId + 1;
        }
        Self { targets }
    }

    /// Number of old ids covered.
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Target id for an old id, if covered.
    pub fn target_of(&self, old_id: DocId) -> Option<DocId> {
        if old_id == 0 {
            return None;
        }
        self.targets.get(old_id as usize - 1).copied()
    }

    /// Write the flat file layout (reserved slot 0 first).
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&0u32.to_le_bytes())?;
        for &target in &self.targets {
            writer.write_all(&target.to_le_bytes())?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Write to `path`, replacing any existing file.
    pub fn write_file(&self, path: &Path) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        self.write_to(&mut writer)?;
        writer.into_inner().map_err(|e| e.into_error())?.sync_all()?;
        Ok(())
    }
}

// ── Tests ──────────────────────────────────────────────────────────
