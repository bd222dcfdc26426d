//! Group files: per-bucket spill files.
//!
//! ## Binary layout
//!
//! ```text
//! [target_id: u32 LE][length: u32 LE][payload: length bytes]
//! [target_id: u32 LE][length: u32 LE][payload: length bytes]
//! ...
//! ```
//!
//! No header, no footer. Records are in arrival order, not target-id order.
//! Files are only ever appended to; replay reads each one exactly once.

use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

use crate::error::{Result, SortError};
use crate::DocId;

/// File name prefix; the bucket index follows in decimal.
pub const GROUP_FILE_PREFIX: &str = "group_";

/// Size of the `[target_id][length]` prefix of every record.
pub const RECORD_PREFIX_SIZE: usize = 8;

/// One spilled record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupRecord {
    pub target_id: DocId,
    pub payload: Vec<u8>,
}

/// Path of the group file for `bucket` under `dir`.
pub fn group_file_path(dir: &Path, bucket: u32) -> PathBuf {
    dir.join(format!("{}{}", GROUP_FILE_PREFIX, bucket))
}

/// Bucket index encoded in a group file name, if `name` is one.
pub fn parse_group_file_name(name: &str) -> Option<u32> {
    let digits = name.strip_prefix(GROUP_FILE_PREFIX)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Hint the kernel that `file` will be read front to back.
#[cfg(target_os = "linux")]
pub(crate) fn advise_sequential(file: &File) {
    use std::os::unix::io::AsRawFd;
    // SAFETY: the descriptor is owned by `file`, which outlives the call, and
    // posix_fadvise does not touch memory. The hint is advisory, so its return
    // code is ignored.
    unsafe {
        libc::posix_fadvise(file.as_raw_fd(), 0, 0, libc::POSIX_FADV_SEQUENTIAL);
    }
}

#[cfg(not(target_os = "linux"))]
pub(crate) fn advise_sequential(_file: &File) {}

// ── GroupFileWriter ────────────────────────────────────────────────

/// Append-mode writer for one group file.
pub struct GroupFileWriter {
    path: PathBuf,
    writer: BufWriter<File>,
    records: u64,
}

impl GroupFileWriter {
    /// Open `path` for appending, creating it if needed. Never truncates.
    pub fn open_append(path: &Path) -> Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
            records: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Records appended through this handle.
    pub fn records(&self) -> u64 {
        self.records
    }

    /// Append one `(target_id, payload)` triple.
    pub fn append(&mut self, target_id: DocId, payload: &[u8]) -> Result<()> {
        let len = u32::try_from(payload.len()).map_err(|_| {
            SortError::InvalidFormat(format!(
                "payload of {} bytes for target {} exceeds the u32 length field",
                payload.len(),
                target_id
            ))
        })?;
        self.writer.write_all(&target_id.to_le_bytes())?;
        self.writer.write_all(&len.to_le_bytes())?;
        self.writer.write_all(payload)?;
        self.records += 1;
        Ok(())
    }

    /// Flush buffered bytes and close the handle.
    pub fn finish(mut self) -> Result<u64> {
        self.writer.flush()?;
        Ok(self.records)
    }
}

// ── GroupFileReader ────────────────────────────────────────────────

/// Sequential reader over one group file.
pub struct GroupFileReader<R: Read = BufReader<File>> {
    reader: R,
    path: PathBuf,
}

impl GroupFileReader<BufReader<File>> {
    /// Open a group file. A missing file is an empty bucket: `Ok(None)`.
    pub fn open(path: &Path) -> Result<Option<Self>> {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        advise_sequential(&file);
        Ok(Some(Self::from_reader(BufReader::new(file), path)))
    }
}

impl<R: Read> GroupFileReader<R> {
    /// Wrap any reader; `path` is only used in error reports.
    pub fn from_reader(reader: R, path: &Path) -> Self {
        Self {
            reader,
            path: path.to_path_buf(),
        }
    }

    /// Read the next triple.
    ///
    /// `Ok(None)` at a clean end of file (record boundary). A file that ends
    /// inside a prefix or inside a payload is `SortError::TruncatedRecord`.
    pub fn next_record(&mut self) -> Result<Option<GroupRecord>> {
        let mut prefix = [0u8; RECORD_PREFIX_SIZE];
        let got = read_full(&mut self.reader, &mut prefix)?;
        if got == 0 {
            return Ok(None);
        }
        if got < RECORD_PREFIX_SIZE {
            return Err(SortError::TruncatedRecord {
                path: self.path.clone(),
                declared: RECORD_PREFIX_SIZE as u64,
                available: got as u64,
            });
        }

        let target_id = u32::from_le_bytes(prefix[0..4].try_into().unwrap());
        let len = u32::from_le_bytes(prefix[4..8].try_into().unwrap()) as u64;

        // take() + read_to_end grows the buffer as bytes arrive, so a corrupt
        // length cannot force a huge up-front allocation.
        let mut payload = Vec::new();
        let available = (&mut self.reader).take(len).read_to_end(&mut payload)? as u64;
        if available < len {
            return Err(SortError::TruncatedRecord {
                path: self.path.clone(),
                declared: len,
                available,
            });
        }

        Ok(Some(GroupRecord { target_id, payload }))
    }
}

impl<R: Read> Iterator for GroupFileReader<R> {
    type Item = Result<GroupRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_record().transpose()
    }
}

/// Fill `buf`, retrying interrupted reads. Short count only at EOF.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        match reader.read(&mut buf[total..]) {
            Ok(0) => break,
            Ok(n) => total += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(total)
}

// ── Tests ──────────────────────────────────────────────────────────
