//! Progress hooks for a remap run.
//!
//! The driver reports through `RemapObserver` instead of printing, so the
//! engine itself never touches the console. All hooks default to no-ops.

use std::io::Write;

use tracing::{debug, info};

use crate::remap::types::{BucketReplay, FlushSummary, RemapStats};

/// Receives progress events from the driver, in phase order.
pub trait RemapObserver {
    /// Scan is about to start; `total` is the source document count.
    fn on_start(&mut self, _total: u64) {}

    /// A source record was staged. `buffered_bytes` is the staged payload size.
    fn on_record_read(&mut self, _read: u64, _buffered_bytes: usize) {}

    /// The staging buffer was flushed to group files.
    fn on_flush(&mut self, _summary: &FlushSummary) {}

    /// Write phase finished; replay is about to start.
    fn on_grouping_complete(&mut self, _records_grouped: u64, _max_bucket: Option<u32>) {}

    /// A record was written to the destination.
    fn on_record_written(&mut self, _written: u64) {}

    /// A bucket finished replaying.
    fn on_bucket_replayed(&mut self, _replay: &BucketReplay) {}

    /// The run completed.
    fn on_finish(&mut self, _stats: &RemapStats) {}
}

/// Ignores every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl RemapObserver for NoopObserver {}

// ── TracingObserver ────────────────────────────────────────────────

/// Emits structured `tracing` events at phase boundaries.
#[derive(Debug, Default)]
pub struct TracingObserver {
    flushes: u32,
}

impl TracingObserver {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RemapObserver for TracingObserver {
    fn on_start(&mut self, total: u64) {
        info!(total, "remap started");
    }

    fn on_flush(&mut self, summary: &FlushSummary) {
        self.flushes += 1;
        debug!(
            flush = self.flushes,
            records = summary.records,
            payload_bytes = summary.payload_bytes,
            buckets = summary.buckets_touched,
            "staging buffer flushed"
        );
    }

    fn on_grouping_complete(&mut self, records_grouped: u64, max_bucket: Option<u32>) {
        info!(records_grouped, ?max_bucket, "grouping complete");
    }

    fn on_bucket_replayed(&mut self, replay: &BucketReplay) {
        debug!(
            bucket = replay.bucket,
            written = replay.records_written,
            duplicates = replay.duplicates_overwritten,
            "bucket replayed"
        );
    }

    fn on_finish(&mut self, stats: &RemapStats) {
        info!(
            read = stats.records_read,
            written = stats.records_written,
            buckets = stats.buckets_replayed,
            flushes = stats.flushes,
            duplicates = stats.duplicates_overwritten,
            elapsed_ms = stats.elapsed.as_millis() as u64,
            "remap finished"
        );
    }
}

// ── ConsoleProgress ────────────────────────────────────────────────

/// Carriage-return progress line for interactive use.
///
/// Updates are throttled: the first 10 counts are always shown, after that
/// only counts where `(total - n) % 13 == 0`.
pub struct ConsoleProgress<W: Write> {
    out: W,
    label: String,
    total: u64,
    width: usize,
    read: u64,
    grouped: u64,
}

impl<W: Write> ConsoleProgress<W> {
    /// `label` prefixes the write-phase line (usually the source store name).
    pub fn new(out: W, label: impl Into<String>) -> Self {
        Self {
            out,
            label: label.into(),
            total: 0,
            width: 1,
            read: 0,
            grouped: 0,
        }
    }

    /// Consume the observer, returning the underlying writer.
    pub fn into_inner(self) -> W {
        self.out
    }

    fn should_report(&self, n: u64) -> bool {
        n <= 10 || self.total.saturating_sub(n) % 13 == 0
    }
}

impl<W: Write> RemapObserver for ConsoleProgress<W> {
    fn on_start(&mut self, total: u64) {
        self.total = total;
        self.width = total.max(1).to_string().len();
        let _ = writeln!(self.out, "{}", self.label);
    }

    fn on_record_read(&mut self, read: u64, buffered_bytes: usize) {
        self.read = read;
        if self.should_report(read) {
            let _ = write!(
                self.out,
                "\r{:>width$} read, {} grouped, out of {} ({}Mb buffered)     ",
                read,
                self.grouped,
                self.total,
                buffered_bytes / 1024 / 1024,
                width = self.width
            );
            let _ = self.out.flush();
        }
    }

    fn on_flush(&mut self, summary: &FlushSummary) {
        self.grouped += summary.records as u64;
        let _ = write!(
            self.out,
            "\r{:>width$} read, {} grouped, out of {}",
            self.read,
            self.grouped,
            self.total,
            width = self.width
        );
        let _ = self.out.flush();
    }

    fn on_grouping_complete(&mut self, records_grouped: u64, max_bucket: Option<u32>) {
        let groups = max_bucket.map_or(0, |b| b as u64 + 1);
        let _ = writeln!(self.out, "\n{} in {} groups", records_grouped, groups);
    }

    fn on_record_written(&mut self, written: u64) {
        if self.should_report(written) {
            let _ = write!(
                self.out,
                "\r{}: {:>width$} written, out of {}                    ",
                self.label,
                written,
                self.total,
                width = self.width
            );
            let _ = self.out.flush();
        }
    }

    fn on_finish(&mut self, stats: &RemapStats) {
        let _ = writeln!(self.out);
        if stats.duplicates_overwritten > 0 {
            let _ = writeln!(
                self.out,
                "{} records overwritten by duplicate target ids",
                stats.duplicates_overwritten
            );
        }
        let _ = self.out.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_console_progress_throttles_after_ten() {
        let mut progress = ConsoleProgress::new(Vec::new(), "src.db");
        progress.on_start(100);
        for n in 1..=100 {
            progress.on_record_read(n, 0);
        }
        let text = String::from_utf8(progress.into_inner()).unwrap();

        assert!(text.starts_with("src.db\n"));
        // 1..=10 always, then n with (100 - n) % 13 == 0: 22, 35, 48, 61, 74, 87, 100
        let updates = text.matches(" read, ").count();
        assert_eq!(updates, 17);
        assert!(text.contains("100 read, 0 grouped, out of 100 (0Mb buffered)"));
        assert!(!text.contains(" 11 read"));
    }

    #[test]
    fn test_console_progress_phases() {
        let mut progress = ConsoleProgress::new(Vec::new(), "docs");
        progress.on_start(3);
        progress.on_record_read(3, 2 * 1024 * 1024);
        progress.on_flush(&FlushSummary {
            records: 3,
            payload_bytes: 10,
            buckets_touched: 3,
            max_bucket: 3,
        });
        progress.on_grouping_complete(3, Some(3));
        progress.on_record_written(3);
        progress.on_finish(&RemapStats::default());
        let text = String::from_utf8(progress.into_inner()).unwrap();

        assert!(text.contains("3 read, 0 grouped, out of 3 (2Mb buffered)"));
        assert!(text.contains("3 read, 3 grouped, out of 3"));
        assert!(text.contains("3 in 4 groups"));
        assert!(text.contains("docs: 3 written, out of 3"));
        assert!(!text.contains("overwritten"));
    }

    #[test]
    fn test_noop_observer_accepts_everything() {
        let mut observer = NoopObserver;
        observer.on_start(1);
        observer.on_record_read(1, 1);
        observer.on_record_written(1);
        observer.on_finish(&RemapStats::default());
    }
}
