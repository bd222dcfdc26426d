//! System resource detection and memory-based tuning for a remap run.
//!
//! Peak memory is the staging buffer (`flush_size` records) during the scan
//! and one bucket (`group_size` target ids) during replay. Both knobs are
//! derived from a budget carved out of available RAM and the source's
//! average payload size. Stateless: each `auto_tune()` re-probes the system.

use sysinfo::{MemoryRefreshKind, RefreshKind, System};

use crate::remap::types::{RemapConfig, DEFAULT_FLUSH_SIZE, DEFAULT_GROUP_SIZE};

// ── Constants ───────────────────────────────────────────────────────

const MB: u64 = 1024 * 1024;
const GB: u64 = 1024 * 1024 * 1024;

/// Budget floor (64 MB).
const BUDGET_MIN: u64 = 64 * MB;

/// Budget ceiling (2 GB).
const BUDGET_MAX: u64 = 2 * GB;

/// Fraction of available memory given to one phase.
const BUDGET_FRACTION: f64 = 0.10;

/// Per-record bookkeeping on top of the payload (Vec header, id, map node).
const RECORD_OVERHEAD: u64 = 64;

/// Bounds for derived record counts.
const RECORDS_MIN: u64 = 1_000;
const RECORDS_MAX: u64 = 10_000_000;

// ── SystemResources ─────────────────────────────────────────────────

/// Snapshot of detected memory.
#[derive(Debug, Clone)]
pub struct SystemResources {
    /// Total physical RAM in bytes.
    pub total_memory_bytes: u64,
    /// Available (re-usable) RAM in bytes.
    pub available_memory_bytes: u64,
}

impl SystemResources {
    /// Probe the current system for RAM information.
    pub fn detect() -> Self {
        let mut sys = System::new_with_specifics(
            RefreshKind::new().with_memory(MemoryRefreshKind::everything()),
        );
        sys.refresh_memory();

        Self {
            total_memory_bytes: sys.total_memory(),
            available_memory_bytes: sys.available_memory(),
        }
    }
}

// ── TuningProfile ───────────────────────────────────────────────────

/// Flush and group sizes computed from system resources.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TuningProfile {
    /// Staged records before a flush.
    pub flush_size: usize,
    /// Target ids per bucket.
    pub group_size: u32,
    /// Memory budget per phase, in bytes.
    pub budget_bytes: u64,
}

impl TuningProfile {
    /// Compute a profile from detected resources.
    ///
    /// Heuristics:
    /// - `budget_bytes`: `clamp(available * 0.10, 64 MB, 2 GB)`.
    /// - `flush_size` = `group_size` = `budget / (avg_payload + 64)`,
    ///   clamped to `[1_000, 10_000_000]`.
    ///
    /// With a bijective permutation one bucket holds at most `group_size`
    /// records, the same bound as the staging buffer.
    pub fn from_resources(res: &SystemResources, avg_payload_bytes: u64) -> Self {
        let raw = (res.available_memory_bytes as f64 * BUDGET_FRACTION) as u64;
        let budget_bytes = raw.clamp(BUDGET_MIN, BUDGET_MAX);

        let per_record = avg_payload_bytes.saturating_add(RECORD_OVERHEAD);
        let records = (budget_bytes / per_record).clamp(RECORDS_MIN, RECORDS_MAX);

        Self {
            flush_size: records as usize,
            group_size: records as u32,
            budget_bytes,
        }
    }

    /// Apply the sizes to a config, keeping its other settings.
    pub fn apply(&self, config: RemapConfig) -> RemapConfig {
        RemapConfig {
            flush_size: self.flush_size,
            group_size: self.group_size,
            ..config
        }
    }

    /// Probe the system and derive a profile for `avg_payload_bytes`.
    pub fn auto_tune(avg_payload_bytes: u64) -> Self {
        let resources = SystemResources::detect();
        Self::from_resources(&resources, avg_payload_bytes)
    }
}

impl Default for TuningProfile {
    /// Fixed sizes matching `RemapConfig::default()`.
    fn default() -> Self {
        Self {
            flush_size: DEFAULT_FLUSH_SIZE,
            group_size: DEFAULT_GROUP_SIZE,
            budget_bytes: BUDGET_MIN,
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    /// Helper: build `SystemResources` with explicit values (bypasses detection).
    fn make_resources(total_gb: f64, available_gb: f64) -> SystemResources {
        SystemResources {
            total_memory_bytes: (total_gb * GB as f64) as u64,
            available_memory_bytes: (available_gb * GB as f64) as u64,
        }
    }

    #[test]
    fn test_system_resources_detection() {
        let res = SystemResources::detect();
        assert!(res.total_memory_bytes > 0, "total memory must be positive");
    }

    #[test]
    fn test_budget_floor() {
        // 256 MB available -> 10% is ~25 MB, floored at 64 MB
        let res = make_resources(1.0, 0.25);
        let profile = TuningProfile::from_resources(&res, 960);
        assert_eq!(profile.budget_bytes, 64 * MB);
        assert_eq!(profile.flush_size, (64 * MB / 1024) as usize);
        assert_eq!(profile.group_size, (64 * MB / 1024) as u32);
    }

    #[test]
    fn test_budget_ceiling() {
        let res = make_resources(512.0, 256.0);
        let profile = TuningProfile::from_resources(&res, 960);
        assert_eq!(profile.budget_bytes, 2 * GB);
        assert_eq!(profile.flush_size, (2 * GB / 1024) as usize);
    }

    #[test]
    fn test_record_count_bounds() {
        let res = make_resources(64.0, 32.0);

        // Huge documents: never fewer than 1_000 per flush
        let big = TuningProfile::from_resources(&res, 512 * MB);
        assert_eq!(big.flush_size, 1_000);

        // Tiny documents: capped at 10M
        let tiny = TuningProfile::from_resources(&res, 0);
        assert_eq!(tiny.flush_size, 10_000_000);
        assert_eq!(tiny.group_size, 10_000_000);
    }

    #[test]
    fn test_apply_keeps_flags() {
        let config = RemapConfig {
            keep_group_files: true,
            ..RemapConfig::default()
        };
        let profile = TuningProfile {
            flush_size: 5,
            group_size: 7,
            budget_bytes: 0,
        };
        let tuned = profile.apply(config);
        assert_eq!(tuned.flush_size, 5);
        assert_eq!(tuned.group_size, 7);
        assert!(tuned.keep_group_files);
    }

    #[test]
    fn test_tuning_profile_default() {
        let profile = TuningProfile::default();
        assert_eq!(profile.flush_size, 100_000);
        assert_eq!(profile.group_size, 100_000);
    }
}
