//! Property tests for the remap engine over in-memory stores.

use std::collections::BTreeMap;
use std::path::Path;

use docsort::{
    remap_store, MemoryStore, NoopObserver, PermutationReader, PermutationWriter, RemapConfig,
};
use proptest::prelude::*;
use tempfile::TempDir;

fn run(
    dir: &Path,
    source: &MemoryStore,
    permutation: &PermutationWriter,
    flush_size: usize,
    group_size: u32,
) -> MemoryStore {
    let perm_path = dir.join("order.perm");
    permutation.write_file(&perm_path).unwrap();
    let reader = PermutationReader::open(&perm_path).unwrap();

    let mut dest = MemoryStore::new();
    let config = RemapConfig {
        flush_size,
        group_size,
        ..RemapConfig::default()
    };
    remap_store(source, &reader, &dir.join("tmp"), &mut dest, config, &mut NoopObserver).unwrap();
    dest
}

fn snapshot(store: &MemoryStore) -> Vec<(u32, Vec<u8>)> {
    store.iter().map(|(id, p)| (id, p.to_vec())).collect()
}

/// Source with dense ids `1..=n`.
fn source_strategy() -> impl Strategy<Value = Vec<Vec<u8>>> {
    prop::collection::vec(prop::collection::vec(any::<u8>(), 0..24), 1..80)
}

fn dense(payloads: &[Vec<u8>]) -> MemoryStore {
    MemoryStore::from_documents(
        payloads
            .iter()
            .enumerate()
            .map(|(i, p)| (i as u32 + 1, p.clone())),
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    /// A bijection over `1..=n` moves every payload, byte for byte.
    #[test]
    fn bijection_moves_every_payload(
        payloads in source_strategy(),
        seed in prop::collection::vec(any::<f32>(), 80),
        flush_size in 1usize..16,
        group_size in 1u32..20,
    ) {
        let n = payloads.len();
        let permutation = PermutationWriter::from_scores(&seed[..n], false);
        let dir = TempDir::new().unwrap();
        let dest = run(dir.path(), &dense(&payloads), &permutation, flush_size, group_size);

        prop_assert_eq!(dest.len(), n);
        for (i, payload) in payloads.iter().enumerate() {
            let target = permutation.target_of(i as u32 + 1).unwrap();
            prop_assert_eq!(dest.get(target), Some(payload.as_slice()));
        }
        // Replay writes each bucket in ascending order, buckets ascending
        let log = dest.write_log().to_vec();
        let mut sorted = log.clone();
        sorted.sort_unstable();
        prop_assert_eq!(log, sorted);
    }

    /// Output does not depend on flush or group size.
    #[test]
    fn result_independent_of_tuning(
        payloads in source_strategy(),
        targets in prop::collection::vec(1u32..200, 80),
        a in (1usize..10, 1u32..50),
        b in (10usize..1000, 50u32..500),
    ) {
        let n = payloads.len();
        let permutation = PermutationWriter::from_mapping(targets[..n].to_vec());
        let source = dense(&payloads);

        let dir_a = TempDir::new().unwrap();
        let dir_b = TempDir::new().unwrap();
        let out_a = run(dir_a.path(), &source, &permutation, a.0, a.1);
        let out_b = run(dir_b.path(), &source, &permutation, b.0, b.1);

        prop_assert_eq!(snapshot(&out_a), snapshot(&out_b));
    }

    /// With colliding targets the record scanned last wins.
    #[test]
    fn duplicate_targets_last_scanned_wins(
        payloads in source_strategy(),
        targets in prop::collection::vec(1u32..12, 80),
        flush_size in 1usize..8,
        group_size in 1u32..6,
    ) {
        let n = payloads.len();
        let mapping = targets[..n].to_vec();

        let mut expected = BTreeMap::new();
        for (payload, &target) in payloads.iter().zip(&mapping) {
            expected.insert(target, payload.clone());
        }

        let permutation = PermutationWriter::from_mapping(mapping);
        let dir = TempDir::new().unwrap();
        let dest = run(dir.path(), &dense(&payloads), &permutation, flush_size, group_size);

        prop_assert_eq!(snapshot(&dest), expected.into_iter().collect::<Vec<_>>());
    }
}

#[test]
fn identity_reproduces_source() {
    let payloads: Vec<Vec<u8>> = (0..300u32).map(|i| i.to_le_bytes().repeat(i as usize % 5)).collect();
    let source = dense(&payloads);
    let dir = TempDir::new().unwrap();

    let dest = run(dir.path(), &source, &PermutationWriter::identity(300), 33, 40);
    assert_eq!(snapshot(&dest), snapshot(&source));
}
