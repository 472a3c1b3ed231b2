//! Cross-module invariants for the ledger engine.
//!
//! These tests treat `CompactSkipLedger` as authoritative for row assembly
//! and check that batching, caching, and path derivation never change what
//! a row's hash means relative to the one-row-at-a-time baseline.

use proptest::prelude::*;
use skiplg_storage::{CacheConfig, CompactSkipLedger};

fn hash_for(i: u64) -> [u8; 32] {
    let mut h = [0u8; 32];
    h[0] = i as u8;
    h[1] = (i >> 8) as u8;
    h[2] = (i >> 16) as u8;
    h
}

prop_compose! {
    fn arb_batch_len()(n in 1usize..=64) -> usize { n }
}

proptest! {
    #![proptest_config(ProptestConfig { cases: 48, .. ProptestConfig::default() })]

    /// Appending rows one at a time and appending the same rows as a single
    /// batch produce identical row hashes throughout.
    #[test]
    fn batched_and_sequential_append_agree(n in arb_batch_len()) {
        let sequential = CompactSkipLedger::new();
        for i in 1..=n as u64 {
            sequential.append_row(hash_for(i)).unwrap();
        }

        let batched = CompactSkipLedger::new();
        let mut concatenated = Vec::new();
        for i in 1..=n as u64 {
            concatenated.extend_from_slice(&hash_for(i));
        }
        batched.append_rows(&concatenated).unwrap();

        prop_assert_eq!(sequential.size(), batched.size());
        for rn in 1..=n as u64 {
            prop_assert_eq!(sequential.row_hash(rn).unwrap(), batched.row_hash(rn).unwrap());
        }
        prop_assert_eq!(sequential.state_hash().unwrap(), batched.state_hash().unwrap());
    }

    /// A cached ledger's row hashes agree with an uncached ledger fed the
    /// same inputs, regardless of lookup order.
    #[test]
    fn cache_never_changes_the_answer(n in arb_batch_len()) {
        let plain = CompactSkipLedger::new();
        let cached = CompactSkipLedger::with_cache(CacheConfig::default());
        for i in 1..=n as u64 {
            plain.append_row(hash_for(i)).unwrap();
            cached.append_row(hash_for(i)).unwrap();
        }
        // Look up in reverse order to exercise the cache against rows it
        // has not yet seen in this direction.
        for rn in (1..=n as u64).rev() {
            prop_assert_eq!(plain.row_hash(rn).unwrap(), cached.row_hash(rn).unwrap());
        }
    }

    /// The ledger's state path always spans the whole ledger and its
    /// terminal hash matches `state_hash`.
    #[test]
    fn state_path_spans_the_whole_ledger(n in arb_batch_len()) {
        let ledger = CompactSkipLedger::new();
        for i in 1..=n as u64 {
            ledger.append_row(hash_for(i)).unwrap();
        }
        let path = ledger.state_path().unwrap().unwrap();
        prop_assert_eq!(path.lo(), 1);
        prop_assert_eq!(path.hi(), n as u64);
        prop_assert_eq!(path.get_row_hash(n as u64).unwrap(), ledger.state_hash().unwrap());
    }
}

/// Trimming the ledger and re-appending produces a ledger indistinguishable
/// (by row hash) from one that was only ever appended to the trimmed size.
#[test]
fn trim_then_reappend_matches_a_ledger_built_to_that_size() {
    let full = CompactSkipLedger::new();
    for i in 1..=10u64 {
        full.append_row(hash_for(i)).unwrap();
    }
    full.trim_size(6).unwrap();
    for i in 7..=10u64 {
        full.append_row(hash_for(i + 100)).unwrap();
    }

    let reference = CompactSkipLedger::new();
    for i in 1..=6u64 {
        reference.append_row(hash_for(i)).unwrap();
    }
    for i in 7..=10u64 {
        reference.append_row(hash_for(i + 100)).unwrap();
    }

    for rn in 1..=10 {
        assert_eq!(full.row_hash(rn).unwrap(), reference.row_hash(rn).unwrap());
    }
}
