//! Cross-combinator invariants for [`Path`].
//!
//! These tests treat the forward-scan validator in `Path::new` as
//! authoritative and check that the combinators built on top of it
//! (`compress`, `sub_path`, `append_tail`, `skip_path`) never change what a
//! row's hash *means*, only how compactly it is represented.

use proptest::prelude::*;
use skiplg_core::geometry;
use skiplg_core::hash::{Hash, SENTINEL};
use skiplg_core::levels::LevelsPointer;
use skiplg_core::row::Row;
use skiplg_path::Path;
use std::collections::BTreeMap;

fn build_chain(n: u64) -> Vec<Row> {
    let mut hashes: BTreeMap<u64, Hash> = BTreeMap::new();
    hashes.insert(0, SENTINEL);
    let mut rows = Vec::new();
    for rn in 1..=n {
        let mut input = [0u8; 32];
        input[0] = rn as u8;
        input[1] = (rn >> 8) as u8;
        let refs = geometry::references(rn);
        let prev: Vec<Hash> = refs.iter().map(|r| hashes[r]).collect();
        let lp = LevelsPointer::full(rn, prev).unwrap();
        let row = Row::new(rn, input, lp).unwrap();
        hashes.insert(rn, row.hash());
        rows.push(row);
    }
    rows
}

prop_compose! {
    fn arb_chain_len()(n in 1u64..=64) -> u64 { n }
}

proptest! {
    #![proptest_config(ProptestConfig { cases: 48, .. ProptestConfig::default() })]

    /// Compressing a path never changes its last row's hash, and always
    /// yields a fully compressed path.
    #[test]
    fn compress_is_hash_preserving(n in arb_chain_len()) {
        let path = Path::new(build_chain(n)).unwrap();
        let compressed = path.compress().unwrap();
        prop_assert_eq!(compressed.last().hash(), path.last().hash());
        prop_assert!(compressed.is_compressed());
        prop_assert_eq!(compressed.lo(), path.lo());
        prop_assert_eq!(compressed.hi(), path.hi());
    }

    /// Any `sub_path(a, b)` with both endpoints present reproduces exactly
    /// the rows the full path has for that range, in the same order.
    #[test]
    fn sub_path_is_a_faithful_restriction(n in 2u64..=64) {
        let path = Path::new(build_chain(n)).unwrap();
        let nums = path.row_numbers();
        prop_assume!(nums.len() >= 2);
        let from = nums[0];
        let to = nums[nums.len() - 1];
        let sub = path.sub_path(from, to).unwrap();
        prop_assert_eq!(sub.row_numbers(), path.row_numbers());
        prop_assert_eq!(sub.last().hash(), path.last().hash());
    }

    /// `head_path(rn).append_tail(tail_path(rn))` reconstructs the original
    /// path's last-row hash for every split point present as a row.
    #[test]
    fn splitting_and_rejoining_preserves_the_state_hash(n in 4u64..=64) {
        let path = Path::new(build_chain(n)).unwrap();
        let mid = path.row_numbers()[path.row_numbers().len() / 2];
        let head = path.head_path(mid).unwrap();
        let tail = path.tail_path(mid).unwrap();
        let rejoined = head.append_tail(&tail).unwrap();
        prop_assert_eq!(rejoined.last().hash(), path.last().hash());
        prop_assert_eq!(rejoined.hi(), path.hi());
    }

    /// The skip path of any chain is never longer than the chain itself,
    /// and always shares the same endpoints and terminal hash.
    #[test]
    fn skip_path_is_no_longer_than_the_source(n in arb_chain_len()) {
        let path = Path::new(build_chain(n)).unwrap();
        let sp = path.skip_path().unwrap();
        prop_assert!(sp.length() <= path.length());
        prop_assert_eq!(sp.lo(), path.lo());
        prop_assert_eq!(sp.hi(), path.hi());
        prop_assert_eq!(sp.last().hash(), path.last().hash());
    }
}
