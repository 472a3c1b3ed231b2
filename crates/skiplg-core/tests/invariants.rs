//! Cross-module invariants for row geometry and hashing.
//!
//! These tests treat `geometry` as authoritative for linkage and stitching,
//! and check that `hash`'s funnel machinery agrees with a direct Merkle
//! root computation over the same leaves for every leaf position.

use proptest::prelude::*;
use skiplg_core::geometry;
use skiplg_core::hash;

prop_compose! {
    fn arb_leaves()(n in 1usize..=40) -> Vec<hash::Hash> {
        (0..n).map(|i| {
            let mut h = [0u8; 32];
            h[0] = i as u8;
            h[1] = (i >> 8) as u8;
            h
        }).collect()
    }
}

proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]

    /// A funnel built for any leaf position reconstructs the same root that
    /// a direct computation over the full leaf set produces.
    #[test]
    fn funnel_reconstructs_merkle_root(leaves in arb_leaves()) {
        let root = hash::merkle_root(&leaves);
        for (i, leaf) in leaves.iter().enumerate() {
            let funnel = hash::build_funnel(&leaves, i);
            prop_assert_eq!(funnel.len(), hash::funnel_length(leaves.len(), i));
            let rebuilt = hash::root_from_funnel(leaf, i, leaves.len(), &funnel)
                .expect("funnel length matches what build_funnel produced");
            prop_assert_eq!(rebuilt, root);
        }
    }

    /// `stitch` followed by `stitch_compress` recovers the original row
    /// number set whenever it was itself a minimal (farthest-jump) list.
    #[test]
    fn stitch_compress_is_a_left_inverse_of_stitch(rns in prop::collection::btree_set(1u64..=4096, 1..12)) {
        let rns: Vec<u64> = rns.into_iter().collect();
        let stitched = geometry::stitch(&rns);
        prop_assume!(stitched.is_ok());
        let stitched = stitched.unwrap();
        let compressed = geometry::stitch_compress(&stitched).unwrap();
        let restitched = geometry::stitch(&compressed).unwrap();
        prop_assert_eq!(restitched, stitched);
    }

    /// Linkage is symmetric: `linked(a, b) == linked(b, a)`.
    #[test]
    fn linked_is_symmetric(a in 1u64..=4096, b in 1u64..=4096) {
        prop_assert_eq!(geometry::linked(a, b), geometry::linked(b, a));
    }

    /// Every row is linked to itself.
    #[test]
    fn linked_is_reflexive(rn in 1u64..=1_000_000) {
        prop_assert!(geometry::linked(rn, rn));
    }
}

/// `skip_path_numbers` always starts at `lo`, ends at `hi`, and is strictly
/// ascending with every consecutive pair linked.
#[test]
fn skip_path_numbers_is_a_linked_ascending_chain() {
    for hi in 1u64..=64 {
        for lo in 1..=hi {
            let path = geometry::skip_path_numbers(lo, hi).unwrap();
            assert_eq!(*path.first().unwrap(), lo);
            assert_eq!(*path.last().unwrap(), hi);
            for w in path.windows(2) {
                assert!(w[0] < w[1]);
                assert!(geometry::linked(w[0], w[1]), "{} and {} must be linked", w[0], w[1]);
            }
        }
    }
}
