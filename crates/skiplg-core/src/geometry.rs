//! Row numbering and skip-pointer geometry: skip counts, linkage, skip
//! paths, and stitching (spec.md §4.1).

use std::collections::BTreeSet;

use crate::error::{Result, SkipLedgerError};

/// Row 0 is the virtual sentinel row; it has no skip count of its own.
pub const ROW_ZERO: u64 = 0;

/// Upper bound on `skipCount(rn)` for any row number representable here.
pub const MAX_SKIP_COUNT: u32 = 63;

/// Maximum number of rows a single [`crate::Path`]-like structure may hold
/// (spec.md §6).
pub const MAX_ROWS_PER_PATH: usize = 65_536;

/// `skipCount(rn) = 1 + trailing_zero_bits(rn)` for `rn >= 1`.
///
/// # Panics
/// Panics if `rn == 0`; row 0 is virtual and has no skip count.
#[inline]
#[must_use]
pub fn skip_count(rn: u64) -> u32 {
    assert!(rn >= 1, "skip_count is undefined for row 0");
    1 + rn.trailing_zeros()
}

/// The offsets `2^level` a row at `rn` references, ordered to match the
/// levels-pointer array layout: index 0 is the deepest level
/// (`level = skipCount(rn) - 1`, the largest offset), the last index is
/// level 0 (offset 1).
#[must_use]
pub fn level_offsets(rn: u64) -> Vec<u64> {
    let sc = skip_count(rn);
    (0..sc).rev().map(|level| 1u64 << level).collect()
}

/// The row numbers referenced by the row at `rn`, in the same (deepest
/// first) order as [`level_offsets`].
#[must_use]
pub fn references(rn: u64) -> Vec<u64> {
    level_offsets(rn).into_iter().map(|off| rn - off).collect()
}

/// The row number referenced at a specific `level` (0 = nearest
/// predecessor).
///
/// # Errors
/// Returns [`SkipLedgerError::OutOfBounds`] if `level >= skipCount(rn)`.
pub fn reference_at_level(rn: u64, level: u32) -> Result<u64> {
    let sc = skip_count(rn);
    if level >= sc {
        return Err(SkipLedgerError::out_of_bounds(format!(
            "level {level} out of range for rn={rn} (skipCount={sc})"
        )));
    }
    Ok(rn - (1u64 << level))
}

/// The array index (within the levels-pointer full vector) that corresponds
/// to `level`.
#[inline]
#[must_use]
pub fn level_to_index(skip_count: u32, level: u32) -> usize {
    (skip_count - 1 - level) as usize
}

/// The level number that corresponds to array index `index`.
#[inline]
#[must_use]
pub fn index_to_level(skip_count: u32, index: usize) -> u32 {
    skip_count - 1 - index as u32
}

/// `true` iff `a` and `b` are linked: either equal (reflexive), or, writing
/// `lo = min(a,b)`, `hi = max(a,b)`, `hi - lo` is a power of two with
/// `log2(hi - lo) < skipCount(hi)`.
#[must_use]
pub fn linked(a: u64, b: u64) -> bool {
    if a == b {
        return true;
    }
    let (lo, hi) = if a < b { (a, b) } else { (b, a) };
    let gap = hi - lo;
    if !gap.is_power_of_two() {
        return false;
    }
    let level = gap.trailing_zeros();
    level < skip_count(hi)
}

/// The unique shortest ascending row-number sequence from `lo` to `hi`
/// (inclusive) such that every adjacent pair is linked.
///
/// Greedy: starting at `hi`, repeatedly descend by the largest offset that
/// does not undershoot `lo`.
///
/// # Errors
/// Returns [`SkipLedgerError::InvalidArgument`] if `lo > hi`.
pub fn skip_path_numbers(lo: u64, hi: u64) -> Result<Vec<u64>> {
    if lo > hi {
        return Err(SkipLedgerError::invalid(format!(
            "skip_path_numbers: lo={lo} > hi={hi}"
        )));
    }
    let mut path = vec![hi];
    let mut cur = hi;
    while cur > lo {
        let sc = skip_count(cur);
        let mut chosen = None;
        for level in (0..sc).rev() {
            let off = 1u64 << level;
            if off <= cur && cur - off >= lo {
                chosen = Some(off);
                break;
            }
        }
        let off = chosen.ok_or_else(|| {
            SkipLedgerError::invalid(format!("no valid descent from {cur} toward {lo}"))
        })?;
        cur -= off;
        path.push(cur);
    }
    path.reverse();
    Ok(path)
}

/// Minimal-length filling of an ascending row-number list so that every
/// adjacent pair is linked, interleaving skip-path rows across any gap that
/// is not itself a direct link.
///
/// # Errors
/// Returns [`SkipLedgerError::InvalidArgument`] if `rns` is empty or not
/// strictly ascending.
pub fn stitch(rns: &[u64]) -> Result<Vec<u64>> {
    if rns.is_empty() {
        return Err(SkipLedgerError::invalid("stitch: empty row-number list"));
    }
    for w in rns.windows(2) {
        if w[0] >= w[1] {
            return Err(SkipLedgerError::invalid(
                "stitch: row numbers must be strictly ascending",
            ));
        }
    }
    let mut out = vec![rns[0]];
    for w in rns.windows(2) {
        let (p, r) = (w[0], w[1]);
        if linked(p, r) {
            out.push(r);
        } else {
            let seg = skip_path_numbers(p, r)?;
            out.extend(seg.into_iter().skip(1));
        }
    }
    Ok(out)
}

/// The inverse of [`stitch`]: the minimal ascending subset `S` of a fully
/// linked ascending list `l` such that `stitch(S) == l`.
///
/// Greedily finds, from each kept row, the farthest later row whose
/// skip-path exactly reproduces the intervening rows of `l`.
///
/// # Errors
/// Returns [`SkipLedgerError::InvalidArgument`] if `l` is empty, not
/// strictly ascending, or any adjacent pair is not linked.
pub fn stitch_compress(l: &[u64]) -> Result<Vec<u64>> {
    if l.is_empty() {
        return Err(SkipLedgerError::invalid("stitch_compress: empty list"));
    }
    for w in l.windows(2) {
        if w[0] >= w[1] || !linked(w[0], w[1]) {
            return Err(SkipLedgerError::invalid(
                "stitch_compress: input must be ascending and fully linked",
            ));
        }
    }
    let mut kept = vec![l[0]];
    let mut i = 0usize;
    while i < l.len() - 1 {
        let mut best = i + 1;
        for j in (i + 1..l.len()).rev() {
            let sp = skip_path_numbers(l[i], l[j])?;
            if sp.as_slice() == &l[i..=j] {
                best = j;
                break;
            }
        }
        kept.push(l[best]);
        i = best;
    }
    Ok(kept)
}

/// Attempt to build a stitched path from `targets[0]` to `targets.last()`,
/// visiting every entry of `targets` in order, using only row numbers
/// present in `known`.
///
/// Returns `None` if any target is missing from `known`, or if no linked
/// descent within `known` bridges a gap between two consecutive targets.
///
/// This is a greedy, largest-jump-first search, not an exhaustive one: it
/// will find a path whenever `known` is itself a stitch-closed or
/// skip-path-shaped set (the common case for a row bag backing a ledger),
/// but is not guaranteed complete for arbitrary subsets of linked rows.
#[must_use]
pub fn stitch_path(known: &BTreeSet<u64>, targets: &[u64]) -> Option<Vec<u64>> {
    if targets.is_empty() || !known.contains(&targets[0]) {
        return None;
    }
    let mut out = vec![targets[0]];
    for w in targets.windows(2) {
        let (p, r) = (w[0], w[1]);
        if !known.contains(&r) {
            return None;
        }
        if linked(p, r) {
            out.push(r);
            continue;
        }
        let seg = stitch_path_segment(known, p, r)?;
        out.extend(seg.into_iter().skip(1));
    }
    Some(out)
}

fn stitch_path_segment(known: &BTreeSet<u64>, lo: u64, hi: u64) -> Option<Vec<u64>> {
    let mut path = vec![hi];
    let mut cur = hi;
    while cur > lo {
        let sc = skip_count(cur);
        let mut next = None;
        for level in (0..sc).rev() {
            let off = 1u64 << level;
            if off > cur {
                continue;
            }
            let cand = cur - off;
            if cand >= lo && known.contains(&cand) {
                next = Some(cand);
                break;
            }
        }
        cur = next?;
        path.push(cur);
    }
    path.reverse();
    Some(path)
}

/// `true` iff `rn` is condensable: its levels pointer can be collapsed to a
/// single level plus a funnel. `skipCount(rn) > 2 && rn != 4` per spec.md §3.
#[must_use]
pub fn is_condensable(rn: u64) -> bool {
    rn != 4 && skip_count(rn) > 2
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn skip_count_matches_trailing_zeros() {
        for rn in 1u64..=4096 {
            assert_eq!(skip_count(rn), 1 + rn.trailing_zeros());
        }
    }

    #[test]
    fn linkage_is_reflexive_and_symmetric() {
        for a in 0u64..64 {
            assert!(linked(a, a));
            for b in 0u64..64 {
                assert_eq!(linked(a, b), linked(b, a));
            }
        }
    }

    #[test]
    fn row_one_references_only_row_zero() {
        assert_eq!(references(1), vec![0]);
    }

    #[test]
    fn power_of_two_deepest_reference_is_zero() {
        for k in 0u32..10 {
            let rn = 1u64 << k;
            let refs = references(rn);
            assert_eq!(*refs.first().unwrap(), 0);
        }
    }

    #[test]
    fn skip_path_numbers_shape() {
        assert_eq!(skip_path_numbers(1, 8).unwrap(), vec![1, 2, 4, 8]);
        assert_eq!(skip_path_numbers(1, 1).unwrap(), vec![1]);
    }

    #[test]
    fn stitch_contains_original_elements() {
        let l = vec![1u64, 8, 9];
        let stitched = stitch(&l).unwrap();
        for x in &l {
            assert!(stitched.contains(x));
        }
        // idempotent on an already-linked list
        assert_eq!(stitch(&stitched).unwrap(), stitched);
    }

    #[test]
    fn stitch_compress_round_trip() {
        let l = skip_path_numbers(1, 37).unwrap();
        let compressed = stitch_compress(&l).unwrap();
        assert_eq!(stitch(&compressed).unwrap(), l);
    }

    proptest! {
        #[test]
        fn prop_skip_count_identity(rn in 1u64..1_000_000) {
            prop_assert_eq!(skip_count(rn), 1 + rn.trailing_zeros());
        }

        #[test]
        fn prop_stitch_compress_round_trip(hi in 2u64..5000) {
            let l = skip_path_numbers(1, hi).unwrap();
            let c = stitch_compress(&l).unwrap();
            prop_assert_eq!(stitch(&c).unwrap(), l);
        }

        #[test]
        fn prop_linkage_symmetry(a in 0u64..2000, b in 0u64..2000) {
            prop_assert_eq!(linked(a, b), linked(b, a));
        }
    }
}
