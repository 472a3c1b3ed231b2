//! A row, and the storage-agnostic `RowBag` interface that [`crate::Path`]
//! and the pack crates consume to look rows up (spec.md §4.3).

use crate::error::{Result, SkipLedgerError};
use crate::geometry;
use crate::hash::{self, Hash, SENTINEL};
use crate::levels::LevelsPointer;

/// `(rn, inputHash(rn), levelsPointer(rn))` plus its derived row hash.
///
/// Rows are immutable value types: the row hash is computed once at
/// construction and validated against `levelsPointer.rn()`, so there is no
/// separate "lazy" vs. "memoizing" row type the way the original
/// object-oriented design has — a bag-backed row simply resolves its
/// levels pointer once, up front, from the bag (see [`RowBag::get_row`]).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Row {
    no: u64,
    input_hash: Hash,
    levels_pointer: LevelsPointer,
    hash: Hash,
}

impl Row {
    /// Construct a row, computing and caching its hash.
    ///
    /// # Errors
    /// [`SkipLedgerError::InvalidArgument`] if `no` does not match
    /// `levels_pointer.rn()`; propagates hash errors from a malformed
    /// condensed funnel.
    pub fn new(no: u64, input_hash: Hash, levels_pointer: LevelsPointer) -> Result<Self> {
        if levels_pointer.rn() != no {
            return Err(SkipLedgerError::invalid_at(
                format!(
                    "levels pointer is for rn={}, not {no}",
                    levels_pointer.rn()
                ),
                no,
            ));
        }
        let levels_hash = levels_pointer.hash()?;
        let hash = hash::row_hash(&input_hash, &levels_hash);
        Ok(Self {
            no,
            input_hash,
            levels_pointer,
            hash,
        })
    }

    /// The virtual row 0: no input, hash is the sentinel.
    #[must_use]
    pub fn zero() -> RowZero {
        RowZero
    }

    /// 1-based row number.
    #[must_use]
    pub fn no(&self) -> u64 {
        self.no
    }

    /// The row's own input hash.
    #[must_use]
    pub fn input_hash(&self) -> Hash {
        self.input_hash
    }

    /// The row's levels pointer.
    #[must_use]
    pub fn levels_pointer(&self) -> &LevelsPointer {
        &self.levels_pointer
    }

    /// `rowHash(rn) = H(inputHash(rn) ‖ levelsHash(rn))`, precomputed.
    #[must_use]
    pub fn hash(&self) -> Hash {
        self.hash
    }

    /// Hash of a row number covered by this row (including itself).
    #[must_use]
    pub fn hash_of(&self, other_rn: u64) -> Option<Hash> {
        if other_rn == self.no {
            return Some(self.hash);
        }
        if other_rn == 0 {
            return None;
        }
        self.levels_pointer.row_hash(other_rn)
    }

    /// Hash at a given level, if carried directly by this row's pointer.
    #[must_use]
    pub fn prev_hash(&self, level: u32) -> Option<Hash> {
        self.levels_pointer.level_hash(level)
    }

    /// `true` if this row's levels pointer is condensed.
    #[must_use]
    pub fn is_condensed(&self) -> bool {
        self.levels_pointer.is_condensed()
    }

    /// `true` if this row is compliant with the "compressed path" rule:
    /// always-all-levels rows trivially qualify; condensable rows qualify
    /// only when actually condensed.
    #[must_use]
    pub fn is_compressed(&self) -> bool {
        !geometry::is_condensable(self.no) || self.is_condensed()
    }

    /// `true` if this row carries every level (the full form).
    #[must_use]
    pub fn has_all_levels(&self) -> bool {
        !self.is_condensed()
    }
}

/// Marker type for the virtual row 0: no content, hash is the sentinel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RowZero;

impl RowZero {
    /// Row 0's hash is always the sentinel.
    #[must_use]
    pub fn hash(self) -> Hash {
        SENTINEL
    }
}

/// Storage-agnostic row lookup interface consumed by [`crate::Path`] and the
/// pack crates.
pub trait RowBag {
    /// Input hash of a *full* row this bag owns. `None` if `rn` is not a
    /// full row in this bag.
    fn input_hash(&self, rn: u64) -> Option<Hash>;

    /// Hash of any row number in this bag's coverage. `rn == 0` always
    /// yields [`SENTINEL`].
    fn row_hash(&self, rn: u64) -> Option<Hash>;

    /// Ascending full row numbers this bag owns.
    fn full_row_numbers(&self) -> Vec<u64>;

    /// Funnel for `rn` condensed at `level`, if this bag stores condensed
    /// rows. Returns `None` for full (uncondensed) bags.
    fn get_funnel(&self, rn: u64, level: u32) -> Option<Vec<Hash>> {
        let _ = (rn, level);
        None
    }

    /// Resolve a full row from this bag, choosing the condensed form when
    /// the bag supplies a funnel at the level that targets `target_level`.
    ///
    /// # Errors
    /// [`SkipLedgerError::InvalidArgument`] if `rn` is not a full row here,
    /// or a referenced hash is missing from the bag.
    fn get_row_condensed_to(&self, rn: u64, target_level: Option<u32>) -> Result<Row> {
        let input_hash = self
            .input_hash(rn)
            .ok_or_else(|| SkipLedgerError::invalid_at(format!("no full row at rn={rn}"), rn))?;

        let pointer = if let Some(level) = target_level {
            if let Some(funnel) = self.get_funnel(rn, level) {
                let ref_rn = geometry::reference_at_level(rn, level)?;
                let level_hash = self.row_hash(ref_rn).ok_or_else(|| {
                    SkipLedgerError::invalid_at(
                        format!("bag missing hash for referenced rn={ref_rn}"),
                        rn,
                    )
                })?;
                LevelsPointer::condensed(rn, level, level_hash, funnel)?
            } else {
                self.full_pointer(rn)?
            }
        } else {
            self.full_pointer(rn)?
        };

        Row::new(rn, input_hash, pointer)
    }

    /// Resolve a full row in its full (uncondensed) form.
    ///
    /// # Errors
    /// As [`RowBag::get_row_condensed_to`].
    fn get_row(&self, rn: u64) -> Result<Row> {
        self.get_row_condensed_to(rn, None)
    }

    fn full_pointer(&self, rn: u64) -> Result<LevelsPointer> {
        let refs = geometry::references(rn);
        let mut hashes = Vec::with_capacity(refs.len());
        for r in refs {
            let h = self.row_hash(r).ok_or_else(|| {
                SkipLedgerError::invalid_at(format!("bag missing hash for referenced rn={r}"), rn)
            })?;
            hashes.push(h);
        }
        LevelsPointer::full(rn, hashes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    struct MapBag {
        inputs: BTreeMap<u64, Hash>,
        hashes: BTreeMap<u64, Hash>,
    }

    impl RowBag for MapBag {
        fn input_hash(&self, rn: u64) -> Option<Hash> {
            self.inputs.get(&rn).copied()
        }
        fn row_hash(&self, rn: u64) -> Option<Hash> {
            if rn == 0 {
                return Some(SENTINEL);
            }
            self.hashes.get(&rn).copied()
        }
        fn full_row_numbers(&self) -> Vec<u64> {
            self.inputs.keys().copied().collect()
        }
    }

    fn build_chain(n: u64) -> MapBag {
        let mut inputs = BTreeMap::new();
        let mut hashes = BTreeMap::new();
        hashes.insert(0, SENTINEL);
        for rn in 1..=n {
            let mut input = [0u8; 32];
            input[0] = rn as u8;
            inputs.insert(rn, input);
            let refs = geometry::references(rn);
            let prev: Vec<Hash> = refs.iter().map(|r| hashes[r]).collect();
            let lp = LevelsPointer::full(rn, prev).unwrap();
            let row = Row::new(rn, input, lp).unwrap();
            hashes.insert(rn, row.hash());
        }
        MapBag { inputs, hashes }
    }

    #[test]
    fn row_one_hash_uses_sentinel() {
        let bag = build_chain(1);
        let row = bag.get_row(1).unwrap();
        assert_eq!(row.hash(), hash::row_hash(&row.input_hash(), &SENTINEL));
    }

    #[test]
    fn bag_derived_row_matches_directly_built_row() {
        let bag = build_chain(16);
        for rn in 1..=16 {
            let row = bag.get_row(rn).unwrap();
            assert_eq!(row.hash(), bag.row_hash(rn).unwrap());
        }
    }
}
