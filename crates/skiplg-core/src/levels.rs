//! The levels pointer: a row's commitment to its skip-referenced
//! predecessors, in either full or condensed form (spec.md §4.2).

use crate::error::{Result, SkipLedgerError};
use crate::geometry::{self, is_condensable};
use crate::hash::{self, Hash};

/// A row's commitment to the rows it references.
///
/// `Full` carries every referenced hash; `Condensed` carries one level's
/// hash plus a Merkle funnel that, together, still reproduce the same
/// [`LevelsPointer::hash`] as the full form (spec.md invariant: condensed
/// equivalence).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LevelsPointer {
    /// `skipCount(rn)` hashes in reverse-level order (index 0 = deepest
    /// level).
    Full {
        /// Row number this pointer belongs to.
        rn: u64,
        /// Hashes of the referenced rows, deepest level first.
        prev_hashes: Vec<Hash>,
    },
    /// A single retained level plus the funnel needed to recompute the
    /// levels-merkle-hash without the other levels.
    Condensed {
        /// Row number this pointer belongs to.
        rn: u64,
        /// The retained level (0 = nearest predecessor).
        level: u32,
        /// Hash of the row referenced at `level`.
        level_hash: Hash,
        /// Merkle funnel from `level_hash` up to the levels-merkle-hash.
        funnel: Vec<Hash>,
    },
}

impl LevelsPointer {
    /// Build a full levels pointer from hashes in deepest-first order.
    ///
    /// # Errors
    /// Returns [`SkipLedgerError::InvalidArgument`] if `prev_hashes.len() !=
    /// skipCount(rn)`.
    pub fn full(rn: u64, prev_hashes: Vec<Hash>) -> Result<Self> {
        let sc = geometry::skip_count(rn) as usize;
        if prev_hashes.len() != sc {
            return Err(SkipLedgerError::invalid_at(
                format!(
                    "full levels pointer needs {sc} hashes, got {}",
                    prev_hashes.len()
                ),
                rn,
            ));
        }
        Ok(Self::Full { rn, prev_hashes })
    }

    /// Build a condensed levels pointer.
    ///
    /// # Errors
    /// Returns [`SkipLedgerError::Unsupported`] if `rn` is not condensable,
    /// [`SkipLedgerError::OutOfBounds`] if `level >= skipCount(rn)`, or
    /// [`SkipLedgerError::ByteFormat`] if the funnel length does not match
    /// `funnelLength(skipCount(rn), level)`.
    pub fn condensed(rn: u64, level: u32, level_hash: Hash, funnel: Vec<Hash>) -> Result<Self> {
        if !is_condensable(rn) {
            return Err(SkipLedgerError::unsupported(format!(
                "rn={rn} is always-all-levels and cannot be condensed"
            )));
        }
        let sc = geometry::skip_count(rn);
        if level >= sc {
            return Err(SkipLedgerError::out_of_bounds(format!(
                "level {level} out of range for rn={rn} (skipCount={sc})"
            )));
        }
        let index = geometry::level_to_index(sc, level);
        let expected = hash::funnel_length(sc as usize, index);
        if funnel.len() != expected {
            return Err(SkipLedgerError::byte_format(format!(
                "funnel length mismatch for rn={rn} level={level}: expected {expected}, got {}",
                funnel.len()
            )));
        }
        Ok(Self::Condensed {
            rn,
            level,
            level_hash,
            funnel,
        })
    }

    /// The row number this pointer belongs to.
    #[must_use]
    pub fn rn(&self) -> u64 {
        match self {
            Self::Full { rn, .. } | Self::Condensed { rn, .. } => *rn,
        }
    }

    /// `true` if this is the condensed variant.
    #[must_use]
    pub fn is_condensed(&self) -> bool {
        matches!(self, Self::Condensed { .. })
    }

    /// The levels-merkle-hash: identical whether computed from the full
    /// level list or reconstructed from a condensed funnel.
    ///
    /// # Errors
    /// Propagates [`SkipLedgerError::ByteFormat`] from a malformed funnel.
    pub fn hash(&self) -> Result<Hash> {
        match self {
            Self::Full { prev_hashes, .. } => Ok(hash::levels_merkle_hash(prev_hashes)),
            Self::Condensed {
                rn,
                level,
                level_hash,
                funnel,
            } => {
                let sc = geometry::skip_count(*rn) as usize;
                let idx = geometry::level_to_index(geometry::skip_count(*rn), *level);
                hash::root_from_funnel(level_hash, idx, sc, funnel)
            }
        }
    }

    /// Ascending row numbers referenced by this pointer (at least one
    /// entry).
    #[must_use]
    pub fn coverage(&self) -> Vec<u64> {
        match self {
            Self::Full { rn, .. } => {
                let mut refs = geometry::references(*rn);
                refs.sort_unstable();
                refs
            }
            Self::Condensed { rn, level, .. } => {
                vec![rn - (1u64 << level)]
            }
        }
    }

    /// `true` if this pointer references `rn`.
    #[must_use]
    pub fn covers_row(&self, rn: u64) -> bool {
        self.coverage().binary_search(&rn).is_ok()
    }

    /// `true` if this pointer carries hash data for `level`.
    #[must_use]
    pub fn covers_level(&self, level: u32) -> bool {
        match self {
            Self::Full { rn, .. } => level < geometry::skip_count(*rn),
            Self::Condensed { level: l, .. } => *l == level,
        }
    }

    /// Hash of the row referenced at `refRn`, if covered.
    #[must_use]
    pub fn row_hash(&self, ref_rn: u64) -> Option<Hash> {
        match self {
            Self::Full { rn, prev_hashes } => geometry::references(*rn)
                .iter()
                .position(|&r| r == ref_rn)
                .map(|idx| prev_hashes[idx]),
            Self::Condensed { rn, level, level_hash, .. } => {
                if rn - (1u64 << level) == ref_rn {
                    Some(*level_hash)
                } else {
                    None
                }
            }
        }
    }

    /// Hash at a specific level, if this pointer carries it directly
    /// (for the condensed form, only the stored level is available).
    #[must_use]
    pub fn level_hash(&self, level: u32) -> Option<Hash> {
        match self {
            Self::Full { rn, prev_hashes } => {
                let sc = geometry::skip_count(*rn);
                if level >= sc {
                    return None;
                }
                Some(prev_hashes[geometry::level_to_index(sc, level)])
            }
            Self::Condensed { level: l, level_hash, .. } => {
                if *l == level {
                    Some(*level_hash)
                } else {
                    None
                }
            }
        }
    }

    /// Condense this pointer to a specific level.
    ///
    /// # Errors
    /// [`SkipLedgerError::Unsupported`] if already condensed at a different
    /// level, or if `rn` is not condensable; [`SkipLedgerError::OutOfBounds`]
    /// if `level` is out of range.
    pub fn compress_to_level(&self, level: u32) -> Result<Self> {
        match self {
            Self::Condensed { level: l, .. } if *l == level => Ok(self.clone()),
            Self::Condensed { rn, level: l, .. } => Err(SkipLedgerError::unsupported(format!(
                "rn={rn} already condensed at level {l}, cannot re-condense at {level}"
            ))),
            Self::Full { rn, prev_hashes } => {
                let sc = geometry::skip_count(*rn);
                if level >= sc {
                    return Err(SkipLedgerError::out_of_bounds(format!(
                        "level {level} out of range for rn={rn} (skipCount={sc})"
                    )));
                }
                let index = geometry::level_to_index(sc, level);
                let level_hash = prev_hashes[index];
                let funnel = hash::build_funnel(prev_hashes, index);
                Self::condensed(*rn, level, level_hash, funnel)
            }
        }
    }

    /// Condense this pointer to the level that references `target_rn`.
    ///
    /// # Errors
    /// As [`LevelsPointer::compress_to_level`], plus
    /// [`SkipLedgerError::InvalidArgument`] if `target_rn` is not among this
    /// row's references.
    pub fn compress_to_level_row_no(&self, target_rn: u64) -> Result<Self> {
        let rn = self.rn();
        if target_rn >= rn {
            return Err(SkipLedgerError::invalid_at(
                format!("target_rn {target_rn} must be < rn {rn}"),
                rn,
            ));
        }
        let gap = rn - target_rn;
        if !gap.is_power_of_two() {
            return Err(SkipLedgerError::invalid_at(
                format!("rn={rn} does not reference {target_rn} at any level"),
                rn,
            ));
        }
        self.compress_to_level(gap.trailing_zeros())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mk_full(rn: u64) -> LevelsPointer {
        let sc = geometry::skip_count(rn) as usize;
        let hashes: Vec<Hash> = (0..sc)
            .map(|i| {
                let mut h = [0u8; 32];
                h[0] = i as u8;
                h[1] = (rn % 251) as u8;
                h
            })
            .collect();
        LevelsPointer::full(rn, hashes).unwrap()
    }

    #[test]
    fn condense_then_hash_matches_full_hash() {
        for rn in [5u64, 8, 12, 16, 24, 32] {
            let full = mk_full(rn);
            let full_hash = full.hash().unwrap();
            let sc = geometry::skip_count(rn);
            for level in 0..sc {
                let condensed = full.compress_to_level(level).unwrap();
                assert_eq!(condensed.hash().unwrap(), full_hash, "rn={rn} level={level}");
            }
        }
    }

    #[test]
    fn row_four_is_not_condensable() {
        assert!(!is_condensable(4));
        let full = mk_full(4);
        assert!(full.compress_to_level(0).is_err());
    }

    #[test]
    fn recondensing_at_different_level_fails() {
        let full = mk_full(8);
        let condensed = full.compress_to_level(1).unwrap();
        assert!(condensed.compress_to_level(2).is_err());
        assert!(condensed.compress_to_level(1).is_ok());
    }
}
