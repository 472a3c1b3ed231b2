//! `PathPackBuilder`: a thread-safe incremental assembler of a validated row
//! bag from externally supplied rows, paths, or packs (spec.md §4.6).

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

use skiplg_core::error::{Result, SkipLedgerError};
use skiplg_core::geometry;
use skiplg_core::hash::{Hash, SENTINEL};
use skiplg_core::levels::LevelsPointer;
use skiplg_core::row::Row;
use skiplg_path::Path;

use crate::pack::PathPack;

#[derive(Default)]
struct State {
    input_hashes: BTreeMap<u64, Hash>,
    ref_hashes: BTreeMap<u64, Hash>,
    memo_hashes: BTreeMap<u64, Hash>,
}

/// Incrementally absorbs rows, paths, or packs from arbitrary sources and
/// order, emitting a validated [`Path`] or [`PathPack`] on demand.
///
/// A single mutex guards all bookkeeping; every operation holds it for its
/// full duration (spec.md §5).
#[derive(Default)]
pub struct PathPackBuilder {
    state: Mutex<State>,
}

impl PathPackBuilder {
    /// An empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Absorb a single externally supplied row.
    ///
    /// Returns the number of hashes newly recorded (pending reference
    /// entries plus the row's own entry), or `0` if the row was already
    /// known and agrees.
    ///
    /// # Errors
    /// [`SkipLedgerError::HashConflict`] if `row` disagrees with a hash
    /// already known, directly or through a level reference;
    /// [`SkipLedgerError::NotLinked`] if it cannot be linked to the
    /// builder's current rows; [`SkipLedgerError::InvalidArgument`] if it is
    /// not a pending reference and cannot be appended at the high end.
    pub fn add_row(&self, row: &Row) -> Result<usize> {
        let mut state = lock(&self.state);
        Self::add_row_locked(&mut state, row)
    }

    fn add_row_locked(state: &mut State, row: &Row) -> Result<usize> {
        let rn = row.no();
        let hash = row.hash();

        if let Some(existing) = state.memo_hashes.get(&rn) {
            return if *existing == hash {
                Ok(0)
            } else {
                Err(SkipLedgerError::HashConflict { rn, level: None })
            };
        }

        if !state.memo_hashes.is_empty() {
            let hi = *state.memo_hashes.keys().next_back().expect("checked non-empty");
            if rn > hi {
                if !geometry::linked(hi, rn) {
                    return Err(SkipLedgerError::NotLinked { lo: hi, hi: rn });
                }
                let claimed = row.hash_of(hi).ok_or_else(|| {
                    SkipLedgerError::invalid_at(
                        format!("row {rn} does not reference current high row {hi}"),
                        rn,
                    )
                })?;
                if state.memo_hashes[&hi] != claimed {
                    return Err(SkipLedgerError::HashConflict {
                        rn: hi,
                        level: None,
                    });
                }
            } else {
                let pending = state.ref_hashes.get(&rn).copied().ok_or_else(|| {
                    SkipLedgerError::invalid_at(
                        format!("row {rn} is not a pending reference of any known row"),
                        rn,
                    )
                })?;
                if pending != hash {
                    return Err(SkipLedgerError::HashConflict { rn, level: None });
                }
                if let Some((&below, _)) = state.memo_hashes.range(..rn).next_back() {
                    if !geometry::linked(below, rn) {
                        return Err(SkipLedgerError::NotLinked { lo: below, hi: rn });
                    }
                }
            }
        }

        let mut added = 0usize;
        for level in 0..geometry::skip_count(rn) {
            let Some(h) = row.prev_hash(level) else {
                continue;
            };
            let ref_rn = rn - (1u64 << level);
            if ref_rn == 0 {
                continue;
            }
            match state
                .ref_hashes
                .get(&ref_rn)
                .or_else(|| state.memo_hashes.get(&ref_rn))
            {
                Some(existing) if *existing != h => {
                    return Err(SkipLedgerError::HashConflict {
                        rn: ref_rn,
                        level: Some(level),
                    })
                }
                Some(_) => {}
                None => {
                    state.ref_hashes.insert(ref_rn, h);
                    added += 1;
                }
            }
        }

        state.memo_hashes.insert(rn, hash);
        state.input_hashes.insert(rn, row.input_hash());
        state.ref_hashes.remove(&rn);
        added += 1;
        Ok(added)
    }

    /// Absorb every row of `path`.
    ///
    /// If the builder is empty, rows are added high-to-low with no
    /// stitchability check (each lower row's references were already seeded
    /// by the higher rows above it). Otherwise the union of existing and
    /// incoming row numbers must stitch to itself (no new rns needed to
    /// bridge a gap), and the hashes at the highest row number common to
    /// both must agree.
    ///
    /// # Errors
    /// [`SkipLedgerError::InvalidArgument`] on a stitchability violation;
    /// [`SkipLedgerError::HashConflict`] on disagreement at the highest
    /// common row; propagates [`SkipLedgerError`] from [`Self::add_row`].
    pub fn add_path(&self, path: &Path) -> Result<usize> {
        let mut state = lock(&self.state);

        if state.memo_hashes.is_empty() {
            let mut total = 0;
            for row in path.rows().iter().rev() {
                total += Self::add_row_locked(&mut state, row)?;
            }
            return Ok(total);
        }

        let existing: BTreeSet<u64> = state.memo_hashes.keys().copied().collect();
        let incoming = path.row_numbers();
        let union: Vec<u64> = existing
            .iter()
            .copied()
            .chain(incoming.iter().copied())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let stitched = geometry::stitch(&union)?;
        if stitched.len() != union.len() {
            return Err(SkipLedgerError::invalid(
                "path is not stitchable onto the builder's rows without new row numbers",
            ));
        }

        if let Some(&common) = existing.intersection(&incoming.iter().copied().collect()).max() {
            let existing_hash = state.memo_hashes[&common];
            let incoming_hash = path
                .get_row_hash(common)
                .expect("common rn is in both coverage sets");
            if existing_hash != incoming_hash {
                return Err(SkipLedgerError::HashConflict {
                    rn: common,
                    level: None,
                });
            }
        }

        let mut total = 0;
        for &rn in incoming.iter().rev() {
            if existing.contains(&rn) {
                continue;
            }
            let row = path
                .get_row_by_number(rn)
                .expect("rn came from path.row_numbers()");
            total += Self::add_row_locked(&mut state, row)?;
        }
        Ok(total)
    }

    /// Absorb every row of `pack`'s underlying path.
    ///
    /// # Errors
    /// As [`Self::add_path`], plus propagates pack-reconstruction errors.
    pub fn add_pack(&self, pack: &PathPack) -> Result<usize> {
        self.add_path(&pack.path()?)
    }

    /// The validated path over every row currently known, in full
    /// (uncondensed) form.
    ///
    /// # Errors
    /// [`SkipLedgerError::InvalidArgument`] if the builder has no rows yet;
    /// propagates any [`SkipLedgerError`] from an inconsistent internal
    /// state (should not occur given `add_row`'s checks).
    pub fn path(&self) -> Result<Path> {
        let state = lock(&self.state);
        if state.memo_hashes.is_empty() {
            return Err(SkipLedgerError::invalid("builder has no rows yet"));
        }
        let mut rows = Vec::with_capacity(state.memo_hashes.len());
        for (&rn, &input) in &state.input_hashes {
            let refs = geometry::references(rn);
            let mut hashes = Vec::with_capacity(refs.len());
            for r in refs {
                let h = if r == 0 {
                    SENTINEL
                } else {
                    state
                        .memo_hashes
                        .get(&r)
                        .or_else(|| state.ref_hashes.get(&r))
                        .copied()
                        .ok_or_else(|| {
                            SkipLedgerError::invalid_at(
                                format!("builder missing hash for rn={r}"),
                                rn,
                            )
                        })?
                };
                hashes.push(h);
            }
            let pointer = LevelsPointer::full(rn, hashes)?;
            rows.push(Row::new(rn, input, pointer)?);
        }
        Path::new(rows)
    }

    /// The validated pack over every row currently known.
    ///
    /// # Errors
    /// As [`Self::path`].
    pub fn pack(&self) -> Result<PathPack> {
        PathPack::for_path(&self.path()?)
    }
}

fn lock(m: &Mutex<State>) -> std::sync::MutexGuard<'_, State> {
    m.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}
