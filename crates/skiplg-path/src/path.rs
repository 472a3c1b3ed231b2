//! Validated, immutable sequences of linked rows, and their combinators
//! (spec.md §4.4).

use std::collections::{BTreeMap, BTreeSet};
use std::hash::{Hash as StdHash, Hasher as StdHasher};
use std::sync::Arc;

use skiplg_core::error::{Result, SkipLedgerError};
use skiplg_core::geometry::{self, MAX_ROWS_PER_PATH};
use skiplg_core::hash::{Hash, SENTINEL};
use skiplg_core::levels::LevelsPointer;
use skiplg_core::row::{Row, RowBag};

/// A non-empty, validated, ascending sequence of linked rows.
///
/// Cloning a `Path` is cheap: the row storage is reference-counted and
/// `subPath`/`headPath`/`tailPath` reuse it directly without re-validating
/// (spec.md §4.4).
#[derive(Clone, Debug)]
pub struct Path {
    rows: Arc<Vec<Row>>,
    start: usize,
    end: usize, // exclusive
}

impl Path {
    /// Validate and wrap a row list into a `Path`.
    ///
    /// Runs a single forward pass enforcing strict ascent, pairwise
    /// linkage, the condensed-level-targets-predecessor rule, and
    /// cross-row hash agreement (any rn whose hash is asserted more than
    /// once, directly or via a level reference, must agree bit-for-bit).
    ///
    /// # Errors
    /// [`SkipLedgerError::InvalidArgument`] on an empty or oversized list,
    /// non-ascending rows, or a condensed level that does not target its
    /// predecessor; [`SkipLedgerError::NotLinked`] on a broken adjacency;
    /// [`SkipLedgerError::HashConflict`] on disagreeing hashes.
    pub fn new(rows: Vec<Row>) -> Result<Self> {
        if rows.is_empty() {
            return Err(SkipLedgerError::invalid("path must contain at least one row"));
        }
        if rows.len() > MAX_ROWS_PER_PATH {
            return Err(SkipLedgerError::invalid(format!(
                "path exceeds MAX_ROWS_PER_PATH ({MAX_ROWS_PER_PATH})"
            )));
        }

        let mut known: BTreeMap<u64, Hash> = BTreeMap::new();
        known.insert(0, SENTINEL);

        let mut prev_no = rows[0].no().checked_sub(1).ok_or_else(|| {
            SkipLedgerError::invalid("row number must be >= 1")
        })?;

        for row in &rows {
            let rn = row.no();
            if rn <= prev_no {
                return Err(SkipLedgerError::invalid(format!(
                    "rows must be strictly ascending (rn={rn}, previous={prev_no})"
                )));
            }
            if !geometry::linked(prev_no, rn) {
                return Err(SkipLedgerError::NotLinked { lo: prev_no, hi: rn });
            }
            if let LevelsPointer::Condensed { level, .. } = row.levels_pointer() {
                let expected = prev_no + (1u64 << level);
                if expected != rn {
                    return Err(SkipLedgerError::invalid_at(
                        format!(
                            "condensed level {level} targets {expected}, not predecessor {prev_no}"
                        ),
                        rn,
                    ));
                }
            }

            bind(&mut known, rn, row.hash())?;
            for level in 0..geometry::skip_count(rn) {
                if let Some(h) = row.prev_hash(level) {
                    let ref_rn = rn - (1u64 << level);
                    bind(&mut known, ref_rn, h)?;
                }
            }

            prev_no = rn;
        }

        let len = rows.len();
        Ok(Self {
            rows: Arc::new(rows),
            start: 0,
            end: len,
        })
    }

    fn view(&self) -> &[Row] {
        &self.rows[self.start..self.end]
    }

    /// All rows, in ascending order.
    #[must_use]
    pub fn rows(&self) -> &[Row] {
        self.view()
    }

    /// The first row.
    #[must_use]
    pub fn first(&self) -> &Row {
        &self.view()[0]
    }

    /// The last row.
    #[must_use]
    pub fn last(&self) -> &Row {
        let v = self.view();
        &v[v.len() - 1]
    }

    /// Row number of the first row.
    #[must_use]
    pub fn lo(&self) -> u64 {
        self.first().no()
    }

    /// Row number of the last row.
    #[must_use]
    pub fn hi(&self) -> u64 {
        self.last().no()
    }

    /// Number of rows.
    #[must_use]
    pub fn length(&self) -> usize {
        self.end - self.start
    }

    /// Ascending row numbers of every row (not coverage — just the rows
    /// actually present).
    #[must_use]
    pub fn row_numbers(&self) -> Vec<u64> {
        self.view().iter().map(Row::no).collect()
    }

    /// `true` iff this path's length equals the shortest possible path
    /// between its endpoints.
    #[must_use]
    pub fn is_skip_path(&self) -> bool {
        geometry::skip_path_numbers(self.lo(), self.hi())
            .map(|p| p.len() == self.length())
            .unwrap_or(false)
    }

    /// `true` if any row is condensed.
    #[must_use]
    pub fn is_condensed(&self) -> bool {
        self.view().iter().any(Row::is_condensed)
    }

    /// `true` if every row is either always-all-levels or condensed.
    #[must_use]
    pub fn is_compressed(&self) -> bool {
        self.view().iter().all(Row::is_compressed)
    }

    /// A compressed version of this path: every condensable row's levels
    /// pointer is condensed to the level that targets its predecessor in
    /// this path (the first row targets its numeric predecessor, `lo() -
    /// 1`, per the condensed-first-row rule spec.md's design notes call
    /// out — §4.4/§9 open question (a)).
    ///
    /// # Errors
    /// Propagates any [`SkipLedgerError`] from condensing an individual
    /// row's pointer.
    pub fn compress(&self) -> Result<Path> {
        let view = self.view();
        let mut out = Vec::with_capacity(view.len());
        for (i, row) in view.iter().enumerate() {
            let no = row.no();
            if !geometry::is_condensable(no) {
                out.push(row.clone());
                continue;
            }
            let level = if i == 0 {
                0
            } else {
                (no - view[i - 1].no()).trailing_zeros()
            };
            let pointer = row.levels_pointer().compress_to_level(level)?;
            out.push(Row::new(no, row.input_hash(), pointer)?);
        }
        Path::new(out)
    }

    /// Sub-range `[from, to]` (both row numbers, inclusive), reusing the
    /// underlying row storage without re-validating.
    ///
    /// # Errors
    /// [`SkipLedgerError::InvalidArgument`] if `from`/`to` are not present
    /// as rows in this path, `from > to`, or (for a condensed path) the new
    /// first row's levels pointer does not target its numeric predecessor
    /// (spec.md §4.4's `subPath` precondition).
    pub fn sub_path(&self, from: u64, to: u64) -> Result<Path> {
        let view = self.view();
        let idx_from = view
            .binary_search_by_key(&from, Row::no)
            .map_err(|_| SkipLedgerError::invalid_at(format!("row {from} not in path"), from))?;
        let idx_to = view
            .binary_search_by_key(&to, Row::no)
            .map_err(|_| SkipLedgerError::invalid_at(format!("row {to} not in path"), to))?;
        if idx_from > idx_to {
            return Err(SkipLedgerError::invalid(format!(
                "sub_path: from={from} must be <= to={to}"
            )));
        }
        let new_first = &view[idx_from];
        if let LevelsPointer::Condensed { level, .. } = new_first.levels_pointer() {
            if *level != 0 {
                return Err(SkipLedgerError::invalid_at(
                    format!(
                        "row {} is condensed at level {level}, which does not target its \
                         predecessor; it cannot become a path's first row",
                        new_first.no()
                    ),
                    new_first.no(),
                ));
            }
        }
        Ok(Path {
            rows: Arc::clone(&self.rows),
            start: self.start + idx_from,
            end: self.start + idx_to + 1,
        })
    }

    /// `subPath(from, hi())`.
    ///
    /// # Errors
    /// As [`Path::sub_path`].
    pub fn sub_path_from(&self, from: u64) -> Result<Path> {
        self.sub_path(from, self.hi())
    }

    /// `subPath(lo(), rn)`.
    ///
    /// # Errors
    /// As [`Path::sub_path`].
    pub fn head_path(&self, rn: u64) -> Result<Path> {
        self.sub_path(self.lo(), rn)
    }

    /// `subPath(rn, hi())`.
    ///
    /// # Errors
    /// As [`Path::sub_path`].
    pub fn tail_path(&self, rn: u64) -> Result<Path> {
        self.sub_path(rn, self.hi())
    }

    /// The ordered union of `{rn} ∪ levelsPointer.coverage()` over every
    /// row.
    #[must_use]
    pub fn nos_covered(&self) -> Vec<u64> {
        let mut set = BTreeSet::new();
        for row in self.view() {
            set.insert(row.no());
            for rn in row.levels_pointer().coverage() {
                set.insert(rn);
            }
        }
        set.into_iter().collect()
    }

    /// `true` iff `rn` is an actual row in this path.
    #[must_use]
    pub fn has_row(&self, rn: u64) -> bool {
        self.view().binary_search_by_key(&rn, Row::no).is_ok()
    }

    /// `true` iff `rn` is in [`Path::nos_covered`].
    #[must_use]
    pub fn has_row_covered(&self, rn: u64) -> bool {
        if self.has_row(rn) {
            return true;
        }
        self.view()
            .iter()
            .any(|r| r.levels_pointer().covers_row(rn))
    }

    /// The hash of any row number in [`Path::nos_covered`].
    #[must_use]
    pub fn get_row_hash(&self, rn: u64) -> Option<Hash> {
        if rn == 0 {
            return Some(SENTINEL);
        }
        if let Ok(idx) = self.view().binary_search_by_key(&rn, Row::no) {
            return Some(self.view()[idx].hash());
        }
        self.view().iter().find_map(|r| r.hash_of(rn))
    }

    /// The row at `rn`, if it is actually present (not just covered).
    #[must_use]
    pub fn get_row_by_number(&self, rn: u64) -> Option<&Row> {
        self.view()
            .binary_search_by_key(&rn, Row::no)
            .ok()
            .map(|idx| &self.view()[idx])
    }

    /// The row at `rn` if present, else the first row (in ascending order)
    /// whose levels pointer covers `rn`.
    #[must_use]
    pub fn get_row_or_referring_row(&self, rn: u64) -> Option<&Row> {
        if let Some(r) = self.get_row_by_number(rn) {
            return Some(r);
        }
        self.view()
            .iter()
            .find(|r| r.levels_pointer().covers_row(rn))
    }

    /// The unique shortest path equivalent to this one (same endpoints).
    ///
    /// # Errors
    /// Propagates geometry errors, or [`SkipLedgerError::InvalidArgument`]
    /// if one of the canonical skip-path row numbers is not actually
    /// present among this path's rows.
    pub fn skip_path(&self) -> Result<Path> {
        let nums = geometry::skip_path_numbers(self.lo(), self.hi())?;
        let mut rows = Vec::with_capacity(nums.len());
        for rn in nums {
            let row = self.get_row_by_number(rn).ok_or_else(|| {
                SkipLedgerError::invalid_at(
                    format!("canonical skip-path row {rn} missing from this path"),
                    rn,
                )
            })?;
            rows.push(row.clone());
        }
        Path::new(rows)
    }

    /// The shortest path through the given `targets`, optionally still
    /// anchored at this path's current endpoints.
    ///
    /// `trim == false` keeps `lo()`/`hi()` as endpoints even if they are
    /// not themselves in `targets`; `trim == true` shrinks to exactly the
    /// span of `targets`.
    ///
    /// Returns `Ok(None)` if any target is not in [`Path::nos_covered`].
    ///
    /// # Errors
    /// Propagates geometry errors or missing-row errors as in
    /// [`Path::skip_path`].
    pub fn skip_path_via(&self, trim: bool, targets: &[u64]) -> Result<Option<Path>> {
        for &t in targets {
            if !self.has_row_covered(t) {
                return Ok(None);
            }
        }
        let mut pts: Vec<u64> = targets.to_vec();
        if !trim {
            pts.push(self.lo());
            pts.push(self.hi());
        }
        pts.sort_unstable();
        pts.dedup();
        if pts.is_empty() {
            return Err(SkipLedgerError::invalid("skip_path_via: no targets given"));
        }
        let stitched = geometry::stitch(&pts)?;
        let mut rows = Vec::with_capacity(stitched.len());
        for rn in stitched {
            match self.get_row_by_number(rn) {
                Some(r) => rows.push(r.clone()),
                None => return Ok(None),
            }
        }
        Ok(Some(Path::new(rows)?))
    }

    /// Append `other`'s rows strictly after `hi()`, provided `other` agrees
    /// with this path's hash at `hi()`.
    ///
    /// # Errors
    /// [`SkipLedgerError::InvalidArgument`] if `other` does not cover
    /// `hi()`; [`SkipLedgerError::HashConflict`] if the hashes at `hi()`
    /// disagree.
    pub fn append_tail(&self, other: &Path) -> Result<Path> {
        let hi = self.hi();
        let this_hash = self
            .get_row_hash(hi)
            .expect("hi() is always covered by its own row");
        let other_hash = other.get_row_hash(hi).ok_or_else(|| {
            SkipLedgerError::invalid_at(format!("other path does not cover rn={hi}"), hi)
        })?;
        if this_hash != other_hash {
            return Err(SkipLedgerError::HashConflict {
                rn: hi,
                level: None,
            });
        }
        let mut rows: Vec<Row> = self.view().to_vec();
        if other.hi() > hi {
            let tail = other.tail_path(hi + 1)?;
            rows.extend(tail.view().iter().cloned());
        }
        Path::new(rows)
    }

    /// Largest row number in both paths' coverage, verifying hash
    /// agreement there.
    ///
    /// # Errors
    /// [`SkipLedgerError::InvalidArgument`] if the coverage sets are
    /// disjoint; [`SkipLedgerError::HashConflict`] if the hashes at the
    /// common row number disagree.
    pub fn highest_common_no(&self, other: &Path) -> Result<u64> {
        highest_common(&self.nos_covered(), &other.nos_covered())
            .ok_or_else(|| SkipLedgerError::invalid("paths share no common row number"))
            .and_then(|rn| self.verify_common(other, rn))
    }

    /// Largest row number present as an actual row in both paths,
    /// verifying hash agreement there.
    ///
    /// # Errors
    /// As [`Path::highest_common_no`].
    pub fn highest_common_full_no(&self, other: &Path) -> Result<u64> {
        highest_common(&self.row_numbers(), &other.row_numbers())
            .ok_or_else(|| SkipLedgerError::invalid("paths share no common full row number"))
            .and_then(|rn| self.verify_common(other, rn))
    }

    fn verify_common(&self, other: &Path, rn: u64) -> Result<u64> {
        let a = self.get_row_hash(rn).expect("rn from intersection is covered");
        let b = other.get_row_hash(rn).expect("rn from intersection is covered");
        if a != b {
            return Err(SkipLedgerError::HashConflict { rn, level: None });
        }
        Ok(rn)
    }
}

fn highest_common(a: &[u64], b: &[u64]) -> Option<u64> {
    let set: BTreeSet<u64> = b.iter().copied().collect();
    a.iter().rev().find(|rn| set.contains(rn)).copied()
}

fn bind(known: &mut BTreeMap<u64, Hash>, rn: u64, h: Hash) -> Result<()> {
    match known.get(&rn) {
        Some(existing) if *existing != h => Err(SkipLedgerError::HashConflict { rn, level: None }),
        Some(_) => Ok(()),
        None => {
            known.insert(rn, h);
            Ok(())
        }
    }
}

impl PartialEq for Path {
    fn eq(&self, other: &Self) -> bool {
        self.row_numbers() == other.row_numbers() && self.last().hash() == other.last().hash()
    }
}

impl Eq for Path {}

impl StdHash for Path {
    fn hash<H: StdHasher>(&self, state: &mut H) {
        self.lo().hash(state);
        self.length().hash(state);
        self.last().hash().hash(state);
        self.row_numbers().hash(state);
    }
}

impl RowBag for Path {
    fn input_hash(&self, rn: u64) -> Option<Hash> {
        self.get_row_by_number(rn).map(Row::input_hash)
    }

    fn row_hash(&self, rn: u64) -> Option<Hash> {
        self.get_row_hash(rn)
    }

    fn full_row_numbers(&self) -> Vec<u64> {
        self.row_numbers()
    }
}
