//! `PathPack`: a byte-serializable, memoizable encoding of a [`Path`] that
//! minimizes hash storage (spec.md §4.5).

use std::collections::{BTreeMap, BTreeSet};
use std::sync::OnceLock;

use skiplg_core::error::{Result, SkipLedgerError};
use skiplg_core::geometry::{self};
use skiplg_core::hash::{self, Hash, HASH_WIDTH, SENTINEL};
use skiplg_core::levels::LevelsPointer;
use skiplg_core::row::Row;
use skiplg_path::Path;

/// Which form every condensable row in a pack takes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PackType {
    /// Every row carries all of its reference hashes.
    Full,
    /// Every condensable row is condensed to the level targeting its
    /// predecessor in the packed row list.
    Condensed,
}

/// A byte-serializable encoding of a [`Path`].
///
/// The condensation level of each row (for a condensed pack) and the set of
/// externally-needed reference hashes are both derived structurally from
/// `full_rns` and `pack_type` — nothing about level choice is stored on the
/// wire (spec.md §4.5).
#[derive(Clone, Debug)]
pub struct PathPack {
    header: Vec<u64>,
    full_rns: Vec<u64>,
    pack_type: PackType,
    inputs: Vec<Hash>,
    funnels: BTreeMap<u64, Vec<Hash>>,
    refs: BTreeMap<u64, Hash>,
    path_cache: OnceLock<Path>,
}

impl PathPack {
    /// Build a pack from a path, reusing its rows' own form: an
    /// all-full path packs as [`PackType::Full`], a fully [`Path::compress`]ed
    /// one packs as [`PackType::Condensed`].
    ///
    /// # Errors
    /// [`SkipLedgerError::Unsupported`] if the path mixes full and condensed
    /// condensable rows (a single pack cannot represent that under one type
    /// byte); propagates any other [`SkipLedgerError`] from a malformed row.
    pub fn for_path(path: &Path) -> Result<Self> {
        let full_rns = path.row_numbers();
        let header = geometry::stitch_compress(&full_rns)?;
        let any_condensed = path.rows().iter().any(Row::is_condensed);
        let pack_type = if !any_condensed {
            PackType::Full
        } else if path.is_compressed() {
            PackType::Condensed
        } else {
            return Err(SkipLedgerError::unsupported(
                "path mixes full and condensed condensable rows; pack a uniform path",
            ));
        };

        let full_set: BTreeSet<u64> = full_rns.iter().copied().collect();
        let inputs: Vec<Hash> = path.rows().iter().map(Row::input_hash).collect();
        let mut funnels = BTreeMap::new();
        let mut refs: BTreeMap<u64, Hash> = BTreeMap::new();

        for (i, row) in path.rows().iter().enumerate() {
            let rn = row.no();
            let condensed_here =
                pack_type == PackType::Condensed && geometry::is_condensable(rn);
            if condensed_here {
                let LevelsPointer::Condensed {
                    level,
                    level_hash,
                    funnel,
                    ..
                } = row.levels_pointer()
                else {
                    return Err(SkipLedgerError::invalid_at(
                        format!("row {rn} is condensable but not condensed"),
                        rn,
                    ));
                };
                let expected = condensed_level(&full_rns, i);
                if *level != expected {
                    return Err(SkipLedgerError::invalid_at(
                        format!(
                            "row {rn} is condensed at level {level}, expected {expected} \
                             (the level targeting its predecessor in this path)"
                        ),
                        rn,
                    ));
                }
                funnels.insert(rn, funnel.clone());
                let target = rn - (1u64 << level);
                if target != 0 && !full_set.contains(&target) {
                    bind_ref(&mut refs, target, *level_hash)?;
                }
            } else {
                for ref_rn in geometry::references(rn) {
                    if ref_rn == 0 || full_set.contains(&ref_rn) {
                        continue;
                    }
                    let h = row
                        .levels_pointer()
                        .row_hash(ref_rn)
                        .expect("full pointer covers every one of its references");
                    bind_ref(&mut refs, ref_rn, h)?;
                }
            }
        }

        Ok(Self {
            header,
            full_rns,
            pack_type,
            inputs,
            funnels,
            refs,
            path_cache: OnceLock::new(),
        })
    }

    /// Serialize to the pack's fixed binary layout (header, type byte,
    /// inputs, funnels, refs).
    #[must_use]
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.estimated_len());
        out.extend_from_slice(&(self.header.len() as u32).to_be_bytes());
        for &rn in &self.header {
            out.extend_from_slice(&rn.to_be_bytes());
        }
        out.push(match self.pack_type {
            PackType::Full => 0x00,
            PackType::Condensed => 0x01,
        });
        for h in &self.inputs {
            out.extend_from_slice(h);
        }
        for rn in &self.full_rns {
            if let Some(f) = self.funnels.get(rn) {
                for h in f {
                    out.extend_from_slice(h);
                }
            }
        }
        for h in self.refs.values() {
            out.extend_from_slice(h);
        }
        out
    }

    fn estimated_len(&self) -> usize {
        4 + self.header.len() * 8
            + 1
            + self.inputs.len() * HASH_WIDTH
            + self.funnels.values().map(Vec::len).sum::<usize>() * HASH_WIDTH
            + self.refs.len() * HASH_WIDTH
    }

    /// Deserialize a pack, validating every block length exactly.
    ///
    /// # Errors
    /// [`SkipLedgerError::ByteFormat`] on any length mismatch, unknown type
    /// byte, non-ascending header, or trailing bytes.
    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        let mut pos = 0usize;
        let count = read_u32(bytes, &mut pos)?;
        if count == 0 {
            return Err(SkipLedgerError::byte_format("pack header count must be > 0"));
        }
        let mut header = Vec::with_capacity(count as usize);
        for _ in 0..count {
            header.push(read_u64(bytes, &mut pos)?);
        }
        for w in header.windows(2) {
            if w[0] >= w[1] {
                return Err(SkipLedgerError::byte_format(
                    "pack header rns must be strictly ascending",
                ));
            }
        }
        let pack_type = match read_u8(bytes, &mut pos)? {
            0x00 => PackType::Full,
            0x01 => PackType::Condensed,
            other => {
                return Err(SkipLedgerError::byte_format(format!(
                    "unknown pack type byte {other:#04x}"
                )))
            }
        };
        let full_rns = geometry::stitch(&header)?;

        let mut inputs = Vec::with_capacity(full_rns.len());
        for _ in 0..full_rns.len() {
            inputs.push(read_hash(bytes, &mut pos)?);
        }

        let mut funnels = BTreeMap::new();
        if pack_type == PackType::Condensed {
            for (rn, len) in funnel_spec(&full_rns) {
                let mut f = Vec::with_capacity(len);
                for _ in 0..len {
                    f.push(read_hash(bytes, &mut pos)?);
                }
                funnels.insert(rn, f);
            }
        }

        let mut refs = BTreeMap::new();
        for rn in required_refs(&full_rns, pack_type) {
            refs.insert(rn, read_hash(bytes, &mut pos)?);
        }

        if pos != bytes.len() {
            return Err(SkipLedgerError::byte_format(format!(
                "{} trailing byte(s) after pack body",
                bytes.len() - pos
            )));
        }

        Ok(Self {
            header,
            full_rns,
            pack_type,
            inputs,
            funnels,
            refs,
            path_cache: OnceLock::new(),
        })
    }

    /// Input hash of a full row, if `rn` is one.
    #[must_use]
    pub fn input_hash(&self, rn: u64) -> Option<Hash> {
        self.full_rns
            .binary_search(&rn)
            .ok()
            .map(|idx| self.inputs[idx])
    }

    /// Explicitly stored reference-only hash for `rn`, if any.
    #[must_use]
    pub fn ref_only_hash(&self, rn: u64) -> Option<Hash> {
        self.refs.get(&rn).copied()
    }

    /// The funnel carried for a condensed row, if any.
    #[must_use]
    pub fn get_funnel(&self, rn: u64) -> Option<&[Hash]> {
        self.funnels.get(&rn).map(Vec::as_slice)
    }

    /// Ascending full row numbers in this pack.
    #[must_use]
    pub fn get_full_row_numbers(&self) -> &[u64] {
        &self.full_rns
    }

    /// This pack's type.
    #[must_use]
    pub fn pack_type(&self) -> PackType {
        self.pack_type
    }

    /// Hash of any rn this pack knows: a ref hash if present, else the
    /// recomputed hash of a full row, else `None`.
    ///
    /// # Errors
    /// Propagates [`SkipLedgerError`] from reconstructing the underlying
    /// path when `rn` is a full row.
    pub fn row_hash(&self, rn: u64) -> Result<Option<Hash>> {
        if rn == 0 {
            return Ok(Some(SENTINEL));
        }
        if let Some(h) = self.ref_only_hash(rn) {
            return Ok(Some(h));
        }
        match self.path()?.get_row_by_number(rn) {
            Some(row) => Ok(Some(row.hash())),
            None => Ok(None),
        }
    }

    /// Lazily construct the [`Path`] this pack encodes, caching the result.
    ///
    /// # Errors
    /// Propagates [`SkipLedgerError`] from a malformed pack (missing
    /// reference hashes, bad funnel lengths).
    pub fn path(&self) -> Result<Path> {
        if let Some(p) = self.path_cache.get() {
            return Ok(p.clone());
        }
        let mut rows = Vec::with_capacity(self.full_rns.len());
        let mut computed: BTreeMap<u64, Hash> = BTreeMap::new();

        for (i, &rn) in self.full_rns.iter().enumerate() {
            let input = self.inputs[i];
            let pointer = if self.pack_type == PackType::Condensed && geometry::is_condensable(rn)
            {
                let level = condensed_level(&self.full_rns, i);
                let target = rn - (1u64 << level);
                let level_hash = self.lookup(target, &computed)?;
                let funnel = self.funnels.get(&rn).cloned().ok_or_else(|| {
                    SkipLedgerError::byte_format(format!("pack missing funnel for rn={rn}"))
                })?;
                LevelsPointer::condensed(rn, level, level_hash, funnel)?
            } else {
                let mut hashes = Vec::new();
                for r in geometry::references(rn) {
                    hashes.push(self.lookup(r, &computed)?);
                }
                LevelsPointer::full(rn, hashes)?
            };
            let row = Row::new(rn, input, pointer)?;
            computed.insert(rn, row.hash());
            rows.push(row);
        }

        let path = Path::new(rows)?;
        let _ = self.path_cache.set(path.clone());
        Ok(path)
    }

    fn lookup(&self, rn: u64, computed: &BTreeMap<u64, Hash>) -> Result<Hash> {
        if rn == 0 {
            return Ok(SENTINEL);
        }
        if let Some(h) = computed.get(&rn) {
            return Ok(*h);
        }
        self.refs
            .get(&rn)
            .copied()
            .ok_or_else(|| SkipLedgerError::byte_format(format!("pack missing hash for rn={rn}")))
    }

    /// A short diagnostic summary: rn range, row count, and condensation
    /// shape.
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "PathPack[{}..{}] rows={} type={:?} header_len={} refs={} funnels={}",
            self.full_rns.first().copied().unwrap_or(0),
            self.full_rns.last().copied().unwrap_or(0),
            self.full_rns.len(),
            self.pack_type,
            self.header.len(),
            self.refs.len(),
            self.funnels.len()
        )
    }
}

/// A memoizing variant of [`PathPack`]: every full row's hash is precomputed
/// bottom-up at construction, so [`PathPackMemo::row_hash`] is `O(log N)`
/// binary search with no recursive reconstruction (spec.md §4.5, "memo
/// variant").
#[derive(Clone, Debug)]
pub struct PathPackMemo {
    pack: PathPack,
    memo: Vec<Hash>,
}

impl PathPackMemo {
    /// Precompute every full row's hash from `pack`.
    ///
    /// # Errors
    /// Propagates [`SkipLedgerError`] from a malformed pack.
    pub fn build(pack: PathPack) -> Result<Self> {
        let mut memo = Vec::with_capacity(pack.full_rns.len());
        for (i, &rn) in pack.full_rns.iter().enumerate() {
            let levels_hash = if pack.pack_type == PackType::Condensed
                && geometry::is_condensable(rn)
            {
                let level = condensed_level(&pack.full_rns, i);
                let target = rn - (1u64 << level);
                let level_hash = memo_lookup(&pack, &memo, i, target)?;
                let funnel = pack.funnels.get(&rn).ok_or_else(|| {
                    SkipLedgerError::byte_format(format!("pack missing funnel for rn={rn}"))
                })?;
                let sc = geometry::skip_count(rn) as usize;
                let idx = geometry::level_to_index(geometry::skip_count(rn), level);
                hash::root_from_funnel(&level_hash, idx, sc, funnel)?
            } else {
                let mut level_hashes = Vec::new();
                for r in geometry::references(rn) {
                    level_hashes.push(memo_lookup(&pack, &memo, i, r)?);
                }
                hash::levels_merkle_hash(&level_hashes)
            };
            memo.push(hash::row_hash(&pack.inputs[i], &levels_hash));
        }
        Ok(Self { pack, memo })
    }

    /// `O(log N)` row-hash lookup for any rn this pack knows.
    #[must_use]
    pub fn row_hash(&self, rn: u64) -> Option<Hash> {
        if rn == 0 {
            return Some(SENTINEL);
        }
        if let Ok(idx) = self.pack.full_rns.binary_search(&rn) {
            return Some(self.memo[idx]);
        }
        self.pack.ref_only_hash(rn)
    }

    /// The underlying pack.
    #[must_use]
    pub fn pack(&self) -> &PathPack {
        &self.pack
    }
}

fn memo_lookup(pack: &PathPack, memo: &[Hash], upto: usize, rn: u64) -> Result<Hash> {
    if rn == 0 {
        return Ok(SENTINEL);
    }
    if let Ok(idx) = pack.full_rns[..upto].binary_search(&rn) {
        return Ok(memo[idx]);
    }
    pack.refs
        .get(&rn)
        .copied()
        .ok_or_else(|| SkipLedgerError::byte_format(format!("pack missing hash for rn={rn}")))
}

fn condensed_level(full_rns: &[u64], i: usize) -> u32 {
    if i == 0 {
        0
    } else {
        (full_rns[i] - full_rns[i - 1]).trailing_zeros()
    }
}

fn funnel_spec(full_rns: &[u64]) -> Vec<(u64, usize)> {
    full_rns
        .iter()
        .enumerate()
        .filter_map(|(i, &rn)| {
            if geometry::is_condensable(rn) {
                let level = condensed_level(full_rns, i);
                let sc = geometry::skip_count(rn);
                let idx = geometry::level_to_index(sc, level);
                Some((rn, hash::funnel_length(sc as usize, idx)))
            } else {
                None
            }
        })
        .collect()
}

fn required_refs(full_rns: &[u64], pack_type: PackType) -> Vec<u64> {
    let full_set: BTreeSet<u64> = full_rns.iter().copied().collect();
    let mut set = BTreeSet::new();
    for (i, &rn) in full_rns.iter().enumerate() {
        let needed = if pack_type == PackType::Condensed && geometry::is_condensable(rn) {
            vec![rn - (1u64 << condensed_level(full_rns, i))]
        } else {
            geometry::references(rn)
        };
        for r in needed {
            if r != 0 && !full_set.contains(&r) {
                set.insert(r);
            }
        }
    }
    set.into_iter().collect()
}

fn bind_ref(refs: &mut BTreeMap<u64, Hash>, rn: u64, h: Hash) -> Result<()> {
    match refs.get(&rn) {
        Some(existing) if *existing != h => Err(SkipLedgerError::HashConflict { rn, level: None }),
        Some(_) => Ok(()),
        None => {
            refs.insert(rn, h);
            Ok(())
        }
    }
}

fn read_u8(bytes: &[u8], pos: &mut usize) -> Result<u8> {
    let b = *bytes
        .get(*pos)
        .ok_or_else(|| SkipLedgerError::byte_format("unexpected end of pack bytes"))?;
    *pos += 1;
    Ok(b)
}

fn read_u32(bytes: &[u8], pos: &mut usize) -> Result<u32> {
    let slice = bytes
        .get(*pos..*pos + 4)
        .ok_or_else(|| SkipLedgerError::byte_format("unexpected end of pack bytes reading u32"))?;
    *pos += 4;
    Ok(u32::from_be_bytes(slice.try_into().expect("slice is 4 bytes")))
}

fn read_u64(bytes: &[u8], pos: &mut usize) -> Result<u64> {
    let slice = bytes
        .get(*pos..*pos + 8)
        .ok_or_else(|| SkipLedgerError::byte_format("unexpected end of pack bytes reading u64"))?;
    *pos += 8;
    Ok(u64::from_be_bytes(slice.try_into().expect("slice is 8 bytes")))
}

fn read_hash(bytes: &[u8], pos: &mut usize) -> Result<Hash> {
    let slice = bytes.get(*pos..*pos + HASH_WIDTH).ok_or_else(|| {
        SkipLedgerError::byte_format("unexpected end of pack bytes reading a hash")
    })?;
    *pos += HASH_WIDTH;
    let mut h = [0u8; HASH_WIDTH];
    h.copy_from_slice(slice);
    Ok(h)
}

#[cfg(test)]
mod tests {
    use super::*;
    use skiplg_core::hash::SENTINEL;

    fn build_chain(n: u64) -> Vec<Row> {
        let mut hashes: BTreeMap<u64, Hash> = BTreeMap::new();
        hashes.insert(0, SENTINEL);
        let mut rows = Vec::new();
        for rn in 1..=n {
            let mut input = [0u8; HASH_WIDTH];
            input[0] = rn as u8;
            let refs = geometry::references(rn);
            let prev: Vec<Hash> = refs.iter().map(|r| hashes[r]).collect();
            let lp = LevelsPointer::full(rn, prev).unwrap();
            let row = Row::new(rn, input, lp).unwrap();
            hashes.insert(rn, row.hash());
            rows.push(row);
        }
        rows
    }

    #[test]
    fn full_pack_round_trips() {
        let path = Path::new(build_chain(16)).unwrap();
        let pack = PathPack::for_path(&path).unwrap();
        let bytes = pack.serialize();
        let back = PathPack::deserialize(&bytes).unwrap();
        assert_eq!(back.path().unwrap(), path);
    }

    #[test]
    fn condensed_pack_round_trips() {
        let path = Path::new(build_chain(16)).unwrap().compress().unwrap();
        let pack = PathPack::for_path(&path).unwrap();
        let bytes = pack.serialize();
        let back = PathPack::deserialize(&bytes).unwrap();
        assert_eq!(back.path().unwrap(), path);
    }

    #[test]
    fn skip_path_pack_is_compact() {
        let full = Path::new(build_chain(32)).unwrap();
        let sp = full.skip_path().unwrap().compress().unwrap();
        let pack = PathPack::for_path(&sp).unwrap();
        let bytes = pack.serialize();
        // A condensed skip-path pack should be far smaller than a full one
        // spanning the same range.
        let full_pack = PathPack::for_path(&full).unwrap().serialize();
        assert!(bytes.len() < full_pack.len());
    }

    #[test]
    fn memo_matches_plain_lookup() {
        let path = Path::new(build_chain(16)).unwrap().compress().unwrap();
        let pack = PathPack::for_path(&path).unwrap();
        let plain_hashes: Vec<Hash> = path.row_numbers().iter().map(|&rn| pack.row_hash(rn).unwrap().unwrap()).collect();
        let memo = PathPackMemo::build(pack).unwrap();
        for (rn, expected) in path.row_numbers().into_iter().zip(plain_hashes) {
            assert_eq!(memo.row_hash(rn).unwrap(), expected);
        }
    }

    #[test]
    fn deserialize_rejects_truncated_bytes() {
        let path = Path::new(build_chain(8)).unwrap();
        let pack = PathPack::for_path(&path).unwrap();
        let mut bytes = pack.serialize();
        bytes.pop();
        let err = PathPack::deserialize(&bytes).unwrap_err();
        assert!(matches!(err, SkipLedgerError::ByteFormat { .. }));
    }

    #[test]
    fn summary_reports_range_and_type() {
        let path = Path::new(build_chain(4)).unwrap();
        let pack = PathPack::for_path(&path).unwrap();
        let s = pack.summary();
        assert!(s.contains("Full"));
        assert!(s.contains('1'));
    }
}
