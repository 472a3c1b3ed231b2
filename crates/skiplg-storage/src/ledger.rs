//! [`CompactSkipLedger`]: the append-only ledger engine that drives a
//! [`SkipTable`] and an optional [`RowCache`] (spec.md §5, §6).

use skiplg_core::error::{Result, SkipLedgerError};
use skiplg_core::geometry;
use skiplg_core::hash::{Hash, HASH_WIDTH, SENTINEL};
use skiplg_core::levels::LevelsPointer;
use skiplg_core::row::Row;
use skiplg_path::Path;

use crate::cache::{CacheConfig, RowCache};
use crate::table::{InMemoryTable, SkipTable, ROW_WIDTH};
use crate::txn::TxnTable;

/// The append-only ledger engine: a row table plus the geometry needed to
/// derive full rows, paths, and state proofs from it on demand.
///
/// Generic over its [`SkipTable`] so the same engine logic serves an
/// in-memory table today and any future external-storage table without
/// change.
pub struct CompactSkipLedger<T: SkipTable = InMemoryTable> {
    table: T,
    cache: Option<RowCache>,
}

impl CompactSkipLedger<InMemoryTable> {
    /// An empty, uncached, in-memory ledger.
    #[must_use]
    pub fn new() -> Self {
        Self { table: InMemoryTable::new(), cache: None }
    }

    /// An empty, in-memory ledger with a row cache governed by `config`.
    #[must_use]
    pub fn with_cache(config: CacheConfig) -> Self {
        Self { table: InMemoryTable::new(), cache: Some(RowCache::new(config)) }
    }
}

impl Default for CompactSkipLedger<InMemoryTable> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: SkipTable> CompactSkipLedger<T> {
    /// Build a ledger over an already-populated table, with no cache.
    #[must_use]
    pub fn from_table(table: T) -> Self {
        Self { table, cache: None }
    }

    /// Build a ledger over an already-populated table, with a cache
    /// governed by `config`.
    #[must_use]
    pub fn from_table_with_cache(table: T, config: CacheConfig) -> Self {
        Self { table, cache: Some(RowCache::new(config)) }
    }

    /// The number of rows currently in the ledger.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.table.size() as u64
    }

    /// Append a single row whose input hash is `input_hash`, returning its
    /// assigned row number.
    ///
    /// # Errors
    /// Propagates [`SkipLedgerError`] from [`Self::append_rows`].
    pub fn append_row(&self, input_hash: Hash) -> Result<u64> {
        let rns = self.append_rows(&input_hash)?;
        rns.into_iter()
            .next()
            .ok_or_else(|| SkipLedgerError::invalid("append_rows produced no row numbers"))
    }

    /// Append one or more rows, `input_hashes` being their input hashes
    /// concatenated in order. A single row is written directly; a batch of
    /// more than one is staged through a [`TxnTable`] and committed as one
    /// underlying write. Returns the newly assigned row numbers, in order.
    ///
    /// # Errors
    /// [`SkipLedgerError::InvalidArgument`] if `input_hashes` is empty or
    /// not a multiple of the hash width; propagates [`SkipLedgerError`]
    /// from the underlying table or row construction.
    pub fn append_rows(&self, input_hashes: &[u8]) -> Result<Vec<u64>> {
        if input_hashes.is_empty() || input_hashes.len() % HASH_WIDTH != 0 {
            return Err(SkipLedgerError::invalid(
                "append_rows: input must be a positive multiple of the hash width",
            ));
        }
        let n = input_hashes.len() / HASH_WIDTH;
        let first_rn = self.table.size() as u64 + 1;

        if n == 1 {
            let mut input = [0u8; HASH_WIDTH];
            input.copy_from_slice(&input_hashes[..HASH_WIDTH]);
            let rn = first_rn;
            let row = self.build_row(rn, input, |r| self.row_hash(r))?;
            let mut block = Vec::with_capacity(ROW_WIDTH);
            block.extend_from_slice(&input);
            block.extend_from_slice(&row.hash());
            self.table.write_rows(&block, self.table.size())?;
            if let Some(cache) = &self.cache {
                cache.insert(rn, row.hash());
            }
            tracing::debug!(rn, "appended row");
            return Ok(vec![rn]);
        }

        let mut txn = TxnTable::new(&self.table);
        let mut new_rns = Vec::with_capacity(n);
        for i in 0..n {
            let rn = first_rn + i as u64;
            let mut input = [0u8; HASH_WIDTH];
            input.copy_from_slice(&input_hashes[i * HASH_WIDTH..(i + 1) * HASH_WIDTH]);
            let row = self.build_row(rn, input, |r| {
                if r == 0 {
                    Ok(SENTINEL)
                } else {
                    txn.read_row((r - 1) as usize).map(|(_, h)| h)
                }
            })?;
            txn.write_row(input, row.hash());
            new_rns.push(rn);
        }
        let new_size = txn.commit()?;
        if let Some(cache) = &self.cache {
            for &rn in &new_rns {
                if let Ok((_, h)) = self.table.read_row((rn - 1) as usize) {
                    cache.insert(rn, h);
                }
            }
        }
        tracing::debug!(first_rn, n, new_size, "appended batch");
        Ok(new_rns)
    }

    fn build_row(&self, rn: u64, input: Hash, mut hash_of: impl FnMut(u64) -> Result<Hash>) -> Result<Row> {
        let refs = geometry::references(rn);
        let mut hashes = Vec::with_capacity(refs.len());
        for r in refs {
            hashes.push(hash_of(r)?);
        }
        let pointer = LevelsPointer::full(rn, hashes)?;
        Row::new(rn, input, pointer)
    }

    /// The hash of row `rn`, or the sentinel for `rn == 0`.
    ///
    /// # Errors
    /// [`SkipLedgerError::OutOfBounds`] if `rn` exceeds [`Self::size`].
    pub fn row_hash(&self, rn: u64) -> Result<Hash> {
        if rn == 0 {
            return Ok(SENTINEL);
        }
        let size = self.size();
        if rn > size {
            return Err(SkipLedgerError::out_of_bounds(format!(
                "rn {rn} exceeds ledger size {size}"
            )));
        }
        if let Some(cache) = &self.cache {
            if let Some(h) = cache.get(rn) {
                return Ok(h);
            }
        }
        let (_, row_hash) = self.table.read_row((rn - 1) as usize)?;
        if let Some(cache) = &self.cache {
            cache.insert(rn, row_hash);
        }
        Ok(row_hash)
    }

    /// The full row `rn`, its levels pointer derived lazily from table
    /// lookups (each possibly cache-served).
    ///
    /// # Errors
    /// [`SkipLedgerError::OutOfBounds`] if `rn` is zero or exceeds
    /// [`Self::size`]; propagates [`SkipLedgerError`] from the table.
    pub fn get_row(&self, rn: u64) -> Result<Row> {
        let size = self.size();
        if rn == 0 || rn > size {
            return Err(SkipLedgerError::out_of_bounds(format!(
                "rn {rn} is out of bounds for ledger size {size}"
            )));
        }
        let (input_hash, _) = self.table.read_row((rn - 1) as usize)?;
        let row = self.build_row(rn, input_hash, |r| self.row_hash(r))?;
        Ok(row)
    }

    /// Shrink the ledger to `new_size` rows.
    ///
    /// # Errors
    /// Propagates [`SkipLedgerError`] from the underlying table.
    pub fn trim_size(&self, new_size: u64) -> Result<()> {
        self.table.trim_size(new_size as usize)?;
        if let Some(cache) = &self.cache {
            cache.invalidate_above(new_size);
        }
        Ok(())
    }

    /// A validated path covering every row number in `targets` (stitched to
    /// a linked ascending sequence as needed).
    ///
    /// # Errors
    /// Propagates [`SkipLedgerError`] from geometry stitching, row lookup,
    /// or path validation.
    pub fn get_path(&self, targets: &[u64]) -> Result<Path> {
        let stitched = geometry::stitch(targets)?;
        let mut rows = Vec::with_capacity(stitched.len());
        for rn in stitched {
            rows.push(self.get_row(rn)?);
        }
        Path::new(rows)
    }

    /// The canonical skip path from `lo` to `hi`.
    ///
    /// # Errors
    /// Propagates [`SkipLedgerError`] from geometry, row lookup, or path
    /// validation.
    pub fn skip_path(&self, lo: u64, hi: u64) -> Result<Path> {
        let nums = geometry::skip_path_numbers(lo, hi)?;
        let rows: Result<Vec<Row>> = nums.into_iter().map(|rn| self.get_row(rn)).collect();
        Path::new(rows?)
    }

    /// The skip path covering the whole ledger, from row 1 to its current
    /// last row, or `None` if the ledger is empty.
    ///
    /// # Errors
    /// Propagates [`SkipLedgerError`] from [`Self::skip_path`].
    pub fn state_path(&self) -> Result<Option<Path>> {
        let size = self.size();
        if size == 0 {
            return Ok(None);
        }
        self.skip_path(1, size).map(Some)
    }

    /// The hash of the ledger's current last row, or the sentinel if empty.
    ///
    /// # Errors
    /// Propagates [`SkipLedgerError`] from [`Self::row_hash`].
    pub fn state_hash(&self) -> Result<Hash> {
        let size = self.size();
        if size == 0 {
            return Ok(SENTINEL);
        }
        self.row_hash(size)
    }
}
