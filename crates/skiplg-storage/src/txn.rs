//! [`TxnTable`]: a read-through transactional view over a [`SkipTable`] used
//! to batch a multi-row append into a single underlying write (spec.md §6).

use skiplg_core::error::{Result, SkipLedgerError};
use skiplg_core::hash::{Hash, HASH_WIDTH};

use crate::table::{SkipTable, ROW_WIDTH};

/// A private, in-flight view over a primary table: reads below the snapshot
/// size are served by the primary, reads above it are served from a local
/// buffer, and [`Self::commit`] flushes that buffer as a single call to
/// [`SkipTable::write_rows`].
pub struct TxnTable<'a, T: SkipTable + ?Sized> {
    primary: &'a T,
    snapshot_size: usize,
    buffer: Vec<u8>,
}

impl<'a, T: SkipTable + ?Sized> TxnTable<'a, T> {
    /// Open a transaction against `primary`, snapshotting its current size.
    #[must_use]
    pub fn new(primary: &'a T) -> Self {
        Self {
            primary,
            snapshot_size: primary.size(),
            buffer: Vec::new(),
        }
    }

    /// The row count this transaction would have if committed right now.
    #[must_use]
    pub fn pending_size(&self) -> usize {
        self.snapshot_size + self.buffer.len() / ROW_WIDTH
    }

    /// Append one row to the in-flight buffer. Does not touch the primary
    /// table until [`Self::commit`].
    pub fn write_row(&mut self, input_hash: Hash, row_hash: Hash) {
        self.buffer.extend_from_slice(&input_hash);
        self.buffer.extend_from_slice(&row_hash);
    }

    /// Read the row at zero-based `index`, from the primary if it predates
    /// this transaction's snapshot, or from the in-flight buffer otherwise.
    ///
    /// # Errors
    /// [`SkipLedgerError::OutOfBounds`] if `index` is not yet written on
    /// either side; propagates [`SkipLedgerError`] from the primary table.
    pub fn read_row(&self, index: usize) -> Result<(Hash, Hash)> {
        if index < self.snapshot_size {
            return self.primary.read_row(index);
        }
        let local = index - self.snapshot_size;
        let off = local * ROW_WIDTH;
        if off + ROW_WIDTH > self.buffer.len() {
            return Err(SkipLedgerError::out_of_bounds(format!(
                "read_row: index {index} is not yet written in this transaction"
            )));
        }
        let mut input = [0u8; HASH_WIDTH];
        input.copy_from_slice(&self.buffer[off..off + HASH_WIDTH]);
        let mut row_hash = [0u8; HASH_WIDTH];
        row_hash.copy_from_slice(&self.buffer[off + HASH_WIDTH..off + ROW_WIDTH]);
        Ok((input, row_hash))
    }

    /// Flush the in-flight buffer to the primary table as a single write,
    /// returning the primary's new size. A no-op, returning the snapshot
    /// size unchanged, if nothing was buffered.
    ///
    /// # Errors
    /// Propagates [`SkipLedgerError`] from the primary's
    /// [`SkipTable::write_rows`], including if another writer raced ahead
    /// of this transaction's snapshot.
    pub fn commit(self) -> Result<usize> {
        if self.buffer.is_empty() {
            return Ok(self.snapshot_size);
        }
        self.primary.write_rows(&self.buffer, self.snapshot_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::InMemoryTable;

    #[test]
    fn reads_through_to_primary_below_snapshot() {
        let primary = InMemoryTable::new();
        primary.write_rows(&[7u8; ROW_WIDTH], 0).unwrap();
        let txn = TxnTable::new(&primary);
        assert_eq!(txn.read_row(0).unwrap().0[0], 7);
    }

    #[test]
    fn buffered_rows_are_visible_before_commit() {
        let primary = InMemoryTable::new();
        primary.write_rows(&[1u8; ROW_WIDTH], 0).unwrap();
        let mut txn = TxnTable::new(&primary);
        txn.write_row([2u8; HASH_WIDTH], [3u8; HASH_WIDTH]);
        assert_eq!(txn.pending_size(), 2);
        assert_eq!(txn.read_row(1).unwrap().0[0], 2);
        assert!(primary.read_row(1).is_err());
    }

    #[test]
    fn commit_flushes_buffer_as_one_write() {
        let primary = InMemoryTable::new();
        let mut txn = TxnTable::new(&primary);
        txn.write_row([1u8; HASH_WIDTH], [2u8; HASH_WIDTH]);
        txn.write_row([3u8; HASH_WIDTH], [4u8; HASH_WIDTH]);
        let new_size = txn.commit().unwrap();
        assert_eq!(new_size, 2);
        assert_eq!(primary.size(), 2);
        assert_eq!(primary.read_row(1).unwrap().0[0], 3);
    }
}
