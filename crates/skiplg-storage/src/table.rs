//! [`SkipTable`]: the fixed-width row storage abstraction, and
//! [`InMemoryTable`], its growable in-process implementation (spec.md §6).

use std::sync::Mutex;

use skiplg_core::error::{Result, SkipLedgerError};
use skiplg_core::hash::{Hash, HASH_WIDTH};

/// Bytes per stored row: an input hash followed by a row hash.
pub const ROW_WIDTH: usize = 2 * HASH_WIDTH;

/// Fixed-width row storage: every row occupies exactly [`ROW_WIDTH`] bytes,
/// `input_hash ‖ row_hash`, addressed by zero-based table index (row number
/// minus one).
///
/// Implementations need not be lock-free, but every method must be safe to
/// call from multiple threads concurrently.
pub trait SkipTable: Send + Sync {
    /// Write a contiguous block of whole rows starting at `start_index`.
    /// `block.len()` must be a positive multiple of [`ROW_WIDTH`] and
    /// `start_index` must equal [`Self::size`] at the time of the call
    /// (appends only; no in-place rewrite of already-written rows).
    /// Returns the table's new size, in rows.
    ///
    /// # Errors
    /// [`SkipLedgerError::InvalidArgument`] if `block` is empty or
    /// misaligned; [`SkipLedgerError::OutOfBounds`] if `start_index` does
    /// not match the current size.
    fn write_rows(&self, block: &[u8], start_index: usize) -> Result<usize>;

    /// Read the row at zero-based `index`, returning `(input_hash,
    /// row_hash)`.
    ///
    /// # Errors
    /// [`SkipLedgerError::OutOfBounds`] if `index >= self.size()`.
    fn read_row(&self, index: usize) -> Result<(Hash, Hash)>;

    /// The number of rows currently stored.
    fn size(&self) -> usize;

    /// Shrink the table's logical size to `new_size` rows, discarding
    /// everything above it. Physical storage need not be reclaimed.
    ///
    /// # Errors
    /// [`SkipLedgerError::InvalidArgument`] if `new_size` is zero or exceeds
    /// the current size.
    fn trim_size(&self, new_size: usize) -> Result<()>;

    /// Release any resources held by the table. A no-op for in-memory
    /// tables; present for symmetry with table implementations backed by
    /// files or other external handles.
    ///
    /// # Errors
    /// Implementation-defined; [`InMemoryTable`] never fails.
    fn close(&self) -> Result<()>;
}

/// A growable, in-process [`SkipTable`] backed by a single byte buffer.
///
/// Writers grow the buffer by at least 1.5x and swap in a freshly built
/// copy under a brief lock; readers take a snapshot reference of the same
/// lock and then read without holding it, so a long-running scan never
/// blocks a concurrent append.
pub struct InMemoryTable {
    buf: Mutex<std::sync::Arc<Vec<u8>>>,
    size: std::sync::atomic::AtomicUsize,
}

impl InMemoryTable {
    /// An empty table.
    #[must_use]
    pub fn new() -> Self {
        Self {
            buf: Mutex::new(std::sync::Arc::new(Vec::new())),
            size: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    fn snapshot(&self) -> std::sync::Arc<Vec<u8>> {
        self.buf.lock().unwrap_or_else(std::sync::PoisonError::into_inner).clone()
    }
}

impl Default for InMemoryTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SkipTable for InMemoryTable {
    fn write_rows(&self, block: &[u8], start_index: usize) -> Result<usize> {
        if block.is_empty() || block.len() % ROW_WIDTH != 0 {
            return Err(SkipLedgerError::invalid(
                "write_rows: block must be a positive multiple of the row width",
            ));
        }
        let cur_size = self.size.load(std::sync::atomic::Ordering::Acquire);
        if start_index != cur_size {
            return Err(SkipLedgerError::out_of_bounds(format!(
                "write_rows: start_index {start_index} does not match table size {cur_size}"
            )));
        }

        let snapshot = self.snapshot();
        let mut grown = (*snapshot).clone();
        let needed = start_index * ROW_WIDTH + block.len();
        if grown.capacity() < needed {
            let mut target = grown.capacity().max(ROW_WIDTH);
            while target < needed {
                target = target * 3 / 2 + 1;
            }
            grown.reserve(target - grown.len());
        }
        grown.truncate(start_index * ROW_WIDTH);
        grown.extend_from_slice(block);
        let new_size = start_index + block.len() / ROW_WIDTH;

        {
            let mut guard = self.buf.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            *guard = std::sync::Arc::new(grown);
        }
        self.size.store(new_size, std::sync::atomic::Ordering::Release);
        tracing::trace!(start_index, rows = block.len() / ROW_WIDTH, new_size, "wrote rows");
        Ok(new_size)
    }

    fn read_row(&self, index: usize) -> Result<(Hash, Hash)> {
        let size = self.size.load(std::sync::atomic::Ordering::Acquire);
        if index >= size {
            return Err(SkipLedgerError::out_of_bounds(format!(
                "read_row: index {index} is out of bounds for table of size {size}"
            )));
        }
        let snapshot = self.snapshot();
        let off = index * ROW_WIDTH;
        let mut input = [0u8; HASH_WIDTH];
        input.copy_from_slice(&snapshot[off..off + HASH_WIDTH]);
        let mut row_hash = [0u8; HASH_WIDTH];
        row_hash.copy_from_slice(&snapshot[off + HASH_WIDTH..off + ROW_WIDTH]);
        Ok((input, row_hash))
    }

    fn size(&self) -> usize {
        self.size.load(std::sync::atomic::Ordering::Acquire)
    }

    fn trim_size(&self, new_size: usize) -> Result<()> {
        let cur = self.size.load(std::sync::atomic::Ordering::Acquire);
        if new_size == 0 || new_size > cur {
            return Err(SkipLedgerError::invalid(format!(
                "trim_size: {new_size} is not in range 1..={cur}"
            )));
        }
        self.size.store(new_size, std::sync::atomic::Ordering::Release);
        tracing::debug!(new_size, "trimmed table size");
        Ok(())
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row_bytes(seed: u8) -> Vec<u8> {
        let mut v = vec![0u8; ROW_WIDTH];
        v[0] = seed;
        v[HASH_WIDTH] = seed.wrapping_add(1);
        v
    }

    #[test]
    fn append_then_read_round_trips() {
        let table = InMemoryTable::new();
        table.write_rows(&row_bytes(1), 0).unwrap();
        table.write_rows(&row_bytes(2), 1).unwrap();
        assert_eq!(table.size(), 2);
        let (input, hash) = table.read_row(1).unwrap();
        assert_eq!(input[0], 2);
        assert_eq!(hash[0], 3);
    }

    #[test]
    fn misaligned_start_index_is_rejected() {
        let table = InMemoryTable::new();
        table.write_rows(&row_bytes(1), 0).unwrap();
        let err = table.write_rows(&row_bytes(2), 5).unwrap_err();
        assert!(matches!(err, SkipLedgerError::OutOfBounds { .. }));
    }

    #[test]
    fn read_past_size_is_out_of_bounds() {
        let table = InMemoryTable::new();
        table.write_rows(&row_bytes(1), 0).unwrap();
        assert!(table.read_row(1).is_err());
    }

    #[test]
    fn trim_size_shrinks_and_rejects_growth() {
        let table = InMemoryTable::new();
        for i in 0..4u8 {
            table.write_rows(&row_bytes(i), i as usize).unwrap();
        }
        table.trim_size(2).unwrap();
        assert_eq!(table.size(), 2);
        assert!(table.trim_size(3).is_err());
        assert!(table.trim_size(0).is_err());
    }
}
