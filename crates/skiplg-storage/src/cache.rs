//! [`RowCache`]: a bounded, best-effort cache of row hashes addressed by a
//! binary-tree layout over row number, plus its [`CacheConfig`] and
//! [`CacheStats`] (spec.md §6).

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Mutex;

use skiplg_core::error::{Result, SkipLedgerError};
use skiplg_core::hash::Hash;

/// Bounds on what the cache tree will hold.
///
/// `min_level` filters out rows whose trailing zero-bit count is too small
/// to be worth caching (rows with few skip references are cheap to recompute
/// and would otherwise churn the tree). `max_level` bounds the tree's depth,
/// and therefore its worst-case footprint at `2^(max_level + 1) - 1` slots.
#[derive(Debug, Clone, Copy)]
pub struct CacheConfig {
    /// Minimum `trailing_zeros(rn)` a row must have to be cache-eligible.
    pub min_level: u32,
    /// Maximum tree depth; also the ceiling on the dynamic high-water level.
    pub max_level: u32,
}

impl CacheConfig {
    /// Build a config, rejecting an inverted range or a depth whose tree
    /// would outgrow a reasonable in-memory footprint.
    ///
    /// `max_level` bounds the tree at `2^(max_level + 1) - 1` slots; 22
    /// (roughly 4M rows) is the documented ceiling for a single process.
    ///
    /// # Errors
    /// [`SkipLedgerError::InvalidArgument`] if `min_level > max_level` or
    /// `max_level` exceeds 22.
    pub fn new(min_level: u32, max_level: u32) -> Result<Self> {
        if min_level > max_level {
            return Err(SkipLedgerError::invalid(format!(
                "min_level {min_level} exceeds max_level {max_level}"
            )));
        }
        if max_level > 22 {
            return Err(SkipLedgerError::invalid(format!(
                "max_level {max_level} exceeds the documented ceiling of 22 (~4M cached rows)"
            )));
        }
        Ok(Self { min_level, max_level })
    }
}

impl Default for CacheConfig {
    /// A typical working set: roughly a thousand tree slots.
    fn default() -> Self {
        Self { min_level: 0, max_level: 10 }
    }
}

/// Hit/miss counters for diagnostics. Never consulted for correctness.
#[derive(Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
}

impl CacheStats {
    /// A `(hits, misses)` snapshot taken without synchronizing the two
    /// counters against each other.
    #[must_use]
    pub fn snapshot(&self) -> (u64, u64) {
        (self.hits.load(Ordering::Relaxed), self.misses.load(Ordering::Relaxed))
    }

    fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }
}

fn depth_start(depth: u32) -> usize {
    (1usize << depth) - 1
}

/// A bounded, approximate cache of row hashes.
///
/// Row 1 and the most recently inserted row each occupy a dedicated slot and
/// are never evicted by tree churn. Every other candidate row is addressed
/// by a complete-binary-tree layout keyed on `trailing_zeros(rn)`; raising
/// the tree's dynamic high-water level re-addresses every existing entry,
/// so a raise may cause concurrent readers to miss on rows it would
/// otherwise have served, but never to observe a row's hash under the wrong
/// row number.
pub struct RowCache {
    config: CacheConfig,
    tree: Mutex<Vec<Option<(u64, Hash)>>>,
    current_max_level: AtomicU32,
    row_one: Mutex<Option<Hash>>,
    last: Mutex<Option<(u64, Hash)>>,
    stats: CacheStats,
}

impl RowCache {
    /// A cache governed by `config`, with its tree pre-sized to
    /// `config.max_level`'s full capacity.
    #[must_use]
    pub fn new(config: CacheConfig) -> Self {
        let capacity = (1usize << (config.max_level + 1)) - 1;
        Self {
            config,
            tree: Mutex::new(vec![None; capacity]),
            current_max_level: AtomicU32::new(config.min_level),
            row_one: Mutex::new(None),
            last: Mutex::new(None),
            stats: CacheStats::default(),
        }
    }

    /// This cache's hit/miss counters.
    #[must_use]
    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// Record `rn`'s hash, placing it in whichever of the three slot kinds
    /// applies.
    pub fn insert(&self, rn: u64, hash: Hash) {
        if rn == 1 {
            *self.row_one.lock().unwrap_or_else(std::sync::PoisonError::into_inner) = Some(hash);
        }
        {
            let mut last = self.last.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            let should_replace = match *last {
                Some((last_rn, _)) => rn > last_rn,
                None => true,
            };
            if should_replace {
                *last = Some((rn, hash));
            }
        }

        let level = rn.trailing_zeros();
        if level < self.config.min_level || level > self.config.max_level {
            return;
        }
        let m = self.current_max_level.fetch_max(level, Ordering::AcqRel).max(level);
        let depth = m - level;
        let idx = depth_start(depth) + ((rn >> level) - 1) as usize;

        let mut tree = self.tree.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if idx < tree.len() {
            tree[idx] = Some((rn, hash));
            tracing::trace!(rn, level, depth, idx, "cached row");
        }
    }

    /// Drop every cached entry for a row number above `new_size`.
    ///
    /// Must be called whenever the ledger beneath this cache is trimmed:
    /// otherwise a trimmed-then-reused row number can be served the hash
    /// from before the trim, which disagrees with the row now occupying it.
    pub fn invalidate_above(&self, new_size: u64) {
        if new_size == 0 {
            *self.row_one.lock().unwrap_or_else(std::sync::PoisonError::into_inner) = None;
        }
        {
            let mut last = self.last.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            if matches!(*last, Some((rn, _)) if rn > new_size) {
                *last = None;
            }
        }
        let mut tree = self.tree.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        for slot in tree.iter_mut() {
            if matches!(*slot, Some((rn, _)) if rn > new_size) {
                *slot = None;
            }
        }
    }

    /// Look up `rn`'s hash, if currently cached.
    #[must_use]
    pub fn get(&self, rn: u64) -> Option<Hash> {
        if rn == 1 {
            if let Some(h) = *self.row_one.lock().unwrap_or_else(std::sync::PoisonError::into_inner) {
                self.stats.record_hit();
                return Some(h);
            }
        }
        {
            let last = self.last.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            if let Some((last_rn, h)) = *last {
                if last_rn == rn {
                    self.stats.record_hit();
                    return Some(h);
                }
            }
        }

        let level = rn.trailing_zeros();
        if level < self.config.min_level || level > self.config.max_level {
            self.stats.record_miss();
            return None;
        }
        let m = self.current_max_level.load(Ordering::Acquire).max(level);
        let depth = m - level;
        let idx = depth_start(depth) + ((rn >> level) - 1) as usize;

        let tree = self.tree.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        match tree.get(idx) {
            Some(Some((stored_rn, h))) if *stored_rn == rn => {
                self.stats.record_hit();
                Some(*h)
            }
            _ => {
                self.stats.record_miss();
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_one_and_last_row_are_always_cacheable() {
        let cache = RowCache::new(CacheConfig::default());
        cache.insert(1, [1u8; 32]);
        cache.insert(100, [2u8; 32]);
        assert_eq!(cache.get(1), Some([1u8; 32]));
        assert_eq!(cache.get(100), Some([2u8; 32]));
    }

    #[test]
    fn rows_below_min_level_are_not_cached() {
        let config = CacheConfig::new(2, 10).unwrap();
        let cache = RowCache::new(config);
        cache.insert(3, [9u8; 32]); // trailing_zeros(3) == 0 < min_level
        assert_eq!(cache.get(3), None);
    }

    #[test]
    fn a_stale_slot_after_a_level_raise_misses_rather_than_lies() {
        let cache = RowCache::new(CacheConfig::default());
        cache.insert(4, [1u8; 32]);
        assert_eq!(cache.get(4), Some([1u8; 32]));
        // Raises the dynamic high-water level; 4's old slot may now be
        // addressed by a different row, but a stored-rn mismatch must
        // surface as a miss, never as someone else's hash.
        cache.insert(1024, [2u8; 32]);
        match cache.get(4) {
            None | Some([1, ..]) => {}
            Some(other) => panic!("stale slot returned wrong row's hash: {other:?}"),
        }
    }

    #[test]
    fn invalidate_above_clears_last_and_tree_slots_beyond_the_new_size() {
        let cache = RowCache::new(CacheConfig::default());
        cache.insert(1, [1u8; 32]);
        cache.insert(4, [2u8; 32]);
        cache.insert(8, [3u8; 32]); // becomes the dedicated "last" slot
        cache.invalidate_above(2);
        assert_eq!(cache.get(1), Some([1u8; 32]));
        assert_eq!(cache.get(4), None);
        assert_eq!(cache.get(8), None);
    }

    #[test]
    fn invalidate_above_zero_clears_row_one_too() {
        let cache = RowCache::new(CacheConfig::default());
        cache.insert(1, [1u8; 32]);
        cache.invalidate_above(0);
        assert_eq!(cache.get(1), None);
    }

    #[test]
    fn invalidate_above_leaves_rows_at_or_below_the_new_size() {
        let cache = RowCache::new(CacheConfig::default());
        cache.insert(4, [2u8; 32]);
        cache.insert(8, [3u8; 32]);
        cache.invalidate_above(4);
        assert_eq!(cache.get(4), Some([2u8; 32]));
        assert_eq!(cache.get(8), None);
    }

    #[test]
    fn stats_count_hits_and_misses() {
        let cache = RowCache::new(CacheConfig::default());
        cache.insert(1, [1u8; 32]);
        cache.get(1);
        cache.get(2);
        let (hits, misses) = cache.stats().snapshot();
        assert_eq!(hits, 1);
        assert_eq!(misses, 1);
    }
}
