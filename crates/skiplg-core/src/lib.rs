// crates/skiplg-core/src/lib.rs

//! Core algebra of an append-only, tamper-evident skip ledger: row
//! numbering and skip-pointer geometry, the row-hash commitment scheme, and
//! the levels-pointer (full/condensed) commitment a row makes to its
//! skip-referenced predecessors.
//!
//! This crate has no notion of a ledger, a path, or on-disk storage — those
//! live in `skiplg-path`, `skiplg-pack`, and `skiplg-storage`, all built on
//! top of the [`RowBag`] interface exposed here.

#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![warn(
    missing_docs,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    clippy::unwrap_used,
    clippy::expect_used
)]

pub mod error;
pub mod geometry;
pub mod hash;
pub mod levels;
pub mod row;

pub use error::{Result, RowNumber, SkipLedgerError};
pub use geometry::{
    is_condensable, level_to_index, linked, references, skip_count, skip_path_numbers, stitch,
    stitch_compress, stitch_path, MAX_ROWS_PER_PATH, MAX_SKIP_COUNT, ROW_ZERO,
};
pub use hash::{
    build_funnel, domain_hash, funnel_length, levels_merkle_hash, merkle_parent, root_from_funnel,
    row_hash, Hash, HASH_WIDTH, SENTINEL,
};
pub use levels::LevelsPointer;
pub use row::{Row, RowBag, RowZero};
