// crates/skiplg-path/src/lib.rs

//! Validated, immutable paths through a skip ledger — ascending sequences
//! of linked rows, plus the combinators (`subPath`, `skipPath`, `compress`,
//! `appendTail`, ...) used to navigate and compose them (spec.md §4.4).

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

mod path;

pub use path::Path;
pub use skiplg_core::error::{Result, SkipLedgerError};
