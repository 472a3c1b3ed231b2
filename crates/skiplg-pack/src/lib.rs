// crates/skiplg-pack/src/lib.rs

//! Byte-serializable path packs ([`PathPack`], [`PathPackMemo`]) and the
//! thread-safe incremental builder ([`PathPackBuilder`]) that assembles a
//! validated row bag from externally supplied rows, paths, or packs
//! (spec.md §§4.5–4.6).

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

mod builder;
mod pack;

pub use builder::PathPackBuilder;
pub use pack::{PackType, PathPack, PathPackMemo};
pub use skiplg_core::error::{Result, SkipLedgerError};
