//! Domain error type shared by every skip-ledger crate.
//!
//! The core never retries and never swallows a failure: validation errors
//! and hash conflicts abort the current operation and leave prior state
//! untouched (the one exception, the ledger engine's batched `append_rows`,
//! documents its own all-or-nothing behavior at the call site).

use thiserror::Error;

/// A row number, 1-based; row 0 is the virtual sentinel row.
pub type RowNumber = u64;

/// Everything that can go wrong inside the skip-ledger core.
///
/// Every variant that spec.md calls out in its error-kinds table (§7) is
/// represented here so callers can match on the *kind* of failure, not just
/// a formatted message.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SkipLedgerError {
    /// Bad row number, out-of-range level, empty input, duplicate targets,
    /// malformed lists, or out-of-sequence writes.
    #[error("invalid argument: {message} (rn={rn:?})")]
    InvalidArgument {
        /// Human-readable detail.
        message: String,
        /// Row number in question, if any.
        rn: Option<RowNumber>,
    },

    /// Index/range violation in a path, pack, or cache.
    #[error("out of bounds: {message}")]
    OutOfBounds {
        /// Human-readable detail.
        message: String,
    },

    /// Two row numbers cannot be linked (their gap is not a power of two
    /// within reach, or the higher row's skip count does not cover it).
    #[error("rows {lo} and {hi} are not linked")]
    NotLinked {
        /// Lower row number.
        lo: RowNumber,
        /// Higher row number.
        hi: RowNumber,
    },

    /// Malformed pack header or block sizes.
    #[error("malformed byte layout: {message}")]
    ByteFormat {
        /// Human-readable detail.
        message: String,
    },

    /// A hash computed or supplied disagrees with one already known.
    ///
    /// Always surfaces; never recoverable locally. Carries the row number
    /// and, where known, the level at which the disagreement was found.
    #[error("hash conflict at rn={rn} (level={level:?})")]
    HashConflict {
        /// Row number at which the conflicting hashes were observed.
        rn: RowNumber,
        /// Level at which the conflict was detected, if applicable.
        level: Option<u32>,
    },

    /// Operation valid only for one form (condensed/full) invoked on the
    /// other, or a storage operation (e.g. `trimSize`) the backend does not
    /// support.
    #[error("unsupported: {message}")]
    Unsupported {
        /// Human-readable detail.
        message: String,
    },
}

impl SkipLedgerError {
    /// Shorthand for [`SkipLedgerError::InvalidArgument`] without a row
    /// number.
    #[must_use]
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
            rn: None,
        }
    }

    /// Shorthand for [`SkipLedgerError::InvalidArgument`] with a row number.
    #[must_use]
    pub fn invalid_at(message: impl Into<String>, rn: RowNumber) -> Self {
        Self::InvalidArgument {
            message: message.into(),
            rn: Some(rn),
        }
    }

    /// Shorthand for [`SkipLedgerError::OutOfBounds`].
    #[must_use]
    pub fn out_of_bounds(message: impl Into<String>) -> Self {
        Self::OutOfBounds {
            message: message.into(),
        }
    }

    /// Shorthand for [`SkipLedgerError::ByteFormat`].
    #[must_use]
    pub fn byte_format(message: impl Into<String>) -> Self {
        Self::ByteFormat {
            message: message.into(),
        }
    }

    /// Shorthand for [`SkipLedgerError::Unsupported`].
    #[must_use]
    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::Unsupported {
            message: message.into(),
        }
    }
}

/// Convenience alias used across the skip-ledger crates.
pub type Result<T> = std::result::Result<T, SkipLedgerError>;
