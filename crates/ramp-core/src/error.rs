//! Structured validation errors for foundational types.

use thiserror::Error;

/// Errors raised while constructing or validating foundational values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Token identifier is empty, too long, or contains invalid characters.
    #[error("invalid token identifier: {0:?}")]
    InvalidTokenId(String),

    /// Fiat currency code is not three ASCII uppercase letters.
    #[error("invalid currency code: {0:?}")]
    InvalidCurrencyCode(String),

    /// Basis-point value exceeds the 10 000 bps whole.
    #[error("basis points out of range: {0} (max 10000)")]
    InvalidBasisPoints(u16),

    /// Fee schedule rates sum past the whole.
    #[error("fee schedule rates sum to {total_bps} bps, exceeding 10000")]
    InvalidFeeSchedule {
        /// Sum of all schedule rates in basis points.
        total_bps: u32,
    },
}
