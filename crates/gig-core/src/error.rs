//! Error types for gig-core.

use thiserror::Error;

/// Errors produced while constructing core primitives.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// Amount could not be parsed or overflowed.
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// Rating outside the accepted 1..=5 range.
    #[error("invalid rating: {0} (expected 1..=5)")]
    InvalidRating(u8),

    /// Fee percentage above 100.
    #[error("invalid fee percent: {0} (expected 0..=100)")]
    InvalidFeePercent(u8),

    /// Job id of zero, which never names a job.
    #[error("invalid job id: 0")]
    ZeroJobId,

    /// Job id text that is not a number.
    #[error("invalid job id: {0}")]
    InvalidJobId(String),

    /// Principal id was empty.
    #[error("principal id must not be empty")]
    EmptyPrincipal,
}
