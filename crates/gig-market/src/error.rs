//! Error types for gig-market.

use gig_core::{CoreError, JobId, PrincipalId};
use thiserror::Error;

use crate::lifecycle::JobStatus;

/// Errors returned by marketplace actions.
///
/// Every write action is all-or-nothing: when one of these is returned no
/// record was mutated and no event was published.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MarketError {
    /// Caller already has a profile.
    #[error("principal {0} is already registered")]
    AlreadyRegistered(PrincipalId),

    /// Registration asked for neither the client nor the freelancer role.
    #[error("a profile must be a client, a freelancer, or both")]
    InvalidRole,

    /// No job with this id.
    #[error("job not found: {0}")]
    JobNotFound(JobId),

    /// No application at this index for the job.
    #[error("application {index} not found for {job_id}")]
    ApplicationNotFound {
        /// The job.
        job_id: JobId,
        /// The requested application index.
        index: usize,
    },

    /// The application at this index was submitted by someone else.
    #[error("application {index} for {job_id} was not submitted by {freelancer}")]
    ApplicationMismatch {
        /// The job.
        job_id: JobId,
        /// The requested application index.
        index: usize,
        /// The freelancer the client tried to assign.
        freelancer: PrincipalId,
    },

    /// Caller is not allowed to perform the action.
    #[error("{caller} is not authorized to {action}")]
    Unauthorized {
        /// The rejected caller.
        caller: PrincipalId,
        /// The attempted action.
        action: &'static str,
    },

    /// The job's status does not allow the action.
    #[error("cannot {action} {job_id} while it is {status}")]
    InvalidState {
        /// The job.
        job_id: JobId,
        /// Status at the time of the call.
        status: JobStatus,
        /// The attempted action.
        action: &'static str,
    },

    /// The freelancer already applied to this job.
    #[error("{freelancer} already applied to {job_id}")]
    AlreadyApplied {
        /// The job.
        job_id: JobId,
        /// The repeat applicant.
        freelancer: PrincipalId,
    },

    /// Bid is higher than the job's price.
    #[error("bid {bid} exceeds price {price} for {job_id}")]
    BidExceedsPrice {
        /// The job.
        job_id: JobId,
        /// The offered bid.
        bid: u64,
        /// The job's current price.
        price: u64,
    },

    /// Payment for the job was already released.
    #[error("payment for {0} was already released")]
    AlreadyReleased(JobId),

    /// Escrow balance does not cover the amount to move.
    #[error("insufficient escrow for {job_id}: required {required}, available {available}")]
    InsufficientEscrow {
        /// The job.
        job_id: JobId,
        /// Amount required for the operation.
        required: u64,
        /// Amount currently escrowed.
        available: u64,
    },

    /// A release or refund for the job is still waiting on its transfer.
    #[error("a payment for {0} is already in flight")]
    PaymentInFlight(JobId),

    /// The external transfer failed; all state was rolled back.
    #[error("transfer failed for {job_id}: {reason}")]
    TransferFailed {
        /// The job.
        job_id: JobId,
        /// Reason reported by the transfer backend.
        reason: String,
    },

    /// Rating outside 1..=5.
    #[error("invalid rating: {0} (expected 1..=5)")]
    InvalidRating(u8),

    /// Malformed action input (empty text, zero price).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Configuration rejected at construction.
    #[error("config error: {0}")]
    Config(String),
}

impl From<CoreError> for MarketError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::InvalidRating(value) => Self::InvalidRating(value),
            CoreError::InvalidFeePercent(_) => Self::Config(e.to_string()),
            other => Self::InvalidInput(other.to_string()),
        }
    }
}
