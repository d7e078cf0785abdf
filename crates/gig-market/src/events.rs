//! Events published for external indexers and notifiers.
//!
//! Events are sent while the marketplace write lock is held, so subscribers
//! see them in exactly the order the mutations were committed. Payments and
//! refunds commit when their transfer settles, not when they are called, so
//! events from actions committed in the meantime can precede them.

use gig_core::{Amount, JobId, PrincipalId};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// A committed marketplace mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum MarketEvent {
    /// A principal registered a profile.
    UserRegistered {
        /// The new user.
        user: PrincipalId,
        /// Registered as client.
        is_client: bool,
        /// Registered as freelancer.
        is_freelancer: bool,
    },
    /// A client posted a job.
    JobCreated {
        /// The new job.
        job_id: JobId,
        /// The posting client.
        client: PrincipalId,
        /// Asking price.
        price: Amount,
        /// Funds placed in escrow.
        deposit: Amount,
    },
    /// A client edited an open job's text.
    JobUpdated {
        /// The job.
        job_id: JobId,
        /// The new title.
        title: String,
    },
    /// A freelancer applied for a job.
    FreelancerApplied {
        /// The job.
        job_id: JobId,
        /// The applicant.
        freelancer: PrincipalId,
        /// Offered price.
        bid: Amount,
    },
    /// A client assigned a freelancer.
    JobAssigned {
        /// The job.
        job_id: JobId,
        /// The assigned freelancer.
        freelancer: PrincipalId,
        /// Price after accepting the bid.
        price: Amount,
    },
    /// A party reported the job complete.
    JobCompleted {
        /// The job.
        job_id: JobId,
        /// Who reported completion.
        completed_by: PrincipalId,
    },
    /// Escrowed payment went to the freelancer and platform.
    PaymentReleased {
        /// The job.
        job_id: JobId,
        /// The paid freelancer.
        freelancer: PrincipalId,
        /// Amount paid to the freelancer.
        payout: Amount,
        /// Amount kept by the platform.
        fee: Amount,
    },
    /// A client cancelled an open job and was refunded.
    JobCancelled {
        /// The job.
        job_id: JobId,
        /// Amount refunded to the client.
        refund: Amount,
    },
    /// A party raised a dispute.
    DisputeRaised {
        /// The job.
        job_id: JobId,
        /// Who raised it.
        raised_by: PrincipalId,
    },
    /// A party rated the other.
    RatingGiven {
        /// The job.
        job_id: JobId,
        /// Who gave the rating.
        rater: PrincipalId,
        /// Who received it.
        ratee: PrincipalId,
        /// The rating given.
        rating: u8,
        /// The ratee's rating after folding this one in.
        new_rating: u8,
    },
}

impl MarketEvent {
    /// Short name of the event kind.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::UserRegistered { .. } => "user_registered",
            Self::JobCreated { .. } => "job_created",
            Self::JobUpdated { .. } => "job_updated",
            Self::FreelancerApplied { .. } => "freelancer_applied",
            Self::JobAssigned { .. } => "job_assigned",
            Self::JobCompleted { .. } => "job_completed",
            Self::PaymentReleased { .. } => "payment_released",
            Self::JobCancelled { .. } => "job_cancelled",
            Self::DisputeRaised { .. } => "dispute_raised",
            Self::RatingGiven { .. } => "rating_given",
        }
    }

    /// The job the event concerns, if any.
    #[must_use]
    pub const fn job_id(&self) -> Option<JobId> {
        match self {
            Self::UserRegistered { .. } => None,
            Self::JobCreated { job_id, .. }
            | Self::JobUpdated { job_id, .. }
            | Self::FreelancerApplied { job_id, .. }
            | Self::JobAssigned { job_id, .. }
            | Self::JobCompleted { job_id, .. }
            | Self::PaymentReleased { job_id, .. }
            | Self::JobCancelled { job_id, .. }
            | Self::DisputeRaised { job_id, .. }
            | Self::RatingGiven { job_id, .. } => Some(*job_id),
        }
    }
}

/// Fan-out of committed events to any number of subscribers.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<MarketEvent>,
}

impl EventBus {
    /// Creates a bus buffering up to `capacity` events per slow subscriber.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Subscribes to events published from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<MarketEvent> {
        self.tx.subscribe()
    }

    /// Publishes an event.
    ///
    /// Returns the number of subscribers that received it.
    pub fn publish(&self, event: MarketEvent) -> usize {
        self.tx.send(event).unwrap_or(0)
    }

    /// Number of live subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}
