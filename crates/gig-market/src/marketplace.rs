//! The marketplace: every caller-facing action and query.
//!
//! All records live behind one `RwLock`. Each write action validates and
//! mutates inside a single write-lock critical section and publishes its
//! event before the lock is released, so actions are totally ordered and
//! events arrive in commit order.
//!
//! Payment actions (`release_payment`, `cancel_job`) are the only ones that
//! touch the outside world. They run in three steps:
//!
//! 1. under the lock: validate, debit escrow, flip the job's flags, mark the
//!    escrow account in flight
//! 2. without the lock: hand the payouts to the [`FundsTransfer`] backend
//! 3. under the lock: settle (and publish) on success, or restore every
//!    field touched in step 1 on failure
//!
//! Because step 1 already committed, a concurrent second call observes the
//! job as released or cancelled and fails instead of paying twice. If the
//! caller drops the future during step 2, step 1 is rolled back as if the
//! transfer had failed, so the job can be released or cancelled again.
//!
//! A payout counts as committed, and its `PaymentReleased` or `JobCancelled`
//! event is published, only in step 3. Other actions that commit while a
//! transfer is in flight (a rating, an application on another job) publish
//! their events first, so event order follows commit order rather than call
//! order.

use std::sync::Arc;

use chrono::Utc;
use gig_core::{running_average, Amount, FeeSchedule, JobId, PrincipalId, Rating};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::config::MarketConfig;
use crate::error::MarketError;
use crate::escrow::{EscrowAccount, EscrowLedger, PayoutKind, PendingPayout};
use crate::events::{EventBus, MarketEvent};
use crate::lifecycle::{Application, Job, JobRole, JobStatus, UserProfile};
use crate::registry::Registry;
use crate::transfer::{FundsTransfer, Transfer};

/// Outcome of a successful payment release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentReceipt {
    /// The paid job.
    pub job_id: JobId,
    /// The paid freelancer.
    pub freelancer: PrincipalId,
    /// Amount credited to the freelancer.
    pub payout: Amount,
    /// Amount credited to the platform.
    pub fee: Amount,
    /// Account that received the fee.
    pub platform: PrincipalId,
}

impl PaymentReceipt {
    fn transfers(&self) -> Vec<Transfer> {
        [(&self.freelancer, self.payout), (&self.platform, self.fee)]
            .into_iter()
            .filter(|(_, amount)| !amount.is_zero())
            .map(|(to, amount)| Transfer {
                job_id: self.job_id,
                to: to.clone(),
                amount,
            })
            .collect()
    }
}

/// Outcome of a successful cancellation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundReceipt {
    /// The cancelled job.
    pub job_id: JobId,
    /// The refunded client.
    pub client: PrincipalId,
    /// Amount returned.
    pub amount: Amount,
}

/// Number of jobs in each status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    /// Open jobs.
    pub open: u64,
    /// Assigned jobs.
    pub assigned: u64,
    /// Completed jobs.
    pub completed: u64,
    /// Cancelled jobs.
    pub cancelled: u64,
    /// Disputed jobs.
    pub disputed: u64,
}

/// A consistent point-in-time summary of the marketplace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    /// Registered profiles.
    pub total_users: u64,
    /// Jobs ever created.
    pub total_jobs: u64,
    /// Funds still held across all escrow accounts.
    pub total_escrowed: Amount,
    /// Jobs per status.
    pub jobs_by_status: StatusCounts,
}

#[derive(Debug, Default)]
struct MarketState {
    registry: Registry,
    ledger: EscrowLedger,
}

/// The job marketplace with escrow-backed settlement.
pub struct Marketplace<T: FundsTransfer> {
    config: Arc<MarketConfig>,
    fees: FeeSchedule,
    platform: PrincipalId,
    state: RwLock<MarketState>,
    treasury: Arc<T>,
    events: EventBus,
}

impl<T: FundsTransfer> Marketplace<T> {
    /// Creates a marketplace paying out through `treasury`.
    ///
    /// # Errors
    ///
    /// Returns `MarketError::Config` if the config does not validate.
    pub fn new(config: MarketConfig, treasury: Arc<T>) -> Result<Self, MarketError> {
        config.validate()?;
        let fees = config.fee_schedule()?;
        let platform = config.platform_principal()?;
        let events = EventBus::new(config.event_capacity);
        info!(fee_percent = fees.percent(), %platform, "marketplace initialized");
        Ok(Self {
            config: Arc::new(config),
            fees,
            platform,
            state: RwLock::new(MarketState::default()),
            treasury,
            events,
        })
    }

    /// The configuration the marketplace was built with.
    #[must_use]
    pub fn config(&self) -> &MarketConfig {
        &self.config
    }

    /// The fee schedule applied on release.
    #[must_use]
    pub const fn fee_schedule(&self) -> FeeSchedule {
        self.fees
    }

    /// The transfer backend.
    #[must_use]
    pub fn treasury(&self) -> &Arc<T> {
        &self.treasury
    }

    /// Subscribes to events committed from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<MarketEvent> {
        self.events.subscribe()
    }

    /// Runs `action` under the write lock and publishes its event on success.
    fn commit<R>(
        &self,
        action: impl FnOnce(&mut MarketState) -> Result<(R, MarketEvent), MarketError>,
    ) -> Result<R, MarketError> {
        let mut state = self.state.write();
        let (result, event) = action(&mut state)?;
        self.events.publish(event);
        Ok(result)
    }

    // ------------------------------------------------------------------
    // Registration
    // ------------------------------------------------------------------

    /// Registers the caller's profile. Roles can never change afterwards.
    pub fn register_user(
        &self,
        caller: &PrincipalId,
        is_client: bool,
        is_freelancer: bool,
        resume: Option<String>,
    ) -> Result<(), MarketError> {
        self.commit(|state| {
            if state.registry.user(caller).is_some() {
                return Err(MarketError::AlreadyRegistered(caller.clone()));
            }
            let profile = UserProfile::new(is_client, is_freelancer, resume)?;
            state.registry.insert_user(caller.clone(), profile)?;
            info!(user = %caller, is_client, is_freelancer, "user registered");
            Ok((
                (),
                MarketEvent::UserRegistered {
                    user: caller.clone(),
                    is_client,
                    is_freelancer,
                },
            ))
        })
    }

    // ------------------------------------------------------------------
    // Job lifecycle
    // ------------------------------------------------------------------

    /// Posts a job, placing `deposit` in escrow.
    ///
    /// The deposit is not required to match the price; release later
    /// requires the escrow to cover the (possibly lowered) price.
    pub fn create_job(
        &self,
        caller: &PrincipalId,
        title: &str,
        description: &str,
        price: Amount,
        deposit: Amount,
    ) -> Result<JobId, MarketError> {
        self.commit(|state| {
            require_role(&state.registry, caller, |p| p.is_client, "create a job")?;
            if price.is_zero() {
                return Err(MarketError::InvalidInput("price must be greater than zero".into()));
            }
            require_text("title", title)?;
            require_text("description", description)?;

            let job_id = state.registry.peek_job_id()?;
            let job = Job::new(
                job_id,
                caller.clone(),
                title.to_string(),
                description.to_string(),
                price,
            );
            state.ledger.open(job_id, caller.clone(), deposit)?;
            state.registry.insert_job(job)?;
            info!(%job_id, client = %caller, %price, %deposit, "job created");
            Ok((
                job_id,
                MarketEvent::JobCreated {
                    job_id,
                    client: caller.clone(),
                    price,
                    deposit,
                },
            ))
        })
    }

    /// Replaces the title and description of an open job.
    pub fn edit_job(
        &self,
        caller: &PrincipalId,
        job_id: JobId,
        title: &str,
        description: &str,
    ) -> Result<(), MarketError> {
        self.commit(|state| {
            let job = state.registry.job(job_id)?;
            job.require_client(caller, "edit")?;
            job.require_status(JobStatus::Open, "edit")?;
            require_text("title", title)?;
            require_text("description", description)?;

            let job = state.registry.job_mut(job_id)?;
            job.title = title.to_string();
            job.description = description.to_string();
            info!(%job_id, "job updated");
            Ok((
                (),
                MarketEvent::JobUpdated {
                    job_id,
                    title: title.to_string(),
                },
            ))
        })
    }

    /// Applies for an open job with a bid no higher than its price.
    ///
    /// Returns the application's index, used later by `assign_job`.
    pub fn apply_for_job(&self, caller: &PrincipalId, job_id: JobId, bid: Amount) -> Result<usize, MarketError> {
        self.commit(|state| {
            let job = state.registry.job(job_id)?;
            let profile = require_role(&state.registry, caller, |p| p.is_freelancer, "apply for jobs")?;
            job.require_status(JobStatus::Open, "apply for")?;
            if state.registry.has_applied(job_id, caller) {
                return Err(MarketError::AlreadyApplied {
                    job_id,
                    freelancer: caller.clone(),
                });
            }
            if bid > job.price {
                return Err(MarketError::BidExceedsPrice {
                    job_id,
                    bid: bid.units(),
                    price: job.price.units(),
                });
            }

            let application = Application {
                freelancer: caller.clone(),
                resume: profile.resume.clone(),
                bid,
                submitted_at: Utc::now(),
            };
            let index = state.registry.push_application(job_id, application)?;
            info!(%job_id, freelancer = %caller, %bid, index, "freelancer applied");
            Ok((
                index,
                MarketEvent::FreelancerApplied {
                    job_id,
                    freelancer: caller.clone(),
                    bid,
                },
            ))
        })
    }

    /// Assigns `freelancer` using their application at `application_index`.
    ///
    /// A bid strictly between zero and the price lowers the price to the
    /// bid; a bid of zero or of exactly the price leaves it unchanged.
    pub fn assign_job(
        &self,
        caller: &PrincipalId,
        job_id: JobId,
        freelancer: &PrincipalId,
        application_index: usize,
    ) -> Result<(), MarketError> {
        self.commit(|state| {
            let job = state.registry.job(job_id)?;
            job.require_client(caller, "assign")?;
            job.require_status(JobStatus::Open, "assign")?;
            if !state.registry.user(freelancer).is_some_and(|p| p.is_freelancer) {
                return Err(MarketError::Unauthorized {
                    caller: freelancer.clone(),
                    action: "be assigned work",
                });
            }
            let application = state.registry.application(job_id, application_index)?;
            if application.freelancer != *freelancer {
                return Err(MarketError::ApplicationMismatch {
                    job_id,
                    index: application_index,
                    freelancer: freelancer.clone(),
                });
            }
            let bid = application.bid;

            let job = state.registry.job_mut(job_id)?;
            job.transition_to(JobStatus::Assigned, "assign")?;
            job.freelancer = Some(freelancer.clone());
            if !bid.is_zero() && bid < job.price {
                debug!(%job_id, old_price = %job.price, new_price = %bid, "price lowered to accepted bid");
                job.price = bid;
            }
            let price = job.price;
            state.registry.index_assignment(job_id, freelancer);
            info!(%job_id, %freelancer, %price, "job assigned");
            Ok((
                (),
                MarketEvent::JobAssigned {
                    job_id,
                    freelancer: freelancer.clone(),
                    price,
                },
            ))
        })
    }

    /// Marks an assigned job complete. Either party may do this alone.
    pub fn complete_job(&self, caller: &PrincipalId, job_id: JobId) -> Result<(), MarketError> {
        self.commit(|state| {
            let job = state.registry.job(job_id)?;
            let role = job.require_party(caller, "complete")?;
            job.require_status(JobStatus::Assigned, "complete")?;
            let freelancer = job
                .freelancer
                .clone()
                .ok_or_else(|| job.invalid_state("complete"))?;

            let job = state.registry.job_mut(job_id)?;
            job.transition_to(JobStatus::Completed, "complete")?;
            job.completed_at = Some(Utc::now());
            if let Some(profile) = state.registry.user_mut(&freelancer) {
                profile.completed_jobs += 1;
            }
            match role {
                JobRole::Client => info!(%job_id, client = %caller, "job completed by client"),
                JobRole::Freelancer => info!(%job_id, %freelancer, "job completed by freelancer"),
            }
            Ok((
                (),
                MarketEvent::JobCompleted {
                    job_id,
                    completed_by: caller.clone(),
                },
            ))
        })
    }

    /// Records a dispute on an assigned or completed job.
    ///
    /// A completed job whose payment has been released (or is being
    /// released) can no longer be disputed.
    pub fn raise_dispute(&self, caller: &PrincipalId, job_id: JobId) -> Result<(), MarketError> {
        self.commit(|state| {
            let job = state.registry.job(job_id)?;
            let role = job.require_party(caller, "raise a dispute on")?;
            if !matches!(job.status, JobStatus::Assigned | JobStatus::Completed) || job.funds_released {
                return Err(job.invalid_state("raise a dispute on"));
            }
            if state.ledger.is_in_flight(job_id) {
                return Err(MarketError::PaymentInFlight(job_id));
            }

            state
                .registry
                .job_mut(job_id)?
                .transition_to(JobStatus::Disputed, "raise a dispute on")?;
            info!(%job_id, raised_by = %caller, ?role, "dispute raised");
            Ok((
                (),
                MarketEvent::DisputeRaised {
                    job_id,
                    raised_by: caller.clone(),
                },
            ))
        })
    }

    /// Rates the other party of a completed job.
    ///
    /// The client rates the freelancer and the freelancer rates the client.
    /// The ratee's completed-job count weights the running average.
    pub fn give_rating(&self, caller: &PrincipalId, job_id: JobId, rating: u8) -> Result<u8, MarketError> {
        self.commit(|state| {
            let job = state.registry.job(job_id)?;
            job.require_status(JobStatus::Completed, "rate")?;
            let rating = Rating::new(rating)?;
            let ratee = match job.require_party(caller, "rate")? {
                JobRole::Client => job.freelancer.clone().ok_or_else(|| job.invalid_state("rate"))?,
                JobRole::Freelancer => job.client.clone(),
            };

            let profile = state
                .registry
                .user_mut(&ratee)
                .ok_or_else(|| MarketError::InvalidInput(format!("ratee {ratee} has no profile")))?;
            let new_rating = running_average(profile.rating, profile.completed_jobs, rating);
            profile.rating = new_rating;
            info!(%job_id, rater = %caller, %ratee, rating = rating.value(), new_rating, "rating given");
            Ok((
                new_rating,
                MarketEvent::RatingGiven {
                    job_id,
                    rater: caller.clone(),
                    ratee,
                    rating: rating.value(),
                    new_rating,
                },
            ))
        })
    }

    // ------------------------------------------------------------------
    // Payments
    // ------------------------------------------------------------------

    /// Pays the job price out of escrow: price minus fee to the freelancer,
    /// fee to the platform.
    ///
    /// Any escrow beyond the price stays in the account. Dropping the
    /// returned future before it resolves rolls the release back.
    pub async fn release_payment(&self, caller: &PrincipalId, job_id: JobId) -> Result<PaymentReceipt, MarketError> {
        let (pending, receipt) = {
            let mut guard = self.state.write();
            let state = &mut *guard;
            let job = state.registry.job(job_id)?;
            job.require_client(caller, "release payment for")?;
            job.require_status(JobStatus::Completed, "release payment for")?;
            if job.funds_released {
                return Err(MarketError::AlreadyReleased(job_id));
            }
            let freelancer = job
                .freelancer
                .clone()
                .ok_or_else(|| job.invalid_state("release payment for"))?;
            let price = job.price;

            let pending = state.ledger.begin_release(job_id, price)?;
            state.registry.job_mut(job_id)?.funds_released = true;
            let split = self.fees.split(price);
            debug!(%job_id, %price, payout = %split.payout, fee = %split.fee, "release committed, transferring");
            (
                pending,
                PaymentReceipt {
                    job_id,
                    freelancer,
                    payout: split.payout,
                    fee: split.fee,
                    platform: self.platform.clone(),
                },
            )
        };
        let in_flight = InFlightPayout::new(&self.state, pending);

        let outcome = self.treasury.transfer(&receipt.transfers()).await;

        let pending = in_flight.disarm();
        let mut guard = self.state.write();
        let state = &mut *guard;
        match outcome {
            Ok(()) => {
                state.ledger.settle(&pending)?;
                info!(%job_id, freelancer = %receipt.freelancer, payout = %receipt.payout, fee = %receipt.fee, "payment released");
                self.events.publish(MarketEvent::PaymentReleased {
                    job_id,
                    freelancer: receipt.freelancer.clone(),
                    payout: receipt.payout,
                    fee: receipt.fee,
                });
                Ok(receipt)
            }
            Err(e) => {
                undo_payout(state, &pending)?;
                warn!(%job_id, error = %e, "release transfer failed, rolled back");
                Err(MarketError::TransferFailed {
                    job_id,
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Cancels an open job and refunds the full escrow to the client.
    ///
    /// Dropping the returned future before it resolves reopens the job.
    pub async fn cancel_job(&self, caller: &PrincipalId, job_id: JobId) -> Result<RefundReceipt, MarketError> {
        let (pending, receipt) = {
            let mut guard = self.state.write();
            let state = &mut *guard;
            let job = state.registry.job(job_id)?;
            job.require_client(caller, "cancel")?;
            job.require_status(JobStatus::Open, "cancel")?;

            let pending = state.ledger.begin_refund(job_id)?;
            state
                .registry
                .job_mut(job_id)?
                .transition_to(JobStatus::Cancelled, "cancel")?;
            debug!(%job_id, amount = %pending.amount, "cancel committed, refunding");
            let receipt = RefundReceipt {
                job_id,
                client: caller.clone(),
                amount: pending.amount,
            };
            (pending, receipt)
        };
        let in_flight = InFlightPayout::new(&self.state, pending);

        let refund = [Transfer {
            job_id,
            to: receipt.client.clone(),
            amount: receipt.amount,
        }];
        let outcome = self.treasury.transfer(&refund).await;

        let pending = in_flight.disarm();
        let mut guard = self.state.write();
        let state = &mut *guard;
        match outcome {
            Ok(()) => {
                state.ledger.settle(&pending)?;
                info!(%job_id, client = %receipt.client, refund = %receipt.amount, "job cancelled");
                self.events.publish(MarketEvent::JobCancelled {
                    job_id,
                    refund: receipt.amount,
                });
                Ok(receipt)
            }
            Err(e) => {
                undo_payout(state, &pending)?;
                warn!(%job_id, error = %e, "refund transfer failed, rolled back");
                Err(MarketError::TransferFailed {
                    job_id,
                    reason: e.to_string(),
                })
            }
        }
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Returns a copy of a job.
    pub fn job_details(&self, job_id: JobId) -> Result<Job, MarketError> {
        self.state.read().registry.job(job_id).cloned()
    }

    /// Returns a job's applications in submission order.
    pub fn job_applications(&self, job_id: JobId) -> Result<Vec<Application>, MarketError> {
        let state = self.state.read();
        state.registry.job(job_id)?;
        Ok(state.registry.applications(job_id).to_vec())
    }

    /// Jobs posted by `client`, oldest first.
    #[must_use]
    pub fn client_jobs(&self, client: &PrincipalId) -> Vec<JobId> {
        self.state.read().registry.client_jobs(client).to_vec()
    }

    /// Jobs assigned to `freelancer`, oldest assignment first.
    #[must_use]
    pub fn freelancer_jobs(&self, freelancer: &PrincipalId) -> Vec<JobId> {
        self.state.read().registry.freelancer_jobs(freelancer).to_vec()
    }

    /// Returns a copy of a profile, if registered.
    #[must_use]
    pub fn user_profile(&self, principal: &PrincipalId) -> Option<UserProfile> {
        self.state.read().registry.user(principal).cloned()
    }

    /// Number of jobs ever created.
    #[must_use]
    pub fn total_jobs(&self) -> u64 {
        self.state.read().registry.total_jobs()
    }

    /// Number of registered profiles.
    #[must_use]
    pub fn total_users(&self) -> u64 {
        self.state.read().registry.total_users()
    }

    /// Amount currently held in a job's escrow.
    pub fn escrowed_amount(&self, job_id: JobId) -> Result<Amount, MarketError> {
        self.state
            .read()
            .ledger
            .balance(job_id)
            .ok_or(MarketError::JobNotFound(job_id))
    }

    /// Returns a copy of a job's escrow account.
    pub fn escrow_account(&self, job_id: JobId) -> Result<EscrowAccount, MarketError> {
        self.state
            .read()
            .ledger
            .account(job_id)
            .cloned()
            .ok_or(MarketError::JobNotFound(job_id))
    }

    /// Summarizes the marketplace under a single read lock.
    #[must_use]
    pub fn snapshot(&self) -> MarketSnapshot {
        let state = self.state.read();
        let mut counts = StatusCounts::default();
        for job in state.registry.jobs() {
            let slot = match job.status {
                JobStatus::Open => &mut counts.open,
                JobStatus::Assigned => &mut counts.assigned,
                JobStatus::Completed => &mut counts.completed,
                JobStatus::Cancelled => &mut counts.cancelled,
                JobStatus::Disputed => &mut counts.disputed,
            };
            *slot += 1;
        }
        MarketSnapshot {
            total_users: state.registry.total_users(),
            total_jobs: state.registry.total_jobs(),
            total_escrowed: state.ledger.total_held(),
            jobs_by_status: counts,
        }
    }
}

impl<T: FundsTransfer> std::fmt::Debug for Marketplace<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Marketplace")
            .field("config", &self.config)
            .field("subscribers", &self.events.subscriber_count())
            .finish_non_exhaustive()
    }
}

fn require_role<'a>(
    registry: &'a Registry,
    caller: &PrincipalId,
    has_role: impl Fn(&UserProfile) -> bool,
    action: &'static str,
) -> Result<&'a UserProfile, MarketError> {
    registry
        .user(caller)
        .filter(|p| has_role(p))
        .ok_or_else(|| MarketError::Unauthorized {
            caller: caller.clone(),
            action,
        })
}

fn require_text(field: &str, value: &str) -> Result<(), MarketError> {
    if value.trim().is_empty() {
        return Err(MarketError::InvalidInput(format!("{field} must not be empty")));
    }
    Ok(())
}

/// Restores everything a payout committed before its transfer: the escrow
/// balance and state, plus `funds_released` or the job status.
fn undo_payout(state: &mut MarketState, pending: &PendingPayout) -> Result<(), MarketError> {
    state.ledger.rollback(pending)?;
    let job = state.registry.job_mut(pending.job_id)?;
    match pending.kind {
        PayoutKind::Release => job.funds_released = false,
        // Cancelled -> Open is not a lifecycle transition; this restores the pre-call status
        PayoutKind::Refund => job.status = JobStatus::Open,
    }
    Ok(())
}

/// A committed payout whose transfer has not reported back.
///
/// Rolls the payout back on drop unless [`disarm`](Self::disarm)ed, so a
/// caller abandoning the future mid-transfer cannot strand the escrow.
/// Must never be dropped while the state lock is held.
struct InFlightPayout<'a> {
    state: &'a RwLock<MarketState>,
    pending: PendingPayout,
    armed: bool,
}

impl<'a> InFlightPayout<'a> {
    const fn new(state: &'a RwLock<MarketState>, pending: PendingPayout) -> Self {
        Self {
            state,
            pending,
            armed: true,
        }
    }

    /// Hands the payout back to the caller, who must settle or undo it.
    fn disarm(mut self) -> PendingPayout {
        self.armed = false;
        self.pending.clone()
    }
}

impl Drop for InFlightPayout<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let pending = &self.pending;
        let mut state = self.state.write();
        match undo_payout(&mut state, pending) {
            Ok(()) => warn!(job_id = %pending.job_id, kind = ?pending.kind, "payout abandoned mid-transfer, rolled back"),
            Err(e) => warn!(job_id = %pending.job_id, error = %e, "failed to roll back abandoned payout"),
        }
    }
}
