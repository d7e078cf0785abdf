//! External fund movement.
//!
//! The marketplace never moves money itself; it hands a batch of payouts to
//! a [`FundsTransfer`] backend as the final step of a release or refund.
//! Backends must apply a batch all-or-nothing: either every payout lands or
//! none does.
//!
//! [`SimulatedTreasury`] is an in-memory backend for development and tests.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use gig_core::{Amount, JobId, PrincipalId};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// A single payout leg.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    /// The job whose escrow funds the payout.
    pub job_id: JobId,
    /// Receiving account.
    pub to: PrincipalId,
    /// Amount to credit.
    pub amount: Amount,
}

/// Errors reported by a transfer backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransferError {
    /// The receiving account cannot accept funds.
    #[error("recipient {0} rejected the transfer")]
    RecipientRejected(PrincipalId),

    /// The backend is unreachable or refused the batch.
    #[error("transfer backend unavailable: {0}")]
    Unavailable(String),

    /// Crediting would overflow the recipient's balance.
    #[error("balance overflow for {0}")]
    Overflow(PrincipalId),
}

/// Moves funds out of platform custody.
#[async_trait]
pub trait FundsTransfer: Send + Sync {
    /// Applies every transfer in `batch`, or none of them.
    ///
    /// Dropping the returned future before it resolves must leave the batch
    /// unapplied; the marketplace rolls its escrow back in that case.
    async fn transfer(&self, batch: &[Transfer]) -> Result<(), TransferError>;
}

#[derive(Debug, Default)]
struct SimulatedState {
    balances: HashMap<PrincipalId, Amount>,
    rejected: HashSet<PrincipalId>,
    fail_next: u32,
    paid_out: Amount,
    batches: u64,
}

/// In-memory transfer backend.
///
/// Credits recipients in a local balance map. Failures can be injected with
/// [`fail_next`](Self::fail_next) and [`reject_recipient`](Self::reject_recipient).
#[derive(Debug, Default)]
pub struct SimulatedTreasury {
    state: Mutex<SimulatedState>,
}

impl SimulatedTreasury {
    /// Creates an empty treasury.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails the next `count` batches with `Unavailable`.
    pub async fn fail_next(&self, count: u32) {
        self.state.lock().await.fail_next = count;
    }

    /// Makes every batch paying `recipient` fail.
    pub async fn reject_recipient(&self, recipient: PrincipalId) {
        self.state.lock().await.rejected.insert(recipient);
    }

    /// Lifts a rejection set by [`reject_recipient`](Self::reject_recipient).
    pub async fn accept_recipient(&self, recipient: &PrincipalId) {
        self.state.lock().await.rejected.remove(recipient);
    }

    /// Total credited to an account so far.
    pub async fn balance(&self, account: &PrincipalId) -> Amount {
        self.state
            .lock()
            .await
            .balances
            .get(account)
            .copied()
            .unwrap_or(Amount::ZERO)
    }

    /// Total credited across all accounts.
    pub async fn paid_out(&self) -> Amount {
        self.state.lock().await.paid_out
    }

    /// Number of batches applied successfully.
    pub async fn batches_applied(&self) -> u64 {
        self.state.lock().await.batches
    }
}

#[async_trait]
impl FundsTransfer for SimulatedTreasury {
    async fn transfer(&self, batch: &[Transfer]) -> Result<(), TransferError> {
        // let concurrent callers interleave here the way a network call would
        tokio::task::yield_now().await;

        let mut state = self.state.lock().await;
        if state.fail_next > 0 {
            state.fail_next -= 1;
            return Err(TransferError::Unavailable("injected failure".into()));
        }

        // validate the whole batch before crediting anything
        let mut credited = state.balances.clone();
        let mut paid_out = state.paid_out;
        for leg in batch {
            if state.rejected.contains(&leg.to) {
                return Err(TransferError::RecipientRejected(leg.to.clone()));
            }
            let entry = credited.entry(leg.to.clone()).or_insert(Amount::ZERO);
            *entry = entry
                .checked_add(leg.amount)
                .ok_or_else(|| TransferError::Overflow(leg.to.clone()))?;
            paid_out = paid_out
                .checked_add(leg.amount)
                .ok_or_else(|| TransferError::Overflow(leg.to.clone()))?;
            debug!(job_id = %leg.job_id, to = %leg.to, amount = %leg.amount, "transfer leg staged");
        }

        state.balances = credited;
        state.paid_out = paid_out;
        state.batches += 1;
        info!(legs = batch.len(), total_paid_out = %paid_out, "transfer batch applied");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn principal(id: &str) -> PrincipalId {
        PrincipalId::new(id).expect("principal")
    }

    fn leg(to: &str, amount: u64) -> Transfer {
        Transfer {
            job_id: JobId::FIRST,
            to: principal(to),
            amount: Amount::new(amount),
        }
    }

    #[tokio::test]
    async fn applies_batch() {
        let treasury = SimulatedTreasury::new();
        treasury
            .transfer(&[leg("dev", 784), leg("platform", 16)])
            .await
            .expect("transfer");

        assert_eq!(treasury.balance(&principal("dev")).await, Amount::new(784));
        assert_eq!(treasury.balance(&principal("platform")).await, Amount::new(16));
        assert_eq!(treasury.paid_out().await, Amount::new(800));
        assert_eq!(treasury.batches_applied().await, 1);
    }

    #[tokio::test]
    async fn rejected_recipient_fails_whole_batch() {
        let treasury = SimulatedTreasury::new();
        treasury.reject_recipient(principal("platform")).await;

        let err = treasury
            .transfer(&[leg("dev", 784), leg("platform", 16)])
            .await
            .unwrap_err();
        assert_eq!(err, TransferError::RecipientRejected(principal("platform")));
        // first leg was not credited either
        assert_eq!(treasury.balance(&principal("dev")).await, Amount::ZERO);
        assert_eq!(treasury.paid_out().await, Amount::ZERO);

        treasury.accept_recipient(&principal("platform")).await;
        assert!(treasury.transfer(&[leg("platform", 16)]).await.is_ok());
    }

    #[tokio::test]
    async fn injected_failures_are_consumed() {
        let treasury = SimulatedTreasury::new();
        treasury.fail_next(1).await;

        assert!(matches!(
            treasury.transfer(&[leg("dev", 1)]).await,
            Err(TransferError::Unavailable(_))
        ));
        assert!(treasury.transfer(&[leg("dev", 1)]).await.is_ok());
        assert_eq!(treasury.balance(&principal("dev")).await, Amount::new(1));
    }

    #[tokio::test]
    async fn overflow_is_rejected() {
        let treasury = SimulatedTreasury::new();
        treasury.transfer(&[leg("dev", u64::MAX)]).await.expect("first");
        let err = treasury.transfer(&[leg("dev", 1)]).await.unwrap_err();
        assert_eq!(err, TransferError::Overflow(principal("dev")));
        assert_eq!(treasury.balance(&principal("dev")).await, Amount::MAX);
    }
}
