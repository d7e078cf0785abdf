//! Escrow ledger holding each job's deposit.
//!
//! Every job gets one escrow account, funded with the deposit attached at
//! job creation. An account is drained at most once: either a release (the
//! job price goes to freelancer and platform) or a refund (the whole balance
//! goes back to the client).
//!
//! Draining is two-phase. `begin_*` debits the balance and parks the account
//! in an in-flight state before any external transfer is attempted; the
//! caller then either `settle`s or `rollback`s the returned
//! [`PendingPayout`]. While in flight, no other drain can start on the same
//! account.

use std::collections::HashMap;

use gig_core::{Amount, JobId, PrincipalId};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::MarketError;

/// The state of an escrow account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EscrowState {
    /// Deposit held, nothing drained yet.
    Funded,
    /// Release debited, transfer in flight.
    Releasing,
    /// Price paid out to freelancer and platform.
    Released,
    /// Refund debited, transfer in flight.
    Refunding,
    /// Balance returned to the client.
    Refunded,
}

impl EscrowState {
    /// Checks if a transition to the target state is valid.
    #[must_use]
    pub const fn can_transition_to(&self, target: &Self) -> bool {
        use EscrowState::{Funded, Refunded, Refunding, Released, Releasing};

        matches!(
            (self, target),
            (Funded, Releasing | Refunding)
                | (Releasing, Released | Funded)
                | (Refunding, Refunded | Funded)
        )
    }

    /// Returns true while a transfer for this account is outstanding.
    #[must_use]
    pub const fn is_in_flight(&self) -> bool {
        matches!(self, Self::Releasing | Self::Refunding)
    }

    /// Returns true once the account has been drained.
    #[must_use]
    pub const fn is_finalized(&self) -> bool {
        matches!(self, Self::Released | Self::Refunded)
    }
}

impl std::fmt::Display for EscrowState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Funded => write!(f, "Funded"),
            Self::Releasing => write!(f, "Releasing"),
            Self::Released => write!(f, "Released"),
            Self::Refunding => write!(f, "Refunding"),
            Self::Refunded => write!(f, "Refunded"),
        }
    }
}

/// Funds held for one job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscrowAccount {
    /// The job this escrow is for.
    pub job_id: JobId,
    /// The client who deposited funds.
    pub depositor: PrincipalId,
    /// Amount attached at job creation.
    pub deposited: Amount,
    /// Amount still held.
    pub balance: Amount,
    /// Current state of the account.
    pub state: EscrowState,
}

/// Which way a drain sends funds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PayoutKind {
    /// Job price to freelancer and platform.
    Release,
    /// Entire balance back to the client.
    Refund,
}

/// A debit that has been committed to the ledger but whose transfer has not
/// yet been confirmed.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "a pending payout must be settled or rolled back"]
pub struct PendingPayout {
    /// The job being drained.
    pub job_id: JobId,
    /// Release or refund.
    pub kind: PayoutKind,
    /// Amount debited from the balance.
    pub amount: Amount,
    /// Balance before the debit, restored on rollback.
    pub prior_balance: Amount,
}

/// Per-job escrow balances.
#[derive(Debug, Default, Clone)]
pub struct EscrowLedger {
    accounts: HashMap<JobId, EscrowAccount>,
}

impl EscrowLedger {
    /// Creates an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a funded account for a new job.
    pub fn open(&mut self, job_id: JobId, depositor: PrincipalId, deposit: Amount) -> Result<(), MarketError> {
        if self.accounts.contains_key(&job_id) {
            return Err(MarketError::InvalidInput(format!("escrow for {job_id} already exists")));
        }
        debug!(%job_id, %deposit, "opened escrow account");
        self.accounts.insert(
            job_id,
            EscrowAccount {
                job_id,
                depositor,
                deposited: deposit,
                balance: deposit,
                state: EscrowState::Funded,
            },
        );
        Ok(())
    }

    /// Returns the account for a job.
    #[must_use]
    pub fn account(&self, job_id: JobId) -> Option<&EscrowAccount> {
        self.accounts.get(&job_id)
    }

    /// Returns the amount currently held for a job.
    #[must_use]
    pub fn balance(&self, job_id: JobId) -> Option<Amount> {
        self.accounts.get(&job_id).map(|a| a.balance)
    }

    /// Returns true while a release or refund for the job is outstanding.
    #[must_use]
    pub fn is_in_flight(&self, job_id: JobId) -> bool {
        self.accounts
            .get(&job_id)
            .is_some_and(|a| a.state.is_in_flight())
    }

    /// Sum of all balances still held.
    #[must_use]
    pub fn total_held(&self) -> Amount {
        self.accounts
            .values()
            .fold(Amount::ZERO, |acc, a| acc.checked_add(a.balance).unwrap_or(Amount::MAX))
    }

    /// Debits `price` for release and marks the account in flight.
    pub fn begin_release(&mut self, job_id: JobId, price: Amount) -> Result<PendingPayout, MarketError> {
        let account = self.drainable(job_id)?;
        if account.state == EscrowState::Released {
            return Err(MarketError::AlreadyReleased(job_id));
        }
        Self::require_funded(account)?;
        let prior_balance = account.balance;
        let remaining = prior_balance
            .checked_sub(price)
            .ok_or(MarketError::InsufficientEscrow {
                job_id,
                required: price.units(),
                available: prior_balance.units(),
            })?;

        account.balance = remaining;
        account.state = EscrowState::Releasing;
        debug!(%job_id, %price, %remaining, "escrow release pending");
        Ok(PendingPayout {
            job_id,
            kind: PayoutKind::Release,
            amount: price,
            prior_balance,
        })
    }

    /// Debits the whole balance for refund and marks the account in flight.
    pub fn begin_refund(&mut self, job_id: JobId) -> Result<PendingPayout, MarketError> {
        let account = self.drainable(job_id)?;
        Self::require_funded(account)?;
        let prior_balance = account.balance;
        if prior_balance.is_zero() {
            return Err(MarketError::InsufficientEscrow {
                job_id,
                required: 1,
                available: 0,
            });
        }

        account.balance = Amount::ZERO;
        account.state = EscrowState::Refunding;
        debug!(%job_id, amount = %prior_balance, "escrow refund pending");
        Ok(PendingPayout {
            job_id,
            kind: PayoutKind::Refund,
            amount: prior_balance,
            prior_balance,
        })
    }

    /// Finalizes a pending payout after its transfer succeeded.
    pub fn settle(&mut self, pending: &PendingPayout) -> Result<(), MarketError> {
        let target = match pending.kind {
            PayoutKind::Release => EscrowState::Released,
            PayoutKind::Refund => EscrowState::Refunded,
        };
        self.transition(pending.job_id, target)
    }

    /// Restores the balance of a pending payout whose transfer failed.
    pub fn rollback(&mut self, pending: &PendingPayout) -> Result<(), MarketError> {
        self.transition(pending.job_id, EscrowState::Funded)?;
        if let Some(account) = self.accounts.get_mut(&pending.job_id) {
            account.balance = pending.prior_balance;
        }
        debug!(job_id = %pending.job_id, balance = %pending.prior_balance, "escrow payout rolled back");
        Ok(())
    }

    fn drainable(&mut self, job_id: JobId) -> Result<&mut EscrowAccount, MarketError> {
        let account = self
            .accounts
            .get_mut(&job_id)
            .ok_or(MarketError::JobNotFound(job_id))?;
        if account.state.is_in_flight() {
            return Err(MarketError::PaymentInFlight(job_id));
        }
        Ok(account)
    }

    fn require_funded(account: &EscrowAccount) -> Result<(), MarketError> {
        if account.state == EscrowState::Funded {
            Ok(())
        } else {
            Err(MarketError::InsufficientEscrow {
                job_id: account.job_id,
                required: 1,
                available: 0,
            })
        }
    }

    fn transition(&mut self, job_id: JobId, target: EscrowState) -> Result<(), MarketError> {
        let account = self
            .accounts
            .get_mut(&job_id)
            .ok_or(MarketError::JobNotFound(job_id))?;
        if !account.state.can_transition_to(&target) {
            return Err(MarketError::InvalidInput(format!(
                "escrow for {job_id} cannot move from {} to {target}",
                account.state
            )));
        }
        account.state = target;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(n: u64) -> JobId {
        JobId::new(n).expect("job id")
    }

    fn ledger_with(deposit: u64) -> EscrowLedger {
        let mut ledger = EscrowLedger::new();
        ledger
            .open(job(1), PrincipalId::new("client").expect("principal"), Amount::new(deposit))
            .expect("open");
        ledger
    }

    #[test]
    fn escrow_state_transitions() {
        assert!(EscrowState::Funded.can_transition_to(&EscrowState::Releasing));
        assert!(EscrowState::Funded.can_transition_to(&EscrowState::Refunding));
        assert!(EscrowState::Releasing.can_transition_to(&EscrowState::Released));
        assert!(EscrowState::Releasing.can_transition_to(&EscrowState::Funded));
        assert!(EscrowState::Refunding.can_transition_to(&EscrowState::Refunded));

        assert!(!EscrowState::Funded.can_transition_to(&EscrowState::Released));
        assert!(!EscrowState::Released.can_transition_to(&EscrowState::Funded));
        assert!(!EscrowState::Refunded.can_transition_to(&EscrowState::Refunding));
        assert!(!EscrowState::Releasing.can_transition_to(&EscrowState::Refunded));
    }

    #[test]
    fn open_rejects_duplicate() {
        let mut ledger = ledger_with(100);
        let again = ledger.open(job(1), PrincipalId::new("client").expect("principal"), Amount::new(5));
        assert!(again.is_err());
        assert_eq!(ledger.balance(job(1)), Some(Amount::new(100)));
    }

    #[test]
    fn release_debits_price_and_leaves_surplus() {
        let mut ledger = ledger_with(1000);
        let pending = ledger.begin_release(job(1), Amount::new(800)).expect("begin");
        assert_eq!(pending.amount, Amount::new(800));
        assert_eq!(ledger.balance(job(1)), Some(Amount::new(200)));
        assert!(ledger.is_in_flight(job(1)));

        ledger.settle(&pending).expect("settle");
        assert_eq!(ledger.balance(job(1)), Some(Amount::new(200)));
        assert_eq!(ledger.account(job(1)).map(|a| a.state), Some(EscrowState::Released));
        assert!(!ledger.is_in_flight(job(1)));
    }

    #[test]
    fn release_requires_enough_balance() {
        let mut ledger = ledger_with(500);
        let err = ledger.begin_release(job(1), Amount::new(800)).unwrap_err();
        assert_eq!(
            err,
            MarketError::InsufficientEscrow {
                job_id: job(1),
                required: 800,
                available: 500,
            }
        );
        assert_eq!(ledger.balance(job(1)), Some(Amount::new(500)));
        assert_eq!(ledger.account(job(1)).map(|a| a.state), Some(EscrowState::Funded));
    }

    #[test]
    fn second_release_is_rejected() {
        let mut ledger = ledger_with(1000);
        let pending = ledger.begin_release(job(1), Amount::new(100)).expect("begin");
        ledger.settle(&pending).expect("settle");
        assert_eq!(
            ledger.begin_release(job(1), Amount::new(100)).unwrap_err(),
            MarketError::AlreadyReleased(job(1))
        );
        assert_eq!(ledger.balance(job(1)), Some(Amount::new(900)));
    }

    #[test]
    fn in_flight_blocks_other_drains() {
        let mut ledger = ledger_with(1000);
        let _pending = ledger.begin_release(job(1), Amount::new(1000)).expect("begin");
        assert_eq!(
            ledger.begin_release(job(1), Amount::new(1000)).unwrap_err(),
            MarketError::PaymentInFlight(job(1))
        );
        assert_eq!(
            ledger.begin_refund(job(1)).unwrap_err(),
            MarketError::PaymentInFlight(job(1))
        );
    }

    #[test]
    fn rollback_restores_balance() {
        let mut ledger = ledger_with(1000);
        let pending = ledger.begin_release(job(1), Amount::new(800)).expect("begin");
        ledger.rollback(&pending).expect("rollback");
        assert_eq!(ledger.balance(job(1)), Some(Amount::new(1000)));
        assert_eq!(ledger.account(job(1)).map(|a| a.state), Some(EscrowState::Funded));

        // the account can be drained again after a rollback
        let pending = ledger.begin_refund(job(1)).expect("refund");
        assert_eq!(pending.amount, Amount::new(1000));
    }

    #[test]
    fn refund_drains_everything_once() {
        let mut ledger = ledger_with(750);
        let pending = ledger.begin_refund(job(1)).expect("begin");
        assert_eq!(pending.amount, Amount::new(750));
        assert_eq!(ledger.balance(job(1)), Some(Amount::ZERO));
        ledger.settle(&pending).expect("settle");

        assert!(ledger.begin_refund(job(1)).is_err());
        assert!(ledger.begin_release(job(1), Amount::new(1)).is_err());
        assert!(ledger.account(job(1)).is_some_and(|a| a.state.is_finalized()));
    }

    #[test]
    fn refund_of_empty_escrow_fails() {
        let mut ledger = ledger_with(0);
        assert!(matches!(
            ledger.begin_refund(job(1)),
            Err(MarketError::InsufficientEscrow { available: 0, .. })
        ));
    }

    #[test]
    fn settle_twice_is_rejected() {
        let mut ledger = ledger_with(10);
        let pending = ledger.begin_refund(job(1)).expect("begin");
        ledger.settle(&pending).expect("settle");
        assert!(ledger.settle(&pending).is_err());
        assert!(ledger.rollback(&pending).is_err());
    }

    #[test]
    fn unknown_job_is_not_found() {
        let mut ledger = EscrowLedger::new();
        assert_eq!(ledger.begin_refund(job(9)).unwrap_err(), MarketError::JobNotFound(job(9)));
        assert_eq!(ledger.balance(job(9)), None);
    }

    #[test]
    fn total_held_sums_balances() {
        let mut ledger = ledger_with(1000);
        ledger
            .open(job(2), PrincipalId::new("other").expect("principal"), Amount::new(250))
            .expect("open");
        assert_eq!(ledger.total_held(), Amount::new(1250));
    }
}
