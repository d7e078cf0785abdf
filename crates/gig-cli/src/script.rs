//! Action scripts replayed against an in-memory marketplace.
//!
//! A script is a JSON document with an optional `config` and a list of
//! `actions`, each tagged by its `action` field:
//!
//! ```json
//! {
//!   "actions": [
//!     { "action": "register", "caller": "alice", "client": true },
//!     { "action": "create_job", "caller": "alice", "title": "API",
//!       "description": "Build it", "price": 800, "deposit": 1000 }
//!   ]
//! }
//! ```

use std::io::Write;
use std::sync::Arc;

use gig_core::{Amount, JobId, PrincipalId};
use gig_market::{MarketConfig, MarketError, MarketEvent, MarketSnapshot, Marketplace, SimulatedTreasury};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::error::CliError;

/// One caller action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    /// Register a profile.
    Register {
        /// Registering principal.
        caller: PrincipalId,
        /// Register as client.
        #[serde(default)]
        client: bool,
        /// Register as freelancer.
        #[serde(default)]
        freelancer: bool,
        /// Freelancer resume.
        #[serde(default)]
        resume: Option<String>,
    },
    /// Post a job.
    CreateJob {
        /// Posting client.
        caller: PrincipalId,
        /// Job title.
        title: String,
        /// Job description.
        description: String,
        /// Asking price.
        price: Amount,
        /// Escrow deposit.
        deposit: Amount,
    },
    /// Edit an open job.
    EditJob {
        /// Owning client.
        caller: PrincipalId,
        /// The job.
        job_id: JobId,
        /// New title.
        title: String,
        /// New description.
        description: String,
    },
    /// Apply for a job.
    Apply {
        /// Applying freelancer.
        caller: PrincipalId,
        /// The job.
        job_id: JobId,
        /// Offered price.
        bid: Amount,
    },
    /// Assign a freelancer.
    Assign {
        /// Owning client.
        caller: PrincipalId,
        /// The job.
        job_id: JobId,
        /// Freelancer to assign.
        freelancer: PrincipalId,
        /// Index of their application.
        index: usize,
    },
    /// Mark a job complete.
    Complete {
        /// Client or freelancer.
        caller: PrincipalId,
        /// The job.
        job_id: JobId,
    },
    /// Release escrowed payment.
    Release {
        /// Owning client.
        caller: PrincipalId,
        /// The job.
        job_id: JobId,
    },
    /// Cancel an open job.
    Cancel {
        /// Owning client.
        caller: PrincipalId,
        /// The job.
        job_id: JobId,
    },
    /// Raise a dispute.
    Dispute {
        /// Client or freelancer.
        caller: PrincipalId,
        /// The job.
        job_id: JobId,
    },
    /// Rate the other party.
    Rate {
        /// Client or freelancer.
        caller: PrincipalId,
        /// The job.
        job_id: JobId,
        /// Rating from 1 to 5.
        rating: u8,
    },
    /// Make the next transfer batches fail.
    FailTransfers {
        /// Number of batches to fail.
        count: u32,
    },
}

/// A replayable script.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Script {
    /// Overrides the config given on the command line.
    #[serde(default)]
    pub config: Option<MarketConfig>,
    /// Actions in execution order.
    pub actions: Vec<Action>,
}

impl Script {
    /// Parses a script from JSON.
    pub fn from_json(json: &str) -> Result<Self, CliError> {
        serde_json::from_str(json).map_err(|e| CliError::Script(e.to_string()))
    }
}

/// An action the marketplace refused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rejection {
    /// Position of the action in the script.
    pub index: usize,
    /// The error message.
    pub error: String,
}

/// Result of replaying a script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReplayReport {
    /// Actions that committed.
    pub applied: usize,
    /// Actions that were refused.
    pub rejected: Vec<Rejection>,
    /// Marketplace state after the last action.
    pub snapshot: MarketSnapshot,
}

/// Replays a script, writing each emitted event to `out` as one JSON line.
///
/// Rejected actions are reported and skipped, unless `strict` is set, in
/// which case the first rejection aborts the replay.
pub async fn replay<W: Write>(
    script: Script,
    default_config: MarketConfig,
    strict: bool,
    out: &mut W,
) -> Result<ReplayReport, CliError> {
    let config = script.config.unwrap_or(default_config);
    let market = Marketplace::new(config, Arc::new(SimulatedTreasury::new()))?;
    let mut events = market.subscribe();
    let mut applied = 0;
    let mut rejected = Vec::new();

    for (index, action) in script.actions.into_iter().enumerate() {
        debug!(index, ?action, "replaying action");
        match run_action(&market, action).await {
            Ok(()) => applied += 1,
            Err(source) if strict => return Err(CliError::Rejected { index, source }),
            Err(e) => {
                warn!(index, error = %e, "action rejected");
                rejected.push(Rejection {
                    index,
                    error: e.to_string(),
                });
            }
        }
        drain_events(&mut events, out)?;
    }

    info!(applied, rejected = rejected.len(), "replay finished");
    Ok(ReplayReport {
        applied,
        rejected,
        snapshot: market.snapshot(),
    })
}

async fn run_action(market: &Marketplace<SimulatedTreasury>, action: Action) -> Result<(), MarketError> {
    match action {
        Action::Register {
            caller,
            client,
            freelancer,
            resume,
        } => market.register_user(&caller, client, freelancer, resume),
        Action::CreateJob {
            caller,
            title,
            description,
            price,
            deposit,
        } => market
            .create_job(&caller, &title, &description, price, deposit)
            .map(|_| ()),
        Action::EditJob {
            caller,
            job_id,
            title,
            description,
        } => market.edit_job(&caller, job_id, &title, &description),
        Action::Apply { caller, job_id, bid } => market.apply_for_job(&caller, job_id, bid).map(|_| ()),
        Action::Assign {
            caller,
            job_id,
            freelancer,
            index,
        } => market.assign_job(&caller, job_id, &freelancer, index),
        Action::Complete { caller, job_id } => market.complete_job(&caller, job_id),
        Action::Release { caller, job_id } => market.release_payment(&caller, job_id).await.map(|_| ()),
        Action::Cancel { caller, job_id } => market.cancel_job(&caller, job_id).await.map(|_| ()),
        Action::Dispute { caller, job_id } => market.raise_dispute(&caller, job_id),
        Action::Rate { caller, job_id, rating } => market.give_rating(&caller, job_id, rating).map(|_| ()),
        Action::FailTransfers { count } => {
            market.treasury().fail_next(count).await;
            Ok(())
        }
    }
}

fn drain_events<W: Write>(events: &mut broadcast::Receiver<MarketEvent>, out: &mut W) -> Result<(), CliError> {
    loop {
        match events.try_recv() {
            Ok(event) => {
                serde_json::to_writer(&mut *out, &event)?;
                writeln!(out)?;
            }
            Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                warn!(skipped, "event buffer overflowed, some events were not printed");
            }
            Err(_) => return Ok(()),
        }
    }
}
