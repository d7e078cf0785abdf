//! # gig-market
//!
//! Escrow-backed job marketplace for clients and freelancers.
//!
//! This crate provides:
//!
//! - Job lifecycle state machine (post, apply, assign, complete, dispute)
//! - Per-job escrow ledger with two-phase release and refund
//! - Platform fee settlement through a pluggable transfer backend
//! - Event stream of committed mutations

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod escrow;
pub mod events;
pub mod lifecycle;
pub mod marketplace;
pub mod registry;
pub mod transfer;

pub use config::MarketConfig;
pub use error::MarketError;
pub use escrow::{EscrowAccount, EscrowLedger, EscrowState};
pub use events::{EventBus, MarketEvent};
pub use lifecycle::{Application, Job, JobRole, JobStatus, UserProfile};
pub use marketplace::{MarketSnapshot, Marketplace, PaymentReceipt, RefundReceipt, StatusCounts};
pub use registry::Registry;
pub use transfer::{FundsTransfer, SimulatedTreasury, Transfer, TransferError};
