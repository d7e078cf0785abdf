//! # gig-core
//!
//! Primitives shared by the gig escrow marketplace.
//!
//! This crate provides:
//!
//! - [`Amount`]: Funds in indivisible base units with checked arithmetic
//! - [`PrincipalId`] / [`JobId`]: Caller and job identifiers
//! - [`FeeSchedule`]: Platform fee split applied at payment release
//! - [`Rating`]: Validated 1..=5 rating and the running-average update

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod amount;
pub mod error;
pub mod fee;
pub mod id;
pub mod rating;

pub use amount::Amount;
pub use error::CoreError;
pub use fee::{FeeSchedule, FeeSplit, DEFAULT_PLATFORM_FEE_PERCENT};
pub use id::{JobId, PrincipalId};
pub use rating::{running_average, Rating, MAX_RATING, MIN_RATING};
