//! # gig-cli
//!
//! Command-line tools for the gig marketplace.
//!
//! Provides commands for:
//! - Replaying JSON action scripts against an in-memory marketplace
//! - Quoting the platform fee split for a price
//! - Validating market config files

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cli;
pub mod commands;
pub mod error;
pub mod script;

pub use cli::{Cli, Commands, Format};
pub use error::CliError;
pub use script::{Action, ReplayReport, Script};
