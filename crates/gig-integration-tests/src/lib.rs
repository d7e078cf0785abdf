//! Integration test crate for the gig marketplace.
//!
//! This crate exists solely to run end-to-end scenarios across the gig crates.
//! It has no public API - all functionality is in the test modules.

#![forbid(unsafe_code)]
