// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # txgroup: Atomic Transaction Groups
//!
//! Build, bind, sign and submit groups of transactions that a ledger
//! commits all together or not at all.
//!
//! The motivating case is small and very common: an account with no
//! balance wants to call an application, and a funded account pays for it.
//! The call carries a zero fee, the payment carries a double fee, and the
//! two only make sense together. This crate makes that pair (and anything
//! up to sixteen members) a first-class value.
//!
//! ## Architecture
//!
//! - **config**: Protocol constants. Fees, windows, limits, hash domains.
//! - **crypto**: Ed25519 keys, SHA-512/256 hashing, Bech32 addresses.
//! - **transaction**: Fee policy, builder, canonical encoding, group
//!   assembly, signing. Pure; never touches the network.
//! - **network**: Ledger client trait, HTTP and sandbox implementations,
//!   and the submission/confirmation engine.
//! - **error**: The crate-level [`Error`] wrapping every stage's errors.
//!
//! ## Pipeline
//!
//! ```text
//! NetworkParameters ─► build ─► validate_group_fees ─► assemble ─► sign_group ─► Submitter
//! ```
//!
//! ## Design Philosophy
//!
//! 1. Order is identity. A group's member order is hashed into its id and
//!    cannot be changed afterwards.
//! 2. Sign last. Fees and the group id are both signed, so both are fixed
//!    before any key is touched.
//! 3. A timeout is an answer, not an error.

pub mod config;
pub mod crypto;
pub mod error;
pub mod network;
pub mod transaction;

pub use error::{Error, Result};
