//! # Transaction Module
//!
//! Construction, grouping, and signing of ledger transactions. Nothing in
//! this module touches the network; see [`crate::network`] for submission.
//!
//! ## Architecture
//!
//! ```text
//! types.rs     Transaction kinds and their bodies
//! params.rs    NetworkParameters snapshot
//! fee.rs       Fee roles and the group fee check
//! builder.rs   UnsignedTransaction, TxIntent, TransactionBuilder
//! encoding.rs  Canonical binary encoding (ids and signatures hang off it)
//! group.rs     Atomic group assembly and group ids
//! signing.rs   Authorities, proofs, SignedTransaction
//! composer.rs  AtomicComposer: fee check, assemble, sign in one call
//! ```
//!
//! ## Transaction Lifecycle
//!
//! 1. **Build**: [`TransactionBuilder`] or [`build`] with a
//!    [`NetworkParameters`] snapshot. Fees are resolved from the
//!    [`FeeRole`].
//! 2. **Check fees**: [`validate_group_fees`] over the whole group.
//! 3. **Assemble**: [`assemble`] computes the group id and writes it into
//!    every member.
//! 4. **Sign**: [`sign_group`] with one [`Authority`] per member.
//! 5. **Submit**: hand the signed members to
//!    [`crate::network::Submitter`].
//!
//! Steps 2 to 4 must happen in that order. The fee is part of what gets
//! signed, and so is the group id.

pub mod builder;
pub mod composer;
pub mod encoding;
pub mod fee;
pub mod group;
pub mod params;
pub mod signing;
pub mod types;

pub use builder::{build, BuildError, GroupId, TransactionBuilder, TxId, TxIntent, UnsignedTransaction};
pub use composer::AtomicComposer;
pub use encoding::{decode_group, encode_group, DecodeError};
pub use fee::{resolve_fee, validate_fees, validate_group_fees, FeePolicyError, FeeRole};
pub use group::{assemble, compute_group_id, GroupError, TransactionGroup};
pub use params::NetworkParameters;
pub use signing::{
    sign, sign_group, AuthorizationError, AuthorizationProof, Authority, LogicSig,
    MultisigSignature, MultisigSubsig, SignedTransaction,
};
pub use types::{AssetParams, OnComplete, StateSchema, TransactionBody, TransactionType};
