//! # Network Module
//!
//! Everything that talks to a ledger node. The transaction pipeline in
//! [`crate::transaction`] is pure; this module is where bytes leave the
//! process and where the crate waits for rounds to pass.
//!
//! ## Architecture
//!
//! ```text
//! rpc.rs      LedgerClient / ProgramCompiler traits and response types
//! http.rs     HttpLedgerClient: node REST API over reqwest
//! sandbox.rs  SandboxLedger: in-process ledger for tests and offline use
//! submit.rs   Submitter: submission and confirmation state machine
//! ```
//!
//! ## Design Decisions
//!
//! - The node is reached only through the [`LedgerClient`] trait, so the
//!   submission engine is tested against scripted clients and the sandbox
//!   without any sockets.
//! - Waiting for confirmation suspends inside the node's "wait for block"
//!   call. There is no client-side sleep loop and no background task.
//! - Only transport failures are retryable. A node that says no has looked
//!   at the bytes, and the same bytes will get the same answer.

pub mod http;
pub mod rpc;
pub mod sandbox;
pub mod submit;

pub use http::HttpLedgerClient;
pub use rpc::{
    ApplicationState, ClientError, ConfirmationEffects, LedgerClient, NodeStatus,
    PendingTransaction, ProgramCompiler, StateDelta, TealValue,
};
pub use sandbox::{SandboxConfig, SandboxLedger};
pub use submit::{
    ConfirmationResult, SubmissionHandle, SubmissionState, SubmitError, Submitter,
};
