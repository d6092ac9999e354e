//! # Ledger RPC Interface
//!
//! The ledger node is an external collaborator. Everything this crate needs
//! from it is captured by the [`LedgerClient`] trait, and everything it
//! needs from a contract compiler by [`ProgramCompiler`]. Two
//! implementations ship with the crate:
//!
//! - [`super::http::HttpLedgerClient`] talks to a node's REST API.
//! - [`super::sandbox::SandboxLedger`] is an in-process ledger for tests,
//!   demos and offline use.
//!
//! ## Method Index
//!
//! | Method | Node endpoint |
//! |--------|---------------|
//! | `suggested_params` | `GET /v2/transactions/params` |
//! | `send_raw_transactions` | `POST /v2/transactions` |
//! | `pending_transaction` | `GET /v2/transactions/pending/{id}` |
//! | `status` | `GET /v2/status` |
//! | `status_after_block` | `GET /v2/status/wait-for-block-after/{round}` |
//! | `application_state` | `GET /v2/applications/{id}` |
//! | `compile` | `POST /v2/teal/compile` |
//!
//! Ids in paths use the node's base32 form. Submitted bytes are this
//! crate's canonical group encoding, not the node's msgpack.
//!
//! The node is treated as possibly unreliable. [`ClientError::is_retryable`]
//! separates "try again" from "the node said no".

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::crypto::Address;
use crate::transaction::{NetworkParameters, TxId};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors returned by a [`LedgerClient`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// The request never got a response (connection refused, timeout, ...).
    #[error("transport error: {0}")]
    Transport(String),

    /// The node answered with an unexpected status code.
    #[error("node returned HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("not found: {0}")]
    NotFound(String),

    /// The node refused the submitted bytes.
    #[error("rejected by node: {0}")]
    Rejected(String),

    /// The node's response could not be understood.
    #[error("malformed response: {0}")]
    Decode(String),
}

impl ClientError {
    /// Transport failures and 5xx responses may succeed on retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Transport(_) => true,
            ClientError::Http { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

/// Node status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NodeStatus {
    pub last_round: u64,
}

/// A value in application state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TealValue {
    Bytes(Vec<u8>),
    Uint(u64),
}

/// One change to application global state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum StateDelta {
    SetBytes { key: String, value: Vec<u8> },
    SetUint { key: String, value: u64 },
    Delete { key: String },
}

impl StateDelta {
    pub fn key(&self) -> &str {
        match self {
            StateDelta::SetBytes { key, .. }
            | StateDelta::SetUint { key, .. }
            | StateDelta::Delete { key } => key,
        }
    }
}

/// Effects of a confirmed transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConfirmationEffects {
    pub created_app_id: Option<u64>,
    pub created_asset_id: Option<u64>,
    pub global_state_delta: Vec<StateDelta>,
}

/// What the node knows about a submitted transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PendingTransaction {
    /// Set once the transaction is in a block.
    pub confirmed_round: Option<u64>,
    /// Set when the node has dropped the transaction from its pool.
    pub pool_error: Option<String>,
    pub effects: ConfirmationEffects,
}

impl PendingTransaction {
    pub fn is_confirmed(&self) -> bool {
        self.confirmed_round.is_some()
    }

    pub fn is_rejected(&self) -> bool {
        self.pool_error.is_some()
    }
}

/// Application record as returned by the node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApplicationState {
    pub app_id: u64,
    pub creator: Address,
    pub global_state: BTreeMap<String, TealValue>,
}

impl ApplicationState {
    /// Convenience accessor for a uint global.
    pub fn global_uint(&self, key: &str) -> Option<u64> {
        match self.global_state.get(key) {
            Some(TealValue::Uint(v)) => Some(*v),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// A connection to a ledger node.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Current suggested transaction parameters.
    async fn suggested_params(&self) -> Result<NetworkParameters, ClientError>;

    /// Submits an encoded signed group. Returns the id of the first member.
    async fn send_raw_transactions(&self, bytes: Vec<u8>) -> Result<TxId, ClientError>;

    async fn pending_transaction(&self, id: &TxId) -> Result<PendingTransaction, ClientError>;

    async fn status(&self) -> Result<NodeStatus, ClientError>;

    /// Suspends until a block after `round` exists, then returns the status.
    async fn status_after_block(&self, round: u64) -> Result<NodeStatus, ClientError>;

    async fn application_state(&self, app_id: u64) -> Result<ApplicationState, ClientError>;
}

/// Turns contract source into program bytes. The result is opaque.
#[async_trait]
pub trait ProgramCompiler: Send + Sync {
    async fn compile(&self, source: &str) -> Result<Vec<u8>, ClientError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryability_classification() {
        assert!(ClientError::Transport("reset".into()).is_retryable());
        assert!(ClientError::Http {
            status: 502,
            message: String::new()
        }
        .is_retryable());
        assert!(!ClientError::Http {
            status: 401,
            message: String::new()
        }
        .is_retryable());
        assert!(!ClientError::Rejected("overspend".into()).is_retryable());
        assert!(!ClientError::NotFound("tx".into()).is_retryable());
    }

    #[test]
    fn global_uint_lookup() {
        let mut global_state = BTreeMap::new();
        global_state.insert("count".to_string(), TealValue::Uint(3));
        global_state.insert("name".to_string(), TealValue::Bytes(b"x".to_vec()));
        let state = ApplicationState {
            app_id: 1,
            creator: Address::ZERO,
            global_state,
        };
        assert_eq!(state.global_uint("count"), Some(3));
        assert_eq!(state.global_uint("name"), None);
        assert_eq!(state.global_uint("missing"), None);
    }

    #[test]
    fn state_delta_serializes_with_action_tag() {
        let delta = StateDelta::SetUint {
            key: "count".into(),
            value: 1,
        };
        let json = serde_json::to_value(&delta).unwrap();
        assert_eq!(json["action"], "set_uint");
        assert_eq!(json["key"], "count");
        assert_eq!(delta.key(), "count");
    }
}
