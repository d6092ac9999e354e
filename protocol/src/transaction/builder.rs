//! Transaction construction.
//!
//! Two entry points produce the same thing:
//!
//! - [`build`] takes a [`TxIntent`] (what the caller wants) and a
//!   [`NetworkParameters`] snapshot (what the network currently allows).
//! - [`TransactionBuilder`] is the fluent front end most callers use; it
//!   collects an intent and hands it to [`build`].
//!
//! Construction is pure. Nothing here talks to the network, and every
//! validation failure surfaces as [`BuildError::InvalidParameter`] before a
//! single byte is sent anywhere.

use serde::{Serialize, Serializer};
use std::fmt;
use thiserror::Error;

use super::encoding::{self, DecodeError};
use super::fee::{resolve_fee, FeeRole};
use super::params::NetworkParameters;
use super::types::{AssetParams, OnComplete, StateSchema, TransactionBody, TransactionType};
use crate::config::{
    MAX_APP_ARGS, MAX_APP_ARGS_TOTAL_LENGTH, MAX_ASSET_DECIMALS, MAX_ASSET_NAME_LENGTH,
    MAX_ASSET_URL_LENGTH, MAX_NOTE_LENGTH, MAX_UNIT_NAME_LENGTH, TX_ID_DOMAIN,
};
use crate::crypto::{base32, domain_hash, Address};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors produced while building a transaction. Never worth retrying: the
/// input itself is wrong.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BuildError {
    #[error("invalid parameter `{field}`: {reason}")]
    InvalidParameter { field: &'static str, reason: String },
}

impl BuildError {
    fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            field,
            reason: reason.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Transaction id: `SHA-512/256("TX" || canonical_encoding)`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TxId([u8; 32]);

impl TxId {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse a hex-encoded id.
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(s.trim())?;
        let arr: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| hex::FromHexError::InvalidStringLength)?;
        Ok(Self(arr))
    }

    /// The node's form: unpadded base32, 52 characters.
    pub fn to_base32(&self) -> String {
        base32::encode(&self.0)
    }

    /// Parse either the hex form or the node's base32 form.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        let bytes = if s.len() == 64 {
            hex::decode(s).ok()?
        } else {
            base32::decode(s)?
        };
        let arr: [u8; 32] = bytes.as_slice().try_into().ok()?;
        Some(Self(arr))
    }
}

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TxId({})", &self.to_hex()[..16])
    }
}

impl Serialize for TxId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

/// Group id shared by every member of an atomic group.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct GroupId([u8; 32]);

impl GroupId {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Debug for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GroupId({})", &hex::encode(self.0)[..16])
    }
}

// ---------------------------------------------------------------------------
// UnsignedTransaction
// ---------------------------------------------------------------------------

/// A transaction ready to be grouped and signed.
///
/// The common header (sender, fee, validity window, genesis, note, group)
/// is shared by every kind; [`TransactionBody`] carries the rest.
///
/// `group` is `None` until [`super::group::assemble`] writes the group id
/// into it. Signing covers the group field, so a proof made before the
/// group id is injected does not verify afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsignedTransaction {
    pub sender: Address,
    /// Fee in micro-units. Zero only when another group member covers it.
    pub fee: u64,
    pub first_valid: u64,
    pub last_valid: u64,
    pub genesis_id: String,
    pub genesis_hash: [u8; 32],
    pub note: Option<Vec<u8>>,
    pub group: Option<GroupId>,
    pub body: TransactionBody,
}

impl UnsignedTransaction {
    pub fn tx_type(&self) -> TransactionType {
        self.body.tx_type()
    }

    /// Canonical byte encoding. See [`super::encoding`] for the layout.
    pub fn encode(&self) -> Vec<u8> {
        encoding::encode_unsigned(self)
    }

    /// Decode a canonical encoding produced by [`encode`](Self::encode).
    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        encoding::decode_unsigned(bytes)
    }

    /// The exact bytes an authorization proof signs: `"TX" || encoding`.
    pub fn signing_bytes(&self) -> Vec<u8> {
        let encoded = self.encode();
        let mut buf = Vec::with_capacity(TX_ID_DOMAIN.len() + encoded.len());
        buf.extend_from_slice(TX_ID_DOMAIN);
        buf.extend_from_slice(&encoded);
        buf
    }

    /// Transaction id over the current field values, group included.
    pub fn id(&self) -> TxId {
        TxId(domain_hash(TX_ID_DOMAIN, &self.encode()))
    }

    pub fn is_grouped(&self) -> bool {
        self.group.is_some()
    }
}

// ---------------------------------------------------------------------------
// TxIntent + build
// ---------------------------------------------------------------------------

/// What the caller wants a transaction to do, before the network's
/// parameters are folded in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxIntent {
    pub sender: Address,
    pub body: TransactionBody,
    pub fee_role: FeeRole,
    /// Fee the sender would pay on its own. Defaults to the network minimum.
    pub base_fee: Option<u64>,
    pub note: Option<Vec<u8>>,
}

/// Builds an unsigned transaction from an intent and a parameter snapshot.
///
/// The fee is resolved through [`resolve_fee`] using the intent's role.
/// Freshness of `params` is the caller's problem: build from a snapshot
/// fetched for this session, not one left over from an earlier group.
pub fn build(
    intent: TxIntent,
    params: &NetworkParameters,
) -> Result<UnsignedTransaction, BuildError> {
    validate_params(params)?;

    if intent.sender.is_zero() {
        return Err(BuildError::invalid("sender", "must be set"));
    }
    if let Some(note) = &intent.note {
        if note.len() > MAX_NOTE_LENGTH {
            return Err(BuildError::invalid(
                "note",
                format!("{} bytes exceeds limit of {}", note.len(), MAX_NOTE_LENGTH),
            ));
        }
    }
    validate_body(&intent.body)?;

    let base_fee = intent.base_fee.unwrap_or(params.min_fee);
    let fee = resolve_fee(intent.fee_role, base_fee, params.min_fee);

    let tx = UnsignedTransaction {
        sender: intent.sender,
        fee,
        first_valid: params.first_valid_round,
        last_valid: params.last_valid_round,
        genesis_id: params.genesis_id.clone(),
        genesis_hash: params.genesis_hash,
        note: intent.note,
        group: None,
        body: intent.body,
    };

    tracing::debug!(
        kind = %tx.tx_type(),
        sender = %tx.sender,
        fee = tx.fee,
        first_valid = tx.first_valid,
        last_valid = tx.last_valid,
        "built transaction"
    );
    Ok(tx)
}

fn validate_params(params: &NetworkParameters) -> Result<(), BuildError> {
    if params.genesis_hash == [0u8; 32] {
        return Err(BuildError::invalid("genesis_hash", "must be set"));
    }
    if params.last_valid_round < params.first_valid_round {
        return Err(BuildError::invalid(
            "last_valid_round",
            format!(
                "validity window is inverted ({} > {})",
                params.first_valid_round, params.last_valid_round
            ),
        ));
    }
    Ok(())
}

fn validate_body(body: &TransactionBody) -> Result<(), BuildError> {
    match body {
        TransactionBody::Payment { receiver, .. } => {
            if receiver.is_zero() {
                return Err(BuildError::invalid("receiver", "must be set"));
            }
        }
        TransactionBody::AssetTransfer {
            asset_id, receiver, ..
        } => {
            if *asset_id == 0 {
                return Err(BuildError::invalid("asset_id", "must be positive"));
            }
            if receiver.is_zero() {
                return Err(BuildError::invalid("receiver", "must be set"));
            }
        }
        TransactionBody::AssetCreate { params } => validate_asset_params(params)?,
        TransactionBody::ApplicationCall { app_id, args, .. } => {
            if *app_id == 0 {
                return Err(BuildError::invalid(
                    "app_id",
                    "must reference an existing application",
                ));
            }
            validate_app_args(args)?;
        }
        TransactionBody::ApplicationCreate {
            approval_program,
            clear_program,
            args,
            ..
        } => {
            if approval_program.is_empty() {
                return Err(BuildError::invalid("approval_program", "must not be empty"));
            }
            if clear_program.is_empty() {
                return Err(BuildError::invalid("clear_program", "must not be empty"));
            }
            validate_app_args(args)?;
        }
    }
    Ok(())
}

fn validate_asset_params(params: &AssetParams) -> Result<(), BuildError> {
    if params.total == 0 {
        return Err(BuildError::invalid("total", "must be positive"));
    }
    if params.decimals > MAX_ASSET_DECIMALS {
        return Err(BuildError::invalid(
            "decimals",
            format!("{} exceeds limit of {}", params.decimals, MAX_ASSET_DECIMALS),
        ));
    }
    for (field, value, limit) in [
        ("unit_name", &params.unit_name, MAX_UNIT_NAME_LENGTH),
        ("asset_name", &params.asset_name, MAX_ASSET_NAME_LENGTH),
        ("url", &params.url, MAX_ASSET_URL_LENGTH),
    ] {
        if value.len() > limit {
            return Err(BuildError::invalid(
                field,
                format!("{} bytes exceeds limit of {}", value.len(), limit),
            ));
        }
    }
    Ok(())
}

fn validate_app_args(args: &[Vec<u8>]) -> Result<(), BuildError> {
    if args.len() > MAX_APP_ARGS {
        return Err(BuildError::invalid(
            "args",
            format!("{} arguments exceeds limit of {}", args.len(), MAX_APP_ARGS),
        ));
    }
    let total: usize = args.iter().map(Vec::len).sum();
    if total > MAX_APP_ARGS_TOTAL_LENGTH {
        return Err(BuildError::invalid(
            "args",
            format!(
                "{} total bytes exceeds limit of {}",
                total, MAX_APP_ARGS_TOTAL_LENGTH
            ),
        ));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// TransactionBuilder
// ---------------------------------------------------------------------------

/// Fluent builder for [`UnsignedTransaction`].
///
/// # Usage
///
/// ```rust,no_run
/// use txgroup_protocol::crypto::Keypair;
/// use txgroup_protocol::transaction::{FeeRole, NetworkParameters, TransactionBuilder};
///
/// let caller = Keypair::generate().address();
/// let params = NetworkParameters::at_round(1_000, 1_000, "sandnet-v1", [1u8; 32]);
///
/// let call = TransactionBuilder::app_call(caller, 42)
///     .app_arg(b"Add".to_vec())
///     .fee_role(FeeRole::Dependent)
///     .build(&params)
///     .unwrap();
/// assert_eq!(call.fee, 0);
/// ```
#[derive(Debug, Clone)]
pub struct TransactionBuilder {
    sender: Address,
    body: TransactionBody,
    fee_role: FeeRole,
    base_fee: Option<u64>,
    note: Option<Vec<u8>>,
    misuse: Option<&'static str>,
}

impl TransactionBuilder {
    fn with_body(sender: Address, body: TransactionBody) -> Self {
        Self {
            sender,
            body,
            fee_role: FeeRole::Standalone,
            base_fee: None,
            note: None,
            misuse: None,
        }
    }

    /// Native currency payment.
    pub fn payment(sender: Address, receiver: Address, amount: u64) -> Self {
        Self::with_body(
            sender,
            TransactionBody::Payment {
                receiver,
                amount,
                close_remainder_to: None,
            },
        )
    }

    /// Asset transfer.
    pub fn asset_transfer(sender: Address, asset_id: u64, receiver: Address, amount: u64) -> Self {
        Self::with_body(
            sender,
            TransactionBody::AssetTransfer {
                asset_id,
                receiver,
                amount,
            },
        )
    }

    /// Opt `account` in to an asset: a zero-amount transfer to itself.
    pub fn asset_opt_in(account: Address, asset_id: u64) -> Self {
        Self::asset_transfer(account, asset_id, account, 0)
    }

    /// Asset creation.
    pub fn asset_create(sender: Address, params: AssetParams) -> Self {
        Self::with_body(sender, TransactionBody::AssetCreate { params })
    }

    /// NoOp call into an existing application.
    pub fn app_call(sender: Address, app_id: u64) -> Self {
        Self::with_body(
            sender,
            TransactionBody::ApplicationCall {
                app_id,
                on_complete: OnComplete::NoOp,
                args: Vec::new(),
                accounts: Vec::new(),
                foreign_apps: Vec::new(),
            },
        )
    }

    /// Application deployment. Program bytes come from the compiler and are
    /// treated as opaque.
    pub fn app_create(sender: Address, approval_program: Vec<u8>, clear_program: Vec<u8>) -> Self {
        Self::with_body(
            sender,
            TransactionBody::ApplicationCreate {
                approval_program,
                clear_program,
                global_schema: StateSchema::default(),
                local_schema: StateSchema::default(),
                on_complete: OnComplete::NoOp,
                args: Vec::new(),
            },
        )
    }

    /// Appends an application argument.
    pub fn app_arg(mut self, arg: impl Into<Vec<u8>>) -> Self {
        match &mut self.body {
            TransactionBody::ApplicationCall { args, .. }
            | TransactionBody::ApplicationCreate { args, .. } => args.push(arg.into()),
            _ => self.misuse = Some("app_arg"),
        }
        self
    }

    pub fn on_complete(mut self, action: OnComplete) -> Self {
        match &mut self.body {
            TransactionBody::ApplicationCall { on_complete, .. }
            | TransactionBody::ApplicationCreate { on_complete, .. } => *on_complete = action,
            _ => self.misuse = Some("on_complete"),
        }
        self
    }

    /// Adds an account the application may read.
    pub fn app_account(mut self, account: Address) -> Self {
        match &mut self.body {
            TransactionBody::ApplicationCall { accounts, .. } => accounts.push(account),
            _ => self.misuse = Some("app_account"),
        }
        self
    }

    /// Adds an application the called application may read.
    pub fn foreign_app(mut self, app_id: u64) -> Self {
        match &mut self.body {
            TransactionBody::ApplicationCall { foreign_apps, .. } => foreign_apps.push(app_id),
            _ => self.misuse = Some("foreign_app"),
        }
        self
    }

    pub fn global_schema(mut self, schema: StateSchema) -> Self {
        match &mut self.body {
            TransactionBody::ApplicationCreate { global_schema, .. } => *global_schema = schema,
            _ => self.misuse = Some("global_schema"),
        }
        self
    }

    pub fn local_schema(mut self, schema: StateSchema) -> Self {
        match &mut self.body {
            TransactionBody::ApplicationCreate { local_schema, .. } => *local_schema = schema,
            _ => self.misuse = Some("local_schema"),
        }
        self
    }

    pub fn close_remainder_to(mut self, to: Address) -> Self {
        match &mut self.body {
            TransactionBody::Payment {
                close_remainder_to, ..
            } => *close_remainder_to = Some(to),
            _ => self.misuse = Some("close_remainder_to"),
        }
        self
    }

    pub fn fee_role(mut self, role: FeeRole) -> Self {
        self.fee_role = role;
        self
    }

    /// Overrides the base fee (before role adjustment). Values below the
    /// network minimum are raised to it.
    pub fn base_fee(mut self, fee: u64) -> Self {
        self.base_fee = Some(fee);
        self
    }

    pub fn note(mut self, note: impl Into<Vec<u8>>) -> Self {
        self.note = Some(note.into());
        self
    }

    /// The intent collected so far.
    pub fn into_intent(self) -> Result<TxIntent, BuildError> {
        if let Some(setter) = self.misuse {
            return Err(BuildError::invalid(
                setter,
                format!("not applicable to {} transactions", self.body.tx_type()),
            ));
        }
        Ok(TxIntent {
            sender: self.sender,
            body: self.body,
            fee_role: self.fee_role,
            base_fee: self.base_fee,
            note: self.note,
        })
    }

    /// Consumes the builder and produces an unsigned transaction.
    pub fn build(self, params: &NetworkParameters) -> Result<UnsignedTransaction, BuildError> {
        build(self.into_intent()?, params)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
