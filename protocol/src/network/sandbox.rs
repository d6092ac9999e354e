//! In-process sandbox ledger.
//!
//! A deliberately small ledger that behaves like a node from the client's
//! point of view: it hands out suggested parameters, admits encoded signed
//! groups, produces blocks on a timer, and reports pending transaction
//! status. It exists so the whole pipeline can be exercised without a
//! real network, in tests, in the demo, and behind the CLI's `--sandbox`
//! flag.
//!
//! ## Admission
//!
//! `send_raw_transactions` rejects a group (with
//! [`ClientError::Rejected`]) when:
//!
//! - the bytes do not decode, or the group is empty or too large,
//! - any proof fails [`SignedTransaction::verify`],
//! - a member was built for another network or is outside its validity
//!   window,
//! - the members' group fields do not match the recomputed group id,
//! - the group fee is below `n * min_fee`,
//! - a member was already submitted,
//! - a trial application against current state fails (overspend, missing
//!   asset, rejected application call).
//!
//! ## Blocks
//!
//! Each block applies pooled groups in arrival order. A group is applied to
//! a scratch copy of the ledger and only committed if every member
//! succeeds; otherwise every member gets the same pool error. With
//! `hold_pool` set, blocks are produced but the pool is left alone.
//!
//! Transaction records are kept until `record_retention` rounds after the
//! member's last valid round, then forgotten. A forgotten id can no longer
//! be resubmitted anyway, since it is outside its validity window.
//!
//! ## Applications
//!
//! Program bytes are opaque here, so application calls follow a fixed
//! counter model: first argument `Add` increments the global uint `count`,
//! `Deduct` decrements it (never below zero), anything else is refused.
//! Opt-in, close-out and clear-state calls are accepted and change nothing;
//! update and delete are creator-only.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use super::rpc::{
    ApplicationState, ClientError, ConfirmationEffects, LedgerClient, NodeStatus,
    PendingTransaction, ProgramCompiler, StateDelta, TealValue,
};
use crate::config::{MAX_GROUP_SIZE, MIN_TX_FEE, ROUND_TIME, VALIDITY_WINDOW};
use crate::crypto::{sha512_256, Address};
use crate::transaction::{
    compute_group_id, decode_group, validate_group_fees, AssetParams, NetworkParameters,
    OnComplete, SignedTransaction, StateSchema, TransactionBody, TxId, UnsignedTransaction,
};

const COUNTER_KEY: &str = "count";

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Sandbox tunables.
#[derive(Debug, Clone)]
pub struct SandboxConfig {
    /// How long a round lasts when someone is waiting for the next block.
    pub round_time: Duration,
    /// Produce blocks without confirming anything.
    pub hold_pool: bool,
    pub genesis_id: String,
    pub min_fee: u64,
    /// Rounds a transaction record outlives its last valid round.
    pub record_retention: u64,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            round_time: ROUND_TIME,
            hold_pool: false,
            genesis_id: "sandnet-v1".to_string(),
            min_fee: MIN_TX_FEE,
            record_retention: VALIDITY_WINDOW,
        }
    }
}

// ---------------------------------------------------------------------------
// Ledger state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
struct Account {
    balance: u64,
    /// Asset id -> amount. Presence means opted in.
    holdings: BTreeMap<u64, u64>,
}

#[derive(Debug, Clone)]
struct App {
    creator: Address,
    global_schema: StateSchema,
    global: BTreeMap<String, TealValue>,
}

#[derive(Debug, Clone)]
struct AssetRecord {
    creator: Address,
    params: AssetParams,
}

/// Everything a block can change. Cloned for atomic group application.
#[derive(Debug, Clone)]
struct Ledger {
    accounts: HashMap<Address, Account>,
    apps: BTreeMap<u64, App>,
    assets: BTreeMap<u64, AssetRecord>,
    next_index: u64,
}

impl Default for Ledger {
    fn default() -> Self {
        Self {
            accounts: HashMap::new(),
            apps: BTreeMap::new(),
            assets: BTreeMap::new(),
            next_index: 1,
        }
    }
}

impl Ledger {
    fn allocate_index(&mut self) -> u64 {
        let id = self.next_index;
        self.next_index += 1;
        id
    }

    fn balance(&self, address: &Address) -> u64 {
        self.accounts.get(address).map_or(0, |a| a.balance)
    }

    fn debit(&mut self, address: &Address, amount: u64) -> Result<(), String> {
        if amount == 0 {
            return Ok(());
        }
        let balance = self.balance(address);
        if balance < amount {
            return Err(format!(
                "overspend: account {} balance {} below {}",
                address, balance, amount
            ));
        }
        self.accounts.entry(*address).or_default().balance = balance - amount;
        Ok(())
    }

    fn credit(&mut self, address: &Address, amount: u64) -> Result<(), String> {
        let account = self.accounts.entry(*address).or_default();
        account.balance = account
            .balance
            .checked_add(amount)
            .ok_or_else(|| format!("balance overflow for {}", address))?;
        Ok(())
    }

    fn apply(&mut self, tx: &UnsignedTransaction) -> Result<ConfirmationEffects, String> {
        let mut effects = ConfirmationEffects::default();
        self.debit(&tx.sender, tx.fee)?;

        match &tx.body {
            TransactionBody::Payment {
                receiver,
                amount,
                close_remainder_to,
            } => {
                self.debit(&tx.sender, *amount)?;
                self.credit(receiver, *amount)?;
                if let Some(close_to) = close_remainder_to {
                    let rest = self
                        .accounts
                        .remove(&tx.sender)
                        .map_or(0, |a| a.balance);
                    self.credit(close_to, rest)?;
                }
            }
            TransactionBody::AssetTransfer {
                asset_id,
                receiver,
                amount,
            } => self.transfer_asset(&tx.sender, *asset_id, receiver, *amount)?,
            TransactionBody::AssetCreate { params } => {
                let id = self.allocate_index();
                self.assets.insert(
                    id,
                    AssetRecord {
                        creator: tx.sender,
                        params: params.clone(),
                    },
                );
                self.accounts
                    .entry(tx.sender)
                    .or_default()
                    .holdings
                    .insert(id, params.total);
                effects.created_asset_id = Some(id);
            }
            TransactionBody::ApplicationCreate { global_schema, .. } => {
                let id = self.allocate_index();
                self.apps.insert(
                    id,
                    App {
                        creator: tx.sender,
                        global_schema: *global_schema,
                        global: BTreeMap::new(),
                    },
                );
                effects.created_app_id = Some(id);
            }
            TransactionBody::ApplicationCall {
                app_id,
                on_complete,
                args,
                ..
            } => {
                effects.global_state_delta =
                    self.call_app(&tx.sender, *app_id, *on_complete, args)?;
            }
        }
        Ok(effects)
    }

    fn transfer_asset(
        &mut self,
        sender: &Address,
        asset_id: u64,
        receiver: &Address,
        amount: u64,
    ) -> Result<(), String> {
        if !self.assets.contains_key(&asset_id) {
            return Err(format!("asset {} does not exist", asset_id));
        }
        // Opt-in: zero-amount transfer to self.
        if sender == receiver && amount == 0 {
            self.accounts
                .entry(*sender)
                .or_default()
                .holdings
                .entry(asset_id)
                .or_insert(0);
            return Ok(());
        }

        let receiver_opted_in = self
            .accounts
            .get(receiver)
            .map_or(false, |a| a.holdings.contains_key(&asset_id));
        if !receiver_opted_in {
            return Err(format!(
                "receiver {} has not opted in to asset {}",
                receiver, asset_id
            ));
        }

        let held = self
            .accounts
            .get(sender)
            .and_then(|a| a.holdings.get(&asset_id).copied())
            .ok_or_else(|| format!("sender {} has not opted in to asset {}", sender, asset_id))?;
        if held < amount {
            return Err(format!(
                "asset overspend: {} holds {} of asset {}, needs {}",
                sender, held, asset_id, amount
            ));
        }

        self.accounts
            .entry(*sender)
            .or_default()
            .holdings
            .insert(asset_id, held - amount);
        let holding = self
            .accounts
            .entry(*receiver)
            .or_default()
            .holdings
            .entry(asset_id)
            .or_insert(0);
        *holding = holding
            .checked_add(amount)
            .ok_or_else(|| "asset balance overflow".to_string())?;
        Ok(())
    }

    fn call_app(
        &mut self,
        sender: &Address,
        app_id: u64,
        on_complete: OnComplete,
        args: &[Vec<u8>],
    ) -> Result<Vec<StateDelta>, String> {
        let app = self
            .apps
            .get_mut(&app_id)
            .ok_or_else(|| format!("application {} does not exist", app_id))?;

        match on_complete {
            OnComplete::NoOp => evaluate_counter(app, args),
            OnComplete::OptIn | OnComplete::CloseOut | OnComplete::ClearState => Ok(Vec::new()),
            OnComplete::UpdateApplication => {
                if app.creator != *sender {
                    return Err("only the creator may update the application".to_string());
                }
                Ok(Vec::new())
            }
            OnComplete::DeleteApplication => {
                if app.creator != *sender {
                    return Err("only the creator may delete the application".to_string());
                }
                self.apps.remove(&app_id);
                Ok(Vec::new())
            }
        }
    }
}

fn evaluate_counter(app: &mut App, args: &[Vec<u8>]) -> Result<Vec<StateDelta>, String> {
    let current = match app.global.get(COUNTER_KEY) {
        Some(TealValue::Uint(v)) => Some(*v),
        Some(TealValue::Bytes(_)) => return Err("counter holds a byte value".to_string()),
        None => None,
    };

    let next = match args.first().map(Vec::as_slice) {
        Some(b"Add") => current.unwrap_or(0).checked_add(1).ok_or("counter overflow")?,
        Some(b"Deduct") => match current {
            Some(v) if v > 0 => v - 1,
            _ => return Ok(Vec::new()),
        },
        _ => return Err("approval program rejected the call".to_string()),
    };

    let used_uints = app
        .global
        .values()
        .filter(|v| matches!(v, TealValue::Uint(_)))
        .count() as u64;
    if current.is_none() && used_uints >= app.global_schema.num_uints {
        return Err("global state schema exceeded".to_string());
    }

    app.global
        .insert(COUNTER_KEY.to_string(), TealValue::Uint(next));
    Ok(vec![StateDelta::SetUint {
        key: COUNTER_KEY.to_string(),
        value: next,
    }])
}

/// Applies `members` to a copy of `ledger`. Returns the new ledger and the
/// per-member effects, or the first failure.
fn apply_group(
    ledger: &Ledger,
    members: &[UnsignedTransaction],
) -> Result<(Ledger, Vec<ConfirmationEffects>), String> {
    let mut scratch = ledger.clone();
    let effects = members
        .iter()
        .enumerate()
        .map(|(index, tx)| {
            scratch
                .apply(tx)
                .map_err(|e| format!("transaction {} of group: {}", index, e))
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok((scratch, effects))
}

struct State {
    round: u64,
    ledger: Ledger,
    pool: Vec<Vec<UnsignedTransaction>>,
    records: HashMap<TxId, Record>,
}

struct Record {
    last_valid: u64,
    pending: PendingTransaction,
}

impl State {
    fn record(&mut self, tx: &UnsignedTransaction, pending: PendingTransaction) {
        self.records.insert(
            tx.id(),
            Record {
                last_valid: tx.last_valid,
                pending,
            },
        );
    }

    fn forget_records_before(&mut self, round: u64, retention: u64) {
        let before = self.records.len();
        self.records
            .retain(|_, r| r.last_valid.saturating_add(retention) >= round);
        let forgotten = before - self.records.len();
        if forgotten > 0 {
            debug!(round, forgotten, "sandbox forgot expired records");
        }
    }
}

// ---------------------------------------------------------------------------
// SandboxLedger
// ---------------------------------------------------------------------------

/// In-process [`LedgerClient`] and [`ProgramCompiler`].
pub struct SandboxLedger {
    config: SandboxConfig,
    genesis_hash: [u8; 32],
    hold_pool: AtomicBool,
    state: RwLock<State>,
    round_advanced: Notify,
}

impl Default for SandboxLedger {
    fn default() -> Self {
        Self::new(SandboxConfig::default())
    }
}

impl SandboxLedger {
    pub fn new(config: SandboxConfig) -> Self {
        let genesis_hash = sha512_256(config.genesis_id.as_bytes());
        Self {
            hold_pool: AtomicBool::new(config.hold_pool),
            genesis_hash,
            config,
            state: RwLock::new(State {
                round: 1,
                ledger: Ledger::default(),
                pool: Vec::new(),
                records: HashMap::new(),
            }),
            round_advanced: Notify::new(),
        }
    }

    /// Credits `amount` to `address` out of thin air.
    pub fn fund(&self, address: &Address, amount: u64) {
        let mut state = self.state.write();
        let account = state.ledger.accounts.entry(*address).or_default();
        account.balance = account.balance.saturating_add(amount);
        debug!(account = %address, amount, "funded sandbox account");
    }

    pub fn balance(&self, address: &Address) -> u64 {
        self.state.read().ledger.balance(address)
    }

    /// Amount of `asset_id` held by `address`, or `None` if not opted in.
    pub fn asset_holding(&self, address: &Address, asset_id: u64) -> Option<u64> {
        self.state
            .read()
            .ledger
            .accounts
            .get(address)
            .and_then(|a| a.holdings.get(&asset_id).copied())
    }

    /// Creator and parameters of an existing asset.
    pub fn asset(&self, asset_id: u64) -> Option<(Address, AssetParams)> {
        self.state
            .read()
            .ledger
            .assets
            .get(&asset_id)
            .map(|a| (a.creator, a.params.clone()))
    }

    pub fn round(&self) -> u64 {
        self.state.read().round
    }

    pub fn genesis_hash(&self) -> [u8; 32] {
        self.genesis_hash
    }

    pub fn set_hold_pool(&self, hold: bool) {
        self.hold_pool.store(hold, Ordering::SeqCst);
    }

    /// Number of groups waiting for a block.
    pub fn pool_len(&self) -> usize {
        self.state.read().pool.len()
    }

    /// Produces one block and returns its round.
    pub fn produce_block(&self) -> u64 {
        let round = {
            let mut guard = self.state.write();
            let state = &mut *guard;
            state.round += 1;
            let round = state.round;
            state.forget_records_before(round, self.config.record_retention);

            if !self.hold_pool.load(Ordering::SeqCst) {
                let pool = std::mem::take(&mut state.pool);
                let groups = pool.len();
                for members in pool {
                    self.commit_group(state, round, &members);
                }
                if groups > 0 {
                    info!(round, groups, "sandbox block produced");
                }
            }
            round
        };
        self.round_advanced.notify_waiters();
        round
    }

    fn commit_group(&self, state: &mut State, round: u64, members: &[UnsignedTransaction]) {
        let expired = members.iter().find(|tx| tx.last_valid < round);
        let outcome = match expired {
            Some(tx) => Err(format!("transaction {} expired at round {}", tx.id(), tx.last_valid)),
            None => apply_group(&state.ledger, members),
        };

        match outcome {
            Ok((ledger, effects)) => {
                state.ledger = ledger;
                for (tx, effects) in members.iter().zip(effects) {
                    state.record(
                        tx,
                        PendingTransaction {
                            confirmed_round: Some(round),
                            pool_error: None,
                            effects,
                        },
                    );
                }
            }
            Err(reason) => {
                warn!(round, reason = %reason, "sandbox dropped group");
                for tx in members {
                    state.record(
                        tx,
                        PendingTransaction {
                            confirmed_round: None,
                            pool_error: Some(reason.clone()),
                            effects: ConfirmationEffects::default(),
                        },
                    );
                }
            }
        }
    }

    fn admit(&self, state: &State, signed: &[SignedTransaction]) -> Result<(), String> {
        if signed.is_empty() {
            return Err("empty transaction group".to_string());
        }
        if signed.len() > MAX_GROUP_SIZE {
            return Err(format!(
                "group of {} exceeds limit of {}",
                signed.len(),
                MAX_GROUP_SIZE
            ));
        }

        let next_round = state.round + 1;
        for stx in signed {
            let tx = stx.transaction();
            stx.verify().map_err(|e| e.to_string())?;
            if tx.genesis_id != self.config.genesis_id || tx.genesis_hash != self.genesis_hash {
                return Err(format!("transaction {} is for another network", tx.id()));
            }
            if tx.first_valid > next_round || tx.last_valid < next_round {
                return Err(format!(
                    "transaction {} valid for rounds {}..={}, next round is {}",
                    tx.id(),
                    tx.first_valid,
                    tx.last_valid,
                    next_round
                ));
            }
            if state.records.contains_key(&stx.id()) {
                return Err(format!("transaction {} already submitted", stx.id()));
            }
        }

        let members: Vec<UnsignedTransaction> =
            signed.iter().map(|s| s.transaction().clone()).collect();

        if members.len() > 1 {
            let expected = compute_group_id(&members);
            if let Some(index) = members.iter().position(|tx| tx.group != Some(expected)) {
                return Err(format!("member {} has an incomplete group id", index));
            }
        } else if members[0].group.is_some() {
            return Err("singleton carries a group id".to_string());
        }

        validate_group_fees(&members, self.config.min_fee).map_err(|e| e.to_string())?;
        apply_group(&state.ledger, &members)?;
        Ok(())
    }
}

#[async_trait]
impl LedgerClient for SandboxLedger {
    async fn suggested_params(&self) -> Result<NetworkParameters, ClientError> {
        Ok(NetworkParameters::at_round(
            self.round(),
            self.config.min_fee,
            &self.config.genesis_id,
            self.genesis_hash,
        ))
    }

    async fn send_raw_transactions(&self, bytes: Vec<u8>) -> Result<TxId, ClientError> {
        let signed = decode_group(&bytes).map_err(|e| ClientError::Rejected(e.to_string()))?;

        let mut state = self.state.write();
        if let Err(reason) = self.admit(&state, &signed) {
            warn!(reason = %reason, "sandbox rejected submission");
            return Err(ClientError::Rejected(reason));
        }

        let members: Vec<UnsignedTransaction> = signed
            .into_iter()
            .map(|s| s.into_parts().0)
            .collect();
        for tx in &members {
            state.record(tx, PendingTransaction::default());
        }
        let first = members[0].id();
        debug!(tx_id = %first, members = members.len(), "sandbox admitted group");
        state.pool.push(members);
        Ok(first)
    }

    async fn pending_transaction(&self, id: &TxId) -> Result<PendingTransaction, ClientError> {
        self.state
            .read()
            .records
            .get(id)
            .map(|r| r.pending.clone())
            .ok_or_else(|| ClientError::NotFound(format!("transaction {}", id)))
    }

    async fn status(&self) -> Result<NodeStatus, ClientError> {
        Ok(NodeStatus {
            last_round: self.round(),
        })
    }

    async fn status_after_block(&self, round: u64) -> Result<NodeStatus, ClientError> {
        loop {
            // Registered before the round is read so a block produced in
            // between still wakes us.
            let mut notified = std::pin::pin!(self.round_advanced.notified());
            notified.as_mut().enable();
            let current = self.round();
            if current > round {
                return Ok(NodeStatus {
                    last_round: current,
                });
            }
            tokio::select! {
                _ = notified => {}
                _ = tokio::time::sleep(self.config.round_time) => {
                    if self.round() <= round {
                        self.produce_block();
                    }
                }
            }
        }
    }

    async fn application_state(&self, app_id: u64) -> Result<ApplicationState, ClientError> {
        let state = self.state.read();
        let app = state
            .ledger
            .apps
            .get(&app_id)
            .ok_or_else(|| ClientError::NotFound(format!("application {}", app_id)))?;
        Ok(ApplicationState {
            app_id,
            creator: app.creator,
            global_state: app.global.clone(),
        })
    }
}

#[async_trait]
impl ProgramCompiler for SandboxLedger {
    /// Produces a deterministic stand-in for program bytes.
    async fn compile(&self, source: &str) -> Result<Vec<u8>, ClientError> {
        if source.trim().is_empty() {
            return Err(ClientError::Rejected("empty program source".to_string()));
        }
        let mut program = vec![0x06];
        program.extend_from_slice(&sha512_256(source.as_bytes()));
        Ok(program)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
