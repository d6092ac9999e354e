//! Submission and confirmation.
//!
//! The engine is a small state machine:
//!
//! ```text
//! Built --submit--> Submitted --await_confirmation--> Confirmed
//!                                                  \-> Rejected
//!                                                  \-> TimedOut
//! ```
//!
//! [`Submitter::submit`] encodes the signed group in member order and makes
//! exactly one network call. [`Submitter::await_confirmation`] then polls
//! once per round boundary, suspending in the node's "wait for block after
//! round" call, for at most `max_rounds` rounds.
//!
//! ## Which member is tracked
//!
//! Only the *last* member is polled. The ledger commits a group atomically,
//! so the last member being in a block means the whole group is. Once it
//! confirms, every member is looked up once to collect the group's effects.
//!
//! A timeout is not an error: the group may still confirm later, and the
//! caller decides whether to keep waiting or give up.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use super::rpc::{ClientError, ConfirmationEffects, LedgerClient, PendingTransaction};
use crate::transaction::{encode_group, SignedTransaction, TxId};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors from submitting or polling.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SubmitError {
    /// The node could not be reached or answered unexpectedly.
    #[error("network error: {message}")]
    Network { message: String, retryable: bool },

    /// The node refused the group outright. Resubmitting the same bytes
    /// will fail the same way.
    #[error("group rejected: {reason}")]
    Rejected { reason: String },

    #[error("nothing to submit")]
    EmptyGroup,
}

impl SubmitError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, SubmitError::Network { retryable: true, .. })
    }
}

impl From<ClientError> for SubmitError {
    fn from(e: ClientError) -> Self {
        match e {
            ClientError::Rejected(reason) => SubmitError::Rejected { reason },
            other => SubmitError::Network {
                retryable: other.is_retryable(),
                message: other.to_string(),
            },
        }
    }
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Where a group is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionState {
    Built,
    Submitted,
    Confirmed,
    Rejected,
    TimedOut,
}

/// Outcome of waiting for a submitted group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ConfirmationResult {
    Confirmed {
        round: u64,
        effects: ConfirmationEffects,
    },
    Rejected {
        reason: String,
    },
    /// Still pending after the allotted rounds. `last_round` is the last
    /// round the node reported, if it was asked at all.
    TimedOut {
        last_round: Option<u64>,
    },
}

impl ConfirmationResult {
    pub fn state(&self) -> SubmissionState {
        match self {
            ConfirmationResult::Confirmed { .. } => SubmissionState::Confirmed,
            ConfirmationResult::Rejected { .. } => SubmissionState::Rejected,
            ConfirmationResult::TimedOut { .. } => SubmissionState::TimedOut,
        }
    }

    pub fn is_confirmed(&self) -> bool {
        matches!(self, ConfirmationResult::Confirmed { .. })
    }

    pub fn effects(&self) -> Option<&ConfirmationEffects> {
        match self {
            ConfirmationResult::Confirmed { effects, .. } => Some(effects),
            _ => None,
        }
    }
}

/// Proof that a group was accepted by the node for processing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmissionHandle {
    /// Id the node returned (the first member).
    pub first: TxId,
    /// Member ids in group order.
    pub members: Vec<TxId>,
}

impl SubmissionHandle {
    /// The member whose confirmation is polled.
    pub fn tracked(&self) -> TxId {
        self.members.last().copied().unwrap_or(self.first)
    }

    pub fn state(&self) -> SubmissionState {
        SubmissionState::Submitted
    }
}

// ---------------------------------------------------------------------------
// Submitter
// ---------------------------------------------------------------------------

/// Drives signed groups through submission and confirmation.
#[derive(Clone)]
pub struct Submitter {
    client: Arc<dyn LedgerClient>,
}

impl Submitter {
    pub fn new(client: Arc<dyn LedgerClient>) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Arc<dyn LedgerClient> {
        &self.client
    }

    /// Sends the group in one call.
    #[instrument(skip_all, fields(members = group.len()))]
    pub async fn submit(
        &self,
        group: &[SignedTransaction],
    ) -> Result<SubmissionHandle, SubmitError> {
        if group.is_empty() {
            return Err(SubmitError::EmptyGroup);
        }
        let members: Vec<TxId> = group.iter().map(SignedTransaction::id).collect();
        let bytes = encode_group(group);

        let first = match self.client.send_raw_transactions(bytes).await {
            Ok(id) => id,
            Err(e) => {
                warn!(error = %e, members = members.len(), "group submission failed");
                return Err(e.into());
            }
        };
        if first != members[0] {
            debug!(node = %first, local = %members[0], "node reported a different first id");
        }

        info!(tx_id = %first, members = members.len(), "submitted group");
        Ok(SubmissionHandle { first, members })
    }

    /// Polls until the group confirms, is rejected, or `max_rounds` round
    /// boundaries pass. `max_rounds = 0` returns `TimedOut` without
    /// contacting the node.
    #[instrument(skip_all, fields(tx_id = %handle.tracked(), max_rounds = max_rounds))]
    pub async fn await_confirmation(
        &self,
        handle: &SubmissionHandle,
        max_rounds: u64,
    ) -> Result<ConfirmationResult, SubmitError> {
        if max_rounds == 0 {
            return Ok(ConfirmationResult::TimedOut { last_round: None });
        }

        let tracked = handle.tracked();
        let mut poller = RoundPoller {
            client: self.client.as_ref(),
            round: self.client.status().await?.last_round,
            rounds_waited: 0,
            max_rounds,
        };

        loop {
            let pending = match self.client.pending_transaction(&tracked).await {
                Ok(p) => p,
                Err(ClientError::NotFound(msg)) => {
                    warn!(tx_id = %tracked, "tracked transaction unknown to node");
                    return Ok(ConfirmationResult::Rejected { reason: msg });
                }
                Err(e) => return Err(e.into()),
            };

            if let Some(round) = pending.confirmed_round {
                let effects = self.collect_effects(handle, pending).await;
                info!(tx_id = %tracked, round, "group confirmed");
                return Ok(ConfirmationResult::Confirmed { round, effects });
            }
            if let Some(reason) = pending.pool_error {
                warn!(tx_id = %tracked, reason = %reason, "group rejected from pool");
                return Ok(ConfirmationResult::Rejected { reason });
            }

            if !poller.next_round().await? {
                info!(tx_id = %tracked, last_round = poller.round, "confirmation timed out");
                return Ok(ConfirmationResult::TimedOut {
                    last_round: Some(poller.round),
                });
            }
        }
    }

    /// [`submit`](Self::submit) then [`await_confirmation`](Self::await_confirmation).
    pub async fn submit_and_wait(
        &self,
        group: &[SignedTransaction],
        max_rounds: u64,
    ) -> Result<ConfirmationResult, SubmitError> {
        let handle = self.submit(group).await?;
        self.await_confirmation(&handle, max_rounds).await
    }

    /// Gathers effects from every member, in group order. The tracked
    /// member's record is already in hand.
    ///
    /// The group has committed by the time this runs, so a failed lookup
    /// only loses that member's effects; it never turns the confirmation
    /// into an error.
    async fn collect_effects(
        &self,
        handle: &SubmissionHandle,
        tracked: PendingTransaction,
    ) -> ConfirmationEffects {
        let mut effects = ConfirmationEffects::default();
        let (last, earlier) = match handle.members.split_last() {
            Some(split) => split,
            None => return tracked.effects,
        };
        for id in earlier {
            match self.client.pending_transaction(id).await {
                Ok(pending) => merge_effects(&mut effects, pending.effects),
                Err(e) => warn!(tx_id = %id, error = %e, "skipping effects of confirmed member"),
            }
        }
        debug!(tx_id = %last, "merging tracked member effects");
        merge_effects(&mut effects, tracked.effects);
        effects
    }
}

fn merge_effects(into: &mut ConfirmationEffects, from: ConfirmationEffects) {
    if from.created_app_id.is_some() {
        into.created_app_id = from.created_app_id;
    }
    if from.created_asset_id.is_some() {
        into.created_asset_id = from.created_asset_id;
    }
    into.global_state_delta.extend(from.global_state_delta);
}

/// Round counter for the confirmation loop.
struct RoundPoller<'a> {
    client: &'a dyn LedgerClient,
    round: u64,
    rounds_waited: u64,
    max_rounds: u64,
}

impl RoundPoller<'_> {
    /// Waits for the next block. Returns `false` once the budget is spent.
    async fn next_round(&mut self) -> Result<bool, SubmitError> {
        if self.rounds_waited >= self.max_rounds {
            return Ok(false);
        }
        let status = self.client.status_after_block(self.round).await?;
        self.rounds_waited += 1;
        self.round = status.last_round.max(self.round + 1);
        debug!(round = self.round, waited = self.rounds_waited, "round boundary");
        Ok(true)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::rpc::{ApplicationState, NodeStatus, StateDelta};
    use crate::transaction::NetworkParameters;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    /// Scripted client: pending lookups pop from a queue, every call is
    /// counted.
    #[derive(Default)]
    struct Scripted {
        send: Mutex<Option<Result<TxId, ClientError>>>,
        pending: Mutex<VecDeque<Result<PendingTransaction, ClientError>>>,
        calls: Mutex<Vec<&'static str>>,
        round: Mutex<u64>,
    }

    #[async_trait]
    impl LedgerClient for Scripted {
        async fn suggested_params(&self) -> Result<NetworkParameters, ClientError> {
            self.calls.lock().push("params");
            Ok(NetworkParameters::at_round(1, 1_000, "test", [1u8; 32]))
        }

        async fn send_raw_transactions(&self, _bytes: Vec<u8>) -> Result<TxId, ClientError> {
            self.calls.lock().push("send");
            self.send
                .lock()
                .take()
                .unwrap_or(Ok(TxId::from_bytes([1u8; 32])))
        }

        async fn pending_transaction(
            &self,
            _id: &TxId,
        ) -> Result<PendingTransaction, ClientError> {
            self.calls.lock().push("pending");
            self.pending
                .lock()
                .pop_front()
                .unwrap_or_else(|| Ok(PendingTransaction::default()))
        }

        async fn status(&self) -> Result<NodeStatus, ClientError> {
            self.calls.lock().push("status");
            Ok(NodeStatus {
                last_round: *self.round.lock(),
            })
        }

        async fn status_after_block(&self, round: u64) -> Result<NodeStatus, ClientError> {
            self.calls.lock().push("wait");
            let mut current = self.round.lock();
            *current = round + 1;
            Ok(NodeStatus {
                last_round: *current,
            })
        }

        async fn application_state(&self, _app_id: u64) -> Result<ApplicationState, ClientError> {
            Err(ClientError::NotFound("app".into()))
        }
    }

    fn handle(n: u8) -> SubmissionHandle {
        let members: Vec<TxId> = (1..=n).map(|i| TxId::from_bytes([i; 32])).collect();
        SubmissionHandle {
            first: members[0],
            members,
        }
    }

    fn confirmed_at(round: u64, effects: ConfirmationEffects) -> PendingTransaction {
        PendingTransaction {
            confirmed_round: Some(round),
            pool_error: None,
            effects,
        }
    }

    #[tokio::test]
    async fn zero_rounds_times_out_without_calls() {
        let client = Arc::new(Scripted::default());
        let submitter = Submitter::new(client.clone());
        let result = submitter.await_confirmation(&handle(2), 0).await.unwrap();
        assert_eq!(result, ConfirmationResult::TimedOut { last_round: None });
        assert!(client.calls.lock().is_empty());
    }

    #[tokio::test]
    async fn empty_group_is_refused() {
        let submitter = Submitter::new(Arc::new(Scripted::default()));
        assert_eq!(submitter.submit(&[]).await, Err(SubmitError::EmptyGroup));
    }

    #[tokio::test]
    async fn confirmation_on_third_poll() {
        let client = Arc::new(Scripted::default());
        *client.round.lock() = 10;
        {
            let mut pending = client.pending.lock();
            pending.push_back(Ok(PendingTransaction::default()));
            pending.push_back(Ok(PendingTransaction::default()));
            pending.push_back(Ok(confirmed_at(12, ConfirmationEffects::default())));
        }
        let submitter = Submitter::new(client.clone());
        let result = submitter.await_confirmation(&handle(1), 5).await.unwrap();
        assert_eq!(
            result,
            ConfirmationResult::Confirmed {
                round: 12,
                effects: ConfirmationEffects::default()
            }
        );
        let calls = client.calls.lock().clone();
        assert_eq!(calls.iter().filter(|c| **c == "wait").count(), 2);
    }

    #[tokio::test]
    async fn pool_error_is_rejection_not_error() {
        let client = Arc::new(Scripted::default());
        client.pending.lock().push_back(Ok(PendingTransaction {
            confirmed_round: None,
            pool_error: Some("overspend".into()),
            effects: ConfirmationEffects::default(),
        }));
        let submitter = Submitter::new(client);
        let result = submitter.await_confirmation(&handle(2), 5).await.unwrap();
        assert_eq!(
            result,
            ConfirmationResult::Rejected {
                reason: "overspend".into()
            }
        );
        assert_eq!(result.state(), SubmissionState::Rejected);
    }

    #[tokio::test]
    async fn never_confirming_times_out_after_budget() {
        let client = Arc::new(Scripted::default());
        *client.round.lock() = 100;
        let submitter = Submitter::new(client.clone());
        let result = submitter.await_confirmation(&handle(1), 3).await.unwrap();
        assert_eq!(
            result,
            ConfirmationResult::TimedOut {
                last_round: Some(103)
            }
        );
        let calls = client.calls.lock().clone();
        assert_eq!(calls.iter().filter(|c| **c == "wait").count(), 3);
        assert_eq!(calls.iter().filter(|c| **c == "pending").count(), 4);
    }

    #[tokio::test]
    async fn effects_merged_across_members() {
        let client = Arc::new(Scripted::default());
        {
            let mut pending = client.pending.lock();
            // Tracked (last) member, confirmed.
            pending.push_back(Ok(confirmed_at(7, ConfirmationEffects::default())));
            // First member: the app call with the state delta.
            pending.push_back(Ok(confirmed_at(
                7,
                ConfirmationEffects {
                    created_app_id: None,
                    created_asset_id: None,
                    global_state_delta: vec![StateDelta::SetUint {
                        key: "count".into(),
                        value: 1,
                    }],
                },
            )));
        }
        let submitter = Submitter::new(client);
        let result = submitter.await_confirmation(&handle(2), 5).await.unwrap();
        let effects = result.effects().unwrap();
        assert_eq!(effects.global_state_delta.len(), 1);
    }

    #[tokio::test]
    async fn member_lookup_failure_still_confirms() {
        let client = Arc::new(Scripted::default());
        {
            let mut pending = client.pending.lock();
            pending.push_back(Ok(confirmed_at(
                7,
                ConfirmationEffects {
                    created_app_id: Some(42),
                    ..Default::default()
                },
            )));
            pending.push_back(Err(ClientError::Transport("reset".into())));
        }
        let submitter = Submitter::new(client);
        let result = submitter.await_confirmation(&handle(2), 5).await.unwrap();
        match result {
            ConfirmationResult::Confirmed { round, effects } => {
                assert_eq!(round, 7);
                assert_eq!(effects.created_app_id, Some(42));
            }
            other => panic!("expected confirmation, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn send_rejection_maps_to_rejected() {
        let client = Arc::new(Scripted::default());
        *client.send.lock() = Some(Err(ClientError::Rejected("fee too low".into())));
        let submitter = Submitter::new(client);

        let kp = crate::crypto::Keypair::from_seed(&[1u8; 32]);
        let params = NetworkParameters::at_round(1, 1_000, "test", [1u8; 32]);
        let tx = crate::transaction::TransactionBuilder::payment(kp.address(), kp.address(), 1)
            .build(&params)
            .unwrap();
        let stx = crate::transaction::sign(tx, &crate::transaction::Authority::SimpleKey(kp))
            .unwrap();

        let err = submitter.submit(&[stx]).await.unwrap_err();
        assert_eq!(
            err,
            SubmitError::Rejected {
                reason: "fee too low".into()
            }
        );
        assert!(!err.is_retryable());
    }

    #[test]
    fn transport_errors_stay_retryable() {
        let err: SubmitError = ClientError::Transport("reset".into()).into();
        assert!(err.is_retryable());
        let err: SubmitError = ClientError::Http {
            status: 401,
            message: "bad token".into(),
        }
        .into();
        assert!(!err.is_retryable());
    }
}
