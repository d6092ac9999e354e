//! One-stop group composition.
//!
//! [`AtomicComposer`] runs the pipeline in the only order that works:
//!
//! 1. fee check over the unsigned members (fees are signed, so this must
//!    come first),
//! 2. group assembly (writes the group id),
//! 3. per-member signing with the authority registered for that member.
//!
//! Callers that need to inspect the group between steps can call
//! [`super::fee::validate_group_fees`], [`super::group::assemble`] and
//! [`super::signing::sign_group`] themselves.

use super::builder::UnsignedTransaction;
use super::fee::validate_group_fees;
use super::group::assemble;
use super::signing::{sign_group, Authority, SignedTransaction};
use crate::error::Error;

/// Collects `(transaction, authority)` pairs in execution order.
#[derive(Debug, Clone, Default)]
pub struct AtomicComposer {
    transactions: Vec<UnsignedTransaction>,
    authorities: Vec<Authority>,
}

impl AtomicComposer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a member. Order of `add` calls is execution order.
    pub fn add(mut self, tx: UnsignedTransaction, authority: Authority) -> Self {
        self.transactions.push(tx);
        self.authorities.push(authority);
        self
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    /// Validates fees, assembles and signs.
    pub fn build(self, network_min_fee: u64) -> Result<Vec<SignedTransaction>, Error> {
        validate_group_fees(&self.transactions, network_min_fee)?;
        let group = assemble(self.transactions)?;
        let group_id = group.id();
        let signed = sign_group(group, &self.authorities)?;

        tracing::debug!(
            group = ?group_id,
            members = signed.len(),
            "composed signed group"
        );
        Ok(signed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Keypair;
    use crate::transaction::fee::{FeePolicyError, FeeRole};
    use crate::transaction::group::GroupError;
    use crate::transaction::{NetworkParameters, TransactionBuilder};

    fn params() -> NetworkParameters {
        NetworkParameters::at_round(50, 1_000, "sandnet-v1", [7u8; 32])
    }

    #[test]
    fn covering_pair_composes() {
        let caller = Keypair::generate();
        let payer = Keypair::generate();
        let call = TransactionBuilder::app_call(caller.address(), 1)
            .app_arg(b"Add".to_vec())
            .fee_role(FeeRole::Dependent)
            .build(&params())
            .unwrap();
        let pay = TransactionBuilder::payment(payer.address(), caller.address(), 1_000_000)
            .fee_role(FeeRole::Payer { covers: 1 })
            .build(&params())
            .unwrap();

        let signed = AtomicComposer::new()
            .add(call, Authority::SimpleKey(caller))
            .add(pay, Authority::SimpleKey(payer))
            .build(params().min_fee)
            .unwrap();

        assert_eq!(signed.len(), 2);
        assert_eq!(signed[0].transaction().fee, 0);
        assert_eq!(signed[1].transaction().fee, 2_000);
        assert!(signed[0].transaction().group.is_some());
        assert_eq!(signed[0].transaction().group, signed[1].transaction().group);
        assert!(signed.iter().all(|stx| stx.verify().is_ok()));
    }

    #[test]
    fn two_dependents_fail_before_signing() {
        let a = Keypair::generate();
        let b = Keypair::generate();
        let tx = |kp: &Keypair| {
            TransactionBuilder::app_call(kp.address(), 1)
                .fee_role(FeeRole::Dependent)
                .build(&params())
                .unwrap()
        };
        let err = AtomicComposer::new()
            .add(tx(&a), Authority::SimpleKey(a.clone()))
            .add(tx(&b), Authority::SimpleKey(b.clone()))
            .build(1_000)
            .unwrap_err();
        assert!(matches!(
            err,
            Error::FeePolicy(FeePolicyError::Underfunded { .. })
        ));
    }

    #[test]
    fn empty_composer_fails() {
        let err = AtomicComposer::new().build(1_000).unwrap_err();
        assert!(matches!(err, Error::Group(GroupError::Empty)));
    }
}
