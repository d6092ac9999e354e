//! Fee policy for standalone and grouped transactions.
//!
//! The ledger only checks one thing about group fees: the sum must cover
//! `n * min_fee`. How that sum is split between members is up to the
//! builder. The common case is a *fee-covering* pair: an unfunded account
//! makes a zero-fee call and a funded account in the same group pays for
//! both.
//!
//! Fees are part of the signed payload, so [`validate_group_fees`] has to
//! run before anything is signed. A group that fails it must be rebuilt
//! with re-resolved fees; retrying it as-is can never succeed.

use thiserror::Error;

use super::builder::UnsignedTransaction;

/// Errors produced by fee validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FeePolicyError {
    /// The group as a whole pays less than the network requires.
    #[error("group under-funded: total fee {total} < required {required} ({count} x {min_fee})")]
    Underfunded {
        total: u64,
        required: u64,
        count: usize,
        min_fee: u64,
    },

    /// Fee arithmetic overflowed. Only reachable with absurd fees.
    #[error("fee overflow while summing group fees")]
    Overflow,
}

/// The part a transaction plays in sharing group fees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FeeRole {
    /// Pays its own minimum and nothing else.
    #[default]
    Standalone,
    /// Pays nothing; relies on a `Payer` in the same group.
    Dependent,
    /// Pays its own minimum plus one minimum for each of `covers` dependents.
    Payer { covers: u64 },
}

/// Resolves the fee a transaction should carry.
///
/// `base_fee` is what the caller would pay on its own (usually the
/// suggested fee); it never drops below `network_min_fee`.
///
/// | role | fee |
/// |------|-----|
/// | `Standalone` | `max(base, min)` |
/// | `Dependent` | `0` |
/// | `Payer { covers: k }` | `max(base, min) + k * min` |
pub fn resolve_fee(role: FeeRole, base_fee: u64, network_min_fee: u64) -> u64 {
    let own = base_fee.max(network_min_fee);
    match role {
        FeeRole::Standalone => own,
        FeeRole::Dependent => 0,
        FeeRole::Payer { covers } => own.saturating_add(network_min_fee.saturating_mul(covers)),
    }
}

/// Checks that a set of fees covers `fees.len() * network_min_fee`.
pub fn validate_fees(fees: &[u64], network_min_fee: u64) -> Result<(), FeePolicyError> {
    let total = fees
        .iter()
        .try_fold(0u64, |acc, fee| acc.checked_add(*fee))
        .ok_or(FeePolicyError::Overflow)?;
    let required = network_min_fee
        .checked_mul(fees.len() as u64)
        .ok_or(FeePolicyError::Overflow)?;

    if total < required {
        return Err(FeePolicyError::Underfunded {
            total,
            required,
            count: fees.len(),
            min_fee: network_min_fee,
        });
    }
    Ok(())
}

/// Checks that the members of a prospective group cover the network minimum.
///
/// A single transaction is just a group of one, so this also catches a
/// zero-fee transaction submitted alone.
pub fn validate_group_fees(
    members: &[UnsignedTransaction],
    network_min_fee: u64,
) -> Result<(), FeePolicyError> {
    let fees: Vec<u64> = members.iter().map(|tx| tx.fee).collect();
    validate_fees(&fees, network_min_fee)
}
