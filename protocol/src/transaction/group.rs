//! Atomic group assembly.
//!
//! An atomic group is an ordered list of transactions that the ledger
//! commits together or not at all. The binding is a *group id* written into
//! every member:
//!
//! ```text
//! member_id_i = SHA-512/256("TX" || encoding(member_i with group = None))
//! group_id    = SHA-512/256("TG" || member_id_0 || member_id_1 || ...)
//! ```
//!
//! The member order passed to [`assemble`] is the order the ledger executes
//! in, and it is baked into the group id. There is deliberately no way to
//! reorder a [`TransactionGroup`] after the fact: reordering would need a
//! new group id, which would invalidate every signature.
//!
//! A single transaction is "grouped" as a passthrough: no group id is
//! computed or written, because the ledger treats a lone transaction as its
//! own atomic unit already.

use thiserror::Error;

use super::builder::{GroupId, TxId, UnsignedTransaction};
use super::fee::{validate_group_fees, FeePolicyError};
use crate::config::{GROUP_ID_DOMAIN, MAX_GROUP_SIZE};
use crate::crypto::domain_hash_parts;

/// Errors produced while assembling a group.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GroupError {
    #[error("cannot assemble an empty group")]
    Empty,

    #[error("group of {size} transactions exceeds the limit of {max}")]
    TooLarge { size: usize, max: usize },
}

/// An assembled, not yet signed, atomic group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionGroup {
    id: Option<GroupId>,
    members: Vec<UnsignedTransaction>,
}

impl TransactionGroup {
    /// The shared group id, or `None` for a singleton.
    pub fn id(&self) -> Option<GroupId> {
        self.id
    }

    /// Members in execution order.
    pub fn members(&self) -> &[UnsignedTransaction] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn into_members(self) -> Vec<UnsignedTransaction> {
        self.members
    }

    /// Member transaction ids, computed over the final (grouped) encoding.
    pub fn member_ids(&self) -> Vec<TxId> {
        self.members.iter().map(UnsignedTransaction::id).collect()
    }

    /// Checks the members' combined fee against `network_min_fee`.
    pub fn validate_fees(&self, network_min_fee: u64) -> Result<(), FeePolicyError> {
        validate_group_fees(&self.members, network_min_fee)
    }
}

/// Computes the group id for `members` in the given order.
///
/// Any group field already present on a member is ignored; ids are always
/// taken over the ungrouped encoding.
pub fn compute_group_id(members: &[UnsignedTransaction]) -> GroupId {
    let ids: Vec<TxId> = members
        .iter()
        .map(|tx| {
            let mut bare = tx.clone();
            bare.group = None;
            bare.id()
        })
        .collect();
    GroupId::from_bytes(domain_hash_parts(
        GROUP_ID_DOMAIN,
        ids.iter().map(|id| id.as_bytes().as_slice()),
    ))
}

/// Binds `members` into an atomic group.
///
/// For two or more members the group id is computed and written into every
/// member's `group` field. A singleton is returned unchanged apart from
/// clearing any stale group field.
pub fn assemble(mut members: Vec<UnsignedTransaction>) -> Result<TransactionGroup, GroupError> {
    if members.is_empty() {
        return Err(GroupError::Empty);
    }
    if members.len() > MAX_GROUP_SIZE {
        return Err(GroupError::TooLarge {
            size: members.len(),
            max: MAX_GROUP_SIZE,
        });
    }

    if members.len() == 1 {
        members[0].group = None;
        return Ok(TransactionGroup { id: None, members });
    }

    let id = compute_group_id(&members);
    for tx in &mut members {
        tx.group = Some(id);
    }

    tracing::debug!(group = %id, members = members.len(), "assembled atomic group");
    Ok(TransactionGroup {
        id: Some(id),
        members,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
