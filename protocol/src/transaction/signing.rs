//! Authorization proofs.
//!
//! Every transaction carries exactly one proof that its sender authorized
//! it. The proof is computed over [`UnsignedTransaction::signing_bytes`],
//! which includes the `group` field, so signing has to happen *after*
//! [`super::group::assemble`]. A signature produced before the group id
//! was injected is still a perfectly good Ed25519 signature, just over the
//! wrong bytes; [`SignedTransaction::verify`] and the ledger both reject it.
//!
//! Three kinds of authority are supported:
//!
//! - **Simple key**: one Ed25519 keypair whose public key is the sender.
//! - **Logic sig**: a program authorizes the transaction. Either the
//!   program's own address is the sender (a contract account), or a key
//!   holder has delegated to the program by signing `"Program" || program`.
//! - **Multisig**: `threshold` of a fixed, ordered key list sign. Keys in
//!   the list must be distinct.
//!
//! Program evaluation is the ledger's business. Here a logic sig is only
//! checked for being bound to the right sender.

use thiserror::Error;

use super::builder::{TxId, UnsignedTransaction};
use super::encoding;
use super::group::{compute_group_id, TransactionGroup};
use crate::config::{MAX_MULTISIG_KEYS, PROGRAM_DOMAIN};
use crate::crypto::{Address, Keypair, PublicKey, Signature};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors produced while signing or verifying.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthorizationError {
    /// The authority controls a different account than the sender.
    #[error("authority for {authority} cannot sign for sender {sender}")]
    SenderMismatch { sender: Address, authority: Address },

    #[error("multisig needs {threshold} signers, only {available} available")]
    InsufficientMultisigSigners { threshold: u8, available: usize },

    #[error("signer {0} is not part of the multisig key list")]
    UnknownMultisigSigner(Address),

    #[error("invalid multisig parameters: {0}")]
    InvalidMultisig(String),

    #[error("group has {members} members but {authorities} authorities were supplied")]
    AuthorityCountMismatch { members: usize, authorities: usize },

    /// A member's group field does not match the group it is signed in.
    #[error("member {index} does not carry the group id")]
    GroupMismatch { index: usize },

    #[error("authorization proof for {tx_id} does not verify")]
    InvalidProof { tx_id: TxId },
}

// ---------------------------------------------------------------------------
// Authorities (signing side)
// ---------------------------------------------------------------------------

/// Whatever can authorize a transaction for one sender.
#[derive(Debug, Clone)]
pub enum Authority {
    SimpleKey(Keypair),
    /// A logic sig. With `delegator: None` the sender must be the program's
    /// own address; otherwise the delegator's account is the sender.
    DelegatedLogic {
        program: Vec<u8>,
        args: Vec<Vec<u8>>,
        delegator: Option<Keypair>,
    },
    /// A multisig account. `keys` is the ordered key list that defines the
    /// address; `signers` are the keypairs available to sign right now.
    Multisig {
        version: u8,
        threshold: u8,
        keys: Vec<PublicKey>,
        signers: Vec<Keypair>,
    },
}

impl Authority {
    /// The account this authority can sign for.
    pub fn address(&self) -> Address {
        match self {
            Authority::SimpleKey(kp) => kp.address(),
            Authority::DelegatedLogic {
                delegator: Some(kp),
                ..
            } => kp.address(),
            Authority::DelegatedLogic { program, .. } => Address::for_program(program),
            Authority::Multisig {
                version,
                threshold,
                keys,
                ..
            } => Address::for_multisig(*version, *threshold, keys),
        }
    }
}

// ---------------------------------------------------------------------------
// Proofs (wire side)
// ---------------------------------------------------------------------------

/// A logic-sig proof.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicSig {
    pub program: Vec<u8>,
    pub args: Vec<Vec<u8>>,
    /// Delegation signature over `"Program" || program`, if delegated.
    pub signature: Option<Signature>,
}

/// One slot of a multisig proof.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultisigSubsig {
    pub key: PublicKey,
    pub signature: Option<Signature>,
}

/// A multisig proof: the full key list with signatures where present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultisigSignature {
    pub version: u8,
    pub threshold: u8,
    pub subsigs: Vec<MultisigSubsig>,
}

impl MultisigSignature {
    fn keys(&self) -> Vec<PublicKey> {
        self.subsigs.iter().map(|s| s.key).collect()
    }
}

/// The authorization attached to a signed transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorizationProof {
    Signature(Signature),
    LogicSig(LogicSig),
    Multisig(MultisigSignature),
}

// ---------------------------------------------------------------------------
// SignedTransaction
// ---------------------------------------------------------------------------

/// A transaction plus its one authorization proof. Immutable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
    txn: UnsignedTransaction,
    proof: AuthorizationProof,
}

impl SignedTransaction {
    /// Pairs a transaction with a proof without checking it. Use
    /// [`verify`](Self::verify) to find out whether the pair is valid.
    pub fn from_parts(txn: UnsignedTransaction, proof: AuthorizationProof) -> Self {
        Self { txn, proof }
    }

    pub fn transaction(&self) -> &UnsignedTransaction {
        &self.txn
    }

    pub fn proof(&self) -> &AuthorizationProof {
        &self.proof
    }

    pub fn id(&self) -> TxId {
        self.txn.id()
    }

    /// Wire encoding of this one transaction.
    pub fn encode(&self) -> Vec<u8> {
        encoding::encode_signed(self)
    }

    /// Checks the proof against the transaction's current encoding.
    pub fn verify(&self) -> Result<(), AuthorizationError> {
        let invalid = || AuthorizationError::InvalidProof { tx_id: self.id() };
        let sender = self.txn.sender;

        match &self.proof {
            AuthorizationProof::Signature(sig) => {
                if !sender
                    .to_public_key()
                    .verify(&self.txn.signing_bytes(), sig)
                {
                    return Err(invalid());
                }
            }
            AuthorizationProof::LogicSig(lsig) => match &lsig.signature {
                Some(sig) => {
                    if !sender
                        .to_public_key()
                        .verify(&delegation_bytes(&lsig.program), sig)
                    {
                        return Err(invalid());
                    }
                }
                None => {
                    if Address::for_program(&lsig.program) != sender {
                        return Err(invalid());
                    }
                }
            },
            AuthorizationProof::Multisig(msig) => {
                let keys = msig.keys();
                if has_duplicate_keys(&keys) {
                    return Err(invalid());
                }
                if Address::for_multisig(msig.version, msig.threshold, &keys) != sender {
                    return Err(invalid());
                }
                let message = self.txn.signing_bytes();
                let mut valid = 0usize;
                for sub in &msig.subsigs {
                    if let Some(sig) = &sub.signature {
                        if !sub.key.verify(&message, sig) {
                            return Err(invalid());
                        }
                        valid += 1;
                    }
                }
                if valid < usize::from(msig.threshold) {
                    return Err(invalid());
                }
            }
        }
        Ok(())
    }

    pub fn into_parts(self) -> (UnsignedTransaction, AuthorizationProof) {
        (self.txn, self.proof)
    }
}

fn has_duplicate_keys(keys: &[PublicKey]) -> bool {
    keys.iter()
        .enumerate()
        .any(|(i, key)| keys[..i].contains(key))
}

fn delegation_bytes(program: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(PROGRAM_DOMAIN.len() + program.len());
    buf.extend_from_slice(PROGRAM_DOMAIN);
    buf.extend_from_slice(program);
    buf
}

// ---------------------------------------------------------------------------
// Signing
// ---------------------------------------------------------------------------

/// Signs one transaction with `authority`.
///
/// Sign *after* grouping. This function cannot tell whether `tx` is about
/// to be grouped; it signs whatever the group field says right now.
pub fn sign(
    tx: UnsignedTransaction,
    authority: &Authority,
) -> Result<SignedTransaction, AuthorizationError> {
    let authority_address = authority.address();
    if authority_address != tx.sender {
        return Err(AuthorizationError::SenderMismatch {
            sender: tx.sender,
            authority: authority_address,
        });
    }

    let proof = match authority {
        Authority::SimpleKey(kp) => AuthorizationProof::Signature(kp.sign(&tx.signing_bytes())),
        Authority::DelegatedLogic {
            program,
            args,
            delegator,
        } => AuthorizationProof::LogicSig(LogicSig {
            program: program.clone(),
            args: args.clone(),
            signature: delegator
                .as_ref()
                .map(|kp| kp.sign(&delegation_bytes(program))),
        }),
        Authority::Multisig {
            version,
            threshold,
            keys,
            signers,
        } => AuthorizationProof::Multisig(sign_multisig(
            &tx, *version, *threshold, keys, signers,
        )?),
    };

    tracing::debug!(tx_id = %tx.id(), sender = %tx.sender, "signed transaction");
    Ok(SignedTransaction { txn: tx, proof })
}

fn sign_multisig(
    tx: &UnsignedTransaction,
    version: u8,
    threshold: u8,
    keys: &[PublicKey],
    signers: &[Keypair],
) -> Result<MultisigSignature, AuthorizationError> {
    if threshold == 0 || usize::from(threshold) > keys.len() {
        return Err(AuthorizationError::InvalidMultisig(format!(
            "threshold {} with {} keys",
            threshold,
            keys.len()
        )));
    }
    if keys.len() > MAX_MULTISIG_KEYS {
        return Err(AuthorizationError::InvalidMultisig(format!(
            "{} keys exceeds limit of {}",
            keys.len(),
            MAX_MULTISIG_KEYS
        )));
    }
    if has_duplicate_keys(keys) {
        return Err(AuthorizationError::InvalidMultisig(
            "duplicate key in multisig".to_string(),
        ));
    }
    for signer in signers {
        if !keys.contains(&signer.public_key()) {
            return Err(AuthorizationError::UnknownMultisigSigner(signer.address()));
        }
    }

    let message = tx.signing_bytes();
    let subsigs: Vec<MultisigSubsig> = keys
        .iter()
        .map(|key| MultisigSubsig {
            key: *key,
            signature: signers
                .iter()
                .find(|kp| kp.public_key() == *key)
                .map(|kp| kp.sign(&message)),
        })
        .collect();

    let available = subsigs.iter().filter(|s| s.signature.is_some()).count();
    if available < usize::from(threshold) {
        return Err(AuthorizationError::InsufficientMultisigSigners {
            threshold,
            available,
        });
    }

    Ok(MultisigSignature {
        version,
        threshold,
        subsigs,
    })
}

/// Signs every member of an assembled group. `authorities[i]` signs member
/// `i`.
pub fn sign_group(
    group: TransactionGroup,
    authorities: &[Authority],
) -> Result<Vec<SignedTransaction>, AuthorizationError> {
    if authorities.len() != group.len() {
        return Err(AuthorizationError::AuthorityCountMismatch {
            members: group.len(),
            authorities: authorities.len(),
        });
    }

    let expected = group.id();
    if let Some(id) = expected {
        if compute_group_id(group.members()) != id {
            return Err(AuthorizationError::GroupMismatch { index: 0 });
        }
    }

    group
        .into_members()
        .into_iter()
        .zip(authorities)
        .enumerate()
        .map(|(index, (tx, authority))| {
            if tx.group != expected {
                return Err(AuthorizationError::GroupMismatch { index });
            }
            sign(tx, authority)
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::fee::FeeRole;
    use crate::transaction::group::assemble;
    use crate::transaction::{NetworkParameters, TransactionBuilder};

    fn params() -> NetworkParameters {
        NetworkParameters::at_round(1_000, 1_000, "sandnet-v1", [7u8; 32])
    }

    fn payment_from(sender: Address) -> UnsignedTransaction {
        TransactionBuilder::payment(sender, Keypair::from_seed(&[9u8; 32]).address(), 10)
            .build(&params())
            .unwrap()
    }

    #[test]
    fn simple_key_signature_verifies() {
        let kp = Keypair::generate();
        let stx = sign(payment_from(kp.address()), &Authority::SimpleKey(kp)).unwrap();
        assert!(stx.verify().is_ok());
    }

    #[test]
    fn wrong_key_is_sender_mismatch() {
        let owner = Keypair::generate();
        let other = Keypair::generate();
        let err = sign(payment_from(owner.address()), &Authority::SimpleKey(other)).unwrap_err();
        assert!(matches!(err, AuthorizationError::SenderMismatch { .. }));
    }

    #[test]
    fn signature_before_grouping_fails_verification() {
        let caller = Keypair::generate();
        let payer = Keypair::generate();
        let call = TransactionBuilder::app_call(caller.address(), 3)
            .fee_role(FeeRole::Dependent)
            .build(&params())
            .unwrap();
        let pay = TransactionBuilder::payment(payer.address(), caller.address(), 1)
            .fee_role(FeeRole::Payer { covers: 1 })
            .build(&params())
            .unwrap();

        let early = sign(call.clone(), &Authority::SimpleKey(caller.clone())).unwrap();
        let group = assemble(vec![call, pay]).unwrap();
        let grouped_call = group.members()[0].clone();

        let (_, early_proof) = early.into_parts();
        let forged = SignedTransaction::from_parts(grouped_call, early_proof);
        assert!(matches!(
            forged.verify(),
            Err(AuthorizationError::InvalidProof { .. })
        ));
    }

    #[test]
    fn sign_group_uses_index_mapping() {
        let caller = Keypair::generate();
        let payer = Keypair::generate();
        let call = TransactionBuilder::app_call(caller.address(), 3)
            .fee_role(FeeRole::Dependent)
            .build(&params())
            .unwrap();
        let pay = TransactionBuilder::payment(payer.address(), caller.address(), 1)
            .fee_role(FeeRole::Payer { covers: 1 })
            .build(&params())
            .unwrap();
        let group = assemble(vec![call, pay]).unwrap();
        let group_id = group.id();

        let signed = sign_group(
            group.clone(),
            &[
                Authority::SimpleKey(caller.clone()),
                Authority::SimpleKey(payer.clone()),
            ],
        )
        .unwrap();
        assert_eq!(signed.len(), 2);
        for stx in &signed {
            assert!(stx.verify().is_ok());
            assert_eq!(stx.transaction().group, group_id);
        }

        // Swapped authorities cannot prove the senders.
        let err = sign_group(
            group,
            &[Authority::SimpleKey(payer), Authority::SimpleKey(caller)],
        )
        .unwrap_err();
        assert!(matches!(err, AuthorizationError::SenderMismatch { .. }));
    }

    #[test]
    fn authority_count_must_match() {
        let kp = Keypair::generate();
        let group = assemble(vec![payment_from(kp.address())]).unwrap();
        let err = sign_group(group, &[]).unwrap_err();
        assert_eq!(
            err,
            AuthorizationError::AuthorityCountMismatch {
                members: 1,
                authorities: 0
            }
        );
    }

    #[test]
    fn contract_account_logic_sig() {
        let program = vec![0x06, 0x81, 0x01];
        let authority = Authority::DelegatedLogic {
            program: program.clone(),
            args: vec![],
            delegator: None,
        };
        let stx = sign(payment_from(Address::for_program(&program)), &authority).unwrap();
        assert!(stx.verify().is_ok());
    }

    #[test]
    fn delegated_logic_sig() {
        let owner = Keypair::generate();
        let authority = Authority::DelegatedLogic {
            program: vec![0x06, 0x81, 0x01],
            args: vec![b"arg".to_vec()],
            delegator: Some(owner.clone()),
        };
        let stx = sign(payment_from(owner.address()), &authority).unwrap();
        assert!(stx.verify().is_ok());
        match stx.proof() {
            AuthorizationProof::LogicSig(lsig) => assert!(lsig.signature.is_some()),
            other => panic!("unexpected proof {:?}", other),
        }
    }

    fn multisig(signers: Vec<Keypair>, keys: &[Keypair], threshold: u8) -> Authority {
        Authority::Multisig {
            version: 1,
            threshold,
            keys: keys.iter().map(Keypair::public_key).collect(),
            signers,
        }
    }

    #[test]
    fn multisig_meets_threshold() {
        let keys: Vec<Keypair> = (0..3).map(|_| Keypair::generate()).collect();
        let authority = multisig(vec![keys[0].clone(), keys[2].clone()], &keys, 2);
        let stx = sign(payment_from(authority.address()), &authority).unwrap();
        assert!(stx.verify().is_ok());
    }

    #[test]
    fn multisig_below_threshold_fails() {
        let keys: Vec<Keypair> = (0..3).map(|_| Keypair::generate()).collect();
        let authority = multisig(vec![keys[0].clone()], &keys, 2);
        let err = sign(payment_from(authority.address()), &authority).unwrap_err();
        assert_eq!(
            err,
            AuthorizationError::InsufficientMultisigSigners {
                threshold: 2,
                available: 1
            }
        );
    }

    #[test]
    fn multisig_rejects_outsider() {
        let keys: Vec<Keypair> = (0..2).map(|_| Keypair::generate()).collect();
        let authority = multisig(vec![Keypair::generate()], &keys, 1);
        let err = sign(payment_from(authority.address()), &authority).unwrap_err();
        assert!(matches!(err, AuthorizationError::UnknownMultisigSigner(_)));
    }

    #[test]
    fn multisig_threshold_bounds() {
        let keys: Vec<Keypair> = (0..2).map(|_| Keypair::generate()).collect();
        let authority = multisig(keys.clone(), &keys, 3);
        assert!(matches!(
            sign(payment_from(authority.address()), &authority),
            Err(AuthorizationError::InvalidMultisig(_))
        ));
    }

    #[test]
    fn repeated_key_cannot_meet_threshold() {
        let kp = Keypair::generate();
        let keys = vec![kp.clone(), kp.clone()];
        let authority = multisig(vec![kp.clone()], &keys, 2);
        let err = sign(payment_from(authority.address()), &authority).unwrap_err();
        assert_eq!(
            err,
            AuthorizationError::InvalidMultisig("duplicate key in multisig".to_string())
        );

        // A hand-built proof that lists the same key twice is refused too.
        let tx = payment_from(authority.address());
        let sig = kp.sign(&tx.signing_bytes());
        let subsig = MultisigSubsig {
            key: kp.public_key(),
            signature: Some(sig),
        };
        let proof = AuthorizationProof::Multisig(MultisigSignature {
            version: 1,
            threshold: 2,
            subsigs: vec![subsig.clone(), subsig],
        });
        let stx = SignedTransaction::from_parts(tx, proof);
        assert!(matches!(
            stx.verify(),
            Err(AuthorizationError::InvalidProof { .. })
        ));
    }

    #[test]
    fn tampered_fee_fails_verification() {
        let kp = Keypair::generate();
        let stx = sign(payment_from(kp.address()), &Authority::SimpleKey(kp)).unwrap();
        let (mut tx, proof) = stx.into_parts();
        tx.fee = 0;
        assert!(SignedTransaction::from_parts(tx, proof).verify().is_err());
    }
}
