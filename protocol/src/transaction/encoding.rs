//! Canonical binary encoding.
//!
//! Transaction ids, group ids and signatures are all computed over these
//! bytes, so the format must be deterministic: the same transaction always
//! encodes to the same bytes, and different transactions never do.
//! JSON/serde is avoided on purpose, since map ordering and number
//! formatting are not something we want consensus to depend on.
//!
//! ## Layout
//!
//! ```text
//! unsigned := version:u8 kind:u8 sender:[32] fee:u64 first_valid:u64 last_valid:u64
//!             genesis_id:str genesis_hash:[32] note:opt<bytes> group:opt<[32]> body
//! signed   := unsigned:bytes proof_tag:u8 proof
//! group    := signed signed ...            (member order, no separator)
//!
//! u64      := 8 bytes big-endian
//! bytes    := len:u32 data[len]
//! str      := bytes (UTF-8)
//! opt<T>   := 0x00 | 0x01 T
//! list<T>  := count:u32 T*
//! ```
//!
//! Every field is written, including defaults, so a decoder can recover
//! exactly what was encoded.

use thiserror::Error;

use super::builder::{GroupId, UnsignedTransaction};
use super::signing::{AuthorizationProof, LogicSig, MultisigSignature, MultisigSubsig, SignedTransaction};
use super::types::{AssetParams, OnComplete, StateSchema, TransactionBody, TransactionType};
use crate::crypto::{Address, PublicKey, Signature};

/// Format version written as the first byte of every unsigned encoding.
pub const ENCODING_VERSION: u8 = 1;

const PROOF_SIGNATURE: u8 = 1;
const PROOF_LOGIC_SIG: u8 = 2;
const PROOF_MULTISIG: u8 = 3;

/// Errors produced while decoding.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("unexpected end of input: needed {needed} bytes, {remaining} remaining")]
    UnexpectedEof { needed: usize, remaining: usize },

    #[error("unsupported encoding version {0}")]
    UnsupportedVersion(u8),

    #[error("invalid tag {tag} for {field}")]
    InvalidTag { field: &'static str, tag: u8 },

    #[error("field {0} is not valid UTF-8")]
    InvalidUtf8(&'static str),

    #[error("{0} trailing bytes after record")]
    TrailingBytes(usize),
}

// ---------------------------------------------------------------------------
// Writer
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    fn u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    fn bool(&mut self, v: bool) {
        self.buf.push(u8::from(v));
    }

    fn u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    fn u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    fn fixed(&mut self, v: &[u8; 32]) {
        self.buf.extend_from_slice(v);
    }

    fn bytes(&mut self, v: &[u8]) {
        self.u32(v.len() as u32);
        self.buf.extend_from_slice(v);
    }

    fn str(&mut self, v: &str) {
        self.bytes(v.as_bytes());
    }

    fn opt_fixed(&mut self, v: Option<&[u8; 32]>) {
        match v {
            Some(v) => {
                self.u8(1);
                self.fixed(v);
            }
            None => self.u8(0),
        }
    }

    fn opt_bytes(&mut self, v: Option<&[u8]>) {
        match v {
            Some(v) => {
                self.u8(1);
                self.bytes(v);
            }
            None => self.u8(0),
        }
    }

    fn bytes_list(&mut self, v: &[Vec<u8>]) {
        self.u32(v.len() as u32);
        for item in v {
            self.bytes(item);
        }
    }

    fn schema(&mut self, s: &StateSchema) {
        self.u64(s.num_uints);
        self.u64(s.num_byte_slices);
    }
}

// ---------------------------------------------------------------------------
// Reader
// ---------------------------------------------------------------------------

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        if n > self.remaining() {
            return Err(DecodeError::UnexpectedEof {
                needed: n,
                remaining: self.remaining(),
            });
        }
        let out = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take(1)?[0])
    }

    fn bool(&mut self, field: &'static str) -> Result<bool, DecodeError> {
        match self.u8()? {
            0 => Ok(false),
            1 => Ok(true),
            tag => Err(DecodeError::InvalidTag { field, tag }),
        }
    }

    fn u32(&mut self) -> Result<u32, DecodeError> {
        let mut b = [0u8; 4];
        b.copy_from_slice(self.take(4)?);
        Ok(u32::from_be_bytes(b))
    }

    fn u64(&mut self) -> Result<u64, DecodeError> {
        let mut b = [0u8; 8];
        b.copy_from_slice(self.take(8)?);
        Ok(u64::from_be_bytes(b))
    }

    fn fixed(&mut self) -> Result<[u8; 32], DecodeError> {
        let mut b = [0u8; 32];
        b.copy_from_slice(self.take(32)?);
        Ok(b)
    }

    fn bytes(&mut self) -> Result<Vec<u8>, DecodeError> {
        let len = self.u32()? as usize;
        Ok(self.take(len)?.to_vec())
    }

    fn str(&mut self, field: &'static str) -> Result<String, DecodeError> {
        String::from_utf8(self.bytes()?).map_err(|_| DecodeError::InvalidUtf8(field))
    }

    fn flag(&mut self, field: &'static str) -> Result<bool, DecodeError> {
        self.bool(field)
    }

    fn opt_fixed(&mut self, field: &'static str) -> Result<Option<[u8; 32]>, DecodeError> {
        if self.flag(field)? {
            Ok(Some(self.fixed()?))
        } else {
            Ok(None)
        }
    }

    fn opt_bytes(&mut self, field: &'static str) -> Result<Option<Vec<u8>>, DecodeError> {
        if self.flag(field)? {
            Ok(Some(self.bytes()?))
        } else {
            Ok(None)
        }
    }

    /// Reads a list count, refusing counts that could not possibly fit in
    /// the remaining input (each element takes at least `min_item` bytes).
    fn count(&mut self, min_item: usize) -> Result<usize, DecodeError> {
        let count = self.u32()? as usize;
        let needed = count.saturating_mul(min_item);
        if needed > self.remaining() {
            return Err(DecodeError::UnexpectedEof {
                needed,
                remaining: self.remaining(),
            });
        }
        Ok(count)
    }

    fn bytes_list(&mut self) -> Result<Vec<Vec<u8>>, DecodeError> {
        let count = self.count(4)?;
        (0..count).map(|_| self.bytes()).collect()
    }

    fn schema(&mut self) -> Result<StateSchema, DecodeError> {
        Ok(StateSchema {
            num_uints: self.u64()?,
            num_byte_slices: self.u64()?,
        })
    }

    fn finish(&self) -> Result<(), DecodeError> {
        match self.remaining() {
            0 => Ok(()),
            n => Err(DecodeError::TrailingBytes(n)),
        }
    }
}

// ---------------------------------------------------------------------------
// Unsigned transactions
// ---------------------------------------------------------------------------

/// Encodes an unsigned transaction.
pub fn encode_unsigned(tx: &UnsignedTransaction) -> Vec<u8> {
    let mut w = Writer::default();
    write_unsigned(&mut w, tx);
    w.buf
}

/// Decodes a complete unsigned transaction encoding.
pub fn decode_unsigned(bytes: &[u8]) -> Result<UnsignedTransaction, DecodeError> {
    let mut r = Reader::new(bytes);
    let tx = read_unsigned(&mut r)?;
    r.finish()?;
    Ok(tx)
}

fn write_unsigned(w: &mut Writer, tx: &UnsignedTransaction) {
    w.u8(ENCODING_VERSION);
    w.u8(tx.tx_type().tag());
    w.fixed(tx.sender.as_bytes());
    w.u64(tx.fee);
    w.u64(tx.first_valid);
    w.u64(tx.last_valid);
    w.str(&tx.genesis_id);
    w.fixed(&tx.genesis_hash);
    w.opt_bytes(tx.note.as_deref());
    w.opt_fixed(tx.group.as_ref().map(GroupId::as_bytes));

    match &tx.body {
        TransactionBody::Payment {
            receiver,
            amount,
            close_remainder_to,
        } => {
            w.fixed(receiver.as_bytes());
            w.u64(*amount);
            w.opt_fixed(close_remainder_to.as_ref().map(Address::as_bytes));
        }
        TransactionBody::AssetTransfer {
            asset_id,
            receiver,
            amount,
        } => {
            w.u64(*asset_id);
            w.fixed(receiver.as_bytes());
            w.u64(*amount);
        }
        TransactionBody::AssetCreate { params } => {
            w.u64(params.total);
            w.u32(params.decimals);
            w.bool(params.default_frozen);
            w.str(&params.unit_name);
            w.str(&params.asset_name);
            w.str(&params.url);
            w.opt_fixed(params.metadata_hash.as_ref());
            for role in [
                &params.manager,
                &params.reserve,
                &params.freeze,
                &params.clawback,
            ] {
                w.opt_fixed(role.as_ref().map(Address::as_bytes));
            }
        }
        TransactionBody::ApplicationCall {
            app_id,
            on_complete,
            args,
            accounts,
            foreign_apps,
        } => {
            w.u64(*app_id);
            w.u8(on_complete.tag());
            w.bytes_list(args);
            w.u32(accounts.len() as u32);
            for account in accounts {
                w.fixed(account.as_bytes());
            }
            w.u32(foreign_apps.len() as u32);
            for app in foreign_apps {
                w.u64(*app);
            }
        }
        TransactionBody::ApplicationCreate {
            approval_program,
            clear_program,
            global_schema,
            local_schema,
            on_complete,
            args,
        } => {
            w.bytes(approval_program);
            w.bytes(clear_program);
            w.schema(global_schema);
            w.schema(local_schema);
            w.u8(on_complete.tag());
            w.bytes_list(args);
        }
    }
}

fn read_address(r: &mut Reader<'_>) -> Result<Address, DecodeError> {
    Ok(Address::from_bytes(r.fixed()?))
}

fn read_opt_address(r: &mut Reader<'_>, field: &'static str) -> Result<Option<Address>, DecodeError> {
    Ok(r.opt_fixed(field)?.map(Address::from_bytes))
}

fn read_on_complete(r: &mut Reader<'_>) -> Result<OnComplete, DecodeError> {
    let tag = r.u8()?;
    OnComplete::from_tag(tag).ok_or(DecodeError::InvalidTag {
        field: "on_complete",
        tag,
    })
}

fn read_unsigned(r: &mut Reader<'_>) -> Result<UnsignedTransaction, DecodeError> {
    let version = r.u8()?;
    if version != ENCODING_VERSION {
        return Err(DecodeError::UnsupportedVersion(version));
    }
    let kind_tag = r.u8()?;
    let kind = TransactionType::from_tag(kind_tag).ok_or(DecodeError::InvalidTag {
        field: "kind",
        tag: kind_tag,
    })?;

    let sender = read_address(r)?;
    let fee = r.u64()?;
    let first_valid = r.u64()?;
    let last_valid = r.u64()?;
    let genesis_id = r.str("genesis_id")?;
    let genesis_hash = r.fixed()?;
    let note = r.opt_bytes("note")?;
    let group = r.opt_fixed("group")?.map(GroupId::from_bytes);

    let body = match kind {
        TransactionType::Payment => TransactionBody::Payment {
            receiver: read_address(r)?,
            amount: r.u64()?,
            close_remainder_to: read_opt_address(r, "close_remainder_to")?,
        },
        TransactionType::AssetTransfer => TransactionBody::AssetTransfer {
            asset_id: r.u64()?,
            receiver: read_address(r)?,
            amount: r.u64()?,
        },
        TransactionType::AssetCreate => TransactionBody::AssetCreate {
            params: AssetParams {
                total: r.u64()?,
                decimals: r.u32()?,
                default_frozen: r.bool("default_frozen")?,
                unit_name: r.str("unit_name")?,
                asset_name: r.str("asset_name")?,
                url: r.str("url")?,
                metadata_hash: r.opt_fixed("metadata_hash")?,
                manager: read_opt_address(r, "manager")?,
                reserve: read_opt_address(r, "reserve")?,
                freeze: read_opt_address(r, "freeze")?,
                clawback: read_opt_address(r, "clawback")?,
            },
        },
        TransactionType::ApplicationCall => {
            let app_id = r.u64()?;
            let on_complete = read_on_complete(r)?;
            let args = r.bytes_list()?;
            let account_count = r.count(32)?;
            let accounts = (0..account_count)
                .map(|_| read_address(r))
                .collect::<Result<Vec<_>, _>>()?;
            let app_count = r.count(8)?;
            let foreign_apps = (0..app_count)
                .map(|_| r.u64())
                .collect::<Result<Vec<_>, _>>()?;
            TransactionBody::ApplicationCall {
                app_id,
                on_complete,
                args,
                accounts,
                foreign_apps,
            }
        }
        TransactionType::ApplicationCreate => TransactionBody::ApplicationCreate {
            approval_program: r.bytes()?,
            clear_program: r.bytes()?,
            global_schema: r.schema()?,
            local_schema: r.schema()?,
            on_complete: read_on_complete(r)?,
            args: r.bytes_list()?,
        },
    };

    Ok(UnsignedTransaction {
        sender,
        fee,
        first_valid,
        last_valid,
        genesis_id,
        genesis_hash,
        note,
        group,
        body,
    })
}

// ---------------------------------------------------------------------------
// Signed transactions
// ---------------------------------------------------------------------------

/// Encodes one signed transaction.
pub fn encode_signed(stx: &SignedTransaction) -> Vec<u8> {
    let mut w = Writer::default();
    write_signed(&mut w, stx);
    w.buf
}

/// Encodes a signed group for submission, in member order.
pub fn encode_group(members: &[SignedTransaction]) -> Vec<u8> {
    let mut w = Writer::default();
    for stx in members {
        write_signed(&mut w, stx);
    }
    w.buf
}

/// Decodes one signed transaction.
pub fn decode_signed(bytes: &[u8]) -> Result<SignedTransaction, DecodeError> {
    let mut r = Reader::new(bytes);
    let stx = read_signed(&mut r)?;
    r.finish()?;
    Ok(stx)
}

/// Decodes a concatenated stream of signed transactions.
pub fn decode_group(bytes: &[u8]) -> Result<Vec<SignedTransaction>, DecodeError> {
    let mut r = Reader::new(bytes);
    let mut members = Vec::new();
    while !r.is_empty() {
        members.push(read_signed(&mut r)?);
    }
    Ok(members)
}

fn write_signed(w: &mut Writer, stx: &SignedTransaction) {
    w.bytes(&encode_unsigned(stx.transaction()));
    match stx.proof() {
        AuthorizationProof::Signature(sig) => {
            w.u8(PROOF_SIGNATURE);
            w.bytes(sig.as_bytes());
        }
        AuthorizationProof::LogicSig(lsig) => {
            w.u8(PROOF_LOGIC_SIG);
            w.bytes(&lsig.program);
            w.bytes_list(&lsig.args);
            w.opt_bytes(lsig.signature.as_ref().map(Signature::as_bytes));
        }
        AuthorizationProof::Multisig(msig) => {
            w.u8(PROOF_MULTISIG);
            w.u8(msig.version);
            w.u8(msig.threshold);
            w.u32(msig.subsigs.len() as u32);
            for sub in &msig.subsigs {
                w.fixed(sub.key.as_bytes());
                w.opt_bytes(sub.signature.as_ref().map(Signature::as_bytes));
            }
        }
    }
}

fn read_signature(r: &mut Reader<'_>) -> Result<Signature, DecodeError> {
    Ok(Signature::from_vec(r.bytes()?))
}

fn read_opt_signature(
    r: &mut Reader<'_>,
    field: &'static str,
) -> Result<Option<Signature>, DecodeError> {
    Ok(r.opt_bytes(field)?.map(Signature::from_vec))
}

fn read_signed(r: &mut Reader<'_>) -> Result<SignedTransaction, DecodeError> {
    let inner = r.bytes()?;
    let txn = decode_unsigned(&inner)?;

    let tag = r.u8()?;
    let proof = match tag {
        PROOF_SIGNATURE => AuthorizationProof::Signature(read_signature(r)?),
        PROOF_LOGIC_SIG => AuthorizationProof::LogicSig(LogicSig {
            program: r.bytes()?,
            args: r.bytes_list()?,
            signature: read_opt_signature(r, "logic_sig.signature")?,
        }),
        PROOF_MULTISIG => {
            let version = r.u8()?;
            let threshold = r.u8()?;
            let count = r.count(33)?;
            let subsigs = (0..count)
                .map(|_| {
                    Ok(MultisigSubsig {
                        key: PublicKey::from_bytes(r.fixed()?),
                        signature: read_opt_signature(r, "multisig.signature")?,
                    })
                })
                .collect::<Result<Vec<_>, DecodeError>>()?;
            AuthorizationProof::Multisig(MultisigSignature {
                version,
                threshold,
                subsigs,
            })
        }
        tag => return Err(DecodeError::InvalidTag { field: "proof", tag }),
    };

    Ok(SignedTransaction::from_parts(txn, proof))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Keypair;

    fn header(body: TransactionBody) -> UnsignedTransaction {
        UnsignedTransaction {
            sender: Keypair::from_seed(&[1u8; 32]).address(),
            fee: 2_000,
            first_valid: 100,
            last_valid: 1_100,
            genesis_id: "sandnet-v1".to_string(),
            genesis_hash: [4u8; 32],
            note: Some(b"hello".to_vec()),
            group: Some(GroupId::from_bytes([9u8; 32])),
            body,
        }
    }

    fn every_kind() -> Vec<UnsignedTransaction> {
        let other = Keypair::from_seed(&[2u8; 32]).address();
        vec![
            header(TransactionBody::Payment {
                receiver: other,
                amount: 1_000_000,
                close_remainder_to: Some(other),
            }),
            header(TransactionBody::AssetTransfer {
                asset_id: 55,
                receiver: other,
                amount: 0,
            }),
            header(TransactionBody::AssetCreate {
                params: AssetParams {
                    total: 1_000_000,
                    decimals: 0,
                    default_frozen: false,
                    unit_name: "TA".to_string(),
                    asset_name: "TESTASSET".to_string(),
                    url: "website".to_string(),
                    metadata_hash: None,
                    manager: Some(other),
                    reserve: Some(other),
                    freeze: None,
                    clawback: Some(other),
                },
            }),
            header(TransactionBody::ApplicationCall {
                app_id: 12,
                on_complete: OnComplete::NoOp,
                args: vec![b"Add".to_vec(), vec![]],
                accounts: vec![other],
                foreign_apps: vec![3, 4],
            }),
            header(TransactionBody::ApplicationCreate {
                approval_program: vec![0x06, 0x81, 0x01],
                clear_program: vec![0x06, 0x81, 0x01],
                global_schema: StateSchema::new(1, 0),
                local_schema: StateSchema::default(),
                on_complete: OnComplete::OptIn,
                args: vec![],
            }),
        ]
    }

    #[test]
    fn every_kind_decodes_to_identical_fields() {
        for tx in every_kind() {
            let decoded = decode_unsigned(&encode_unsigned(&tx)).unwrap();
            assert_eq!(decoded, tx);
        }
    }

    #[test]
    fn absent_group_and_note_survive() {
        let mut tx = every_kind().remove(0);
        tx.group = None;
        tx.note = None;
        assert_eq!(decode_unsigned(&encode_unsigned(&tx)).unwrap(), tx);
    }

    #[test]
    fn group_field_changes_encoding() {
        let tx = every_kind().remove(0);
        let mut ungrouped = tx.clone();
        ungrouped.group = None;
        assert_ne!(encode_unsigned(&tx), encode_unsigned(&ungrouped));
    }

    #[test]
    fn truncated_input_is_an_error() {
        let bytes = encode_unsigned(&every_kind().remove(3));
        for cut in [0, 1, 10, bytes.len() - 1] {
            assert!(matches!(
                decode_unsigned(&bytes[..cut]),
                Err(DecodeError::UnexpectedEof { .. })
            ));
        }
    }

    #[test]
    fn trailing_bytes_rejected() {
        let mut bytes = encode_unsigned(&every_kind().remove(0));
        bytes.push(0);
        assert_eq!(decode_unsigned(&bytes), Err(DecodeError::TrailingBytes(1)));
    }

    #[test]
    fn bad_version_rejected() {
        let mut bytes = encode_unsigned(&every_kind().remove(0));
        bytes[0] = 99;
        assert_eq!(
            decode_unsigned(&bytes),
            Err(DecodeError::UnsupportedVersion(99))
        );
    }

    #[test]
    fn bad_kind_rejected() {
        let mut bytes = encode_unsigned(&every_kind().remove(0));
        bytes[1] = 42;
        assert_eq!(
            decode_unsigned(&bytes),
            Err(DecodeError::InvalidTag {
                field: "kind",
                tag: 42
            })
        );
    }

    #[test]
    fn absurd_list_count_does_not_allocate() {
        // An app call whose args count claims u32::MAX entries.
        let mut tx = every_kind().remove(3);
        tx.body = TransactionBody::ApplicationCall {
            app_id: 1,
            on_complete: OnComplete::NoOp,
            args: vec![],
            accounts: vec![],
            foreign_apps: vec![],
        };
        let mut bytes = encode_unsigned(&tx);
        // Layout tail: app_id(8) on_complete(1) args_count(4) accounts(4) apps(4).
        let args_count_at = bytes.len() - 12;
        bytes[args_count_at..args_count_at + 4].copy_from_slice(&u32::MAX.to_be_bytes());
        assert!(matches!(
            decode_unsigned(&bytes),
            Err(DecodeError::UnexpectedEof { .. })
        ));
    }

    #[test]
    fn signed_group_stream_roundtrip() {
        let kp = Keypair::from_seed(&[1u8; 32]);
        let members: Vec<SignedTransaction> = every_kind()
            .into_iter()
            .map(|tx| {
                let sig = kp.sign(&tx.signing_bytes());
                SignedTransaction::from_parts(tx, AuthorizationProof::Signature(sig))
            })
            .collect();

        let decoded = decode_group(&encode_group(&members)).unwrap();
        assert_eq!(decoded, members);
    }

    #[test]
    fn logic_sig_and_multisig_proofs_roundtrip() {
        let tx = every_kind().remove(0);
        let lsig = SignedTransaction::from_parts(
            tx.clone(),
            AuthorizationProof::LogicSig(LogicSig {
                program: vec![0x06, 0x81, 0x01],
                args: vec![b"arg".to_vec()],
                signature: None,
            }),
        );
        assert_eq!(decode_signed(&encode_signed(&lsig)).unwrap(), lsig);

        let a = Keypair::from_seed(&[5u8; 32]);
        let b = Keypair::from_seed(&[6u8; 32]);
        let msig = SignedTransaction::from_parts(
            tx,
            AuthorizationProof::Multisig(MultisigSignature {
                version: 1,
                threshold: 1,
                subsigs: vec![
                    MultisigSubsig {
                        key: a.public_key(),
                        signature: Some(a.sign(b"x")),
                    },
                    MultisigSubsig {
                        key: b.public_key(),
                        signature: None,
                    },
                ],
            }),
        );
        assert_eq!(decode_signed(&encode_signed(&msig)).unwrap(), msig);
    }

    #[test]
    fn unknown_proof_tag_rejected() {
        let tx = every_kind().remove(0);
        let mut bytes = Vec::new();
        let inner = encode_unsigned(&tx);
        bytes.extend_from_slice(&(inner.len() as u32).to_be_bytes());
        bytes.extend_from_slice(&inner);
        bytes.push(77);
        assert_eq!(
            decode_signed(&bytes),
            Err(DecodeError::InvalidTag {
                field: "proof",
                tag: 77
            })
        );
    }
}
