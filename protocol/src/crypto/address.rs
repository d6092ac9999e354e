//! # Account Addresses
//!
//! An address is 32 bytes. How those bytes come about depends on who
//! controls the account:
//!
//! ```text
//! simple key : address = ed25519_public_key
//! logic sig  : address = SHA-512/256("Program" || program)
//! multisig   : address = SHA-512/256("MultisigAddr" || version || threshold || pk_1 || ... || pk_n)
//! ```
//!
//! The human-facing form is Bech32 with the `algo` prefix, so a mistyped
//! character is caught by the checksum before a payment goes anywhere.
//!
//! Nodes report addresses in their own form: base32 of the 32 bytes
//! followed by the last 4 bytes of `SHA-512/256(bytes)`, 58 characters.
//! [`Address::parse_any`] accepts either.

use bech32::{Bech32, Hrp};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use super::base32;
use super::hash::{domain_hash, domain_hash_parts, sha512_256};
use super::keys::PublicKey;
use crate::config::{ADDRESS_HRP, MULTISIG_DOMAIN, PROGRAM_DOMAIN};

const HRP: Hrp = Hrp::parse_unchecked(ADDRESS_HRP);

/// Errors from parsing a Bech32 address string.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddressError {
    #[error("bech32 decode error: {0}")]
    Bech32Decode(String),

    #[error("invalid address prefix: expected '{expected}', got '{got}'")]
    InvalidHrp { expected: String, got: String },

    #[error("invalid address length: expected 32 bytes, got {0}")]
    InvalidLength(usize),

    #[error("invalid base32 address")]
    InvalidBase32,

    #[error("address checksum mismatch")]
    ChecksumMismatch,
}

/// A 32-byte account address.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Address([u8; 32]);

impl Address {
    /// The all-zero address. Used as "unset" for optional asset roles.
    pub const ZERO: Address = Address([0u8; 32]);

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    /// Address of a simple-key account.
    pub fn from_public_key(pk: &PublicKey) -> Self {
        Self(*pk.as_bytes())
    }

    /// The public key a simple-key account at this address would have.
    pub fn to_public_key(&self) -> PublicKey {
        PublicKey::from_bytes(self.0)
    }

    /// Address of the account controlled by a logic-sig program.
    pub fn for_program(program: &[u8]) -> Self {
        Self(domain_hash(PROGRAM_DOMAIN, program))
    }

    /// Address of a multisig account.
    ///
    /// Order of `keys` matters: the same set of keys in a different order is
    /// a different account.
    pub fn for_multisig(version: u8, threshold: u8, keys: &[PublicKey]) -> Self {
        let header = [version, threshold];
        let parts = std::iter::once(header.as_slice())
            .chain(keys.iter().map(|k| k.as_bytes().as_slice()));
        Self(domain_hash_parts(MULTISIG_DOMAIN, parts))
    }

    /// Parse a Bech32 address string.
    pub fn parse(s: &str) -> Result<Self, AddressError> {
        let (hrp, data) =
            bech32::decode(s.trim()).map_err(|e| AddressError::Bech32Decode(e.to_string()))?;
        if hrp != HRP {
            return Err(AddressError::InvalidHrp {
                expected: ADDRESS_HRP.to_string(),
                got: hrp.to_string(),
            });
        }
        let bytes: [u8; 32] = data
            .as_slice()
            .try_into()
            .map_err(|_| AddressError::InvalidLength(data.len()))?;
        Ok(Self(bytes))
    }

    /// The node's checksummed base32 form.
    pub fn to_node_string(&self) -> String {
        let mut raw = self.0.to_vec();
        raw.extend_from_slice(&node_checksum(&self.0));
        base32::encode(&raw)
    }

    /// Parse the node's checksummed base32 form.
    pub fn parse_node(s: &str) -> Result<Self, AddressError> {
        let raw = base32::decode(s).ok_or(AddressError::InvalidBase32)?;
        if raw.len() != 36 {
            return Err(AddressError::InvalidLength(raw.len().saturating_sub(4)));
        }
        let (body, checksum) = raw.split_at(32);
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(body);
        if checksum != node_checksum(&bytes) {
            return Err(AddressError::ChecksumMismatch);
        }
        Ok(Self(bytes))
    }

    /// Bech32 or the node's base32 form, whichever `s` is.
    pub fn parse_any(s: &str) -> Result<Self, AddressError> {
        let s = s.trim();
        if s.to_ascii_lowercase().starts_with(&format!("{}1", ADDRESS_HRP)) {
            Self::parse(s)
        } else {
            Self::parse_node(s)
        }
    }
}

fn node_checksum(bytes: &[u8; 32]) -> [u8; 4] {
    let digest = sha512_256(bytes);
    let mut checksum = [0u8; 4];
    checksum.copy_from_slice(&digest[28..]);
    checksum
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        bech32::encode_to_fmt::<Bech32, _>(f, HRP, &self.0).map_err(|_| fmt::Error)
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self)
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::keys::Keypair;

    #[test]
    fn display_parse_roundtrip() {
        let addr = Keypair::generate().address();
        let encoded = addr.to_string();
        assert!(encoded.starts_with("algo1"));
        assert_eq!(Address::parse(&encoded).unwrap(), addr);
    }

    #[test]
    fn rejects_foreign_prefix() {
        let hrp = Hrp::parse("test").unwrap();
        let encoded = bech32::encode::<Bech32>(hrp, &[1u8; 32]).unwrap();
        assert!(matches!(
            Address::parse(&encoded),
            Err(AddressError::InvalidHrp { .. })
        ));
    }

    #[test]
    fn rejects_wrong_length() {
        let encoded = bech32::encode::<Bech32>(HRP, &[1u8; 20]).unwrap();
        assert_eq!(Address::parse(&encoded), Err(AddressError::InvalidLength(20)));
    }

    #[test]
    fn rejects_corrupted_checksum() {
        let mut encoded = Keypair::generate().address().to_string();
        let last = encoded.pop().unwrap();
        encoded.push(if last == 'q' { 'p' } else { 'q' });
        assert!(Address::parse(&encoded).is_err());
    }

    #[test]
    fn node_form_of_zero_address() {
        let encoded = "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAY5HFKQ";
        assert_eq!(Address::ZERO.to_node_string(), encoded);
        assert_eq!(Address::parse_node(encoded).unwrap(), Address::ZERO);
        assert_eq!(Address::parse_any(encoded).unwrap(), Address::ZERO);
    }

    #[test]
    fn parse_any_accepts_both_forms() {
        let addr = Keypair::generate().address();
        assert_eq!(Address::parse_any(&addr.to_string()).unwrap(), addr);
        assert_eq!(Address::parse_any(&addr.to_node_string()).unwrap(), addr);
    }

    #[test]
    fn node_form_checksum_is_checked() {
        let addr = Address::from_bytes([7u8; 32]);
        let mut other = addr.to_node_string();
        other.replace_range(0..1, if other.starts_with('A') { "B" } else { "A" });
        assert_eq!(Address::parse_node(&other), Err(AddressError::ChecksumMismatch));
        assert_eq!(Address::parse_node("NOT BASE32"), Err(AddressError::InvalidBase32));
    }

    #[test]
    fn program_address_differs_from_raw_hash() {
        let program = b"\x06\x81\x01";
        assert_ne!(
            Address::for_program(program).as_bytes(),
            &crate::crypto::hash::sha512_256(program)
        );
    }

    #[test]
    fn multisig_address_depends_on_key_order() {
        let a = Keypair::generate().public_key();
        let b = Keypair::generate().public_key();
        assert_ne!(
            Address::for_multisig(1, 2, &[a, b]),
            Address::for_multisig(1, 2, &[b, a])
        );
        assert_ne!(
            Address::for_multisig(1, 1, &[a, b]),
            Address::for_multisig(1, 2, &[a, b])
        );
    }

    #[test]
    fn public_key_roundtrip() {
        let kp = Keypair::generate();
        assert_eq!(kp.address().to_public_key(), kp.public_key());
    }
}
