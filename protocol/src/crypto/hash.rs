//! # Hashing Utilities
//!
//! Everything that needs a digest in this crate uses SHA-512/256: transaction
//! ids, group ids, and the logic-sig and multisig address derivations. The
//! ledger we talk to uses the same function, so there is no room for choice.
//!
//! Hashes are always domain-separated. A transaction id and a group id over
//! the same bytes must never collide, so each use site prepends its own
//! short tag (see the `*_DOMAIN` constants in [`crate::config`]).

use sha2::{Digest, Sha512_256};

/// Compute SHA-512/256 of the input.
///
/// # Example
///
/// ```
/// use txgroup_protocol::crypto::sha512_256;
///
/// let digest = sha512_256(b"counter");
/// assert_eq!(digest.len(), 32);
/// ```
pub fn sha512_256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha512_256::new();
    hasher.update(data);
    finish(hasher)
}

/// Compute SHA-512/256 over `domain || data`.
pub fn domain_hash(domain: &[u8], data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha512_256::new();
    hasher.update(domain);
    hasher.update(data);
    finish(hasher)
}

/// Compute SHA-512/256 over `domain || part_0 || part_1 || ...`.
///
/// Used for group ids, where the input is the ordered list of member ids
/// and concatenating into a temporary buffer first would be pointless.
pub fn domain_hash_parts<'a, I>(domain: &[u8], parts: I) -> [u8; 32]
where
    I: IntoIterator<Item = &'a [u8]>,
{
    let mut hasher = Sha512_256::new();
    hasher.update(domain);
    for part in parts {
        hasher.update(part);
    }
    finish(hasher)
}

fn finish(hasher: Sha512_256) -> [u8; 32] {
    let result = hasher.finalize();
    let mut output = [0u8; 32];
    output.copy_from_slice(&result);
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha512_256_known_vector() {
        // FIPS 180-4 test vector for "abc".
        let digest = sha512_256(b"abc");
        assert_eq!(
            hex::encode(digest),
            "53048e2681941ef99b2e29b76b4c7dabe4c2d0c634fc6d46e0e2f13107e7af23"
        );
    }

    #[test]
    fn domain_changes_digest() {
        assert_ne!(domain_hash(b"TX", b"payload"), domain_hash(b"TG", b"payload"));
    }

    #[test]
    fn domain_hash_equals_prefixed_plain_hash() {
        let mut joined = b"TX".to_vec();
        joined.extend_from_slice(b"payload");
        assert_eq!(domain_hash(b"TX", b"payload"), sha512_256(&joined));
    }

    #[test]
    fn parts_hash_matches_concatenation() {
        let a = [1u8; 32];
        let b = [2u8; 32];
        let mut joined = a.to_vec();
        joined.extend_from_slice(&b);
        assert_eq!(
            domain_hash_parts(b"TG", [a.as_slice(), b.as_slice()]),
            domain_hash(b"TG", &joined)
        );
    }

    #[test]
    fn parts_hash_is_order_sensitive() {
        let a = [1u8; 32];
        let b = [2u8; 32];
        assert_ne!(
            domain_hash_parts(b"TG", [a.as_slice(), b.as_slice()]),
            domain_hash_parts(b"TG", [b.as_slice(), a.as_slice()])
        );
    }
}
