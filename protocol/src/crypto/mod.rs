//! # Cryptographic Primitives
//!
//! Thin, typed wrappers around audited implementations:
//!
//! - **Ed25519** (`ed25519-dalek`) for transaction authorization.
//! - **SHA-512/256** (`sha2`) for transaction ids, group ids, and derived
//!   addresses.
//! - **Bech32** (`bech32`) for the human-facing address form, and plain
//!   base32 for the form nodes report.
//!
//! Nothing here is clever, and nothing here should become clever.

pub mod address;
pub mod base32;
pub mod hash;
pub mod keys;

pub use address::{Address, AddressError};
pub use hash::{domain_hash, domain_hash_parts, sha512_256};
pub use keys::{KeyError, Keypair, PublicKey, Signature};
