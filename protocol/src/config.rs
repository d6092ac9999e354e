//! # Protocol Configuration & Constants
//!
//! Every ledger-facing magic number lives here. The values mirror the limits
//! the target network enforces at admission time; building something that
//! violates them only wastes a round-trip before the node says no.

use std::time::Duration;

// ---------------------------------------------------------------------------
// Fees
// ---------------------------------------------------------------------------

/// Minimum per-transaction fee, in micro-units of the native currency.
/// The node's suggested parameters usually report this same value; the
/// constant is the fallback when they report zero.
pub const MIN_TX_FEE: u64 = 1_000;

// ---------------------------------------------------------------------------
// Validity window
// ---------------------------------------------------------------------------

/// Number of rounds a freshly built transaction stays valid for.
/// `first_valid = current round`, `last_valid = current round + 1000`.
pub const VALIDITY_WINDOW: u64 = 1_000;

// ---------------------------------------------------------------------------
// Transaction limits
// ---------------------------------------------------------------------------

/// Maximum number of transactions in one atomic group.
pub const MAX_GROUP_SIZE: usize = 16;

/// Maximum note field length in bytes.
pub const MAX_NOTE_LENGTH: usize = 1_024;

/// Maximum number of application call arguments.
pub const MAX_APP_ARGS: usize = 16;

/// Maximum combined byte length of all application call arguments.
pub const MAX_APP_ARGS_TOTAL_LENGTH: usize = 2_048;

/// Maximum number of decimal places an asset may declare.
pub const MAX_ASSET_DECIMALS: u32 = 19;

/// Maximum asset unit name length in bytes, e.g. `TA`.
pub const MAX_UNIT_NAME_LENGTH: usize = 8;

/// Maximum asset name length in bytes.
pub const MAX_ASSET_NAME_LENGTH: usize = 32;

/// Maximum asset URL length in bytes.
pub const MAX_ASSET_URL_LENGTH: usize = 96;

/// Maximum number of keys in a multisig account.
pub const MAX_MULTISIG_KEYS: usize = 255;

// ---------------------------------------------------------------------------
// Confirmation
// ---------------------------------------------------------------------------

/// Default number of rounds to wait for a submitted group to confirm.
pub const DEFAULT_CONFIRMATION_ROUNDS: u64 = 30;

/// Nominal round duration of the target network. Only the sandbox ledger
/// and test fixtures use this; real polling waits on the node instead.
pub const ROUND_TIME: Duration = Duration::from_millis(3_300);

// ---------------------------------------------------------------------------
// Addresses
// ---------------------------------------------------------------------------

/// Bech32 human-readable prefix for account addresses.
pub const ADDRESS_HRP: &str = "algo";

// ---------------------------------------------------------------------------
// Hash domain separators
// ---------------------------------------------------------------------------

/// Prefix hashed in front of a transaction encoding to derive its id.
pub const TX_ID_DOMAIN: &[u8] = b"TX";

/// Prefix hashed in front of the member id list to derive a group id.
pub const GROUP_ID_DOMAIN: &[u8] = b"TG";

/// Prefix hashed in front of program bytes to derive a logic-sig address.
pub const PROGRAM_DOMAIN: &[u8] = b"Program";

/// Prefix hashed in front of multisig parameters to derive its address.
pub const MULTISIG_DOMAIN: &[u8] = b"MultisigAddr";

// ---------------------------------------------------------------------------
// Node API
// ---------------------------------------------------------------------------

/// Header carrying the node API token.
pub const API_TOKEN_HEADER: &str = "X-Algo-API-Token";

/// Default per-request timeout for the HTTP ledger client.
pub const HTTP_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_domains_are_distinct() {
        let domains = [TX_ID_DOMAIN, GROUP_ID_DOMAIN, PROGRAM_DOMAIN, MULTISIG_DOMAIN];
        for (i, a) in domains.iter().enumerate() {
            for b in &domains[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn limits_sanity() {
        assert!(MAX_GROUP_SIZE > 1);
        assert!(MAX_APP_ARGS_TOTAL_LENGTH > MAX_APP_ARGS);
        assert!(VALIDITY_WINDOW > DEFAULT_CONFIRMATION_ROUNDS);
        assert!(MIN_TX_FEE > 0);
    }
}
