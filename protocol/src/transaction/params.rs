//! Network parameter snapshots.
//!
//! A [`NetworkParameters`] value is everything the builder needs from the
//! network: the fee floor, the validity window, and the genesis identity.
//! It is fetched once per building session and passed by value through the
//! pipeline. There is no ambient "current parameters" state anywhere in the
//! crate, so tests can pin rounds and fees to whatever they like.

use serde::{Deserialize, Serialize};

use crate::config::{MIN_TX_FEE, VALIDITY_WINDOW};

/// Immutable snapshot of suggested transaction parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkParameters {
    /// Minimum fee per transaction, in micro-units.
    pub min_fee: u64,
    /// First round in which transactions built from this snapshot are valid.
    pub first_valid_round: u64,
    /// Last round in which transactions built from this snapshot are valid.
    pub last_valid_round: u64,
    /// Human-readable network name, e.g. `testnet-v1.0`.
    pub genesis_id: String,
    /// Hash of the genesis block. Pins transactions to one network.
    pub genesis_hash: [u8; 32],
}

impl NetworkParameters {
    /// Builds a snapshot valid from `round` for the standard window.
    ///
    /// A zero `min_fee` (some dev networks report one) is raised to the
    /// protocol floor.
    pub fn at_round(round: u64, min_fee: u64, genesis_id: &str, genesis_hash: [u8; 32]) -> Self {
        Self {
            min_fee: if min_fee == 0 { MIN_TX_FEE } else { min_fee },
            first_valid_round: round,
            last_valid_round: round.saturating_add(VALIDITY_WINDOW),
            genesis_id: genesis_id.to_string(),
            genesis_hash,
        }
    }

    /// Whether transactions built from this snapshot can still be admitted
    /// at `round`.
    pub fn is_valid_at(&self, round: u64) -> bool {
        round >= self.first_valid_round && round <= self.last_valid_round
    }

    /// Whether the snapshot is stale at `round`, meaning the caller must
    /// fetch fresh parameters and rebuild.
    pub fn is_expired_at(&self, round: u64) -> bool {
        round > self.last_valid_round
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn at_round_uses_standard_window() {
        let p = NetworkParameters::at_round(500, 1_000, "sandnet-v1", [9u8; 32]);
        assert_eq!(p.first_valid_round, 500);
        assert_eq!(p.last_valid_round, 1_500);
        assert_eq!(p.min_fee, 1_000);
    }

    #[test]
    fn zero_min_fee_is_raised_to_floor() {
        let p = NetworkParameters::at_round(1, 0, "sandnet-v1", [0u8; 32]);
        assert_eq!(p.min_fee, MIN_TX_FEE);
    }

    #[test]
    fn validity_window_bounds() {
        let p = NetworkParameters::at_round(10, 1_000, "sandnet-v1", [0u8; 32]);
        assert!(!p.is_valid_at(9));
        assert!(p.is_valid_at(10));
        assert!(p.is_valid_at(1_010));
        assert!(!p.is_valid_at(1_011));
        assert!(p.is_expired_at(1_011));
        assert!(!p.is_expired_at(9));
    }

    #[test]
    fn serde_roundtrip() {
        let p = NetworkParameters::at_round(42, 2_000, "testnet-v1.0", [3u8; 32]);
        let json = serde_json::to_string(&p).unwrap();
        let back: NetworkParameters = serde_json::from_str(&json).unwrap();
        assert_eq!(p, back);
    }
}
