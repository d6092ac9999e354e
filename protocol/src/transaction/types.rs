//! Core type definitions for ledger transactions.
//!
//! These are the building blocks of [`super::UnsignedTransaction`]: the kind
//! discriminant, the per-kind body, and the small value types the bodies
//! carry (application schemas, asset parameters, completion actions).

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::crypto::Address;

// ---------------------------------------------------------------------------
// TransactionType
// ---------------------------------------------------------------------------

/// Discriminant for the operation a transaction represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionType {
    /// Native currency transfer.
    Payment,
    /// Asset transfer. A zero-amount transfer to oneself is an opt-in.
    AssetTransfer,
    /// Creation of a new asset.
    AssetCreate,
    /// Call into an existing application.
    ApplicationCall,
    /// Deployment of a new application.
    ApplicationCreate,
}

impl TransactionType {
    /// Wire tag used by the canonical encoding.
    pub fn tag(self) -> u8 {
        match self {
            Self::Payment => 1,
            Self::AssetTransfer => 2,
            Self::AssetCreate => 3,
            Self::ApplicationCall => 4,
            Self::ApplicationCreate => 5,
        }
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(Self::Payment),
            2 => Some(Self::AssetTransfer),
            3 => Some(Self::AssetCreate),
            4 => Some(Self::ApplicationCall),
            5 => Some(Self::ApplicationCreate),
            _ => None,
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Payment => write!(f, "pay"),
            Self::AssetTransfer => write!(f, "axfer"),
            Self::AssetCreate => write!(f, "acfg"),
            Self::ApplicationCall => write!(f, "appl"),
            Self::ApplicationCreate => write!(f, "appl-create"),
        }
    }
}

// ---------------------------------------------------------------------------
// OnComplete
// ---------------------------------------------------------------------------

/// What happens to the caller's relationship with an application after the
/// approval program runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OnComplete {
    /// Just run the program.
    #[default]
    NoOp,
    OptIn,
    CloseOut,
    ClearState,
    UpdateApplication,
    DeleteApplication,
}

impl OnComplete {
    pub fn tag(self) -> u8 {
        match self {
            Self::NoOp => 0,
            Self::OptIn => 1,
            Self::CloseOut => 2,
            Self::ClearState => 3,
            Self::UpdateApplication => 4,
            Self::DeleteApplication => 5,
        }
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Self::NoOp),
            1 => Some(Self::OptIn),
            2 => Some(Self::CloseOut),
            3 => Some(Self::ClearState),
            4 => Some(Self::UpdateApplication),
            5 => Some(Self::DeleteApplication),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// StateSchema
// ---------------------------------------------------------------------------

/// Storage an application reserves, either globally or per opted-in account.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StateSchema {
    pub num_uints: u64,
    pub num_byte_slices: u64,
}

impl StateSchema {
    pub fn new(num_uints: u64, num_byte_slices: u64) -> Self {
        Self {
            num_uints,
            num_byte_slices,
        }
    }
}

// ---------------------------------------------------------------------------
// AssetParams
// ---------------------------------------------------------------------------

/// Parameters of a newly created asset.
///
/// Role addresses left as `None` are permanently disabled once the asset
/// exists. There is no way to add a clawback address later.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssetParams {
    /// Total number of base units.
    pub total: u64,
    /// Display decimals. `total = 1_000` with `decimals = 2` reads as 10.00.
    pub decimals: u32,
    pub default_frozen: bool,
    pub unit_name: String,
    pub asset_name: String,
    pub url: String,
    pub metadata_hash: Option<[u8; 32]>,
    pub manager: Option<Address>,
    pub reserve: Option<Address>,
    pub freeze: Option<Address>,
    pub clawback: Option<Address>,
}

// ---------------------------------------------------------------------------
// TransactionBody
// ---------------------------------------------------------------------------

/// Kind-specific fields of a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionBody {
    Payment {
        receiver: Address,
        amount: u64,
        /// Close the sender's account and send the remainder here.
        close_remainder_to: Option<Address>,
    },
    AssetTransfer {
        asset_id: u64,
        receiver: Address,
        amount: u64,
    },
    AssetCreate {
        params: AssetParams,
    },
    ApplicationCall {
        app_id: u64,
        on_complete: OnComplete,
        args: Vec<Vec<u8>>,
        accounts: Vec<Address>,
        foreign_apps: Vec<u64>,
    },
    ApplicationCreate {
        approval_program: Vec<u8>,
        clear_program: Vec<u8>,
        global_schema: StateSchema,
        local_schema: StateSchema,
        on_complete: OnComplete,
        args: Vec<Vec<u8>>,
    },
}

impl TransactionBody {
    pub fn tx_type(&self) -> TransactionType {
        match self {
            Self::Payment { .. } => TransactionType::Payment,
            Self::AssetTransfer { .. } => TransactionType::AssetTransfer,
            Self::AssetCreate { .. } => TransactionType::AssetCreate,
            Self::ApplicationCall { .. } => TransactionType::ApplicationCall,
            Self::ApplicationCreate { .. } => TransactionType::ApplicationCreate,
        }
    }

    /// Application arguments, for the kinds that carry them.
    pub fn app_args(&self) -> Option<&[Vec<u8>]> {
        match self {
            Self::ApplicationCall { args, .. } | Self::ApplicationCreate { args, .. } => {
                Some(args)
            }
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transaction_type_tags_roundtrip() {
        for t in [
            TransactionType::Payment,
            TransactionType::AssetTransfer,
            TransactionType::AssetCreate,
            TransactionType::ApplicationCall,
            TransactionType::ApplicationCreate,
        ] {
            assert_eq!(TransactionType::from_tag(t.tag()), Some(t));
        }
        assert_eq!(TransactionType::from_tag(0), None);
        assert_eq!(TransactionType::from_tag(99), None);
    }

    #[test]
    fn on_complete_tags_roundtrip() {
        for oc in [
            OnComplete::NoOp,
            OnComplete::OptIn,
            OnComplete::CloseOut,
            OnComplete::ClearState,
            OnComplete::UpdateApplication,
            OnComplete::DeleteApplication,
        ] {
            assert_eq!(OnComplete::from_tag(oc.tag()), Some(oc));
        }
        assert_eq!(OnComplete::from_tag(6), None);
    }

    #[test]
    fn transaction_type_display() {
        assert_eq!(TransactionType::Payment.to_string(), "pay");
        assert_eq!(TransactionType::ApplicationCall.to_string(), "appl");
    }

    #[test]
    fn app_args_only_on_application_kinds() {
        let pay = TransactionBody::Payment {
            receiver: Address::ZERO,
            amount: 1,
            close_remainder_to: None,
        };
        assert!(pay.app_args().is_none());

        let call = TransactionBody::ApplicationCall {
            app_id: 1,
            on_complete: OnComplete::NoOp,
            args: vec![b"Add".to_vec()],
            accounts: vec![],
            foreign_apps: vec![],
        };
        assert_eq!(call.app_args().unwrap(), &[b"Add".to_vec()]);
    }
}
