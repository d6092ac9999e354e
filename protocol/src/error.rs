//! Crate-level error type.
//!
//! Each stage of the pipeline has its own error enum; [`Error`] wraps them
//! so callers that drive the whole pipeline can use a single `?`.

use thiserror::Error;

use crate::network::rpc::ClientError;
use crate::network::submit::SubmitError;
use crate::transaction::{
    AuthorizationError, BuildError, DecodeError, FeePolicyError, GroupError,
};

/// Any failure from building through submission.
///
/// A confirmation timeout is *not* an error; it is reported as
/// [`crate::network::ConfirmationResult::TimedOut`].
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    FeePolicy(#[from] FeePolicyError),

    #[error(transparent)]
    Group(#[from] GroupError),

    #[error(transparent)]
    Authorization(#[from] AuthorizationError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Submit(#[from] SubmitError),

    #[error("ledger client error: {0}")]
    Client(#[from] ClientError),
}

impl Error {
    /// Whether repeating the same operation might succeed.
    ///
    /// Only transport-level failures qualify. Everything else describes a
    /// problem with the input, and resubmitting identical bytes will fail
    /// the same way.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Submit(e) => e.is_retryable(),
            Error::Client(e) => e.is_retryable(),
            _ => false,
        }
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, Error>;
