//! # Chain Error Types
//!
//! Submission failures roll back. Read and indexer failures are transient and
//! are swallowed at the fetch boundary.

use kindred_state::{MutationClass, StatusParseError};
use thiserror::Error;

/// Why a submitted call batch did not produce a transaction.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChainError {
    /// Transport failure.
    #[error("network error: {0}")]
    Network(String),

    /// The wallet refused or failed to sign.
    #[error("signature failed: {0}")]
    Signature(String),

    /// The contract reverted.
    #[error("reverted: {0}")]
    Reverted(String),

    /// The network layer gave up waiting.
    #[error("timed out")]
    Timeout,

    /// Any other rejection.
    #[error("rejected: {0}")]
    Rejected(String),
}

/// Authoritative read failure. Transient by definition.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReadError {
    /// Transport failure.
    #[error("read transport: {0}")]
    Transport(String),

    /// The call reverted with something other than the no-entity signal.
    #[error("read reverted: {0}")]
    Reverted(String),

    /// Return data was not ABI for `getStatus`.
    #[error("read decode: {0}")]
    Decode(String),

    /// Decoded, but not a valid status vector.
    #[error("malformed status: {0}")]
    Malformed(#[from] StatusParseError),
}

/// Indexer query failure. Transient by definition.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IndexerError {
    /// The indexer could not be reached.
    #[error("indexer unavailable: {0}")]
    Unavailable(String),

    /// The query failed.
    #[error("indexer query failed: {0}")]
    Query(String),
}

/// Low-level `eth_call` failure, before interpretation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CallFailure {
    /// The call reverted with this data.
    #[error("call reverted")]
    Revert(Vec<u8>),

    /// Transport failure.
    #[error("call transport: {0}")]
    Transport(String),
}

/// A rolled-back mutation, with the caller's user-facing message.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct MutationError {
    /// User-facing message supplied by the caller.
    pub message: String,
    /// Underlying cause.
    #[source]
    pub cause: ChainError,
}

impl MutationError {
    /// Wraps a chain error with a user-facing message.
    #[must_use]
    pub fn new(message: impl Into<String>, cause: ChainError) -> Self {
        Self {
            message: message.into(),
            cause,
        }
    }
}

/// Errors returned by the game-action facade.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ActionError {
    /// A mutation of this class is already in flight.
    #[error("{} already in progress", .0.label())]
    Busy(MutationClass),

    /// No wallet is connected.
    #[error("no wallet connected")]
    NoWallet,

    /// No entity to act on.
    #[error("no entity")]
    NoEntity,

    /// Submission failed and was rolled back.
    #[error(transparent)]
    Failed(#[from] MutationError),
}
