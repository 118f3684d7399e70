//! # State Error Types
//!
//! All errors that can occur while parsing, storing, persisting or configuring
//! client state.

use alloy_primitives::U256;
use thiserror::Error;

use crate::status::Stat;

/// A raw status read that does not survive the parsing boundary.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StatusParseError {
    /// The read did not contain exactly ten words.
    #[error("status vector must have 10 words, got {0}")]
    Length(usize),

    /// A flag word was neither 0 nor 1.
    #[error("flag at position {index} is not boolean: {value}")]
    Flag {
        /// Word position in the vector.
        index: usize,
        /// Offending value.
        value: U256,
    },

    /// A stat word was above the stat ceiling.
    #[error("{stat:?} out of range: {value}")]
    StatOutOfRange {
        /// Which stat.
        stat: Stat,
        /// Offending value.
        value: U256,
    },

    /// The owner word does not fit in 160 bits.
    #[error("owner word is not an address: {0}")]
    Owner(U256),

    /// The timestamp word does not fit in 64 bits.
    #[error("timestamp overflow: {0}")]
    Timestamp(U256),
}

/// Store writes refused by an invariant.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A pair write where the snapshot does not describe the vector's entity.
    #[error("mismatched pair: authoritative {authoritative}, indexer {indexed}")]
    MismatchedPair {
        /// Id from the authoritative vector.
        authoritative: U256,
        /// Id from the indexer snapshot.
        indexed: U256,
    },

    /// The write belongs to an owner other than the connected wallet.
    #[error("write for a foreign owner")]
    ForeignOwner,

    /// No wallet is connected, so no owner can be checked.
    #[error("no wallet connected")]
    NoSession,
}

/// Errors from the persistence layer.
#[derive(Error, Debug)]
pub enum PersistError {
    /// Underlying storage failed.
    #[error("storage io: {0}")]
    Io(#[from] std::io::Error),

    /// Blob could not be encoded or decoded.
    #[error("blob encoding: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// Invalid or unreadable configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file could not be read.
    #[error("config io: {0}")]
    Io(#[from] std::io::Error),

    /// Config file is not valid TOML for this schema.
    #[error("config parse: {0}")]
    Parse(#[from] toml::de::Error),

    /// Parsed but semantically invalid.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}
