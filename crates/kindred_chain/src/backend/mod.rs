//! # Backend Interfaces
//!
//! Everything the engine consumes but does not own: the transaction
//! executor, the authoritative read, the indexer and the clock.
//!
//! ## Seams
//!
//! ```text
//! engine defines:             host implements:
//! ┌─────────────────────┐     ┌─────────────────────┐
//! │ TransactionExecutor │ ◀── │ wallet + RPC        │
//! │ AuthoritativeReader │ ◀── │ AbiStatusReader     │
//! │ Indexer             │ ◀── │ GraphQL / Torii ... │
//! │ Clock               │ ◀── │ TokioClock          │
//! └─────────────────────┘     └─────────────────────┘
//! ```

pub mod mock;

use std::fmt;
use std::time::Duration;

use alloy_primitives::Address;
use async_trait::async_trait;
use kindred_state::{EntitySnapshot, StatusVector};

use crate::contracts::Call;
use crate::error::{ChainError, IndexerError, ReadError};

/// Identifier of a submitted transaction.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TxId(pub String);

impl TxId {
    /// Wraps an identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A successful authoritative read.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatusRead {
    /// Well-formed status vector.
    Vector(StatusVector),
    /// The owner has no live entity. Not an error.
    NoEntity,
}

/// Submits signed call batches.
#[async_trait]
pub trait TransactionExecutor: Send + Sync {
    /// Resolves with a transaction id, or fails.
    async fn execute(&self, calls: Vec<Call>) -> Result<TxId, ChainError>;
}

/// Synchronous, consistent contract query.
#[async_trait]
pub trait AuthoritativeReader: Send + Sync {
    /// Status of the owner's entity.
    async fn get_status(&self, owner: Address) -> Result<StatusRead, ReadError>;
}

/// Eventually consistent, richer mirror of chain state.
#[async_trait]
pub trait Indexer: Send + Sync {
    /// Zero or one entity record for the owner.
    async fn fetch_entity(&self, owner: Address) -> Result<Option<EntitySnapshot>, IndexerError>;
}

/// Injected sleep, so retry schedules are testable without real timers.
#[async_trait]
pub trait Clock: Send + Sync {
    /// Suspends for the given duration.
    async fn sleep(&self, duration: Duration);
}

/// Real clock backed by the tokio timer.
#[derive(Clone, Copy, Debug, Default)]
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
