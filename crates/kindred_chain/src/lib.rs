//! # KINDRED Chain Bridge
//!
//! Keeps the client-visible creature consistent with a slow chain that is
//! read from two sources: the contract (authoritative, immediate) and the
//! indexer (rich, seconds behind).
//!
//! ## Architecture
//!
//! ```text
//!   UI action
//!      │
//!      ▼
//! ┌──────────────────────┐  submit   ┌──────────────────────┐
//! │ OptimisticCoordinator│ ────────▶ │ TransactionExecutor  │
//! │ capture ▸ apply      │ ◀──────── │ (external)           │
//! │ commit  ▸ rollback   │  tx / err └──────────────────────┘
//! └─────────┬────────────┘
//!           │ writes
//!           ▼
//! ┌──────────────────────┐  validate ┌──────────────────────┐
//! │   LocalStateStore    │ ◀──────── │   EntityReconciler   │
//! └──────────────────────┘           └──────────▲───────────┘
//!           ▲                                   │
//!           │ ordinary mutations                │ creating mutations
//! ┌─────────┴────────────┐           ┌──────────┴───────────┐
//! │    StatusPoller      │           │  SpawnSyncSequencer  │
//! │ (timer, advisory)    │           │ await▸confirm▸index  │
//! └──────────────────────┘           └──────────────────────┘
//! ```
//!
//! The poller and the sequencer never pause each other; a poll landing in the
//! middle of a sequence is merged or discarded by the same validity check.

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod actions;
pub mod backend;
pub mod contracts;
pub mod coordinator;
pub mod error;
pub mod poller;
pub mod sequencer;

pub use actions::{Backends, GameActions};
pub use backend::{AuthoritativeReader, Clock, Indexer, StatusRead, TokioClock, TransactionExecutor, TxId};
pub use contracts::{AbiStatusReader, Call, ContractCaller, IKindredGame};
pub use coordinator::{ExecuteOutcome, MutationHooks, OptimisticCoordinator, PendingMutation};
pub use error::{ActionError, CallFailure, ChainError, IndexerError, MutationError, ReadError};
pub use poller::{PollOutcome, SkipReason, StatusPoller};
pub use sequencer::{Observation, Settlement, SpawnSyncSequencer, Step, SyncPhase, SyncReport, SyncType};
