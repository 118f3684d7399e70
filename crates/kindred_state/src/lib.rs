//! # KINDRED State
//!
//! Client-side state for a creature whose truth lives on-chain in two places
//! that disagree for seconds at a time.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐  getStatus   ┌─────────────────┐
//! │  Contract read  │ ───────────▶ │  StatusVector   │──┐
//! │  (authoritative)│              │  (parsed once)  │  │
//! └─────────────────┘              └─────────────────┘  │   ┌──────────────────┐
//!                                                       ├─▶ │ EntityReconciler │
//! ┌─────────────────┐   query      ┌─────────────────┐  │   └────────┬─────────┘
//! │  Indexer        │ ───────────▶ │ EntitySnapshot  │──┘            │
//! │  (lags seconds) │              │ (rich, stale)   │               ▼
//! └─────────────────┘              └─────────────────┘      ┌──────────────────┐
//!                                                           │ LocalStateStore  │ ──▶ UI
//!                                                           └──────────────────┘
//! ```
//!
//! ## Identity Precedence
//!
//! Every component that needs "the current entity" asks
//! [`LocalStateStore::current_entity_id`]:
//! authoritative vector id, then indexer snapshot id, then last-known id.

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod config;
pub mod deltas;
pub mod entity;
pub mod error;
pub mod mutation;
pub mod persist;
pub mod reconcile;
pub mod status;
pub mod store;

pub use config::{ContractConfig, EngineConfig, PollerConfig, SequencerConfig};
pub use deltas::DeltaTable;
pub use entity::{Descriptor, EntitySnapshot, PlayerRecord, StatusSummary};
pub use error::{ConfigError, PersistError, StatusParseError, StoreError};
pub use mutation::{InFlightFlags, MutationClass};
pub use persist::{FileKv, KeyValueStore, MemoryKv};
pub use reconcile::{EntityReconciler, IdentityComparison, RefusalReason, SyncOutcome, Verdict};
pub use status::{Stat, Stats, StatusField, StatusVector, STATUS_WORDS, STAT_MAX};
pub use store::{FieldPreImage, InFlightGuard, LocalStateStore, MergeOutcome, StoreEvent};
