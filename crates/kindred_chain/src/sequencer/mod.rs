//! # Spawn Sync Sequencer
//!
//! Bounded-retry reconciliation after an entity-creating transaction, when
//! the authoritative id changes and the indexer has to catch up.
//!
//! ## Phases
//!
//! ```text
//!  Await ──sleep──▶ Confirm(1) ──no id──▶ ConfirmBackoff ──▶ Confirm(2) ... Confirm(N) ──▶ Failed
//!                       │
//!                       │ live id
//!                       ▼
//!                   Index(1) ──id ≠──▶ IndexBackoff ──▶ Index(2) ... Index(M) ──▶ Partial
//!                       │
//!                       │ id ==
//!                       ▼
//!                   Complete
//! ```
//!
//! [`SyncPhase::advance`] is a pure transition function; the driver in
//! [`SpawnSyncSequencer`] performs the side effect each [`Step`] asks for
//! and feeds the [`Observation`] back. Sleeping goes through the injected
//! [`Clock`], so the whole schedule runs without real timers in tests.

use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::{Address, U256};
use kindred_state::{EntitySnapshot, LocalStateStore, MergeOutcome, SequencerConfig, StatusVector};

use crate::backend::{AuthoritativeReader, Clock, Indexer, StatusRead, TxId};

/// Terminal classification of a sync run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncType {
    /// Authoritative and indexer ids matched.
    Complete,
    /// Authoritative id obtained; the indexer never caught up.
    Partial,
    /// No authoritative id.
    Failed,
}

/// What the state machine settled on, with the data to commit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Settlement {
    /// Id-matched pair.
    Complete {
        /// Confirmed authoritative vector.
        status: StatusVector,
        /// Indexer snapshot with the same id.
        snapshot: EntitySnapshot,
    },
    /// Authoritative vector only.
    Partial {
        /// Confirmed authoritative vector.
        status: StatusVector,
    },
    /// Confirmation retries exhausted.
    Failed,
}

impl Settlement {
    /// Classification of this settlement.
    #[must_use]
    pub const fn sync_type(&self) -> SyncType {
        match self {
            Self::Complete { .. } => SyncType::Complete,
            Self::Partial { .. } => SyncType::Partial,
            Self::Failed => SyncType::Failed,
        }
    }
}

/// Side effect the current phase needs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Step {
    /// Sleep on the clock.
    Sleep(Duration),
    /// Read the authoritative status.
    ReadAuthoritative,
    /// Fetch the indexer snapshot.
    FetchIndexer,
}

/// Result of performing a [`Step`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Observation {
    /// The sleep finished.
    Slept,
    /// Authoritative read; `None` for no entity or a failed read.
    Authoritative(Option<StatusVector>),
    /// Indexer fetch; `None` for no record or a failed fetch.
    Indexed(Option<EntitySnapshot>),
}

/// State of one sync run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SyncPhase {
    /// Waiting for the transaction to land.
    Await,
    /// Reading the authoritative status.
    Confirm {
        /// 1-based attempt.
        attempt: u32,
    },
    /// Between confirmation attempts.
    ConfirmBackoff {
        /// Attempt that just failed.
        attempt: u32,
    },
    /// Fetching the indexer snapshot.
    Index {
        /// 1-based attempt.
        attempt: u32,
        /// Vector from the confirm phase.
        confirmed: StatusVector,
    },
    /// Between index attempts.
    IndexBackoff {
        /// Attempt that just failed.
        attempt: u32,
        /// Vector from the confirm phase.
        confirmed: StatusVector,
    },
    /// Terminal.
    Done(Settlement),
}

impl SyncPhase {
    /// Initial phase.
    #[must_use]
    pub const fn start() -> Self {
        Self::Await
    }

    /// Side effect needed to leave this phase; `None` once done.
    #[must_use]
    pub fn step(&self, config: &SequencerConfig) -> Option<Step> {
        match self {
            Self::Await => Some(Step::Sleep(config.await_delay())),
            Self::Confirm { .. } => Some(Step::ReadAuthoritative),
            Self::ConfirmBackoff { .. } => Some(Step::Sleep(config.confirm_backoff())),
            Self::Index { .. } => Some(Step::FetchIndexer),
            Self::IndexBackoff { .. } => Some(Step::Sleep(config.index_backoff())),
            Self::Done(_) => None,
        }
    }

    /// Pure transition.
    ///
    /// An observation that does not answer this phase's step leaves the phase
    /// unchanged.
    #[must_use]
    pub fn advance(self, observation: Observation, config: &SequencerConfig) -> Self {
        match (self, observation) {
            (Self::Await, Observation::Slept) => Self::Confirm { attempt: 1 },

            (Self::Confirm { .. }, Observation::Authoritative(Some(vector))) if vector.has_live_entity() => {
                Self::Index {
                    attempt: 1,
                    confirmed: vector,
                }
            }
            (Self::Confirm { attempt }, Observation::Authoritative(_)) => {
                if attempt >= config.confirm_retries {
                    Self::Done(Settlement::Failed)
                } else {
                    Self::ConfirmBackoff { attempt }
                }
            }
            (Self::ConfirmBackoff { attempt }, Observation::Slept) => Self::Confirm { attempt: attempt + 1 },

            (Self::Index { confirmed, .. }, Observation::Indexed(Some(snapshot)))
                if snapshot.entity_id == confirmed.entity_id =>
            {
                Self::Done(Settlement::Complete {
                    status: confirmed,
                    snapshot,
                })
            }
            (Self::Index { attempt, confirmed }, Observation::Indexed(_)) => {
                if attempt >= config.index_retries {
                    Self::Done(Settlement::Partial { status: confirmed })
                } else {
                    Self::IndexBackoff { attempt, confirmed }
                }
            }
            (Self::IndexBackoff { attempt, confirmed }, Observation::Slept) => Self::Index {
                attempt: attempt + 1,
                confirmed,
            },

            (phase, _) => phase,
        }
    }

    /// Short name for logging.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Await => "await",
            Self::Confirm { .. } => "confirm",
            Self::ConfirmBackoff { .. } => "confirm-backoff",
            Self::Index { .. } => "index",
            Self::IndexBackoff { .. } => "index-backoff",
            Self::Done(_) => "done",
        }
    }

    /// The settlement, once done.
    #[must_use]
    pub fn into_settlement(self) -> Option<Settlement> {
        match self {
            Self::Done(settlement) => Some(settlement),
            _ => None,
        }
    }
}

/// Outcome of [`SpawnSyncSequencer::sync_after_create`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SyncReport {
    /// Whether the store now holds the new entity.
    pub success: bool,
    /// Terminal classification.
    pub sync_type: SyncType,
    /// Authoritative id of the new entity.
    pub final_entity_id: Option<U256>,
}

impl SyncReport {
    const fn failed() -> Self {
        Self {
            success: false,
            sync_type: SyncType::Failed,
            final_entity_id: None,
        }
    }
}

/// Drives [`SyncPhase`] against the real backends.
#[derive(Clone)]
pub struct SpawnSyncSequencer {
    store: Arc<LocalStateStore>,
    reader: Arc<dyn AuthoritativeReader>,
    indexer: Arc<dyn Indexer>,
    clock: Arc<dyn Clock>,
    config: SequencerConfig,
}

impl SpawnSyncSequencer {
    /// Creates a sequencer.
    #[must_use]
    pub fn new(
        store: Arc<LocalStateStore>,
        reader: Arc<dyn AuthoritativeReader>,
        indexer: Arc<dyn Indexer>,
        clock: Arc<dyn Clock>,
        config: SequencerConfig,
    ) -> Self {
        Self {
            store,
            reader,
            indexer,
            clock,
            config,
        }
    }

    /// Runs the full schedule and commits the settlement.
    ///
    /// `Complete` writes the id-matched pair. `Partial` merges the
    /// authoritative vector alone, leaving a thin snapshot. `Failed` leaves
    /// the store untouched. Nothing is written once the wallet that started
    /// the run is gone, and reads still naming the entity a staged creation
    /// replaces do not count as confirmation.
    pub async fn sync_after_create(&self, tx_id: &TxId) -> SyncReport {
        let Some(owner) = self.store.wallet() else {
            tracing::warn!(%tx_id, "no wallet, skipping sync");
            return SyncReport::failed();
        };
        let superseded = self.store.superseded_entity_id();
        tracing::info!(%tx_id, %owner, ?superseded, "sync after create started");

        let settlement = self.run(owner, superseded).await;
        let report = self.commit(owner, settlement);
        tracing::info!(
            %tx_id,
            sync_type = ?report.sync_type,
            entity = ?report.final_entity_id,
            success = report.success,
            "sync after create finished"
        );
        report
    }

    async fn run(&self, owner: Address, superseded: Option<U256>) -> Settlement {
        let mut phase = SyncPhase::start();
        while let Some(step) = phase.step(&self.config) {
            let observation = match step {
                Step::Sleep(duration) => {
                    self.clock.sleep(duration).await;
                    Observation::Slept
                }
                Step::ReadAuthoritative => {
                    Observation::Authoritative(self.read_confirmed(owner, superseded).await)
                }
                Step::FetchIndexer => Observation::Indexed(self.fetch_indexed(owner).await),
            };
            let before = phase.label();
            phase = phase.advance(observation, &self.config);
            if phase.label() != before {
                tracing::debug!(from = before, to = phase.label(), "sync phase");
            }
        }
        phase.into_settlement().unwrap_or(Settlement::Failed)
    }

    async fn read_confirmed(&self, owner: Address, superseded: Option<U256>) -> Option<StatusVector> {
        match self.reader.get_status(owner).await {
            Ok(StatusRead::Vector(vector)) if Some(vector.entity_id) == superseded => {
                tracing::debug!(entity = %vector.entity_id, "replaced entity still current");
                None
            }
            Ok(StatusRead::Vector(vector)) => Some(vector),
            Ok(StatusRead::NoEntity) => {
                tracing::debug!("entity not visible yet");
                None
            }
            Err(error) => {
                tracing::warn!(%error, "confirm read failed");
                None
            }
        }
    }

    async fn fetch_indexed(&self, owner: Address) -> Option<EntitySnapshot> {
        match self.indexer.fetch_entity(owner).await {
            Ok(snapshot) => snapshot,
            Err(error) => {
                tracing::warn!(%error, "indexer fetch failed");
                None
            }
        }
    }

    fn commit(&self, owner: Address, settlement: Settlement) -> SyncReport {
        let sync_type = settlement.sync_type();
        if sync_type != SyncType::Failed && self.store.wallet() != Some(owner) {
            tracing::warn!(%owner, "session changed during sync, discarding settlement");
            return SyncReport::failed();
        }
        let stored = match settlement {
            Settlement::Complete { status, snapshot } => {
                let id = status.entity_id;
                self.store.commit_synced_pair(status, snapshot).map(|()| id).map_err(|error| {
                    tracing::warn!(%error, "synced pair refused");
                })
            }
            Settlement::Partial { status } => {
                let id = status.entity_id;
                match self.store.merge_authoritative(status, false) {
                    MergeOutcome::Stored => Ok(id),
                    MergeOutcome::Rejected => Err(()),
                }
            }
            Settlement::Failed => return SyncReport::failed(),
        };

        match stored {
            Ok(id) => SyncReport {
                success: true,
                sync_type,
                final_entity_id: Some(id),
            },
            // The session changed under the run; the id belongs to another owner.
            Err(()) => SyncReport::failed(),
        }
    }
}
