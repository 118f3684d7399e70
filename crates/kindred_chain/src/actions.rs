//! # Game Actions
//!
//! The facade the UI calls. Owns the coordinator, the poller and the
//! sequencer, and turns each player action into a guarded optimistic
//! mutation.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use alloy_primitives::{Address, U256};
use kindred_state::{
    deltas, ConfigError, DeltaTable, Descriptor, EngineConfig, EntitySnapshot, FieldPreImage, LocalStateStore,
    MutationClass, PlayerRecord, StatusVector,
};
use tokio::task::JoinHandle;

use crate::backend::{AuthoritativeReader, Clock, Indexer, TransactionExecutor, TxId};
use crate::contracts::{Call, IKindredGame};
use crate::coordinator::{MutationHooks, OptimisticCoordinator};
use crate::error::ActionError;
use crate::poller::StatusPoller;
use crate::sequencer::{SpawnSyncSequencer, SyncReport, SyncType};

/// Every external collaborator the engine needs.
#[derive(Clone)]
pub struct Backends {
    /// Submits call batches.
    pub executor: Arc<dyn TransactionExecutor>,
    /// Contract `getStatus`.
    pub reader: Arc<dyn AuthoritativeReader>,
    /// Indexer query.
    pub indexer: Arc<dyn Indexer>,
    /// Sleep used by the sequencer.
    pub clock: Arc<dyn Clock>,
}

/// Player actions over one shared store.
pub struct GameActions {
    store: Arc<LocalStateStore>,
    coordinator: OptimisticCoordinator,
    poller: Arc<StatusPoller>,
    sequencer: SpawnSyncSequencer,
    indexer: Arc<dyn Indexer>,
    deltas: DeltaTable,
    contract: Address,
}

impl GameActions {
    /// Wires the engine together and applies the delta table's critical
    /// threshold to the store.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Invalid`] when the config breaks a retry or interval
    /// bound.
    pub fn new(config: &EngineConfig, store: Arc<LocalStateStore>, backends: Backends) -> Result<Self, ConfigError> {
        config.validate()?;
        store.set_critical_threshold(config.deltas.critical_threshold);
        let Backends {
            executor,
            reader,
            indexer,
            clock,
        } = backends;
        Ok(Self {
            coordinator: OptimisticCoordinator::new(Arc::clone(&store), executor),
            poller: StatusPoller::new(Arc::clone(&store), Arc::clone(&reader), config.poller.interval()),
            sequencer: SpawnSyncSequencer::new(
                Arc::clone(&store),
                reader,
                Arc::clone(&indexer),
                clock,
                config.sequencer.clone(),
            ),
            store,
            indexer,
            deltas: config.deltas,
            contract: config.contract.address,
        })
    }

    // ------------------------------------------------------------------
    // Session
    // ------------------------------------------------------------------

    /// Connects a wallet, hydrates from the indexer and starts polling if
    /// a live entity is known.
    ///
    /// An indexer failure is logged; the first poll fills in the rest.
    /// Returns whether polling is active.
    pub async fn connect_wallet(&self, owner: Address) -> bool {
        self.store.connect_wallet(owner);
        match self.indexer.fetch_entity(owner).await {
            Ok(Some(snapshot)) if self.store.wallet() == Some(owner) => {
                let id = snapshot.entity_id;
                if let Err(error) = self.store.set_indexer_snapshot(snapshot) {
                    tracing::warn!(%error, "indexer snapshot refused");
                } else {
                    self.store.set_player(PlayerRecord {
                        owner,
                        current_entity_id: id,
                    });
                }
            }
            Ok(_) => tracing::debug!(%owner, "indexer has no entity"),
            Err(error) => tracing::warn!(%error, "indexer hydrate failed"),
        }
        self.poller.update_lifecycle()
    }

    /// Disconnects the wallet and stops polling.
    pub fn disconnect_wallet(&self) {
        self.store.disconnect_wallet();
        self.poller.update_lifecycle();
    }

    // ------------------------------------------------------------------
    // Stat mutations
    // ------------------------------------------------------------------

    /// Feeds the entity.
    ///
    /// # Errors
    ///
    /// See [`ActionError`].
    pub async fn feed(&self) -> Result<TxId, ActionError> {
        let table = self.deltas;
        self.run_stat_mutation(
            MutationClass::Feed,
            |entity_id| IKindredGame::feedCall {
                entityId: entity_id,
                amount: table.feed,
            },
            move |s| deltas::feed(s, &table),
            "Couldn't feed your pet",
        )
        .await
    }

    /// Cleans the entity.
    ///
    /// # Errors
    ///
    /// See [`ActionError`].
    pub async fn clean(&self) -> Result<TxId, ActionError> {
        let table = self.deltas;
        self.run_stat_mutation(
            MutationClass::Clean,
            |entity_id| IKindredGame::cleanCall { entityId: entity_id },
            move |s| deltas::clean(s, &table),
            "Couldn't clean your pet",
        )
        .await
    }

    /// Plays with the entity.
    ///
    /// # Errors
    ///
    /// See [`ActionError`].
    pub async fn play(&self) -> Result<TxId, ActionError> {
        let table = self.deltas;
        self.run_stat_mutation(
            MutationClass::Play,
            |entity_id| IKindredGame::playCall { entityId: entity_id },
            move |s| deltas::play(s, &table),
            "Couldn't play with your pet",
        )
        .await
    }

    /// Puts the entity to sleep or wakes it.
    ///
    /// # Errors
    ///
    /// See [`ActionError`].
    pub async fn toggle_sleep(&self) -> Result<TxId, ActionError> {
        self.run_stat_mutation(
            MutationClass::Sleep,
            |entity_id| IKindredGame::toggleSleepCall { entityId: entity_id },
            deltas::toggle_sleep,
            "Couldn't change sleep state",
        )
        .await
    }

    async fn run_stat_mutation<C: alloy_sol_types::SolCall>(
        &self,
        class: MutationClass,
        build: impl FnOnce(U256) -> C,
        transform: impl FnOnce(&StatusVector) -> StatusVector + Send + 'static,
        message: &'static str,
    ) -> Result<TxId, ActionError> {
        if self.store.is_in_flight(class) {
            return Err(ActionError::Busy(class));
        }
        let entity_id = self.acting_entity()?;
        let call = Call::new(self.contract, &build(entity_id));

        let _in_flight = self.store.mark_in_flight(class);
        let fields = class.owned_fields();
        let hooks = MutationHooks::new(
            move |store: &LocalStateStore| store.capture_fields(fields),
            move |store: &LocalStateStore| {
                store.apply_optimistic(|s| *s = transform(s));
            },
            |store: &LocalStateStore, pre_image: FieldPreImage| {
                store.restore_fields(&pre_image);
            },
        )
        .with_error_message(message);

        tracing::debug!(class = class.label(), entity = %entity_id, "mutation started");
        self.coordinator
            .execute(vec![call], hooks)
            .await
            .into_result()
            .map_err(ActionError::from)
    }

    fn acting_entity(&self) -> Result<U256, ActionError> {
        if self.store.wallet().is_none() {
            return Err(ActionError::NoWallet);
        }
        self.store
            .current_entity_id()
            .filter(|_| self.store.has_live_entity())
            .ok_or(ActionError::NoEntity)
    }

    // ------------------------------------------------------------------
    // Creation
    // ------------------------------------------------------------------

    /// Creates a new entity and reconciles the store with it.
    ///
    /// A provisional snapshot shows the creature immediately. A submission
    /// failure restores the previous snapshot; so does a `Failed` sync.
    ///
    /// # Errors
    ///
    /// [`ActionError::Busy`], [`ActionError::NoWallet`] or a rolled-back
    /// submission.
    pub async fn spawn(&self, species: &str, name: &str) -> Result<SyncReport, ActionError> {
        let class = MutationClass::Spawn;
        if self.store.is_in_flight(class) {
            return Err(ActionError::Busy(class));
        }
        if self.store.wallet().is_none() {
            return Err(ActionError::NoWallet);
        }
        let _in_flight = self.store.mark_in_flight(class);

        let call = Call::new(
            self.contract,
            &IKindredGame::spawnCall {
                species: species.to_owned(),
                name: name.to_owned(),
            },
        );
        let descriptor = Descriptor {
            species: species.to_owned(),
            name: name.to_owned(),
            born_at: unix_now(),
        };
        let previous = self.store.snapshot();
        let hooks = MutationHooks::new(
            |store: &LocalStateStore| store.snapshot(),
            move |store: &LocalStateStore| {
                store.stage_provisional(descriptor);
            },
            |store: &LocalStateStore, snapshot: Option<EntitySnapshot>| store.replace_snapshot(snapshot),
        )
        .with_error_message("Couldn't hatch your pet");

        tracing::info!(species, name, "spawn started");
        let tx_id = self.coordinator.execute(vec![call], hooks).await.into_result()?;

        let report = self.sequencer.sync_after_create(&tx_id).await;
        if report.sync_type == SyncType::Failed && self.store.snapshot().is_some_and(|s| s.is_provisional()) {
            self.store.replace_snapshot(previous);
        }
        self.poller.update_lifecycle();
        Ok(report)
    }

    // ------------------------------------------------------------------
    // Sessions
    // ------------------------------------------------------------------

    /// Spends energy to start a session.
    ///
    /// The energy is deducted immediately and the transaction runs detached.
    /// A failure is logged and never rolled back; the session has already
    /// begun.
    ///
    /// # Errors
    ///
    /// [`ActionError::NoWallet`] or [`ActionError::NoEntity`].
    pub fn start_session(&self) -> Result<JoinHandle<()>, ActionError> {
        let entity_id = self.acting_entity()?;
        let table = self.deltas;
        self.store.apply_optimistic(|s| *s = deltas::consume_energy(s, &table));

        let call = Call::new(
            self.contract,
            &IKindredGame::consumeEnergyCall {
                entityId: entity_id,
                amount: table.session_energy_cost,
            },
        );
        Ok(self.coordinator.submit_detached(vec![call], "consume energy"))
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    /// The shared store.
    #[must_use]
    pub fn store(&self) -> &Arc<LocalStateStore> {
        &self.store
    }

    /// The status poller.
    #[must_use]
    pub fn poller(&self) -> &Arc<StatusPoller> {
        &self.poller
    }

    /// The creation sequencer.
    #[must_use]
    pub fn sequencer(&self) -> &SpawnSyncSequencer {
        &self.sequencer
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs())
}
