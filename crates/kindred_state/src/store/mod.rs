//! # Local State Store
//!
//! The single source of UI truth: one entity snapshot, one authoritative
//! status vector, one in-flight flag per mutation class.
//!
//! ## Write Paths
//!
//! | Path                        | Sync with owner of truth | Used by                 |
//! |-----------------------------|--------------------------|-------------------------|
//! | `merge_authoritative(false)`| yes                      | poller, sequencer       |
//! | `merge_authoritative(true)` | no                       | self-consistent writes  |
//! | `apply_optimistic`          | no                       | coordinator hooks       |
//! | `restore_fields`            | no                       | rollback hooks          |
//! | `commit_synced_pair`        | pair checked             | sequencer `complete`    |
//!
//! The store is shared as `Arc<LocalStateStore>`. Every method takes the lock
//! for its own duration only, so it is safe to call from async code as long
//! as no guard escapes across an `.await`.

use std::sync::Arc;

use alloy_primitives::{Address, U256};
use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::RwLock;

use crate::deltas::{self, DeltaTable};
use crate::entity::{Descriptor, EntitySnapshot, PlayerRecord};
use crate::error::StoreError;
use crate::mutation::{InFlightFlags, MutationClass};
use crate::reconcile::{self, IdentityComparison, SyncOutcome};
use crate::status::{StatusField, StatusVector};

/// Default change-feed depth.
const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Change notifications for the render loop.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreEvent {
    /// Wallet connected, switched or disconnected.
    SessionChanged(Option<Address>),
    /// Authoritative status for this entity changed.
    StatusChanged(U256),
    /// Snapshot changed (may be provisional, id zero).
    SnapshotChanged(U256),
    /// Optimistic fields were reverted.
    FieldsRestored(U256),
    /// The owner has no live entity.
    EntityAbsent,
    /// Stored status was dropped.
    StatusCleared,
}

/// Result of an authoritative merge.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Vector stored.
    Stored,
    /// Reconciliation refused the vector; nothing written.
    Rejected,
}

/// Pre-image of the fields one mutation class writes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldPreImage {
    entity_id: Option<U256>,
    values: Vec<(StatusField, u8)>,
}

impl FieldPreImage {
    /// Entity the pre-image was taken from, if a status was stored.
    #[must_use]
    pub const fn entity_id(&self) -> Option<U256> {
        self.entity_id
    }

    /// Captured `(field, value)` pairs.
    #[must_use]
    pub fn values(&self) -> &[(StatusField, u8)] {
        &self.values
    }
}

#[derive(Clone, Debug, Default)]
pub(crate) struct StoreInner {
    pub(crate) wallet: Option<Address>,
    pub(crate) snapshot: Option<EntitySnapshot>,
    pub(crate) status: Option<StatusVector>,
    pub(crate) player: Option<PlayerRecord>,
    pub(crate) last_known_id: Option<U256>,
    pub(crate) absent: bool,
    pub(crate) in_flight: InFlightFlags,
    /// Identity current when the provisional snapshot was staged.
    pub(crate) staged_over: Option<U256>,
    pub(crate) critical_threshold: u8,
}

impl StoreInner {
    /// Authoritative vector id, then indexer snapshot id, then last-known id.
    pub(crate) fn current_entity_id(&self) -> Option<U256> {
        let non_null = |id: U256| (!id.is_zero()).then_some(id);
        self.status
            .as_ref()
            .and_then(|s| non_null(s.entity_id))
            .or_else(|| self.snapshot.as_ref().and_then(|s| non_null(s.entity_id)))
            .or_else(|| self.last_known_id.and_then(non_null))
    }

    fn clear_entity(&mut self) {
        self.snapshot = None;
        self.status = None;
        self.player = None;
        self.last_known_id = None;
        self.absent = false;
        self.staged_over = None;
    }

    fn rederive_critical(&mut self) {
        let threshold = self.critical_threshold;
        if let Some(status) = self.status.as_mut() {
            status.is_critical = deltas::derive_critical(&status.stats, threshold);
        }
    }

    fn mirror_into_snapshot(&mut self) {
        if let (Some(status), Some(snapshot)) = (self.status.as_ref(), self.snapshot.as_mut()) {
            if snapshot.entity_id == status.entity_id {
                snapshot.mirror(status);
            }
        }
    }
}

/// Client-side state shared by the UI, the coordinator, the poller and the
/// sequencer.
pub struct LocalStateStore {
    inner: RwLock<StoreInner>,
    sender: Sender<StoreEvent>,
    receiver: Receiver<StoreEvent>,
}

impl LocalStateStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::with_event_capacity(DEFAULT_EVENT_CAPACITY)
    }

    /// Creates an empty store with a custom change-feed depth.
    #[must_use]
    pub fn with_event_capacity(capacity: usize) -> Self {
        let (sender, receiver) = bounded(capacity);
        Self {
            inner: RwLock::new(StoreInner {
                critical_threshold: DeltaTable::default().critical_threshold,
                ..StoreInner::default()
            }),
            sender,
            receiver,
        }
    }

    /// Creates an empty store already wrapped for sharing.
    #[must_use]
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Sets the stat floor at or below which `is_critical` is derived.
    pub fn set_critical_threshold(&self, threshold: u8) {
        self.inner.write().critical_threshold = threshold;
    }

    /// Returns a receiver for change notifications.
    ///
    /// Events are dropped, not queued, once the channel is full.
    #[must_use]
    pub fn subscribe(&self) -> Receiver<StoreEvent> {
        self.receiver.clone()
    }

    fn emit(&self, event: StoreEvent) {
        let _ = self.sender.try_send(event);
    }

    // ------------------------------------------------------------------
    // Session
    // ------------------------------------------------------------------

    /// Connects a wallet. Switching owners clears every entity field.
    pub fn connect_wallet(&self, owner: Address) {
        {
            let mut inner = self.inner.write();
            if inner.wallet == Some(owner) {
                return;
            }
            inner.clear_entity();
            inner.wallet = Some(owner);
        }
        tracing::info!(%owner, "wallet connected");
        self.emit(StoreEvent::SessionChanged(Some(owner)));
    }

    /// Disconnects the wallet and clears every entity field.
    pub fn disconnect_wallet(&self) {
        {
            let mut inner = self.inner.write();
            if inner.wallet.is_none() {
                return;
            }
            inner.clear_entity();
            inner.wallet = None;
        }
        tracing::info!("wallet disconnected");
        self.emit(StoreEvent::SessionChanged(None));
    }

    /// Connected wallet, if any.
    #[must_use]
    pub fn wallet(&self) -> Option<Address> {
        self.inner.read().wallet
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Current entity snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Option<EntitySnapshot> {
        self.inner.read().snapshot.clone()
    }

    /// Current authoritative status vector.
    #[must_use]
    pub fn status(&self) -> Option<StatusVector> {
        self.inner.read().status
    }

    /// Current player record.
    #[must_use]
    pub fn player(&self) -> Option<PlayerRecord> {
        self.inner.read().player
    }

    /// Last id any source agreed on.
    #[must_use]
    pub fn last_known_id(&self) -> Option<U256> {
        self.inner.read().last_known_id
    }

    /// The one identity precedence every component uses:
    /// authoritative vector id, then indexer snapshot id, then last-known id.
    #[must_use]
    pub fn current_entity_id(&self) -> Option<U256> {
        self.inner.read().current_entity_id()
    }

    /// Whether a live entity is believed to exist.
    #[must_use]
    pub fn has_live_entity(&self) -> bool {
        let inner = self.inner.read();
        if inner.absent {
            return false;
        }
        match (&inner.status, &inner.snapshot) {
            (Some(status), _) => status.has_live_entity(),
            (None, Some(snapshot)) => snapshot.status.is_alive && !snapshot.is_provisional(),
            (None, None) => inner.last_known_id.is_some_and(|id| !id.is_zero()),
        }
    }

    /// Entity a staged creation replaces, while the snapshot is provisional.
    #[must_use]
    pub fn superseded_entity_id(&self) -> Option<U256> {
        let inner = self.inner.read();
        inner
            .snapshot
            .as_ref()
            .filter(|s| s.is_provisional())
            .and(inner.staged_over)
    }

    /// Whether the last authoritative read reported no entity.
    #[must_use]
    pub fn is_absent(&self) -> bool {
        self.inner.read().absent
    }

    /// Compares a vector's id with the current identity.
    #[must_use]
    pub fn compare_identity(&self, vector: &StatusVector) -> IdentityComparison {
        IdentityComparison {
            authoritative: vector.entity_id,
            current: self.current_entity_id(),
        }
    }

    // ------------------------------------------------------------------
    // In-flight flags
    // ------------------------------------------------------------------

    /// Whether a mutation of this class is in flight.
    #[must_use]
    pub fn is_in_flight(&self, class: MutationClass) -> bool {
        self.inner.read().in_flight.get(class)
    }

    /// Snapshot of every class flag.
    #[must_use]
    pub fn in_flight(&self) -> InFlightFlags {
        self.inner.read().in_flight
    }

    /// Sets a class flag directly.
    pub fn set_in_flight(&self, class: MutationClass, in_flight: bool) {
        self.inner.write().in_flight.set(class, in_flight);
    }

    /// Marks a class in flight until the returned guard drops.
    ///
    /// This does not check the flag first; callers do.
    #[must_use]
    pub fn mark_in_flight(self: &Arc<Self>, class: MutationClass) -> InFlightGuard {
        self.set_in_flight(class, true);
        InFlightGuard {
            store: Arc::clone(self),
            class,
        }
    }

    // ------------------------------------------------------------------
    // Indexer writes
    // ------------------------------------------------------------------

    /// Stores the player record, unless it belongs to another owner.
    pub fn set_player(&self, player: PlayerRecord) {
        let mut inner = self.inner.write();
        if inner.wallet.is_some_and(|w| w != player.owner) {
            tracing::warn!(owner = %player.owner, "ignoring foreign player record");
            return;
        }
        inner.player = Some(player);
    }

    /// Stores an indexer snapshot.
    ///
    /// Refused when it belongs to another owner, or when an authoritative
    /// vector names a different entity.
    ///
    /// # Errors
    ///
    /// [`StoreError::ForeignOwner`] or [`StoreError::MismatchedPair`].
    pub fn set_indexer_snapshot(&self, snapshot: EntitySnapshot) -> Result<(), StoreError> {
        let id = snapshot.entity_id;
        {
            let mut inner = self.inner.write();
            if inner.wallet.is_some_and(|w| w != snapshot.owner) {
                return Err(StoreError::ForeignOwner);
            }
            if let Some(status) = inner.status.as_ref() {
                if status.entity_id != snapshot.entity_id {
                    return Err(StoreError::MismatchedPair {
                        authoritative: status.entity_id,
                        indexed: snapshot.entity_id,
                    });
                }
            }
            inner.snapshot = Some(snapshot);
            inner.mirror_into_snapshot();
        }
        self.emit(StoreEvent::SnapshotChanged(id));
        Ok(())
    }

    /// Replaces the snapshot wholesale. Used to stage and roll back creation.
    pub fn replace_snapshot(&self, snapshot: Option<EntitySnapshot>) {
        let id = snapshot.as_ref().map_or(U256::ZERO, |s| s.entity_id);
        self.inner.write().snapshot = snapshot;
        self.emit(StoreEvent::SnapshotChanged(id));
    }

    /// Stages a provisional snapshot while creation is in flight.
    ///
    /// The identity current at staging is remembered; an authoritative read of
    /// that entity never adopts the provisional descriptor.
    pub fn stage_provisional(&self, descriptor: Descriptor) -> bool {
        let staged = {
            let mut inner = self.inner.write();
            match inner.wallet {
                Some(owner) => {
                    inner.staged_over = inner.current_entity_id();
                    inner.snapshot = Some(EntitySnapshot::provisional(owner, descriptor));
                    true
                }
                None => false,
            }
        };
        if staged {
            self.emit(StoreEvent::SnapshotChanged(U256::ZERO));
        }
        staged
    }

    // ------------------------------------------------------------------
    // Authoritative writes
    // ------------------------------------------------------------------

    /// Merges an authoritative vector.
    ///
    /// With `skip_sync == false` the owner of truth is realigned first; this is
    /// the only path that corrects drift between the two sources. Fields owned
    /// by in-flight classes keep their current (optimistic) values.
    pub fn merge_authoritative(&self, vector: StatusVector, skip_sync: bool) -> MergeOutcome {
        let id = vector.entity_id;
        {
            let mut inner = self.inner.write();
            if !skip_sync {
                if let SyncOutcome::Refused(reason) = reconcile::sync_owner_of_truth(&mut inner, &vector) {
                    tracing::warn!(entity = %id, ?reason, "authoritative merge refused");
                    return MergeOutcome::Rejected;
                }
            }

            let mut incoming = vector;
            let mut carried = false;
            if let Some(current) = inner.status.as_ref().filter(|s| s.entity_id == id) {
                for class in inner.in_flight.active() {
                    for field in class.owned_fields() {
                        incoming.set_field(*field, current.field(*field));
                        carried = true;
                    }
                }
            }

            inner.status = Some(incoming);
            if carried {
                inner.rederive_critical();
            }
            inner.absent = false;
            if !id.is_zero() {
                inner.last_known_id = Some(id);
            }
            inner.mirror_into_snapshot();
        }
        self.emit(StoreEvent::StatusChanged(id));
        MergeOutcome::Stored
    }

    /// Writes an id-matched (vector, snapshot) pair in one critical section.
    ///
    /// # Errors
    ///
    /// [`StoreError::MismatchedPair`] when the ids differ,
    /// [`StoreError::NoSession`] when no wallet is connected,
    /// [`StoreError::ForeignOwner`] when either belongs to another owner.
    pub fn commit_synced_pair(
        &self,
        vector: StatusVector,
        snapshot: EntitySnapshot,
    ) -> Result<(), StoreError> {
        if vector.entity_id != snapshot.entity_id {
            return Err(StoreError::MismatchedPair {
                authoritative: vector.entity_id,
                indexed: snapshot.entity_id,
            });
        }
        let id = vector.entity_id;
        {
            let mut inner = self.inner.write();
            let Some(wallet) = inner.wallet else {
                return Err(StoreError::NoSession);
            };
            if vector.owner != wallet || snapshot.owner != wallet {
                return Err(StoreError::ForeignOwner);
            }
            inner.snapshot = Some(snapshot);
            inner.status = Some(vector);
            inner.player = Some(PlayerRecord {
                owner: vector.owner,
                current_entity_id: id,
            });
            inner.last_known_id = Some(id);
            inner.absent = false;
            inner.mirror_into_snapshot();
        }
        tracing::info!(entity = %id, "committed synced pair");
        self.emit(StoreEvent::SnapshotChanged(id));
        self.emit(StoreEvent::StatusChanged(id));
        Ok(())
    }

    /// Records the "no live entity" state.
    pub fn mark_absent(&self) {
        {
            let mut inner = self.inner.write();
            inner.status = None;
            inner.absent = true;
            if let Some(snapshot) = inner.snapshot.as_mut() {
                snapshot.status.is_alive = false;
            }
        }
        self.emit(StoreEvent::EntityAbsent);
    }

    /// Drops the stored status vector.
    pub fn clear_status(&self) {
        let cleared = self.inner.write().status.take().is_some();
        if cleared {
            self.emit(StoreEvent::StatusCleared);
        }
    }

    // ------------------------------------------------------------------
    // Optimistic writes
    // ------------------------------------------------------------------

    /// Captures the listed fields of the current status.
    #[must_use]
    pub fn capture_fields(&self, fields: &[StatusField]) -> FieldPreImage {
        let inner = self.inner.read();
        match inner.status.as_ref() {
            Some(status) => FieldPreImage {
                entity_id: Some(status.entity_id),
                values: fields.iter().map(|f| (*f, status.field(*f))).collect(),
            },
            None => FieldPreImage {
                entity_id: None,
                values: Vec::new(),
            },
        }
    }

    /// Restores captured fields. Skipped if the entity changed since capture.
    ///
    /// `is_critical` is derived again from the resulting stats.
    pub fn restore_fields(&self, pre_image: &FieldPreImage) -> bool {
        let Some(id) = pre_image.entity_id else {
            return false;
        };
        {
            let mut inner = self.inner.write();
            let Some(status) = inner.status.as_mut().filter(|s| s.entity_id == id) else {
                tracing::debug!(entity = %id, "entity changed since capture, nothing to restore");
                return false;
            };
            for (field, value) in &pre_image.values {
                status.set_field(*field, *value);
            }
            inner.rederive_critical();
            inner.mirror_into_snapshot();
        }
        self.emit(StoreEvent::FieldsRestored(id));
        true
    }

    /// Applies an optimistic transform to the current status and derives
    /// `is_critical` again.
    ///
    /// Returns `false` when there is no status to apply it to.
    pub fn apply_optimistic(&self, apply: impl FnOnce(&mut StatusVector)) -> bool {
        let id = {
            let mut inner = self.inner.write();
            let Some(status) = inner.status.as_mut() else {
                return false;
            };
            apply(status);
            let id = status.entity_id;
            inner.rederive_critical();
            inner.mirror_into_snapshot();
            id
        };
        self.emit(StoreEvent::StatusChanged(id));
        true
    }

    // ------------------------------------------------------------------
    // Crate-internal access
    // ------------------------------------------------------------------

    pub(crate) fn with_inner<R>(&self, f: impl FnOnce(&mut StoreInner) -> R) -> R {
        f(&mut self.inner.write())
    }

    pub(crate) fn read_inner<R>(&self, f: impl FnOnce(&StoreInner) -> R) -> R {
        f(&self.inner.read())
    }
}

impl Default for LocalStateStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Clears a class's in-flight flag on drop.
pub struct InFlightGuard {
    store: Arc<LocalStateStore>,
    class: MutationClass,
}

impl InFlightGuard {
    /// The guarded class.
    #[must_use]
    pub const fn class(&self) -> MutationClass {
        self.class
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.store.set_in_flight(self.class, false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::{Stat, Stats};

    fn owner() -> Address {
        Address::repeat_byte(0xaa)
    }

    fn vector(id: u64, hunger: u8) -> StatusVector {
        StatusVector {
            owner: owner(),
            entity_id: U256::from(id),
            is_alive: true,
            is_awake: true,
            stats: Stats::new(hunger, 50, 50, 50),
            is_critical: false,
            updated_at: 1,
        }
    }

    fn descriptor() -> Descriptor {
        Descriptor {
            species: "fox".into(),
            name: "Ember".into(),
            born_at: 1,
        }
    }

    fn store_with(v: StatusVector) -> Arc<LocalStateStore> {
        let store = LocalStateStore::shared();
        store.connect_wallet(owner());
        assert_eq!(store.merge_authoritative(v, false), MergeOutcome::Stored);
        store
    }

    #[test]
    fn test_identity_precedence() {
        let store = LocalStateStore::shared();
        store.connect_wallet(owner());
        assert_eq!(store.current_entity_id(), None);

        store.with_inner(|inner| inner.last_known_id = Some(U256::from(3)));
        assert_eq!(store.current_entity_id(), Some(U256::from(3)));

        store
            .set_indexer_snapshot(EntitySnapshot::thin(&vector(5, 0)))
            .unwrap();
        assert_eq!(store.current_entity_id(), Some(U256::from(5)));

        store.with_inner(|inner| inner.status = Some(vector(9, 0)));
        assert_eq!(store.current_entity_id(), Some(U256::from(9)));
    }

    #[test]
    fn test_wallet_switch_clears_entity() {
        let store = store_with(vector(1, 50));
        store.connect_wallet(Address::repeat_byte(0xbb));

        assert!(store.status().is_none());
        assert!(store.snapshot().is_none());
        assert_eq!(store.current_entity_id(), None);
    }

    #[test]
    fn test_merge_keeps_in_flight_fields() {
        let store = store_with(vector(1, 50));
        let guard = store.mark_in_flight(MutationClass::Feed);
        store.apply_optimistic(|s| s.stats.hunger = 70);

        // An older chain read lands while feed is pending.
        let mut stale = vector(1, 50);
        stale.stats.hygiene = 10;
        store.merge_authoritative(stale, false);

        let status = store.status().unwrap();
        assert_eq!(status.stats.hunger, 70);
        assert_eq!(status.stats.hygiene, 10);

        drop(guard);
        assert!(!store.is_in_flight(MutationClass::Feed));
        store.merge_authoritative(vector(1, 50), false);
        assert_eq!(store.status().unwrap().stats.hunger, 50);
    }

    #[test]
    fn test_restore_only_touches_captured_fields() {
        let store = store_with(vector(1, 50));
        let feed_pre = store.capture_fields(MutationClass::Feed.owned_fields());
        let clean_pre = store.capture_fields(MutationClass::Clean.owned_fields());

        store.apply_optimistic(|s| s.stats.hunger = 70);
        store.apply_optimistic(|s| s.stats.hygiene = 75);

        assert!(store.restore_fields(&feed_pre));
        let status = store.status().unwrap();
        assert_eq!(status.stats.hunger, 50);
        assert_eq!(status.stats.hygiene, 75);

        assert!(store.restore_fields(&clean_pre));
        assert_eq!(store.status().unwrap().stats.get(Stat::Hygiene), 50);
    }

    #[test]
    fn test_overlapping_restore_rederives_critical() {
        let mut start = vector(1, 30);
        start.stats.hygiene = 5;
        start.is_critical = true;
        let store = store_with(start);
        let table = DeltaTable::default();

        let feed_pre = store.capture_fields(MutationClass::Feed.owned_fields());
        store.apply_optimistic(|s| *s = deltas::feed(s, &table));
        let clean_pre = store.capture_fields(MutationClass::Clean.owned_fields());
        store.apply_optimistic(|s| *s = deltas::clean(s, &table));
        assert!(!store.status().unwrap().is_critical);

        // Feed is rejected while clean's hygiene stands.
        assert!(store.restore_fields(&feed_pre));
        let status = store.status().unwrap();
        assert_eq!(status.stats, Stats::new(30, 50, 50, 30));
        assert!(!status.is_critical);
        assert_eq!(status.is_critical, deltas::derive_critical(&status.stats, 10));

        assert!(store.restore_fields(&clean_pre));
        assert!(store.status().unwrap().is_critical);
    }

    #[test]
    fn test_carry_over_rederives_critical() {
        let store = store_with(vector(1, 50));
        let _guard = store.mark_in_flight(MutationClass::Clean);
        store.apply_optimistic(|s| s.stats.hygiene = 80);

        // Chain still has the pre-clean hygiene and flags it.
        let mut stale = vector(1, 50);
        stale.stats.hygiene = 4;
        stale.is_critical = true;
        store.merge_authoritative(stale, false);

        let status = store.status().unwrap();
        assert_eq!(status.stats.hygiene, 80);
        assert!(!status.is_critical);
    }

    #[test]
    fn test_critical_threshold_is_configurable() {
        let store = store_with(vector(1, 50));
        store.set_critical_threshold(60);
        let pre = store.capture_fields(MutationClass::Play.owned_fields());
        store.apply_optimistic(|s| s.stats.happiness = 90);

        assert!(store.restore_fields(&pre));
        assert!(store.status().unwrap().is_critical);
    }

    #[test]
    fn test_commit_synced_pair_requires_session() {
        let store = LocalStateStore::shared();
        let snapshot = EntitySnapshot::thin(&vector(42, 50));

        assert_eq!(
            store.commit_synced_pair(vector(42, 50), snapshot),
            Err(StoreError::NoSession)
        );
        assert!(store.status().is_none());
        assert_eq!(store.current_entity_id(), None);
    }

    #[test]
    fn test_restore_skipped_after_entity_change() {
        let store = store_with(vector(1, 50));
        let pre = store.capture_fields(MutationClass::Feed.owned_fields());
        store.merge_authoritative(vector(2, 90), false);

        assert!(!store.restore_fields(&pre));
        assert_eq!(store.status().unwrap().stats.hunger, 90);
    }

    #[test]
    fn test_commit_synced_pair_rejects_mismatch() {
        let store = store_with(vector(41, 50));
        let mut snapshot = EntitySnapshot::thin(&vector(41, 50));
        snapshot.descriptor = Some(descriptor());

        let result = store.commit_synced_pair(vector(42, 50), snapshot);
        assert_eq!(
            result,
            Err(StoreError::MismatchedPair {
                authoritative: U256::from(42),
                indexed: U256::from(41),
            })
        );
        assert_eq!(store.current_entity_id(), Some(U256::from(41)));
    }

    #[test]
    fn test_commit_synced_pair_updates_pointer() {
        let store = store_with(vector(41, 50));
        let mut snapshot = EntitySnapshot::thin(&vector(42, 60));
        snapshot.descriptor = Some(descriptor());

        store.commit_synced_pair(vector(42, 60), snapshot).unwrap();
        assert_eq!(store.current_entity_id(), Some(U256::from(42)));
        assert_eq!(store.player().unwrap().current_entity_id, U256::from(42));
        assert_eq!(store.snapshot().unwrap().descriptor, Some(descriptor()));
    }

    #[test]
    fn test_indexer_snapshot_mismatch_refused() {
        let store = store_with(vector(42, 50));
        let stale = EntitySnapshot::thin(&vector(41, 50));

        assert!(store.set_indexer_snapshot(stale).is_err());
        assert_eq!(store.snapshot().unwrap().entity_id, U256::from(42));
    }

    #[test]
    fn test_mark_absent() {
        let store = store_with(vector(1, 50));
        store.mark_absent();

        assert!(store.status().is_none());
        assert!(store.is_absent());
        assert!(!store.has_live_entity());
        assert!(!store.snapshot().unwrap().status.is_alive);
    }

    #[test]
    fn test_change_feed() {
        let store = LocalStateStore::shared();
        let events = store.subscribe();
        store.connect_wallet(owner());
        store.merge_authoritative(vector(1, 50), false);

        assert_eq!(events.try_recv(), Ok(StoreEvent::SessionChanged(Some(owner()))));
        assert_eq!(events.try_recv(), Ok(StoreEvent::StatusChanged(U256::from(1))));
    }

    #[test]
    fn test_staging_records_superseded_entity() {
        let store = store_with(vector(7, 50));
        assert_eq!(store.superseded_entity_id(), None);

        store.stage_provisional(descriptor());
        assert_eq!(store.superseded_entity_id(), Some(U256::from(7)));

        store.replace_snapshot(Some(EntitySnapshot::thin(&vector(7, 50))));
        assert_eq!(store.superseded_entity_id(), None);
    }

    #[test]
    fn test_provisional_snapshot_not_live() {
        let store = LocalStateStore::shared();
        store.connect_wallet(owner());
        assert!(store.stage_provisional(descriptor()));

        assert!(!store.has_live_entity());
        assert_eq!(store.current_entity_id(), None);
    }
}
