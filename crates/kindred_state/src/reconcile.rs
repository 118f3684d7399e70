//! # Entity Reconciliation
//!
//! Decides whether an authoritative vector and the cached indexer data refer
//! to the same entity, and converges them when they drift.
//!
//! ## How It Works
//!
//! ```text
//! vector.entity_id == current_entity_id() ?
//!        │ yes                        │ no
//!        ▼                            ▼
//!     accept               sync_owner_of_truth(vector)
//!                          ├─ snapshot id   := vector id (descriptor dropped)
//!                          ├─ owner pointer := vector id
//!                          └─ status        := vector
//!                                     │
//!                                     ▼
//!                          compare once more ─▶ accept / reject
//! ```
//!
//! The authoritative vector is always ground truth for identity. Indexer
//! descriptors survive only while the ids agree.

use std::sync::Arc;

use alloy_primitives::{Address, U256};

use crate::entity::{EntitySnapshot, PlayerRecord};
use crate::status::StatusVector;
use crate::store::{LocalStateStore, StoreInner};

/// Ephemeral comparison of the authoritative id against the current one.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IdentityComparison {
    /// Id carried by the authoritative vector.
    pub authoritative: U256,
    /// Result of the identity precedence before reconciliation.
    pub current: Option<U256>,
}

/// Branch taken for a comparison.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verdict {
    /// Same entity.
    Accept,
    /// Different or unknown entity; the sources must be converged.
    Converge,
}

impl IdentityComparison {
    /// Picks the branch.
    #[must_use]
    pub fn verdict(&self) -> Verdict {
        if self.current == Some(self.authoritative) {
            Verdict::Accept
        } else {
            Verdict::Converge
        }
    }
}

/// Why a vector could not become the owner of truth.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RefusalReason {
    /// The vector carries the null id.
    NullEntity,
    /// No wallet is connected.
    NoSession,
    /// The vector belongs to someone other than the connected wallet.
    ForeignOwner {
        /// Connected wallet.
        expected: Address,
        /// Owner in the vector.
        found: Address,
    },
}

/// Result of a convergence attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Every source already agreed.
    Aligned,
    /// At least one source was realigned.
    Converged {
        /// Identity before convergence.
        previous: Option<U256>,
    },
    /// The vector cannot be trusted for identity.
    Refused(RefusalReason),
}

/// Realigns the cached snapshot id, the owner's pointer and the stored status
/// identity to the authoritative vector.
pub(crate) fn sync_owner_of_truth(inner: &mut StoreInner, vector: &StatusVector) -> SyncOutcome {
    let id = vector.entity_id;
    if id.is_zero() {
        return SyncOutcome::Refused(RefusalReason::NullEntity);
    }
    let Some(expected) = inner.wallet else {
        return SyncOutcome::Refused(RefusalReason::NoSession);
    };
    if expected != vector.owner {
        return SyncOutcome::Refused(RefusalReason::ForeignOwner {
            expected,
            found: vector.owner,
        });
    }

    let previous = inner.current_entity_id();
    let mut converged = false;

    let snapshot_state = inner
        .snapshot
        .as_ref()
        .map(|s| (s.entity_id == id, s.is_provisional()));
    match snapshot_state {
        Some((true, _)) => {}
        // The entity being replaced; the staged creation is still pending.
        Some((false, true)) if inner.staged_over == Some(id) => {}
        Some((false, true)) => {
            // Staged locally during creation, not an indexer read.
            if let Some(snapshot) = inner.snapshot.as_mut() {
                snapshot.entity_id = id;
                snapshot.mirror(vector);
            }
            converged = true;
        }
        _ => {
            inner.snapshot = Some(EntitySnapshot::thin(vector));
            converged = true;
        }
    }

    if inner.player.map(|p| p.current_entity_id) != Some(id) {
        inner.player = Some(PlayerRecord {
            owner: vector.owner,
            current_entity_id: id,
        });
        converged = true;
    }

    if inner.status.as_ref().map(|s| s.entity_id) != Some(id) {
        inner.status = Some(*vector);
        converged = true;
    }
    inner.last_known_id = Some(id);

    if converged {
        tracing::info!(?previous, entity = %id, "converged on authoritative identity");
        SyncOutcome::Converged { previous }
    } else {
        SyncOutcome::Aligned
    }
}

/// Identity validation and convergence over a shared store.
#[derive(Clone)]
pub struct EntityReconciler {
    store: Arc<LocalStateStore>,
}

impl EntityReconciler {
    /// Creates a reconciler over the given store.
    #[must_use]
    pub fn new(store: Arc<LocalStateStore>) -> Self {
        Self { store }
    }

    /// Accepts the vector when it names the current entity; otherwise
    /// converges the sources and compares once more.
    ///
    /// Idempotent for an unchanged store and input.
    #[must_use]
    pub fn validate(&self, vector: &StatusVector) -> bool {
        let comparison = self.store.compare_identity(vector);
        if comparison.verdict() == Verdict::Accept {
            return true;
        }

        tracing::debug!(
            authoritative = %comparison.authoritative,
            current = ?comparison.current,
            "identity drift"
        );
        if let SyncOutcome::Refused(reason) = self.sync_owner_of_truth(vector) {
            tracing::warn!(entity = %vector.entity_id, ?reason, "status vector rejected");
            return false;
        }
        self.store.compare_identity(vector).verdict() == Verdict::Accept
    }

    /// Converges the store on the vector's identity.
    pub fn sync_owner_of_truth(&self, vector: &StatusVector) -> SyncOutcome {
        self.store.with_inner(|inner| sync_owner_of_truth(inner, vector))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Descriptor;
    use crate::status::Stats;

    fn owner() -> Address {
        Address::repeat_byte(0x11)
    }

    fn vector(id: u64) -> StatusVector {
        StatusVector {
            owner: owner(),
            entity_id: U256::from(id),
            is_alive: true,
            is_awake: true,
            stats: Stats::new(50, 50, 50, 50),
            is_critical: false,
            updated_at: 0,
        }
    }

    fn indexed(id: u64) -> EntitySnapshot {
        let mut snapshot = EntitySnapshot::thin(&vector(id));
        snapshot.descriptor = Some(Descriptor {
            species: "owl".into(),
            name: "Hoot".into(),
            born_at: 0,
        });
        snapshot
    }

    fn setup() -> (Arc<LocalStateStore>, EntityReconciler) {
        let store = LocalStateStore::shared();
        store.connect_wallet(owner());
        let reconciler = EntityReconciler::new(Arc::clone(&store));
        (store, reconciler)
    }

    #[test]
    fn test_matching_id_accepted_without_writes() {
        let (store, reconciler) = setup();
        store.set_indexer_snapshot(indexed(41)).unwrap();

        assert!(reconciler.validate(&vector(41)));
        assert!(store.status().is_none());
        assert!(store.snapshot().unwrap().descriptor.is_some());
    }

    #[test]
    fn test_stale_indexer_id_converges() {
        let (store, reconciler) = setup();
        store.set_indexer_snapshot(indexed(41)).unwrap();
        store.set_player(PlayerRecord {
            owner: owner(),
            current_entity_id: U256::from(41),
        });

        assert!(reconciler.validate(&vector(42)));

        let snapshot = store.snapshot().unwrap();
        assert_eq!(snapshot.entity_id, U256::from(42));
        assert!(snapshot.is_thin());
        assert_eq!(store.player().unwrap().current_entity_id, U256::from(42));
        assert_eq!(store.current_entity_id(), Some(U256::from(42)));
    }

    #[test]
    fn test_validate_is_idempotent() {
        let (store, reconciler) = setup();
        store.set_indexer_snapshot(indexed(41)).unwrap();

        let first = reconciler.validate(&vector(42));
        let after_first = (store.snapshot(), store.status(), store.player());
        let second = reconciler.validate(&vector(42));
        let after_second = (store.snapshot(), store.status(), store.player());

        assert_eq!(first, second);
        assert_eq!(after_first, after_second);
    }

    #[test]
    fn test_foreign_owner_rejected() {
        let (store, reconciler) = setup();
        store.set_indexer_snapshot(indexed(41)).unwrap();

        let mut foreign = vector(99);
        foreign.owner = Address::repeat_byte(0x22);

        assert!(!reconciler.validate(&foreign));
        assert_eq!(store.current_entity_id(), Some(U256::from(41)));
    }

    #[test]
    fn test_null_entity_rejected() {
        let (_store, reconciler) = setup();
        assert!(!reconciler.validate(&vector(0)));
        assert_eq!(
            reconciler.sync_owner_of_truth(&vector(0)),
            SyncOutcome::Refused(RefusalReason::NullEntity)
        );
    }

    #[test]
    fn test_provisional_descriptor_survives_convergence() {
        let (store, reconciler) = setup();
        store.stage_provisional(Descriptor {
            species: "owl".into(),
            name: "Hoot".into(),
            born_at: 0,
        });

        assert!(reconciler.validate(&vector(7)));
        let snapshot = store.snapshot().unwrap();
        assert_eq!(snapshot.entity_id, U256::from(7));
        assert_eq!(snapshot.descriptor.unwrap().name, "Hoot");
    }

    #[test]
    fn test_replaced_entity_read_keeps_provisional_unpromoted() {
        let (store, reconciler) = setup();
        store.set_indexer_snapshot(indexed(7)).unwrap();
        store.with_inner(|inner| inner.status = Some(vector(7)));
        store.stage_provisional(Descriptor {
            species: "dragon".into(),
            name: "NewPet".into(),
            born_at: 0,
        });

        // The entity being replaced is still what the chain reports.
        assert!(matches!(
            reconciler.sync_owner_of_truth(&vector(7)),
            SyncOutcome::Converged { .. }
        ));
        let snapshot = store.snapshot().unwrap();
        assert!(snapshot.is_provisional());
        assert_eq!(snapshot.entity_id, U256::ZERO);

        // The created entity shows up under its own id.
        assert!(reconciler.validate(&vector(8)));
        let snapshot = store.snapshot().unwrap();
        assert_eq!(snapshot.entity_id, U256::from(8));
        assert_eq!(snapshot.descriptor.unwrap().name, "NewPet");
    }

    #[test]
    fn test_disconnected_store_refuses_sync() {
        let (store, reconciler) = setup();
        store.disconnect_wallet();

        assert!(!reconciler.validate(&vector(42)));
        assert_eq!(
            reconciler.sync_owner_of_truth(&vector(42)),
            SyncOutcome::Refused(RefusalReason::NoSession)
        );
        assert!(store.status().is_none());
        assert!(store.snapshot().is_none());
    }

    #[test]
    fn test_verdict() {
        let same = IdentityComparison {
            authoritative: U256::from(1),
            current: Some(U256::from(1)),
        };
        let unknown = IdentityComparison {
            authoritative: U256::from(1),
            current: None,
        };
        assert_eq!(same.verdict(), Verdict::Accept);
        assert_eq!(unknown.verdict(), Verdict::Converge);
    }
}
