//! # Optimistic Coordinator
//!
//! Runs one mutation through capture, optimistic apply, submit, then commit
//! or rollback.
//!
//! ## Ordering
//!
//! ```text
//! capture_state ─▶ on_optimistic_update ─▶ executor.execute(calls)
//!                                                │
//!                         ┌──── Ok(tx_id) ───────┴──── Err(cause) ────┐
//!                         ▼                                           ▼
//!                    on_success                            rollback (one-shot)
//!                 (delta stands until                             │
//!                  the next poll)                                 ▼
//!                                                             on_error
//! ```
//!
//! The coordinator does not check in-flight flags. Callers do, before calling
//! [`OptimisticCoordinator::execute`].

use std::sync::Arc;

use kindred_state::LocalStateStore;
use tokio::task::JoinHandle;

use crate::backend::{TransactionExecutor, TxId};
use crate::contracts::Call;
use crate::error::MutationError;

type CaptureFn<P> = Box<dyn FnOnce(&LocalStateStore) -> P + Send>;
type ApplyFn = Box<dyn FnOnce(&LocalStateStore) + Send>;
type RollbackFn<P> = Box<dyn FnOnce(&LocalStateStore, P) + Send>;
type SuccessFn = Box<dyn FnOnce(&TxId) + Send>;
type ErrorFn = Box<dyn FnOnce(&MutationError) + Send>;

const DEFAULT_ERROR_MESSAGE: &str = "Transaction failed";

/// Callbacks for one mutation. `P` is the captured pre-image.
pub struct MutationHooks<P> {
    capture_state: CaptureFn<P>,
    on_optimistic_update: ApplyFn,
    on_rollback: RollbackFn<P>,
    on_success: Option<SuccessFn>,
    on_error: Option<ErrorFn>,
    error_message: String,
}

impl<P: Send + 'static> MutationHooks<P> {
    /// Creates hooks from the three mandatory callbacks.
    ///
    /// `capture` must not write to the store.
    #[must_use]
    pub fn new(
        capture: impl FnOnce(&LocalStateStore) -> P + Send + 'static,
        optimistic: impl FnOnce(&LocalStateStore) + Send + 'static,
        rollback: impl FnOnce(&LocalStateStore, P) + Send + 'static,
    ) -> Self {
        Self {
            capture_state: Box::new(capture),
            on_optimistic_update: Box::new(optimistic),
            on_rollback: Box::new(rollback),
            on_success: None,
            on_error: None,
            error_message: DEFAULT_ERROR_MESSAGE.to_owned(),
        }
    }

    /// Called with the transaction id once the executor resolves.
    #[must_use]
    pub fn on_success(mut self, callback: impl FnOnce(&TxId) + Send + 'static) -> Self {
        self.on_success = Some(Box::new(callback));
        self
    }

    /// Called once, after rollback, when the executor rejects.
    #[must_use]
    pub fn on_error(mut self, callback: impl FnOnce(&MutationError) + Send + 'static) -> Self {
        self.on_error = Some(Box::new(callback));
        self
    }

    /// User-facing message attached to every failure of this mutation.
    #[must_use]
    pub fn with_error_message(mut self, message: impl Into<String>) -> Self {
        self.error_message = message.into();
        self
    }
}

/// Pre-image and rollback of a mutation that has not settled yet.
///
/// The rollback runs at most once no matter how many failure paths reach it.
pub struct PendingMutation<P> {
    pre_image: Option<P>,
    rollback: Option<RollbackFn<P>>,
}

impl<P> PendingMutation<P> {
    /// Arms a rollback with its pre-image.
    pub fn new(pre_image: P, rollback: impl FnOnce(&LocalStateStore, P) + Send + 'static) -> Self {
        Self {
            pre_image: Some(pre_image),
            rollback: Some(Box::new(rollback)),
        }
    }

    /// Restores the pre-image. Returns `false` if it already ran.
    pub fn rollback(&mut self, store: &LocalStateStore) -> bool {
        match (self.rollback.take(), self.pre_image.take()) {
            (Some(rollback), Some(pre_image)) => {
                rollback(store, pre_image);
                true
            }
            _ => false,
        }
    }

    /// Drops the rollback without running it.
    pub fn commit(&mut self) {
        self.rollback = None;
        self.pre_image = None;
    }

    /// Whether the mutation was committed or rolled back.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.rollback.is_none()
    }
}

/// Result of [`OptimisticCoordinator::execute`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExecuteOutcome {
    /// The executor resolved.
    Committed {
        /// Submitted transaction.
        tx_id: TxId,
    },
    /// The executor rejected.
    RolledBack {
        /// Failure with the caller's message.
        error: MutationError,
        /// Whether this call performed the rollback.
        rolled_back: bool,
    },
}

impl ExecuteOutcome {
    /// True when committed.
    #[must_use]
    pub const fn success(&self) -> bool {
        matches!(self, Self::Committed { .. })
    }

    /// Transaction id, when committed.
    #[must_use]
    pub const fn tx_id(&self) -> Option<&TxId> {
        match self {
            Self::Committed { tx_id } => Some(tx_id),
            Self::RolledBack { .. } => None,
        }
    }

    /// Failure, when rolled back.
    #[must_use]
    pub const fn error(&self) -> Option<&MutationError> {
        match self {
            Self::Committed { .. } => None,
            Self::RolledBack { error, .. } => Some(error),
        }
    }

    /// Converts into a `Result`.
    ///
    /// # Errors
    ///
    /// The [`MutationError`] of a rolled-back mutation.
    pub fn into_result(self) -> Result<TxId, MutationError> {
        match self {
            Self::Committed { tx_id } => Ok(tx_id),
            Self::RolledBack { error, .. } => Err(error),
        }
    }
}

/// Applies mutations before the chain confirms them.
#[derive(Clone)]
pub struct OptimisticCoordinator {
    store: Arc<LocalStateStore>,
    executor: Arc<dyn TransactionExecutor>,
}

impl OptimisticCoordinator {
    /// Creates a coordinator over the shared store.
    #[must_use]
    pub fn new(store: Arc<LocalStateStore>, executor: Arc<dyn TransactionExecutor>) -> Self {
        Self { store, executor }
    }

    /// Runs one mutation.
    ///
    /// The optimistic update is visible before submission starts. Every kind
    /// of [`ChainError`](crate::error::ChainError) takes the same rollback
    /// path; rollback completes before the error callback runs.
    pub async fn execute<P: Send + 'static>(
        &self,
        calls: Vec<Call>,
        hooks: MutationHooks<P>,
    ) -> ExecuteOutcome {
        let MutationHooks {
            capture_state,
            on_optimistic_update,
            on_rollback,
            on_success,
            on_error,
            error_message,
        } = hooks;

        let mut pending = PendingMutation {
            pre_image: Some(capture_state(&self.store)),
            rollback: Some(on_rollback),
        };
        on_optimistic_update(&self.store);

        let methods: Vec<&'static str> = calls.iter().map(|c| c.method).collect();
        tracing::debug!(?methods, "submitting call batch");

        match self.executor.execute(calls).await {
            Ok(tx_id) => {
                pending.commit();
                tracing::info!(%tx_id, ?methods, "mutation committed");
                if let Some(callback) = on_success {
                    callback(&tx_id);
                }
                ExecuteOutcome::Committed { tx_id }
            }
            Err(cause) => {
                tracing::warn!(error = %cause, ?methods, "submission failed, rolling back");
                let rolled_back = pending.rollback(&self.store);
                let error = MutationError::new(error_message, cause);
                if let Some(callback) = on_error {
                    callback(&error);
                }
                ExecuteOutcome::RolledBack { error, rolled_back }
            }
        }
    }

    /// Submits a batch on a detached task with no rollback.
    ///
    /// For actions the user has already committed to. A failure is logged
    /// and otherwise ignored.
    pub fn submit_detached(&self, calls: Vec<Call>, label: &'static str) -> JoinHandle<()> {
        let executor = Arc::clone(&self.executor);
        tokio::spawn(async move {
            match executor.execute(calls).await {
                Ok(tx_id) => tracing::info!(%tx_id, label, "detached transaction submitted"),
                Err(error) => tracing::error!(%error, label, "detached transaction failed"),
            }
        })
    }

    /// The shared store.
    #[must_use]
    pub fn store(&self) -> &Arc<LocalStateStore> {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::MockExecutor;
    use crate::error::ChainError;
    use alloy_primitives::{Address, U256};
    use kindred_state::{FieldPreImage, MutationClass, Stats, StatusVector};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn owner() -> Address {
        Address::repeat_byte(0x42)
    }

    fn seeded_store() -> Arc<LocalStateStore> {
        let store = LocalStateStore::shared();
        store.connect_wallet(owner());
        store.merge_authoritative(
            StatusVector {
                owner: owner(),
                entity_id: U256::from(9),
                is_alive: true,
                is_awake: true,
                stats: Stats::new(40, 40, 40, 40),
                is_critical: false,
                updated_at: 0,
            },
            false,
        );
        store
    }

    fn feed_hooks() -> MutationHooks<FieldPreImage> {
        MutationHooks::new(
            |store: &LocalStateStore| store.capture_fields(MutationClass::Feed.owned_fields()),
            |store: &LocalStateStore| {
                store.apply_optimistic(|s| s.stats.hunger += 20);
            },
            |store: &LocalStateStore, pre: FieldPreImage| {
                store.restore_fields(&pre);
            },
        )
    }

    fn hunger(store: &LocalStateStore) -> u8 {
        store.status().map_or(0, |s| s.stats.hunger)
    }

    #[tokio::test]
    async fn test_commit_keeps_delta() {
        let store = seeded_store();
        let coordinator = OptimisticCoordinator::new(Arc::clone(&store), Arc::new(MockExecutor::resolving("0xabc")));

        let outcome = coordinator.execute(Vec::new(), feed_hooks()).await;

        assert!(outcome.success());
        assert_eq!(outcome.tx_id(), Some(&TxId::new("0xabc")));
        assert_eq!(hunger(&store), 60);
    }

    #[tokio::test]
    async fn test_rejection_restores_and_reports_once() {
        let store = seeded_store();
        let executor = MockExecutor::rejecting(ChainError::Reverted("insufficient balance".into()));
        let coordinator = OptimisticCoordinator::new(Arc::clone(&store), Arc::new(executor));
        let errors = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&errors);

        let outcome = coordinator
            .execute(
                Vec::new(),
                feed_hooks()
                    .with_error_message("Couldn't feed")
                    .on_error(move |_| {
                        seen.fetch_add(1, Ordering::SeqCst);
                    }),
            )
            .await;

        assert_eq!(hunger(&store), 40);
        assert_eq!(errors.load(Ordering::SeqCst), 1);
        let ExecuteOutcome::RolledBack { error, rolled_back } = outcome else {
            panic!("expected rollback");
        };
        assert!(rolled_back);
        assert_eq!(error.to_string(), "Couldn't feed");
        assert_eq!(error.cause, ChainError::Reverted("insufficient balance".into()));
    }

    #[tokio::test]
    async fn test_optimistic_visible_before_submission_resolves() {
        let store = seeded_store();
        let executor = MockExecutor::resolving("0x1").with_delay(std::time::Duration::from_millis(50));
        let coordinator = OptimisticCoordinator::new(Arc::clone(&store), Arc::new(executor));

        let running = tokio::spawn({
            let coordinator = coordinator.clone();
            async move { coordinator.execute(Vec::new(), feed_hooks()).await }
        });
        tokio::task::yield_now().await;
        assert_eq!(hunger(&store), 60);

        assert!(running.await.unwrap().success());
    }

    #[test]
    fn test_pending_rollback_is_one_shot() {
        let store = seeded_store();
        let pre = store.capture_fields(MutationClass::Feed.owned_fields());
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&runs);
        let mut pending = PendingMutation::new(pre, move |store: &LocalStateStore, pre: FieldPreImage| {
            counter.fetch_add(1, Ordering::SeqCst);
            store.restore_fields(&pre);
        });

        store.apply_optimistic(|s| s.stats.hunger = 90);
        assert!(pending.rollback(&store));
        let after_first = store.status();
        assert!(!pending.rollback(&store));

        assert_eq!(store.status(), after_first);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(pending.is_settled());
    }

    #[tokio::test]
    async fn test_detached_failure_is_not_rolled_back() {
        let store = seeded_store();
        let coordinator =
            OptimisticCoordinator::new(Arc::clone(&store), Arc::new(MockExecutor::rejecting(ChainError::Timeout)));

        store.apply_optimistic(|s| s.stats.energy = 30);
        coordinator.submit_detached(Vec::new(), "consume energy").await.unwrap();

        assert_eq!(store.status().map(|s| s.stats.energy), Some(30));
    }
}
