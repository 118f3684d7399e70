//! # Status Poller
//!
//! Periodically reads the authoritative status and routes it through the
//! reconciler into the store.
//!
//! ## Per-Fetch Outcomes
//!
//! | Read result      | Effect on store                              |
//! |------------------|----------------------------------------------|
//! | status vector    | validated, then merged                       |
//! | dead vector      | merged, then status cleared, polling stops   |
//! | no entity        | entity marked absent, polling stops          |
//! | error            | none (logged, retried on the next tick)      |
//!
//! The poller takes no mutation lock. A read that lands while a mutation is
//! in flight either agrees with the optimistic value or is absorbed by the
//! store's in-flight carry-over.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use alloy_primitives::U256;
use kindred_state::{EntityReconciler, LocalStateStore, MergeOutcome};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::backend::{AuthoritativeReader, StatusRead};
use crate::error::ReadError;

/// Why a fetch did not run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    /// No wallet connected.
    NoWallet,
    /// Another fetch has not returned yet.
    InProgress,
    /// The wallet changed while the read was outstanding.
    WalletChanged,
}

/// Result of one fetch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PollOutcome {
    /// Vector validated and stored.
    Merged(U256),
    /// Vector stored, but the entity is no longer alive.
    EntityDied(U256),
    /// Vector failed validation and was discarded.
    Absorbed,
    /// The owner has no live entity.
    EntityAbsent,
    /// Transient read failure. Store untouched.
    Failed(ReadError),
    /// Nothing was read.
    Skipped(SkipReason),
}

/// Clears the in-progress flag when the fetch finishes, however it finishes.
struct FetchGuard<'a>(&'a AtomicBool);

impl Drop for FetchGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Background reader of the authoritative status.
pub struct StatusPoller {
    store: Arc<LocalStateStore>,
    reader: Arc<dyn AuthoritativeReader>,
    reconciler: EntityReconciler,
    interval: Duration,
    fetch_in_progress: AtomicBool,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl StatusPoller {
    /// Creates a stopped poller.
    #[must_use]
    pub fn new(
        store: Arc<LocalStateStore>,
        reader: Arc<dyn AuthoritativeReader>,
        interval: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            reconciler: EntityReconciler::new(Arc::clone(&store)),
            store,
            reader,
            interval,
            fetch_in_progress: AtomicBool::new(false),
            timer: Mutex::new(None),
        })
    }

    /// Reads once and applies the result.
    pub async fn fetch_latest_status(&self) -> PollOutcome {
        let Some(owner) = self.store.wallet() else {
            return PollOutcome::Skipped(SkipReason::NoWallet);
        };
        if self
            .fetch_in_progress
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!("fetch already in progress");
            return PollOutcome::Skipped(SkipReason::InProgress);
        }
        let _guard = FetchGuard(&self.fetch_in_progress);

        let read = self.reader.get_status(owner).await;

        if self.store.wallet() != Some(owner) {
            tracing::debug!(%owner, "wallet changed during read, discarding");
            return PollOutcome::Skipped(SkipReason::WalletChanged);
        }

        match read {
            Ok(StatusRead::Vector(vector)) => {
                if !self.reconciler.validate(&vector) {
                    return PollOutcome::Absorbed;
                }
                match self.store.merge_authoritative(vector, false) {
                    MergeOutcome::Stored if !vector.has_live_entity() => {
                        tracing::info!(entity = %vector.entity_id, "entity no longer alive");
                        self.stop_polling();
                        self.store.clear_status();
                        PollOutcome::EntityDied(vector.entity_id)
                    }
                    MergeOutcome::Stored => {
                        tracing::debug!(entity = %vector.entity_id, hunger = vector.stats.hunger,
                            energy = vector.stats.energy, "status merged");
                        PollOutcome::Merged(vector.entity_id)
                    }
                    MergeOutcome::Rejected => PollOutcome::Absorbed,
                }
            }
            Ok(StatusRead::NoEntity) => {
                tracing::info!(%owner, "no live entity");
                self.store.mark_absent();
                self.stop_polling();
                PollOutcome::EntityAbsent
            }
            Err(error) => {
                tracing::warn!(%error, "status read failed");
                PollOutcome::Failed(error)
            }
        }
    }

    /// Starts the timer. The first fetch fires immediately.
    ///
    /// Each tick spawns its own fetch; a no-op if already polling.
    pub fn start_polling(self: &Arc<Self>, interval: Duration) {
        let mut timer = self.timer.lock();
        if timer.as_ref().is_some_and(|t| !t.is_finished()) {
            return;
        }

        let weak: Weak<Self> = Arc::downgrade(self);
        *timer = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(poller) = weak.upgrade() else {
                    break;
                };
                tokio::spawn(async move {
                    poller.fetch_latest_status().await;
                });
            }
        }));
        tracing::info!(interval_ms = interval.as_millis(), "polling started");
    }

    /// Stops the timer. Fetches already running complete normally.
    pub fn stop_polling(&self) {
        if let Some(timer) = self.timer.lock().take() {
            timer.abort();
            tracing::info!("polling stopped");
        }
    }

    /// Whether the timer is running.
    #[must_use]
    pub fn is_polling(&self) -> bool {
        self.timer.lock().as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Polls while a wallet is connected and a live entity is believed to
    /// exist; otherwise stops and clears the stored status.
    ///
    /// Returns whether polling is active afterwards.
    pub fn update_lifecycle(self: &Arc<Self>) -> bool {
        if self.store.wallet().is_some() && self.store.has_live_entity() {
            self.start_polling(self.interval);
            true
        } else {
            self.stop_polling();
            self.store.clear_status();
            false
        }
    }

    /// Configured interval.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }
}

impl Drop for StatusPoller {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.get_mut().take() {
            timer.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::MockReader;
    use alloy_primitives::Address;
    use async_trait::async_trait;
    use kindred_state::{Descriptor, EntitySnapshot, Stats, StatusVector};

    fn owner() -> Address {
        Address::repeat_byte(0x5a)
    }

    fn vector(id: u64) -> StatusVector {
        StatusVector {
            owner: owner(),
            entity_id: U256::from(id),
            is_alive: true,
            is_awake: true,
            stats: Stats::new(70, 70, 70, 70),
            is_critical: false,
            updated_at: 10,
        }
    }

    fn store_with_indexed(id: u64) -> Arc<LocalStateStore> {
        let store = LocalStateStore::shared();
        store.connect_wallet(owner());
        let mut snapshot = EntitySnapshot::thin(&vector(id));
        snapshot.descriptor = Some(Descriptor {
            species: "cat".into(),
            name: "Miso".into(),
            born_at: 0,
        });
        store.set_indexer_snapshot(snapshot).unwrap();
        store
    }

    fn poller(store: &Arc<LocalStateStore>, reader: MockReader) -> (Arc<StatusPoller>, Arc<MockReader>) {
        let reader = Arc::new(reader);
        let poller = StatusPoller::new(Arc::clone(store), reader.clone(), Duration::from_secs(5));
        (poller, reader)
    }

    #[tokio::test]
    async fn test_vector_merged() {
        let store = store_with_indexed(7);
        let (poller, _) = poller(&store, MockReader::always(Ok(StatusRead::Vector(vector(7)))));

        assert_eq!(poller.fetch_latest_status().await, PollOutcome::Merged(U256::from(7)));
        assert_eq!(store.status(), Some(vector(7)));
        assert!(store.snapshot().unwrap().descriptor.is_some());
    }

    #[tokio::test]
    async fn test_drifted_vector_converges() {
        let store = store_with_indexed(41);
        let (poller, _) = poller(&store, MockReader::always(Ok(StatusRead::Vector(vector(42)))));

        assert_eq!(poller.fetch_latest_status().await, PollOutcome::Merged(U256::from(42)));
        assert_eq!(store.current_entity_id(), Some(U256::from(42)));
        assert!(store.snapshot().unwrap().is_thin());
    }

    #[tokio::test]
    async fn test_no_entity_marks_absent() {
        let store = store_with_indexed(7);
        let (poller, _) = poller(&store, MockReader::always(Ok(StatusRead::NoEntity)));

        assert_eq!(poller.fetch_latest_status().await, PollOutcome::EntityAbsent);
        assert!(store.is_absent());
        assert!(!store.has_live_entity());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dead_vector_stops_polling() {
        let store = store_with_indexed(7);
        let mut dead = vector(7);
        dead.is_alive = false;
        let (poller, _) = poller(&store, MockReader::always(Ok(StatusRead::Vector(dead))));

        poller.start_polling(Duration::from_secs(5));
        assert!(poller.is_polling());
        assert_eq!(poller.fetch_latest_status().await, PollOutcome::EntityDied(U256::from(7)));

        assert!(!poller.is_polling());
        assert!(store.status().is_none());
        assert!(!store.has_live_entity());
        assert!(!poller.update_lifecycle());
    }

    #[tokio::test]
    async fn test_read_error_leaves_store_untouched() {
        let store = store_with_indexed(7);
        store.merge_authoritative(vector(7), false);
        let before = (store.snapshot(), store.status());
        let (poller, _) = poller(&store, MockReader::always(Err(ReadError::Transport("reset".into()))));

        assert!(matches!(poller.fetch_latest_status().await, PollOutcome::Failed(_)));
        assert_eq!((store.snapshot(), store.status()), before);
    }

    #[tokio::test]
    async fn test_no_wallet_skips() {
        let store = LocalStateStore::shared();
        let (poller, reader) = poller(&store, MockReader::always(Ok(StatusRead::NoEntity)));

        assert_eq!(poller.fetch_latest_status().await, PollOutcome::Skipped(SkipReason::NoWallet));
        assert_eq!(reader.reads(), 0);
    }

    struct SlowReader(StatusVector);

    #[async_trait]
    impl AuthoritativeReader for SlowReader {
        async fn get_status(&self, _owner: Address) -> Result<StatusRead, ReadError> {
            tokio::time::sleep(Duration::from_secs(1)).await;
            Ok(StatusRead::Vector(self.0))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlapping_fetch_skipped() {
        let store = store_with_indexed(7);
        let poller = StatusPoller::new(Arc::clone(&store), Arc::new(SlowReader(vector(7))), Duration::from_secs(5));

        let first = tokio::spawn({
            let poller = Arc::clone(&poller);
            async move { poller.fetch_latest_status().await }
        });
        tokio::task::yield_now().await;

        assert_eq!(poller.fetch_latest_status().await, PollOutcome::Skipped(SkipReason::InProgress));
        assert_eq!(first.await.unwrap(), PollOutcome::Merged(U256::from(7)));
        assert_eq!(poller.fetch_latest_status().await, PollOutcome::Merged(U256::from(7)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wallet_switch_discards_read() {
        let store = store_with_indexed(7);
        let poller = StatusPoller::new(Arc::clone(&store), Arc::new(SlowReader(vector(7))), Duration::from_secs(5));

        let fetch = tokio::spawn({
            let poller = Arc::clone(&poller);
            async move { poller.fetch_latest_status().await }
        });
        tokio::task::yield_now().await;
        store.connect_wallet(Address::repeat_byte(0x01));

        assert_eq!(fetch.await.unwrap(), PollOutcome::Skipped(SkipReason::WalletChanged));
        assert!(store.status().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_start_and_stop() {
        let store = store_with_indexed(7);
        let (poller, reader) = poller(&store, MockReader::always(Ok(StatusRead::Vector(vector(7)))));

        poller.start_polling(Duration::from_secs(5));
        assert!(poller.is_polling());
        tokio::time::sleep(Duration::from_secs(11)).await;
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }
        assert!(reader.reads() >= 2);

        poller.stop_polling();
        assert!(!poller.is_polling());
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }
        let settled = reader.reads();
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(reader.reads(), settled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lifecycle_follows_wallet_and_entity() {
        let store = store_with_indexed(7);
        store.merge_authoritative(vector(7), false);
        let (poller, _) = poller(&store, MockReader::always(Ok(StatusRead::Vector(vector(7)))));

        assert!(poller.update_lifecycle());
        assert!(poller.is_polling());

        store.disconnect_wallet();
        assert!(!poller.update_lifecycle());
        assert!(!poller.is_polling());
        assert!(store.status().is_none());
    }
}
