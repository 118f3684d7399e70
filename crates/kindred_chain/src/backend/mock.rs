//! # Mock Backends
//!
//! Scripted implementations of every backend, for tests and demos.
//! Each mock replays a queue of responses; once the queue is empty the
//! fallback response repeats.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use alloy_primitives::Address;
use async_trait::async_trait;
use kindred_state::EntitySnapshot;
use parking_lot::Mutex;

use super::{AuthoritativeReader, Clock, Indexer, StatusRead, TransactionExecutor, TxId};
use crate::contracts::Call;
use crate::error::{ChainError, IndexerError, ReadError};

struct Script<T> {
    queue: VecDeque<T>,
    fallback: T,
}

impl<T: Clone> Script<T> {
    fn new(fallback: T) -> Self {
        Self {
            queue: VecDeque::new(),
            fallback,
        }
    }

    fn next(&mut self) -> T {
        self.queue.pop_front().unwrap_or_else(|| self.fallback.clone())
    }
}

/// Executor that replays scripted outcomes and records every batch.
pub struct MockExecutor {
    script: Mutex<Script<Result<TxId, ChainError>>>,
    submitted: Mutex<Vec<Vec<Call>>>,
    delay: Option<Duration>,
}

impl MockExecutor {
    /// Always resolves with the given id.
    #[must_use]
    pub fn resolving(tx_id: &str) -> Self {
        Self::with_fallback(Ok(TxId::new(tx_id)))
    }

    /// Always rejects with the given error.
    #[must_use]
    pub fn rejecting(error: ChainError) -> Self {
        Self::with_fallback(Err(error))
    }

    fn with_fallback(fallback: Result<TxId, ChainError>) -> Self {
        Self {
            script: Mutex::new(Script::new(fallback)),
            submitted: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    /// Queues one outcome ahead of the fallback.
    #[must_use]
    pub fn then(self, outcome: Result<TxId, ChainError>) -> Self {
        self.script.lock().queue.push_back(outcome);
        self
    }

    /// Holds every submission for this long before resolving.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Every batch submitted so far.
    #[must_use]
    pub fn submitted(&self) -> Vec<Vec<Call>> {
        self.submitted.lock().clone()
    }
}

#[async_trait]
impl TransactionExecutor for MockExecutor {
    async fn execute(&self, calls: Vec<Call>) -> Result<TxId, ChainError> {
        self.submitted.lock().push(calls);
        let outcome = self.script.lock().next();
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        outcome
    }
}

/// Authoritative reader that replays scripted reads.
pub struct MockReader {
    script: Mutex<Script<Result<StatusRead, ReadError>>>,
    reads: AtomicUsize,
}

impl MockReader {
    /// Repeats the given read forever.
    #[must_use]
    pub fn always(read: Result<StatusRead, ReadError>) -> Self {
        Self {
            script: Mutex::new(Script::new(read)),
            reads: AtomicUsize::new(0),
        }
    }

    /// Queues one read ahead of the fallback.
    #[must_use]
    pub fn then(self, read: Result<StatusRead, ReadError>) -> Self {
        self.script.lock().queue.push_back(read);
        self
    }

    /// Replaces the fallback read.
    pub fn set_fallback(&self, read: Result<StatusRead, ReadError>) {
        self.script.lock().fallback = read;
    }

    /// Number of reads served.
    #[must_use]
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl AuthoritativeReader for MockReader {
    async fn get_status(&self, _owner: Address) -> Result<StatusRead, ReadError> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        self.script.lock().next()
    }
}

/// Indexer that replays scripted snapshots.
pub struct MockIndexer {
    script: Mutex<Script<Result<Option<EntitySnapshot>, IndexerError>>>,
    fetches: AtomicUsize,
}

impl MockIndexer {
    /// Repeats the given result forever.
    #[must_use]
    pub fn always(result: Result<Option<EntitySnapshot>, IndexerError>) -> Self {
        Self {
            script: Mutex::new(Script::new(result)),
            fetches: AtomicUsize::new(0),
        }
    }

    /// Queues one result ahead of the fallback.
    #[must_use]
    pub fn then(self, result: Result<Option<EntitySnapshot>, IndexerError>) -> Self {
        self.script.lock().queue.push_back(result);
        self
    }

    /// Number of fetches served.
    #[must_use]
    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Indexer for MockIndexer {
    async fn fetch_entity(&self, _owner: Address) -> Result<Option<EntitySnapshot>, IndexerError> {
        self.fetches.fetch_add(1, Ordering::Relaxed);
        self.script.lock().next()
    }
}

/// Clock that returns immediately and records every requested sleep.
#[derive(Default)]
pub struct RecordingClock {
    sleeps: Mutex<Vec<Duration>>,
}

impl RecordingClock {
    /// Creates a clock with no recorded sleeps.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every sleep requested so far.
    #[must_use]
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().clone()
    }

    /// Total simulated time.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.sleeps.lock().iter().sum()
    }
}

#[async_trait]
impl Clock for RecordingClock {
    async fn sleep(&self, duration: Duration) {
        self.sleeps.lock().push(duration);
        tokio::task::yield_now().await;
    }
}
