//! Shared helpers for lock coordination tests
//!
//! - CountingClient: wraps a lock client, counts the calls reaching it and can slow releases down
//! - instance(): a coordinator on its own session, standing in for one service instance

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parley_lock::{AdvisoryLockClient, DistributedLockCoordinator, InMemoryLockEngine, LockError};
use sea_orm::DbErr;

pub fn ms(millis: u64) -> Duration {
    Duration::from_millis(millis)
}

pub fn secs(secs: u64) -> Duration {
    Duration::from_secs(secs)
}

/// A coordinator with its own session on `engine`, like a separate service instance
#[allow(dead_code)]
pub fn instance(engine: &InMemoryLockEngine) -> Arc<DistributedLockCoordinator> {
    Arc::new(DistributedLockCoordinator::new(Arc::new(engine.session())))
}

/// Lock client that counts calls and can fail the next acquire on demand
#[allow(dead_code)]
pub struct CountingClient {
    inner: Arc<dyn AdvisoryLockClient>,
    acquires: AtomicUsize,
    releases: AtomicUsize,
    fail_next_acquire: AtomicBool,
    release_delay_ms: AtomicU64,
}

#[allow(dead_code)]
impl CountingClient {
    pub fn new(inner: Arc<dyn AdvisoryLockClient>) -> Arc<Self> {
        Arc::new(Self {
            inner,
            acquires: AtomicUsize::new(0),
            releases: AtomicUsize::new(0),
            fail_next_acquire: AtomicBool::new(false),
            release_delay_ms: AtomicU64::new(0),
        })
    }

    pub fn acquires(&self) -> usize {
        self.acquires.load(Ordering::SeqCst)
    }

    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }

    pub fn fail_next_acquire(&self) {
        self.fail_next_acquire.store(true, Ordering::SeqCst);
    }

    /// Make every release wait `delay` before reaching the inner client
    pub fn delay_releases(&self, delay: Duration) {
        self.release_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }
}

#[async_trait]
impl AdvisoryLockClient for CountingClient {
    async fn try_acquire(&self, name: &str, timeout_secs: u64) -> Result<bool, LockError> {
        self.acquires.fetch_add(1, Ordering::SeqCst);
        if self.fail_next_acquire.swap(false, Ordering::SeqCst) {
            return Err(LockError::Database(DbErr::Custom(
                "connection reset by peer".to_string(),
            )));
        }
        self.inner.try_acquire(name, timeout_secs).await
    }

    async fn is_held_by_any_session(&self, name: &str) -> Result<bool, LockError> {
        self.inner.is_held_by_any_session(name).await
    }

    async fn release(&self, name: &str) -> Result<(), LockError> {
        self.releases.fetch_add(1, Ordering::SeqCst);
        let delay = self.release_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        self.inner.release(name).await
    }

    async fn close(&self) -> Result<(), LockError> {
        self.inner.close().await
    }
}
