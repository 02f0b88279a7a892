//! Distributed lock coordination
//!
//! A distributed lock is taken in two layers, always in the same order:
//!
//! 1. the process-local mutex for the lock name, which serializes callers
//!    inside this process and keeps them from racing to the database;
//! 2. the database named lock, which serializes this process against every
//!    other instance sharing the database.
//!
//! Release runs in reverse order (database, then mutex), so the database lock
//! is never held without the process-local exclusion that goes with it. Both
//! steps share one timeout budget: the database wait gets only what the mutex
//! step left over.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::OwnedMutexGuard;
use tokio::time::Instant;
use tracing::{debug, error, warn};

use crate::{AdvisoryLockClient, LockError, NamedMutexRegistry, Timer};

/// Whole seconds handed to the database for the remaining budget.
///
/// Rounds up, with a floor of one second. Sub-second precision near the
/// deadline is knowingly traded away because the engine only takes seconds.
pub fn database_timeout_secs(remaining: Duration) -> u64 {
    let remaining_ms = remaining.as_millis();
    if remaining_ms > 1000 {
        remaining_ms.div_ceil(1000) as u64
    } else {
        1
    }
}

/// Composes the process mutex registry and the database lock session.
///
/// Owns exactly one [`AdvisoryLockClient`], which must never be shared with
/// anything else, since lock ownership in the database follows that session.
pub struct DistributedLockCoordinator {
    registry: NamedMutexRegistry,
    client: Arc<dyn AdvisoryLockClient>,
    clock: fn() -> Instant,
}

impl DistributedLockCoordinator {
    pub fn new(client: Arc<dyn AdvisoryLockClient>) -> Self {
        Self {
            registry: NamedMutexRegistry::new(),
            client,
            clock: Instant::now,
        }
    }

    #[cfg(test)]
    fn with_clock(mut self, clock: fn() -> Instant) -> Self {
        self.clock = clock;
        self
    }

    pub fn registry(&self) -> &NamedMutexRegistry {
        &self.registry
    }

    pub fn client(&self) -> &Arc<dyn AdvisoryLockClient> {
        &self.client
    }

    /// Acquire the distributed lock `name` within `timeout`.
    ///
    /// On success the returned [`LockReleaser`] holds both layers. On failure
    /// nothing is left held: the process mutex is released before returning.
    pub async fn acquire(&self, name: &str, timeout: Duration) -> Result<LockReleaser, LockError> {
        let timer = Timer::start_with(self.clock);
        debug!(lock = %name, timeout_ms = timeout.as_millis() as u64, "Acquiring distributed lock");

        let mutex_guard = self.acquire_mutex(name, timeout, &timer).await?;

        let Some(remaining) = timer.remaining(timeout) else {
            error!(lock = %name, elapsed_ms = timer.elapsed_ms(), "Could not acquire mutex within the lock budget");
            drop(mutex_guard);
            return Err(LockError::BudgetExhausted {
                name: name.to_string(),
                timeout,
            });
        };

        let seconds = database_timeout_secs(remaining);
        debug!(lock = %name, remaining_ms = remaining.as_millis() as u64, seconds, "Acquiring database lock");

        match self.client.try_acquire(name, seconds).await {
            Ok(true) => {}
            Ok(false) => {
                error!(lock = %name, seconds, "Could not acquire database lock");
                debug!(lock = %name, "Releasing mutex");
                drop(mutex_guard);
                return Err(LockError::DatabaseLockTimeout {
                    name: name.to_string(),
                    seconds,
                });
            }
            Err(e) => {
                error!(lock = %name, error = %e, "Database lock request failed");
                debug!(lock = %name, "Releasing mutex");
                drop(mutex_guard);
                return Err(e);
            }
        }

        debug!(lock = %name, elapsed_ms = timer.elapsed_ms(), "Acquired distributed lock");
        Ok(LockReleaser {
            name: name.to_string(),
            mutex_guard: Some(mutex_guard),
            client: self.client.clone(),
        })
    }

    async fn acquire_mutex(
        &self,
        name: &str,
        timeout: Duration,
        timer: &Timer,
    ) -> Result<OwnedMutexGuard<()>, LockError> {
        let mutex_timeout = || LockError::MutexTimeout {
            name: name.to_string(),
            timeout,
        };

        let mutex = self.registry.get_or_create(name, timeout).await?;
        let remaining = timer.remaining(timeout).ok_or_else(mutex_timeout)?;

        debug!(lock = %name, "Acquiring named mutex");
        tokio::time::timeout(remaining, mutex.lock_owned())
            .await
            .map_err(|_| mutex_timeout())
    }

    /// Whether any session, in this process or another, holds the database lock `name`
    pub async fn is_lock_held_by_any_session(&self, name: &str) -> Result<bool, LockError> {
        self.client.is_held_by_any_session(name).await
    }
}

/// Single-use handle that undoes a successful [`DistributedLockCoordinator::acquire`].
///
/// Calling [`release`](Self::release) again after the first time does nothing.
/// A releaser dropped while still holding the lock schedules the release on
/// the current tokio runtime.
pub struct LockReleaser {
    name: String,
    mutex_guard: Option<OwnedMutexGuard<()>>,
    client: Arc<dyn AdvisoryLockClient>,
}

impl LockReleaser {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_released(&self) -> bool {
        self.mutex_guard.is_none()
    }

    /// Release the database lock, then the process mutex.
    ///
    /// A failed database release is logged and otherwise ignored; the mutex is
    /// released regardless. The database lock still goes away with the session.
    ///
    /// If this future is dropped before the database answers, the releaser
    /// still holds the lock and its `Drop` finishes the release.
    pub async fn release(&mut self) {
        if self.mutex_guard.is_none() {
            debug!(lock = %self.name, "Lock already released");
            return;
        }

        release_database_lock(self.client.as_ref(), &self.name).await;

        debug!(lock = %self.name, "Releasing mutex");
        self.mutex_guard = None;
        debug!(lock = %self.name, "Released mutex");
    }
}

async fn release_database_lock(client: &dyn AdvisoryLockClient, name: &str) {
    debug!(lock = %name, "Releasing database lock");
    match client.release(name).await {
        Ok(()) => debug!(lock = %name, "Released database lock"),
        Err(e) => error!(lock = %name, error = %e, "Could not release database lock"),
    }
}

impl Drop for LockReleaser {
    fn drop(&mut self) {
        let Some(mutex_guard) = self.mutex_guard.take() else {
            return;
        };

        warn!(lock = %self.name, "Lock releaser dropped while holding the lock");
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let client = self.client.clone();
                let name = std::mem::take(&mut self.name);
                handle.spawn(async move {
                    release_database_lock(client.as_ref(), &name).await;
                    drop(mutex_guard);
                });
            }
            Err(_) => {
                // The mutex stays locked: freeing it would let the next caller
                // re-enter a database lock nobody releases.
                error!(
                    lock = %self.name,
                    "No runtime to release the database lock; both layers stay held until the lock session closes"
                );
                std::mem::forget(mutex_guard);
            }
        }
    }
}

impl std::fmt::Debug for LockReleaser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockReleaser")
            .field("name", &self.name)
            .field("released", &self.is_released())
            .finish()
    }
}
