//! In-process emulation of session-scoped named locks
//!
//! [`InMemoryLockEngine`] plays the role of the database engine: it hands out
//! sessions, and every lock belongs to the session that acquired it. Locks are
//! re-entrant per session and need as many releases as acquires. Closing or
//! dropping a session releases everything it holds, the same way a database
//! disconnect does.
//!
//! Useful for single-instance deployments without a shared database and for
//! simulating several service instances inside one test process.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::debug;

use crate::mysql::encode_lock_name;
use crate::{AdvisoryLockClient, LockError};

#[derive(Debug)]
struct Holder {
    session: u64,
    depth: u32,
}

#[derive(Debug, Default)]
struct EngineState {
    holders: HashMap<String, Holder>,
    next_session: u64,
}

#[derive(Debug, Default)]
struct EngineInner {
    state: Mutex<EngineState>,
    released: Notify,
}

/// Shared lock table standing in for the database engine
#[derive(Debug, Clone, Default)]
pub struct InMemoryLockEngine {
    inner: Arc<EngineInner>,
}

impl InMemoryLockEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new session on this engine
    pub fn session(&self) -> InMemoryLockSession {
        let id = {
            let mut state = self.inner.state.lock();
            state.next_session += 1;
            state.next_session
        };

        InMemoryLockSession {
            id,
            engine: self.clone(),
            closed: AtomicBool::new(false),
        }
    }

    /// Id of the session holding `name`, if any
    pub fn holder_of(&self, name: &str) -> Option<u64> {
        let key = encode_lock_name(name).ok()?;
        self.inner.state.lock().holders.get(&key).map(|h| h.session)
    }

    fn is_taken(&self, key: &str) -> bool {
        self.inner.state.lock().holders.contains_key(key)
    }

    /// Number of locks currently held across all sessions
    pub fn held_count(&self) -> usize {
        self.inner.state.lock().holders.len()
    }

    fn try_take(&self, key: &str, session: u64) -> bool {
        let mut state = self.inner.state.lock();
        match state.holders.get_mut(key) {
            None => {
                state
                    .holders
                    .insert(key.to_string(), Holder { session, depth: 1 });
                true
            }
            Some(holder) if holder.session == session => {
                holder.depth += 1;
                true
            }
            Some(_) => false,
        }
    }

    fn give_back(&self, key: &str, session: u64) -> bool {
        let freed = {
            let mut state = self.inner.state.lock();
            match state.holders.get_mut(key) {
                Some(holder) if holder.session == session => {
                    holder.depth -= 1;
                    if holder.depth == 0 {
                        state.holders.remove(key);
                        true
                    } else {
                        false
                    }
                }
                _ => false,
            }
        };

        if freed {
            self.inner.released.notify_waiters();
        }
        freed
    }

    fn release_session(&self, session: u64) -> usize {
        let freed = {
            let mut state = self.inner.state.lock();
            let before = state.holders.len();
            state.holders.retain(|_, holder| holder.session != session);
            before - state.holders.len()
        };

        if freed > 0 {
            self.inner.released.notify_waiters();
        }
        freed
    }
}

/// One session on an [`InMemoryLockEngine`]
#[derive(Debug)]
pub struct InMemoryLockSession {
    id: u64,
    engine: InMemoryLockEngine,
    closed: AtomicBool,
}

impl InMemoryLockSession {
    pub fn id(&self) -> u64 {
        self.id
    }

    fn ensure_open(&self) -> Result<(), LockError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(LockError::SessionClosed(self.id));
        }
        Ok(())
    }
}

#[async_trait]
impl AdvisoryLockClient for InMemoryLockSession {
    async fn try_acquire(&self, name: &str, timeout_secs: u64) -> Result<bool, LockError> {
        self.ensure_open()?;
        let key = encode_lock_name(name)?;
        let deadline = Instant::now() + Duration::from_secs(timeout_secs);

        loop {
            // Register for wake-ups before checking, so a release between the
            // check and the wait is not missed.
            let mut released = std::pin::pin!(self.engine.inner.released.notified());
            released.as_mut().enable();

            if self.engine.try_take(&key, self.id) {
                debug!(lock = %name, session = self.id, "Granted named lock");
                return Ok(true);
            }

            if tokio::time::timeout_at(deadline, released).await.is_err() {
                debug!(lock = %name, session = self.id, timeout_secs, "Named lock wait timed out");
                return Ok(false);
            }
            self.ensure_open()?;
        }
    }

    async fn is_held_by_any_session(&self, name: &str) -> Result<bool, LockError> {
        self.ensure_open()?;
        let key = encode_lock_name(name)?;
        Ok(self.engine.is_taken(&key))
    }

    async fn release(&self, name: &str) -> Result<(), LockError> {
        self.ensure_open()?;
        let key = encode_lock_name(name)?;
        let freed = self.engine.give_back(&key, self.id);
        debug!(lock = %name, session = self.id, freed, "Released named lock");
        Ok(())
    }

    async fn close(&self) -> Result<(), LockError> {
        if !self.closed.swap(true, Ordering::AcqRel) {
            let freed = self.engine.release_session(self.id);
            debug!(session = self.id, freed, "Closed lock session");
        }
        Ok(())
    }
}

impl Drop for InMemoryLockSession {
    fn drop(&mut self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.engine.release_session(self.id);
        }
    }
}
