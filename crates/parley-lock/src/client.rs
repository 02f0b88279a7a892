use async_trait::async_trait;

use crate::LockError;

/// Session-scoped named locks provided by the database engine.
///
/// The engine binds lock ownership to the session that issued the acquire, so
/// every call on one client must travel over the same session. Implementations
/// pin themselves to a single connection that is never shared with ordinary
/// application queries. Losing that session releases every lock it held.
#[async_trait]
pub trait AdvisoryLockClient: Send + Sync {
    /// Request the named lock, waiting up to `timeout_secs` whole seconds.
    ///
    /// Returns `Ok(false)` when the lock was not granted in time.
    async fn try_acquire(&self, name: &str, timeout_secs: u64) -> Result<bool, LockError>;

    /// Whether any session, not necessarily this one, currently holds the lock
    async fn is_held_by_any_session(&self, name: &str) -> Result<bool, LockError>;

    /// Release the lock if this session holds it; a no-op otherwise
    async fn release(&self, name: &str) -> Result<(), LockError>;

    /// Close the session, implicitly releasing all locks it holds
    async fn close(&self) -> Result<(), LockError>;
}
