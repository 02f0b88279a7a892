use std::time::Duration;

use parley_lock::LockError;
use sea_orm::DbErr;

/// Failures raised by the persistence service itself.
///
/// Errors produced by transactional work are never wrapped in this type;
/// they reach the caller unchanged.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error(transparent)]
    Lock(#[from] LockError),

    #[error("database error: {0}")]
    Database(#[from] DbErr),

    #[error("transaction did not finish within {timeout:?}")]
    TransactionTimeout { timeout: Duration },
}

impl PersistenceError {
    /// The lock budget ran out before the lock was held
    pub fn is_acquisition_timeout(&self) -> bool {
        matches!(self, Self::Lock(e) if e.is_acquisition_timeout())
    }

    /// The database refused the lock
    pub fn is_lock_denied(&self) -> bool {
        matches!(self, Self::Lock(e) if e.is_lock_denied())
    }
}
