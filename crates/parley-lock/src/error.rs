//! Error types for lock coordination
//!
//! Acquisition failures are terminal for the call that raised them; nothing in
//! this crate retries on its own. Release failures are never returned, they are
//! reported as `tracing` error events by the releaser.

use std::time::Duration;

use sea_orm::DbErr;

/// Errors raised while acquiring, checking or using a distributed lock
#[derive(thiserror::Error, Debug)]
pub enum LockError {
    /// The registry guard or the process mutex was not obtained within the budget
    #[error("timed out after {timeout:?} waiting for the process mutex of lock '{name}'")]
    MutexTimeout { name: String, timeout: Duration },

    /// The process mutex was obtained but no time was left for the database step
    #[error("lock budget of {timeout:?} for '{name}' was used up before the database lock was requested")]
    BudgetExhausted { name: String, timeout: Duration },

    /// The database did not grant the named lock within the computed seconds
    #[error("database refused lock '{name}' within {seconds}s")]
    DatabaseLockTimeout { name: String, seconds: u64 },

    #[error("database error: {0}")]
    Database(#[from] DbErr),

    /// A lock statement template without exactly one name placeholder
    #[error("malformed lock query: {0}")]
    MalformedLockQuery(String),

    #[error("invalid lock name '{name}': {reason}")]
    InvalidLockName { name: String, reason: String },

    /// The lock statement returned no row or an undecodable column
    #[error("unexpected result from lock query: {0}")]
    UnexpectedLockResult(String),

    /// The lock session was closed and can no longer issue lock statements
    #[error("lock session {0} is closed")]
    SessionClosed(u64),

    /// Work executed under a lock ran past its own timeout
    #[error("work guarded by lock '{name}' exceeded {timeout:?}")]
    WorkTimeout { name: String, timeout: Duration },
}

impl LockError {
    /// True when the acquire budget ran out before the database was asked for the lock
    pub fn is_acquisition_timeout(&self) -> bool {
        matches!(
            self,
            LockError::MutexTimeout { .. } | LockError::BudgetExhausted { .. }
        )
    }

    /// True when the database explicitly refused the lock
    pub fn is_lock_denied(&self) -> bool {
        matches!(self, LockError::DatabaseLockTimeout { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquisition_timeout_classification() {
        let mutex_timeout = LockError::MutexTimeout {
            name: "MIGRATE".to_string(),
            timeout: Duration::from_millis(50),
        };
        let exhausted = LockError::BudgetExhausted {
            name: "MIGRATE".to_string(),
            timeout: Duration::from_millis(50),
        };
        let denied = LockError::DatabaseLockTimeout {
            name: "MIGRATE".to_string(),
            seconds: 1,
        };

        assert!(mutex_timeout.is_acquisition_timeout());
        assert!(exhausted.is_acquisition_timeout());
        assert!(!denied.is_acquisition_timeout());
        assert!(denied.is_lock_denied());
        assert!(!mutex_timeout.is_lock_denied());
    }

    #[test]
    fn test_error_messages() {
        let err = LockError::DatabaseLockTimeout {
            name: "DB_LOCK".to_string(),
            seconds: 3,
        };
        assert_eq!(err.to_string(), "database refused lock 'DB_LOCK' within 3s");

        let err = LockError::MalformedLockQuery("no placeholder".to_string());
        assert_eq!(err.to_string(), "malformed lock query: no placeholder");
    }
}
