//! Persistence service
//!
//! Holds two connections to the same MySQL server:
//! - the application pool, used for every query and transaction
//! - the lock session, a pool of exactly one connection owned by the
//!   [`DistributedLockCoordinator`] and never used for anything else
//!
//! Connect opens the lock session first; close tears the application pool
//! down first, so locks stay valid while application work drains.

use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use parley_lock::{
    AdvisoryLockClient, DistributedLockCoordinator, LockError, LockReleaser, MySqlLockClient,
};
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, DatabaseTransaction, TransactionTrait};
use tracing::{debug, info, warn};

use crate::config::{DEFAULT_TRANSACTION_TIMEOUT, DatabaseConfig, LockDefaults};
use crate::{ComponentStatus, PersistenceError};

pub struct PersistenceService {
    db: DatabaseConnection,
    coordinator: DistributedLockCoordinator,
    lock_defaults: LockDefaults,
}

impl PersistenceService {
    /// Open the lock session, then the application pool.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, PersistenceError> {
        debug!("Connecting lock session");
        let lock_client = MySqlLockClient::connect(config.lock_session_options()).await?;
        debug!("Connected lock session");

        debug!("Connecting application pool");
        let db = match Database::connect(config.connect_options()).await {
            Ok(db) => db,
            Err(e) => {
                if let Err(close_err) = lock_client.close().await {
                    warn!(error = %close_err, "Failed to close lock session");
                }
                return Err(e.into());
            }
        };
        debug!("Connected application pool");

        info!(
            max_connections = config.max_connections,
            min_connections = config.min_connections,
            connect_timeout = config.connect_timeout.as_secs(),
            idle_timeout = config.idle_timeout.as_secs(),
            max_lifetime = config.max_lifetime.as_secs(),
            query_logging = config.query_logging,
            "Database connection pool configured"
        );

        let coordinator = DistributedLockCoordinator::new(Arc::new(lock_client));
        Ok(Self::new(db, coordinator))
    }

    /// Assemble a service from an existing pool and coordinator.
    ///
    /// The coordinator's lock client must not share a connection with `db`.
    pub fn new(db: DatabaseConnection, coordinator: DistributedLockCoordinator) -> Self {
        Self {
            db,
            coordinator,
            lock_defaults: LockDefaults::default(),
        }
    }

    pub fn with_lock_defaults(mut self, lock_defaults: LockDefaults) -> Self {
        self.lock_defaults = lock_defaults;
        self
    }

    pub fn db(&self) -> &DatabaseConnection {
        &self.db
    }

    pub fn coordinator(&self) -> &DistributedLockCoordinator {
        &self.coordinator
    }

    pub fn lock_defaults(&self) -> &LockDefaults {
        &self.lock_defaults
    }

    // ========================================================================
    // Distributed locks
    // ========================================================================

    pub async fn acquire_distributed_lock(
        &self,
        name: &str,
        timeout: Duration,
    ) -> Result<LockReleaser, LockError> {
        self.coordinator.acquire(name, timeout).await
    }

    pub async fn is_lock_used_by_any_session(&self, name: &str) -> Result<bool, LockError> {
        self.coordinator.is_lock_held_by_any_session(name).await
    }

    // ========================================================================
    // Transactions
    // ========================================================================

    /// Run `work` in a transaction with the default 30 second timeout.
    pub async fn transaction<T, E, F>(&self, work: F) -> Result<T, E>
    where
        F: for<'c> FnOnce(&'c DatabaseTransaction) -> BoxFuture<'c, Result<T, E>> + Send,
        T: Send,
        E: From<PersistenceError> + Send,
    {
        self.transaction_with_timeout(DEFAULT_TRANSACTION_TIMEOUT, work)
            .await
    }

    /// Run `work` in a transaction on the application pool.
    ///
    /// Commits when `work` succeeds. Rolls back when it fails or runs past
    /// `timeout`; the error of `work` is returned as is.
    pub async fn transaction_with_timeout<T, E, F>(&self, timeout: Duration, work: F) -> Result<T, E>
    where
        F: for<'c> FnOnce(&'c DatabaseTransaction) -> BoxFuture<'c, Result<T, E>> + Send,
        T: Send,
        E: From<PersistenceError> + Send,
    {
        let txn = self.db.begin().await.map_err(PersistenceError::from)?;

        let outcome = tokio::time::timeout(timeout, work(&txn)).await;
        match outcome {
            Ok(Ok(value)) => {
                txn.commit().await.map_err(PersistenceError::from)?;
                Ok(value)
            }
            Ok(Err(e)) => {
                rollback(txn).await;
                Err(e)
            }
            Err(_) => {
                warn!(timeout_ms = timeout.as_millis() as u64, "Transaction timed out");
                rollback(txn).await;
                Err(PersistenceError::TransactionTimeout { timeout }.into())
            }
        }
    }

    /// Run `work` in a transaction while holding the distributed lock `name`.
    ///
    /// No transaction starts unless the lock is acquired within
    /// `acquire_timeout`. The lock is released exactly once afterwards,
    /// whatever the transaction's outcome; a failed release is only logged.
    pub async fn locked_transaction<T, E, F>(
        &self,
        name: &str,
        acquire_timeout: Duration,
        transaction_timeout: Duration,
        work: F,
    ) -> Result<T, E>
    where
        F: for<'c> FnOnce(&'c DatabaseTransaction) -> BoxFuture<'c, Result<T, E>> + Send,
        T: Send,
        E: From<PersistenceError> + Send,
    {
        let mut releaser = self
            .coordinator
            .acquire(name, acquire_timeout)
            .await
            .map_err(PersistenceError::from)?;

        debug!(lock = %name, "Running locked transaction");
        let result = self.transaction_with_timeout(transaction_timeout, work).await;
        releaser.release().await;

        result
    }

    /// [`locked_transaction`](Self::locked_transaction) with the configured lock defaults
    pub async fn locked_transaction_with_defaults<T, E, F>(&self, work: F) -> Result<T, E>
    where
        F: for<'c> FnOnce(&'c DatabaseTransaction) -> BoxFuture<'c, Result<T, E>> + Send,
        T: Send,
        E: From<PersistenceError> + Send,
    {
        let LockDefaults {
            name,
            acquire_timeout,
            transaction_timeout,
        } = &self.lock_defaults;

        self.locked_transaction(name, *acquire_timeout, *transaction_timeout, work)
            .await
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Application database liveness
    pub async fn health(&self) -> ComponentStatus {
        match self.db.execute_unprepared("SELECT 1").await {
            Ok(_) => ComponentStatus::up(),
            Err(e) => ComponentStatus::down(e.to_string()),
        }
    }

    /// Close the application pool, then the lock session.
    ///
    /// Closing the lock session releases every database lock it still holds.
    pub async fn close(self) -> Result<(), PersistenceError> {
        debug!("Disconnecting application pool");
        let db_result = self.db.close().await;
        if let Err(e) = &db_result {
            warn!(error = %e, "Failed to close application pool");
        }

        self.coordinator.client().close().await?;
        debug!("Persistence service closed");

        db_result.map_err(PersistenceError::from)
    }
}

async fn rollback(txn: DatabaseTransaction) {
    if let Err(e) = txn.rollback().await {
        warn!(error = %e, "Transaction rollback failed");
    }
}
