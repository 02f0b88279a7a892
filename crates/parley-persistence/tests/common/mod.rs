//! Shared helpers for persistence tests

use std::sync::Arc;

use parley_lock::{DistributedLockCoordinator, InMemoryLockEngine};
use parley_persistence::{DatabaseConfig, PersistenceError, PersistenceService};
use sea_orm::{DatabaseConnection, DbErr};

/// Error type of the transactional work in tests
#[allow(dead_code)]
#[derive(Debug)]
pub enum ChatError {
    Persistence(PersistenceError),
    Db(DbErr),
    Rejected(String),
}

impl From<PersistenceError> for ChatError {
    fn from(value: PersistenceError) -> Self {
        ChatError::Persistence(value)
    }
}

impl From<DbErr> for ChatError {
    fn from(value: DbErr) -> Self {
        ChatError::Db(value)
    }
}

/// A service with no application database, locking through `engine`
#[allow(dead_code)]
pub fn offline_service(engine: &InMemoryLockEngine) -> PersistenceService {
    let coordinator = DistributedLockCoordinator::new(Arc::new(engine.session()));
    PersistenceService::new(DatabaseConnection::Disconnected, coordinator)
}

/// Settings for the scratch database in TEST_DATABASE_URL
#[allow(dead_code)]
pub fn test_database_config() -> DatabaseConfig {
    let url = std::env::var("TEST_DATABASE_URL").expect("TEST_DATABASE_URL not set");
    let mut config = DatabaseConfig::new(url);
    config.max_connections = 4;
    config
}
