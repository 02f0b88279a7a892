//! Parley Persistence - database access with distributed locking
//!
//! This crate provides:
//! - Application pool and lock session configuration
//! - Transactions bounded by a timeout
//! - Locked transactions serialized across service instances
//! - Database health reporting

pub mod config;
pub mod error;
pub mod health;
pub mod service;

pub use config::{DatabaseConfig, LockDefaults};
pub use error::PersistenceError;
pub use health::ComponentStatus;
pub use service::PersistenceService;
